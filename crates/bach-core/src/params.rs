//! Free-form string parameters and the `--<scope>.<key>=<value>` syntax used
//! to pass them on the command line.

use crate::error::{BachError, Result};
use std::collections::BTreeMap;

/// Plugin and pipeline parameters. Ordered so snapshots serialize stably.
pub type Params = BTreeMap<String, String>;

/// Parse scoped overrides such as `--area.exclusion_level=AD_GROUP` or
/// `--notify.url https://example.com/hook` into one map per scope.
///
/// Every scope in `scopes` is present in the output, possibly empty. A scope
/// outside `scopes` or a dangling key without a value is a configuration error.
pub fn parse_scoped(args: &[String], scopes: &[&str]) -> Result<BTreeMap<String, Params>> {
    let mut out: BTreeMap<String, Params> = scopes
        .iter()
        .map(|s| (s.to_string(), Params::new()))
        .collect();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let Some(body) = arg.strip_prefix("--") else {
            return Err(BachError::Configuration(format!(
                "unexpected argument '{arg}', expected --<scope>.<key>=<value>"
            )));
        };
        let (path, inline_value) = match body.split_once('=') {
            Some((path, value)) => (path, Some(value.to_string())),
            None => (body, None),
        };
        let Some((scope, key)) = path.split_once('.') else {
            return Err(BachError::Configuration(format!(
                "argument '{arg}' is missing a scope, expected --<scope>.<key>"
            )));
        };
        let Some(params) = out.get_mut(scope) else {
            return Err(BachError::Configuration(format!(
                "unknown parameter scope '{scope}', expected one of: {}",
                scopes.join(", ")
            )));
        };
        let value = match inline_value {
            Some(v) => v,
            None => iter.next().cloned().ok_or_else(|| {
                BachError::Configuration(format!("argument '{arg}' has no value"))
            })?,
        };
        params.insert(key.replace('-', "_"), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_inline_and_separate_values() {
        let parsed = parse_scoped(
            &args(&[
                "--area.exclusion_level=CAMPAIGN",
                "--notify.url",
                "https://chat.example.com/hook",
                "--area.campaign-type=VIDEO",
            ]),
            &["area", "notify"],
        )
        .unwrap();
        assert_eq!(parsed["area"]["exclusion_level"], "CAMPAIGN");
        assert_eq!(parsed["area"]["campaign_type"], "VIDEO");
        assert_eq!(parsed["notify"]["url"], "https://chat.example.com/hook");
    }

    #[test]
    fn every_scope_is_present() {
        let parsed = parse_scoped(&[], &["area", "notify"]).unwrap();
        assert!(parsed["area"].is_empty());
        assert!(parsed["notify"].is_empty());
    }

    #[test]
    fn unknown_scope_is_rejected() {
        let err = parse_scoped(&args(&["--macro.start=1"]), &["area"]).unwrap_err();
        assert!(matches!(err, BachError::Configuration(_)));
    }

    #[test]
    fn dangling_key_is_rejected() {
        assert!(parse_scoped(&args(&["--area.level"]), &["area"]).is_err());
        assert!(parse_scoped(&args(&["--area=1"]), &["area"]).is_err());
        assert!(parse_scoped(&args(&["area.level=1"]), &["area"]).is_err());
    }
}
