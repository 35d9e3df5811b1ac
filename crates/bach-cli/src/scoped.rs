use bach_core::params::{parse_scoped, Params};
use std::collections::BTreeMap;

pub const SCOPES: [&str; 2] = ["area", "notify"];

/// Pull `--area.<key>` / `--notify.<key>` overrides out of argv so clap
/// only sees the flags it knows. Returns `(plain, scoped)`.
pub fn split_args(args: Vec<String>) -> (Vec<String>, Vec<String>) {
    let prefixes: Vec<String> = SCOPES.iter().map(|s| format!("--{s}.")).collect();
    let mut plain = Vec::new();
    let mut scoped = Vec::new();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--" {
            plain.push(arg);
            plain.extend(iter.by_ref());
            break;
        }
        if !prefixes.iter().any(|p| arg.starts_with(p.as_str())) {
            plain.push(arg);
            continue;
        }
        let needs_value = !arg.contains('=');
        scoped.push(arg);
        if needs_value {
            scoped.extend(iter.next());
        }
    }
    (plain, scoped)
}

pub fn parse(scoped: &[String]) -> anyhow::Result<BTreeMap<String, Params>> {
    Ok(parse_scoped(scoped, &SCOPES)?)
}
