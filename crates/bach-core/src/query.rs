//! Query construction.
//!
//! An area resolves to a registered [`QueryTemplate`]; a raw query bypasses
//! the templates entirely. Templates only guarantee placeholder substitution,
//! the reporting backend decides whether the resulting query is meaningful.

use crate::error::{BachError, Result};
use crate::params::Params;
use crate::registry::PluginRegistry;
use chrono::{Days, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Fields every excludable-entity query has to select so actors can address
/// the entity they mutate.
pub const EXCLUDABLE_FIELDS: [&str; 3] = ["customer_id", "campaign_id", "ad_group_id"];

const DEFAULT_LOOKBACK_DAYS: u64 = 7;

pub trait QueryTemplate: Send + Sync {
    fn build(&self, accounts: &[String], params: &Params) -> Result<String>;

    /// Whether queries built from this template select `field`. Templates
    /// that cannot tell answer `true`.
    fn selects(&self, _field: &str) -> bool {
        true
    }
}

/// Where the query for a pipeline comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySource {
    Area(String),
    Raw(String),
}

/// Resolve `source` into query text.
pub fn build_query(
    registry: &PluginRegistry,
    source: &QuerySource,
    accounts: &[String],
    params: &Params,
) -> Result<String> {
    match source {
        QuerySource::Raw(text) => Ok(text.clone()),
        QuerySource::Area(name) => {
            let area = registry.area(name)?;
            area.template.build(accounts, params)
        }
    }
}

/// Configuration error naming every field of `fields` the template lacks.
pub fn require_fields(template: &dyn QueryTemplate, fields: &[&str]) -> Result<()> {
    let missing: Vec<&str> = fields
        .iter()
        .copied()
        .filter(|f| !template.selects(f))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(BachError::Configuration(format!(
        "query text does not contain required fields: {}",
        missing.join(", ")
    )))
}

// ---------------------------------------------------------------------------
// TextTemplate
// ---------------------------------------------------------------------------

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern"))
}

/// Query text with `{placeholder}` slots.
///
/// Resolution order per placeholder: caller params, template defaults, then
/// the built-ins `accounts`, `start_date` and `end_date` (a window of
/// `lookback_days` days ending today).
#[derive(Debug, Clone)]
pub struct TextTemplate {
    body: String,
    defaults: Params,
}

impl TextTemplate {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            defaults: Params::new(),
        }
    }

    /// A template for entities actors can exclude; it must select
    /// [`EXCLUDABLE_FIELDS`].
    pub fn excludable(body: impl Into<String>) -> Result<Self> {
        let body = body.into();
        let template = Self::new(body);
        template.require(&EXCLUDABLE_FIELDS)?;
        Ok(template)
    }

    /// Fail unless the body mentions every one of `fields`.
    pub fn require(&self, fields: &[&str]) -> Result<()> {
        require_fields(self, fields)
    }

    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    fn resolve(&self, name: &str, accounts: &[String], params: &Params) -> Result<String> {
        if let Some(v) = params.get(name).or_else(|| self.defaults.get(name)) {
            return Ok(v.clone());
        }
        let lookback = || -> Result<u64> {
            match params.get("lookback_days").or_else(|| self.defaults.get("lookback_days")) {
                Some(v) => v.parse().map_err(|_| {
                    BachError::Configuration(format!("lookback_days must be a number, got '{v}'"))
                }),
                None => Ok(DEFAULT_LOOKBACK_DAYS),
            }
        };
        let today = Utc::now().date_naive();
        match name {
            "accounts" => Ok(accounts.join(",")),
            "end_date" => Ok(today.format("%Y-%m-%d").to_string()),
            "start_date" => {
                let start = today
                    .checked_sub_days(Days::new(lookback()?))
                    .unwrap_or(today);
                Ok(start.format("%Y-%m-%d").to_string())
            }
            _ => Err(BachError::Configuration(format!(
                "query parameter '{name}' is not set"
            ))),
        }
    }
}

impl QueryTemplate for TextTemplate {
    fn selects(&self, field: &str) -> bool {
        self.body.contains(field)
    }

    fn build(&self, accounts: &[String], params: &Params) -> Result<String> {
        let mut out = String::with_capacity(self.body.len());
        let mut last = 0;
        for caps in placeholder_re().captures_iter(&self.body) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&self.body[last..whole.start()]);
            out.push_str(&self.resolve(name.as_str(), accounts, params)?);
            last = whole.end();
        }
        out.push_str(&self.body[last..]);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Built-in areas
// ---------------------------------------------------------------------------

pub const PLACEMENT_QUERY: &str = "\
SELECT
  customer.id AS customer_id,
  campaign.id AS campaign_id,
  campaign.name AS campaign_name,
  ad_group.id AS ad_group_id,
  group_placement_view.placement AS placement,
  group_placement_view.placement_type AS placement_type,
  metrics.impressions AS impressions,
  metrics.clicks AS clicks,
  metrics.ctr AS ctr,
  metrics.cost_micros AS cost,
  metrics.conversions AS conversions
FROM group_placement_view
WHERE segments.date BETWEEN '{start_date}' AND '{end_date}'
  AND campaign.advertising_channel_type = '{campaign_type}'";

pub const KEYWORD_QUERY: &str = "\
SELECT
  customer.id AS customer_id,
  campaign.id AS campaign_id,
  campaign.name AS campaign_name,
  ad_group.id AS ad_group_id,
  search_term_view.search_term AS search_term,
  metrics.impressions AS impressions,
  metrics.clicks AS clicks,
  metrics.ctr AS ctr,
  metrics.cost_micros AS cost,
  metrics.conversions AS conversions
FROM search_term_view
WHERE segments.date BETWEEN '{start_date}' AND '{end_date}'
  AND campaign.advertising_channel_type = '{campaign_type}'";

pub fn placement_template() -> Result<TextTemplate> {
    Ok(TextTemplate::excludable(PLACEMENT_QUERY)?.with_default("campaign_type", "DISPLAY"))
}

pub fn keyword_template() -> Result<TextTemplate> {
    Ok(TextTemplate::excludable(KEYWORD_QUERY)?.with_default("campaign_type", "SEARCH"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_params_over_defaults() {
        let t = TextTemplate::new("SELECT a FROM t WHERE type = '{campaign_type}'")
            .with_default("campaign_type", "DISPLAY");
        assert_eq!(
            t.build(&[], &Params::new()).unwrap(),
            "SELECT a FROM t WHERE type = 'DISPLAY'"
        );
        assert_eq!(
            t.build(&[], &params(&[("campaign_type", "VIDEO")])).unwrap(),
            "SELECT a FROM t WHERE type = 'VIDEO'"
        );
    }

    #[test]
    fn expands_accounts_and_date_window() {
        let t = TextTemplate::new("{accounts}|{start_date}|{end_date}");
        let out = t
            .build(&["1".into(), "2".into()], &params(&[("lookback_days", "0")]))
            .unwrap();
        let parts: Vec<&str> = out.split('|').collect();
        assert_eq!(parts[0], "1,2");
        assert_eq!(parts[1], parts[2]);
        assert_eq!(parts[1].len(), 10);
    }

    #[test]
    fn unresolved_placeholder_is_a_configuration_error() {
        let t = TextTemplate::new("SELECT {metric} FROM t");
        assert!(matches!(
            t.build(&[], &Params::new()),
            Err(BachError::Configuration(_))
        ));
    }

    #[test]
    fn bad_lookback_is_rejected() {
        let t = TextTemplate::new("{start_date}");
        assert!(t.build(&[], &params(&[("lookback_days", "week")])).is_err());
    }

    #[test]
    fn excludable_templates_require_entity_fields() {
        let err = TextTemplate::excludable("SELECT customer.id AS customer_id FROM t").unwrap_err();
        let BachError::Configuration(msg) = err else {
            panic!("expected configuration error");
        };
        assert!(msg.contains("campaign_id"));
        assert!(msg.contains("ad_group_id"));
        assert!(placement_template().is_ok());
        assert!(keyword_template().is_ok());
    }

    #[test]
    fn text_templates_report_selected_fields() {
        let t = TextTemplate::new("SELECT placement, campaign.id AS campaign_id FROM t");
        assert!(t.selects("campaign_id"));
        assert!(!t.selects("ad_group_id"));
        let err = require_fields(&t, &EXCLUDABLE_FIELDS).unwrap_err();
        assert!(err.to_string().contains("customer_id, ad_group_id"));
    }

    #[test]
    fn raw_query_bypasses_templates() {
        let registry = PluginRegistry::builder().build().unwrap();
        let q = build_query(
            &registry,
            &QuerySource::Raw("SELECT 1".into()),
            &[],
            &Params::new(),
        )
        .unwrap();
        assert_eq!(q, "SELECT 1");
    }

    #[test]
    fn unknown_area_is_a_configuration_error() {
        let registry = PluginRegistry::builder().build().unwrap();
        let err = build_query(
            &registry,
            &QuerySource::Area("nope".into()),
            &[],
            &Params::new(),
        )
        .unwrap_err();
        assert!(matches!(err, BachError::Configuration(_)));
    }

    #[test]
    fn builtin_placement_area_renders() {
        let registry = PluginRegistry::builtin().unwrap();
        let q = build_query(
            &registry,
            &QuerySource::Area("placement".into()),
            &["123".into()],
            &params(&[("campaign_type", "VIDEO")]),
        )
        .unwrap();
        assert!(q.contains("FROM group_placement_view"));
        assert!(q.contains("= 'VIDEO'"));
        assert!(!q.contains('{'));
    }
}
