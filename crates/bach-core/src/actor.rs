//! Actors: what happens to the rows that survive the rules.
//!
//! An actor receives the filtered report plus its parameters and returns an
//! [`ActionResult`] with one outcome per row. Row-level problems become
//! `failed` or `skipped` outcomes; only bad parameters are errors.

use crate::error::{BachError, Result};
use crate::params::Params;
use crate::query::EXCLUDABLE_FIELDS;
use crate::report::{Report, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub trait Actor: Send + Sync {
    fn name(&self) -> &str;
    fn act(&self, report: &Report, params: &Params) -> Result<ActionResult>;

    /// Fields an area query must select before this actor can be its default.
    fn required_query_fields(&self) -> &[&'static str] {
        &[]
    }
}

// ---------------------------------------------------------------------------
// ActionResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Applied,
    Skipped,
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Applied => "applied",
            OutcomeStatus::Skipped => "skipped",
            OutcomeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowOutcome {
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RowOutcome {
    pub fn applied(detail: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Applied,
            detail: Some(detail.into()),
        }
    }

    pub fn skipped(detail: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Skipped,
            detail: Some(detail.into()),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            detail: Some(detail.into()),
        }
    }
}

/// Rows an actor was given plus what it did with each of them.
///
/// `outcomes` is `None` when no actor ran; otherwise it has one entry per row
/// of `report`, in the same order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub actor: Option<String>,
    pub report: Report,
    pub outcomes: Option<Vec<RowOutcome>>,
}

impl ActionResult {
    pub fn passthrough(report: Report) -> Self {
        Self {
            actor: None,
            report,
            outcomes: None,
        }
    }

    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes
            .as_ref()
            .map(|o| o.iter().filter(|r| r.status == status).count())
            .unwrap_or(0)
    }

    /// One-line summary: "placement_exclusion: 3 rows (2 applied, 1 skipped, 0 failed)"
    pub fn summary(&self) -> String {
        match &self.actor {
            None => format!("no actor: {} rows", self.report.len()),
            Some(actor) => format!(
                "{actor}: {} rows ({} applied, {} skipped, {} failed)",
                self.report.len(),
                self.count(OutcomeStatus::Applied),
                self.count(OutcomeStatus::Skipped),
                self.count(OutcomeStatus::Failed),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Exclusion model
// ---------------------------------------------------------------------------

/// Where a negative criterion is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExclusionLevel {
    AdGroup,
    Campaign,
    Account,
}

impl ExclusionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ExclusionLevel::AdGroup => "AD_GROUP",
            ExclusionLevel::Campaign => "CAMPAIGN",
            ExclusionLevel::Account => "ACCOUNT",
        }
    }

    fn from_params(params: &Params) -> Result<Self> {
        params
            .get("exclusion_level")
            .map(|v| v.parse())
            .unwrap_or(Ok(ExclusionLevel::AdGroup))
    }
}

impl fmt::Display for ExclusionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExclusionLevel {
    type Err = BachError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AD_GROUP" => Ok(ExclusionLevel::AdGroup),
            "CAMPAIGN" => Ok(ExclusionLevel::Campaign),
            "ACCOUNT" => Ok(ExclusionLevel::Account),
            _ => Err(BachError::Configuration(format!(
                "unknown exclusion level '{s}', expected AD_GROUP, CAMPAIGN or ACCOUNT"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Criterion {
    Website { url: String },
    MobileApplication { app_id: String },
    YoutubeVideo { video_id: String },
    YoutubeChannel { channel_id: String },
    Keyword { text: String, match_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionOperation {
    pub customer_id: String,
    pub level: ExclusionLevel,
    /// Resource the criterion attaches to, e.g. `customers/1/adGroups/2`.
    pub resource: String,
    pub criterion: Criterion,
    pub negative: bool,
}

/// The ads mutate API. One call per customer.
pub trait MutateClient: Send + Sync {
    fn mutate(&self, customer_id: &str, operations: &[ExclusionOperation]) -> Result<()>;
}

/// Logs operations instead of sending them.
#[derive(Debug, Default)]
pub struct DryRunMutateClient;

impl MutateClient for DryRunMutateClient {
    fn mutate(&self, customer_id: &str, operations: &[ExclusionOperation]) -> Result<()> {
        for op in operations {
            tracing::info!(
                customer_id,
                level = %op.level,
                resource = %op.resource,
                criterion = ?op.criterion,
                "dry run: would add negative criterion"
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ExclusionActor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionKind {
    Placement,
    Keyword,
}

pub struct ExclusionActor {
    kind: ExclusionKind,
    client: Arc<dyn MutateClient>,
}

impl ExclusionActor {
    pub fn new(kind: ExclusionKind, client: Arc<dyn MutateClient>) -> Self {
        Self { kind, client }
    }

    fn required_columns(&self, report: &Report, level: ExclusionLevel) -> Vec<&'static str> {
        let mut cols = vec!["customer_id"];
        match level {
            ExclusionLevel::AdGroup => cols.push("ad_group_id"),
            ExclusionLevel::Campaign => cols.push("campaign_id"),
            ExclusionLevel::Account => {}
        }
        match self.kind {
            ExclusionKind::Placement => cols.extend(["placement", "placement_type"]),
            ExclusionKind::Keyword if report.has_column("search_term") => cols.push("search_term"),
            ExclusionKind::Keyword => cols.push("keyword"),
        }
        cols
    }

    /// Build the operation for one row, or the outcome explaining why not.
    fn operation(
        &self,
        row: &Row<'_>,
        level: ExclusionLevel,
    ) -> std::result::Result<ExclusionOperation, RowOutcome> {
        let cell = |field: &str| -> std::result::Result<String, RowOutcome> {
            match row.get(field).map(|v| v.to_string()) {
                Some(v) if !v.is_empty() => Ok(v),
                _ => Err(RowOutcome::failed(format!("'{field}' is empty"))),
            }
        };

        let customer_id = cell("customer_id")?;
        let resource = match level {
            ExclusionLevel::AdGroup => format!("customers/{customer_id}/adGroups/{}", cell("ad_group_id")?),
            ExclusionLevel::Campaign => format!("customers/{customer_id}/campaigns/{}", cell("campaign_id")?),
            ExclusionLevel::Account => format!("customers/{customer_id}"),
        };

        let (criterion, negative) = match self.kind {
            ExclusionKind::Placement => {
                let placement = cell("placement")?;
                let criterion = match cell("placement_type")?.as_str() {
                    "WEBSITE" => Criterion::Website {
                        url: format_website(&placement),
                    },
                    "MOBILE_APPLICATION" => Criterion::MobileApplication {
                        app_id: format_app_id(&placement),
                    },
                    "YOUTUBE_VIDEO" => Criterion::YoutubeVideo {
                        video_id: placement,
                    },
                    "YOUTUBE_CHANNEL" => Criterion::YoutubeChannel {
                        channel_id: placement,
                    },
                    other => {
                        return Err(RowOutcome::skipped(format!(
                            "placement type '{other}' cannot be excluded"
                        )))
                    }
                };
                (criterion, level != ExclusionLevel::Account)
            }
            ExclusionKind::Keyword => {
                let field = if row.get("search_term").is_some() {
                    "search_term"
                } else {
                    "keyword"
                };
                let criterion = Criterion::Keyword {
                    text: cell(field)?,
                    match_type: "EXACT".to_string(),
                };
                (criterion, true)
            }
        };

        Ok(ExclusionOperation {
            customer_id,
            level,
            resource,
            criterion,
            negative,
        })
    }
}

impl Actor for ExclusionActor {
    fn name(&self) -> &str {
        match self.kind {
            ExclusionKind::Placement => "placement_exclusion",
            ExclusionKind::Keyword => "keyword_exclusion",
        }
    }

    fn required_query_fields(&self) -> &[&'static str] {
        &EXCLUDABLE_FIELDS
    }

    fn act(&self, report: &Report, params: &Params) -> Result<ActionResult> {
        let level = ExclusionLevel::from_params(params)?;
        let missing: Vec<&str> = self
            .required_columns(report, level)
            .into_iter()
            .filter(|c| !report.has_column(c))
            .collect();
        if !missing.is_empty() {
            let detail = format!("report is missing columns: {}", missing.join(", "));
            tracing::warn!(actor = self.name(), "{detail}");
            return Ok(ActionResult {
                actor: Some(self.name().to_string()),
                report: report.clone(),
                outcomes: Some(vec![RowOutcome::failed(detail); report.len()]),
            });
        }

        let mut outcomes: Vec<Option<RowOutcome>> = vec![None; report.len()];
        // (customer_id, [(row index, operation)]) in first-seen order.
        let mut batches: Vec<(String, Vec<(usize, ExclusionOperation)>)> = Vec::new();
        for (i, row) in report.rows().enumerate() {
            match self.operation(&row, level) {
                Ok(op) => match batches.iter_mut().find(|(c, _)| *c == op.customer_id) {
                    Some((_, ops)) => ops.push((i, op)),
                    None => batches.push((op.customer_id.clone(), vec![(i, op)])),
                },
                Err(outcome) => outcomes[i] = Some(outcome),
            }
        }

        for (customer_id, entries) in &batches {
            let ops: Vec<ExclusionOperation> = entries.iter().map(|(_, op)| op.clone()).collect();
            let outcome = match self.client.mutate(customer_id, &ops) {
                Ok(()) => RowOutcome::applied(format!("excluded at {level}")),
                Err(e) => {
                    tracing::warn!(actor = self.name(), customer_id = %customer_id, error = %e, "mutate failed");
                    RowOutcome::failed(e.to_string())
                }
            };
            for (i, _) in entries {
                outcomes[*i] = Some(outcome.clone());
            }
        }

        let outcomes = outcomes
            .into_iter()
            .map(|o| o.unwrap_or_else(|| RowOutcome::failed("row was not processed")))
            .collect();
        Ok(ActionResult {
            actor: Some(self.name().to_string()),
            report: report.clone(),
            outcomes: Some(outcomes),
        })
    }
}

/// Website placements are excluded by domain: everything before the first `/`.
pub fn format_website(url: &str) -> String {
    url.split('/').next().unwrap_or(url).to_string()
}

/// `mobileapp::<store>-<id>` becomes `<store>-<id>`, dropping the `1000`
/// store prefix. Other ids pass through.
pub fn format_app_id(app_id: &str) -> String {
    if !app_id.starts_with("mobileapp::") {
        return app_id.to_string();
    }
    let mut parts = app_id.split('-');
    let head = parts.next().unwrap_or_default();
    let id = app_id.rsplit('-').next().unwrap_or_default();
    let store = head
        .rsplit("::")
        .next()
        .unwrap_or_default()
        .replace("mobileapp::1000", "")
        .replace("1000", "");
    format!("{store}-{id}")
}
