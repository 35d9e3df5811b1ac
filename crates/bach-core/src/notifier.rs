//! Notification channels.
//!
//! Delivery is best-effort: [`deliver`] sends to every channel in order and
//! records failures instead of stopping at the first one.

use crate::actor::ActionResult;
use crate::error::{BachError, Result};
use crate::params::Params;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;
    fn send(&self, result: &ActionResult) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelFailure {
    pub channel: String,
    pub error: String,
}

/// Per-channel outcome of one notify stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationSummary {
    pub delivered: Vec<String>,
    pub failed: Vec<ChannelFailure>,
}

impl NotificationSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub fn deliver(channels: &[Arc<dyn Notifier>], result: &ActionResult) -> NotificationSummary {
    let mut summary = NotificationSummary::default();
    for channel in channels {
        match channel.send(result) {
            Ok(()) => summary.delivered.push(channel.name().to_string()),
            Err(e) => {
                tracing::warn!(channel = channel.name(), error = %e, "notification failed");
                summary.failed.push(ChannelFailure {
                    channel: channel.name().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
    summary
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStream {
    Stdout,
    Stderr,
}

/// Name the console channel is registered under.
pub const CONSOLE_CHANNEL: &str = "console";

pub struct ConsoleNotifier {
    format: ConsoleFormat,
    stream: ConsoleStream,
}

impl ConsoleNotifier {
    pub fn new(format: ConsoleFormat) -> Self {
        Self {
            format,
            stream: ConsoleStream::Stdout,
        }
    }

    pub fn with_stream(mut self, stream: ConsoleStream) -> Self {
        self.stream = stream;
        self
    }

    pub fn stream(&self) -> ConsoleStream {
        self.stream
    }

    /// `format` is `table` (default) or `json`; `stream` is `stdout`
    /// (default) or `stderr`.
    pub fn from_params(params: &Params) -> Result<Self> {
        let format = match params.get("format").map(String::as_str) {
            None | Some("table") => ConsoleFormat::Table,
            Some("json") => ConsoleFormat::Json,
            Some(other) => {
                return Err(BachError::Configuration(format!(
                    "console format must be 'table' or 'json', got '{other}'"
                )))
            }
        };
        let stream = match params.get("stream").map(String::as_str) {
            None | Some("stdout") => ConsoleStream::Stdout,
            Some("stderr") => ConsoleStream::Stderr,
            Some(other) => {
                return Err(BachError::Configuration(format!(
                    "console stream must be 'stdout' or 'stderr', got '{other}'"
                )))
            }
        };
        Ok(Self::new(format).with_stream(stream))
    }

    pub fn render(&self, result: &ActionResult) -> Result<String> {
        match self.format {
            ConsoleFormat::Json => Ok(serde_json::to_string_pretty(result)?),
            ConsoleFormat::Table => Ok(render_table(result)),
        }
    }
}

impl Notifier for ConsoleNotifier {
    fn name(&self) -> &str {
        CONSOLE_CHANNEL
    }

    fn send(&self, result: &ActionResult) -> Result<()> {
        let text = self.render(result)?;
        match self.stream {
            ConsoleStream::Stdout => println!("{text}"),
            ConsoleStream::Stderr => eprintln!("{text}"),
        }
        Ok(())
    }
}

/// Text table of the rows plus a status column when an actor ran.
pub fn render_table(result: &ActionResult) -> String {
    let mut headers: Vec<String> = result.report.columns().to_vec();
    let mut rows: Vec<Vec<String>> = result
        .report
        .rows()
        .map(|row| row.values().iter().map(|v| v.to_string()).collect())
        .collect();
    if let Some(outcomes) = &result.outcomes {
        headers.push("status".to_string());
        for (row, outcome) in rows.iter_mut().zip(outcomes) {
            row.push(outcome.status.to_string());
        }
    }

    format!("{}\n{}", result.summary(), format_table(&headers, &rows))
}

/// Left-aligned columns separated by two spaces, with a dashed rule under
/// the header. Cells beyond the header count are dropped.
pub fn format_table<H: AsRef<str>>(headers: &[H], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.as_ref().len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    let mut out = vec![
        pad_line(headers.iter().map(|h| h.as_ref()), &widths),
        pad_line(rule.iter().map(String::as_str), &widths),
    ];
    out.extend(rows.iter().map(|r| pad_line(r.iter().map(String::as_str), &widths)));
    out.join("\n")
}

fn pad_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(c, &width)| format!("{c:width$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

/// Posts the ActionResult as JSON to a chat webhook.
pub struct WebhookNotifier {
    url: String,
    http: reqwest::blocking::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BachError::Configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }

    pub fn from_params(params: &Params, timeout: Duration) -> Result<Self> {
        let url = params.get("url").ok_or_else(|| {
            BachError::Configuration("webhook notifier requires a 'url' parameter".into())
        })?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(BachError::Configuration(format!(
                "webhook url must be http(s), got '{url}'"
            )));
        }
        Self::new(url.clone(), timeout)
    }

    fn failure(&self, reason: impl Into<String>) -> BachError {
        BachError::Notification {
            channel: "webhook".into(),
            reason: reason.into(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    fn send(&self, result: &ActionResult) -> Result<()> {
        let resp = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({
                "text": result.summary(),
                "result": result,
            }))
            .send()
            .map_err(|e| self.failure(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(self.failure(format!("{} returned {}", self.url, resp.status())));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn send(&self, result: &ActionResult) -> Result<()> {
        tracing::info!(
            actor = result.actor.as_deref().unwrap_or("none"),
            rows = result.report.len(),
            "{}",
            result.summary()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::RowOutcome;
    use crate::report::{Report, Value};

    fn result() -> ActionResult {
        ActionResult {
            actor: Some("placement_exclusion".into()),
            report: Report::new(
                vec!["placement".into(), "clicks".into()],
                vec![
                    vec!["example.com".into(), Value::Int(12)],
                    vec!["a.io".into(), Value::Int(3)],
                ],
            )
            .unwrap(),
            outcomes: Some(vec![RowOutcome::applied("ok"), RowOutcome::skipped("no")]),
        }
    }

    struct Failing;

    impl Notifier for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn send(&self, _: &ActionResult) -> Result<()> {
            Err(BachError::Notification {
                channel: "failing".into(),
                reason: "boom".into(),
            })
        }
    }

    #[test]
    fn table_includes_status_column() {
        let table = render_table(&result());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "placement_exclusion: 2 rows (1 applied, 1 skipped, 0 failed)");
        assert_eq!(lines[1], "placement    clicks  status");
        assert_eq!(lines[3], "example.com  12      applied");
        assert_eq!(lines[4], "a.io         3       skipped");
    }

    #[test]
    fn format_table_pads_to_the_widest_cell() {
        let table = format_table(
            &["ID", "NAME"],
            &[
                vec!["1".to_string(), "nightly".to_string()],
                vec!["1234".to_string(), "x".to_string()],
            ],
        );
        assert_eq!(table, "ID    NAME\n----  -------\n1     nightly\n1234  x");
        assert_eq!(format_table(&["EMPTY"], &[]), "EMPTY\n-----");
    }

    #[test]
    fn console_json_format() {
        let console = ConsoleNotifier::from_params(&Params::from([(
            "format".to_string(),
            "json".to_string(),
        )]))
        .unwrap();
        let out: serde_json::Value = serde_json::from_str(&console.render(&result()).unwrap()).unwrap();
        assert_eq!(out["actor"], "placement_exclusion");
        assert_eq!(out["outcomes"][1]["status"], "skipped");
    }

    #[test]
    fn console_stream_defaults_to_stdout() {
        let console = ConsoleNotifier::from_params(&Params::new()).unwrap();
        assert_eq!(console.stream(), ConsoleStream::Stdout);
        let params = Params::from([("stream".to_string(), "stderr".to_string())]);
        let console = ConsoleNotifier::from_params(&params).unwrap();
        assert_eq!(console.stream(), ConsoleStream::Stderr);
        let params = Params::from([("stream".to_string(), "file".to_string())]);
        assert!(ConsoleNotifier::from_params(&params).is_err());
    }

    #[test]
    fn console_rejects_unknown_format() {
        let params = Params::from([("format".to_string(), "xml".to_string())]);
        assert!(ConsoleNotifier::from_params(&params).is_err());
    }

    #[test]
    fn webhook_requires_url() {
        let err = WebhookNotifier::from_params(&Params::new(), Duration::from_secs(1)).err();
        assert!(matches!(err, Some(BachError::Configuration(_))));
    }

    #[test]
    fn webhook_posts_result() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/hook")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "result": {"actor": "placement_exclusion"}
            })))
            .with_status(200)
            .create();
        let params = Params::from([("url".to_string(), format!("{}/hook", server.url()))]);
        let hook = WebhookNotifier::from_params(&params, Duration::from_secs(5)).unwrap();
        hook.send(&result()).unwrap();
        mock.assert();
    }

    #[test]
    fn delivery_continues_past_failures() {
        let mut server = mockito::Server::new();
        let _down = server.mock("POST", "/hook").with_status(500).create();
        let params = Params::from([("url".to_string(), format!("{}/hook", server.url()))]);
        let hook = WebhookNotifier::from_params(&params, Duration::from_secs(5)).unwrap();

        let channels: Vec<Arc<dyn Notifier>> = vec![Arc::new(Failing), Arc::new(hook), Arc::new(LogNotifier)];
        let summary = deliver(&channels, &result());
        assert_eq!(summary.delivered, vec!["log"]);
        assert_eq!(summary.failed.len(), 2);
        assert_eq!(summary.failed[0].channel, "failing");
        assert_eq!(summary.failed[1].channel, "webhook");
        assert!(!summary.is_complete());
    }
}
