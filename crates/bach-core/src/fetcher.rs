//! Report fetchers.
//!
//! The default path hands query text to a [`ReportClient`], the boundary to
//! the ads reporting backend. Custom fetchers may ignore the query entirely.
//! Nothing here retries: a failed fetch is returned to the pipeline as-is.

use crate::error::{BachError, Result};
use crate::report::Report;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub trait Fetcher: Send + Sync {
    fn fetch(&self, query: Option<&str>, accounts: &[String]) -> Result<Report>;
}

/// Executes a query against the ads reporting backend.
pub trait ReportClient: Send + Sync {
    fn execute(&self, query: &str, accounts: &[String]) -> Result<Report>;
}

// ---------------------------------------------------------------------------
// ClientFetcher
// ---------------------------------------------------------------------------

/// Fetcher that requires a query and delegates it to a [`ReportClient`].
pub struct ClientFetcher<C> {
    client: C,
}

impl<C: ReportClient> ClientFetcher<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: ReportClient> Fetcher for ClientFetcher<C> {
    fn fetch(&self, query: Option<&str>, accounts: &[String]) -> Result<Report> {
        let query =
            query.ok_or_else(|| BachError::Fetch("no query to send to the reporting backend".into()))?;
        self.client.execute(query, accounts)
    }
}

// ---------------------------------------------------------------------------
// HttpReportClient
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ReportRequest<'a> {
    query: &'a str,
    accounts: &'a [String],
}

/// Posts `{query, accounts}` to a report-executor service and decodes the
/// `{columns, rows}` response.
pub struct HttpReportClient {
    endpoint: String,
    http: reqwest::blocking::Client,
}

impl HttpReportClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BachError::Configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }
}

impl ReportClient for HttpReportClient {
    fn execute(&self, query: &str, accounts: &[String]) -> Result<Report> {
        tracing::debug!(endpoint = %self.endpoint, accounts = accounts.len(), "executing report query");
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&ReportRequest { query, accounts })
            .send()
            .map_err(|e| BachError::Fetch(format!("request to {} failed: {e}", self.endpoint)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(BachError::Fetch(format!(
                "{} returned {status}: {}",
                self.endpoint,
                body.trim()
            )));
        }
        resp.json::<Report>()
            .map_err(|e| BachError::Fetch(format!("malformed report from {}: {e}", self.endpoint)))
    }
}

// ---------------------------------------------------------------------------
// FileFetcher / StaticFetcher
// ---------------------------------------------------------------------------

/// Reads a report from a JSON or YAML file; the query is ignored.
pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Fetcher for FileFetcher {
    fn fetch(&self, _query: Option<&str>, _accounts: &[String]) -> Result<Report> {
        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            BachError::Fetch(format!("cannot read report {}: {e}", self.path.display()))
        })?;
        let is_yaml = matches!(
            self.path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );
        let parsed = if is_yaml {
            serde_yaml::from_str(&data).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&data).map_err(|e| e.to_string())
        };
        parsed.map_err(|e| BachError::Fetch(format!("malformed report {}: {e}", self.path.display())))
    }
}

/// Always returns the same report.
pub struct StaticFetcher {
    report: Report,
}

impl StaticFetcher {
    pub fn new(report: Report) -> Self {
        Self { report }
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, _query: Option<&str>, _accounts: &[String]) -> Result<Report> {
        Ok(self.report.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Value;
    use tempfile::TempDir;

    #[test]
    fn client_fetcher_requires_a_query() {
        struct Never;
        impl ReportClient for Never {
            fn execute(&self, _: &str, _: &[String]) -> Result<Report> {
                unreachable!()
            }
        }
        let err = ClientFetcher::new(Never).fetch(None, &[]).unwrap_err();
        assert!(matches!(err, BachError::Fetch(_)));
    }

    #[test]
    fn http_client_posts_query_and_decodes_report() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/report")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "query": "SELECT clicks FROM t",
                "accounts": ["123"],
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"columns":["clicks"],"rows":[[15],[5]]}"#)
            .create();

        let client =
            HttpReportClient::new(format!("{}/report", server.url()), Duration::from_secs(5)).unwrap();
        let report = ClientFetcher::new(client)
            .fetch(Some("SELECT clicks FROM t"), &["123".into()])
            .unwrap();

        mock.assert();
        assert_eq!(report.len(), 2);
        assert_eq!(report.row(0).unwrap().get("clicks"), Some(&Value::Int(15)));
    }

    #[test]
    fn http_error_status_is_a_fetch_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/report")
            .with_status(401)
            .with_body("invalid credentials")
            .create();
        let client =
            HttpReportClient::new(format!("{}/report", server.url()), Duration::from_secs(5)).unwrap();
        let err = client.execute("SELECT 1", &[]).unwrap_err();
        let BachError::Fetch(msg) = err else {
            panic!("expected fetch error");
        };
        assert!(msg.contains("401"));
        assert!(msg.contains("invalid credentials"));
    }

    #[test]
    fn file_fetcher_reads_json_and_yaml() {
        let dir = TempDir::new().unwrap();
        let json = dir.path().join("r.json");
        std::fs::write(&json, r#"{"columns":["clicks"],"rows":[[1]]}"#).unwrap();
        let yaml = dir.path().join("r.yaml");
        std::fs::write(&yaml, "columns: [clicks]\nrows:\n  - [1]\n").unwrap();

        let a = FileFetcher::new(&json).fetch(None, &[]).unwrap();
        let b = FileFetcher::new(&yaml).fetch(Some("ignored"), &[]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_file_is_a_fetch_error() {
        let err = FileFetcher::new("/nonexistent/report.json")
            .fetch(None, &[])
            .unwrap_err();
        assert!(matches!(err, BachError::Fetch(_)));
    }
}
