//! Rule sources beyond the ads report.
//!
//! A rule such as `YOUTUBE_CHANNEL_INFO:viewCount > 1000` reads a field the
//! ads report does not carry. Before filtering, the pipeline asks the
//! enricher registered for that source for the attributes its rules name and
//! joins them into the report as `SOURCE:attribute` columns.

use crate::error::{BachError, Result};
use crate::fetcher::ReportClient;
use crate::report::{Report, Row, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub trait Enricher: Send + Sync {
    /// Rule source prefix this enricher answers for, uppercase.
    fn source(&self) -> &str;

    /// Attributes the enricher can supply.
    fn fields(&self) -> Vec<String>;

    /// One row per row of `report`, one column per entry of `fields`.
    /// Rows the source knows nothing about hold [`Value::Null`].
    fn enrich(&self, report: &Report, fields: &[String]) -> Result<Report>;
}

// ---------------------------------------------------------------------------
// EntityEnricher
// ---------------------------------------------------------------------------

/// Looks up the entity named in `key_column` through a [`ReportClient`].
///
/// Only rows whose `filter` column holds the filter value are looked up;
/// every distinct key goes out in a single query.
pub struct EntityEnricher {
    source: String,
    resource: String,
    key_column: String,
    filter: Option<(String, String)>,
    /// `(path in the resource, attribute name)`
    attributes: Vec<(String, String)>,
    client: Arc<dyn ReportClient>,
}

impl EntityEnricher {
    pub fn new(
        source: &str,
        resource: &str,
        key_column: &str,
        client: Arc<dyn ReportClient>,
    ) -> Self {
        Self {
            source: source.to_ascii_uppercase(),
            resource: resource.to_string(),
            key_column: key_column.to_string(),
            filter: None,
            attributes: Vec::new(),
            client,
        }
    }

    /// Only enrich rows where `column` equals `value`.
    pub fn when(mut self, column: &str, value: &str) -> Self {
        self.filter = Some((column.to_string(), value.to_string()));
        self
    }

    pub fn attribute(mut self, path: &str, name: &str) -> Self {
        self.attributes.push((path.to_string(), name.to_string()));
        self
    }

    fn selected(&self, row: &Row<'_>) -> bool {
        match &self.filter {
            Some((column, value)) => row.get_str(column) == Some(value.as_str()),
            None => true,
        }
    }

    fn key(&self, row: &Row<'_>) -> Option<String> {
        match row.get(&self.key_column)? {
            Value::Null => None,
            v => Some(v.to_string()),
        }
    }

    fn query(&self, keys: &[String], fields: &[(String, String)]) -> String {
        let mut select = vec!["  id".to_string()];
        select.extend(fields.iter().map(|(path, name)| format!("  {path} AS {name}")));
        let ids: Vec<String> = keys
            .iter()
            .map(|k| format!("'{}'", k.replace('\'', "''")))
            .collect();
        format!(
            "SELECT\n{}\nFROM {}\nWHERE id IN ({})",
            select.join(",\n"),
            self.resource,
            ids.join(", ")
        )
    }
}

impl Enricher for EntityEnricher {
    fn source(&self) -> &str {
        &self.source
    }

    fn fields(&self) -> Vec<String> {
        self.attributes.iter().map(|(_, name)| name.clone()).collect()
    }

    fn enrich(&self, report: &Report, fields: &[String]) -> Result<Report> {
        let wanted: Vec<(String, String)> = fields
            .iter()
            .map(|f| {
                self.attributes
                    .iter()
                    .find(|(_, name)| name == f)
                    .cloned()
                    .ok_or_else(|| {
                        BachError::Configuration(format!(
                            "{} has no attribute '{f}' (available: {})",
                            self.source,
                            self.fields().join(", ")
                        ))
                    })
            })
            .collect::<Result<_>>()?;

        if !report.has_column(&self.key_column) {
            return Err(BachError::InvalidReport(format!(
                "{} needs a '{}' column to look entities up",
                self.source, self.key_column
            )));
        }

        let keys: Vec<Option<String>> = report
            .rows()
            .map(|row| if self.selected(&row) { self.key(&row) } else { None })
            .collect();
        let mut distinct: Vec<String> = Vec::new();
        for key in keys.iter().flatten() {
            if !distinct.contains(key) {
                distinct.push(key.clone());
            }
        }

        let mut found: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        if !distinct.is_empty() {
            tracing::debug!(source = %self.source, entities = distinct.len(), "enriching report");
            let response = self.client.execute(&self.query(&distinct, &wanted), &[])?;
            let columns: Vec<usize> = std::iter::once("id")
                .chain(wanted.iter().map(|(_, name)| name.as_str()))
                .map(|c| {
                    response.columns().iter().position(|rc| rc == c).ok_or_else(|| {
                        BachError::Fetch(format!("{} response has no '{c}' column", self.source))
                    })
                })
                .collect::<Result<_>>()?;
            for row in response.rows() {
                let values = row.values();
                let id = values[columns[0]].to_string();
                let attrs = columns[1..].iter().map(|&i| values[i].clone()).collect();
                found.insert(id, attrs);
            }
        }

        let rows = keys
            .iter()
            .map(|key| {
                key.as_ref()
                    .and_then(|k| found.get(k).cloned())
                    .unwrap_or_else(|| vec![Value::Null; wanted.len()])
            })
            .collect();
        Report::new(fields.to_vec(), rows)
    }
}

// ---------------------------------------------------------------------------
// Built-in sources
// ---------------------------------------------------------------------------

pub const YOUTUBE_CHANNEL_SOURCE: &str = "YOUTUBE_CHANNEL_INFO";
pub const YOUTUBE_VIDEO_SOURCE: &str = "YOUTUBE_VIDEO_INFO";

const YOUTUBE_ATTRIBUTES: [(&str, &str); 11] = [
    ("snippet.title", "title"),
    ("snippet.description", "description"),
    ("snippet.defaultLanguage", "defaultLanguage"),
    ("snippet.defaultAudioLanguage", "defaultAudioLanguage"),
    ("snippet.tags", "tags"),
    ("statistics.commentCount", "commentCount"),
    ("statistics.favouriteCount", "favouriteCount"),
    ("statistics.likeCount", "likeCount"),
    ("statistics.viewCount", "viewCount"),
    ("status.madeForKids", "madeForKids"),
    ("topicDetails.topicCategories", "topicCategories"),
];

fn youtube(
    source: &str,
    resource: &str,
    placement_type: &str,
    client: Arc<dyn ReportClient>,
) -> EntityEnricher {
    let base = EntityEnricher::new(source, resource, "placement", client)
        .when("placement_type", placement_type);
    YOUTUBE_ATTRIBUTES
        .iter()
        .fold(base, |enricher, (path, name)| enricher.attribute(path, name))
}

/// Channel metadata for `YOUTUBE_CHANNEL` placements.
pub fn youtube_channel_enricher(client: Arc<dyn ReportClient>) -> EntityEnricher {
    youtube(YOUTUBE_CHANNEL_SOURCE, "channels", "YOUTUBE_CHANNEL", client)
}

/// Video metadata for `YOUTUBE_VIDEO` placements.
pub fn youtube_video_enricher(client: Arc<dyn ReportClient>) -> EntityEnricher {
    youtube(YOUTUBE_VIDEO_SOURCE, "videos", "YOUTUBE_VIDEO", client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers every query with `response` and records the query text.
    struct Canned {
        response: Report,
        queries: Mutex<Vec<String>>,
    }

    impl ReportClient for Canned {
        fn execute(&self, query: &str, _accounts: &[String]) -> Result<Report> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self.response.clone())
        }
    }

    fn canned(columns: &[&str], rows: Vec<Vec<Value>>) -> Arc<Canned> {
        Arc::new(Canned {
            response: Report::new(columns.iter().map(|c| c.to_string()).collect(), rows).unwrap(),
            queries: Mutex::new(Vec::new()),
        })
    }

    fn placements() -> Report {
        Report::new(
            vec!["placement".into(), "placement_type".into(), "clicks".into()],
            vec![
                vec!["UCgames".into(), "YOUTUBE_CHANNEL".into(), Value::Int(5)],
                vec!["example.com".into(), "WEBSITE".into(), Value::Int(7)],
                vec!["UCunknown".into(), "YOUTUBE_CHANNEL".into(), Value::Int(1)],
                vec!["UCgames".into(), "YOUTUBE_CHANNEL".into(), Value::Int(2)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn joins_attributes_for_matching_rows_only() {
        let client = canned(
            &["id", "title", "viewCount"],
            vec![vec!["UCgames".into(), "Best games".into(), Value::Int(1200)]],
        );
        let enricher = youtube_channel_enricher(client.clone());
        let extra = enricher
            .enrich(&placements(), &["title".into(), "viewCount".into()])
            .unwrap();

        assert_eq!(extra.columns(), ["title", "viewCount"]);
        assert_eq!(extra.len(), 4);
        assert_eq!(extra.row(0).unwrap().get("title"), Some(&"Best games".into()));
        assert_eq!(extra.row(1).unwrap().get("title"), Some(&Value::Null));
        assert_eq!(extra.row(2).unwrap().get("viewCount"), Some(&Value::Null));
        assert_eq!(extra.row(3).unwrap().get("viewCount"), Some(&Value::Int(1200)));

        let queries = client.queries.lock().unwrap();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains("snippet.title AS title"));
        assert!(queries[0].contains("FROM channels"));
        assert!(queries[0].contains("WHERE id IN ('UCgames', 'UCunknown')"));
    }

    #[test]
    fn no_matching_rows_skips_the_client() {
        let client = canned(&["id", "title"], vec![]);
        let enricher = youtube_video_enricher(client.clone());
        let extra = enricher.enrich(&placements(), &["title".into()]).unwrap();
        assert!(extra.rows().all(|r| r.get("title") == Some(&Value::Null)));
        assert!(client.queries.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_attribute_is_a_configuration_error() {
        let enricher = youtube_channel_enricher(canned(&["id"], vec![]));
        let err = enricher.enrich(&placements(), &["subscribers".into()]).unwrap_err();
        let BachError::Configuration(msg) = err else {
            panic!("expected configuration error");
        };
        assert!(msg.contains("subscribers"));
        assert!(msg.contains("viewCount"));
    }

    #[test]
    fn response_without_id_is_a_fetch_error() {
        let client = canned(&["title"], vec![vec!["x".into()]]);
        let err = youtube_channel_enricher(client)
            .enrich(&placements(), &["title".into()])
            .unwrap_err();
        assert!(matches!(err, BachError::Fetch(_)));
    }

    #[test]
    fn quotes_in_keys_are_escaped() {
        let client = canned(&["id", "title"], vec![]);
        let report = Report::new(
            vec!["placement".into()],
            vec![vec!["it's".into()]],
        )
        .unwrap();
        EntityEnricher::new("x_info", "things", "placement", client.clone())
            .attribute("snippet.title", "title")
            .enrich(&report, &["title".into()])
            .unwrap();
        assert!(client.queries.lock().unwrap()[0].contains("('it''s')"));
    }
}
