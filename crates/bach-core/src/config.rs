use crate::error::Result;
use crate::params::Params;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "bach.yaml";

/// Contents of `bach.yaml`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BachConfig {
    /// Report-executor service used by the `ads` fetcher.
    #[serde(default)]
    pub report_endpoint: Option<String>,
    /// Metadata service behind the `YOUTUBE_*_INFO` rule sources; those
    /// sources are only registered when it is set.
    #[serde(default)]
    pub enrichment_endpoint: Option<String>,
    #[serde(default = "default_task_db")]
    pub task_db: PathBuf,
    /// Channels notified when a run names none.
    #[serde(default)]
    pub default_notifiers: Vec<String>,
    /// Per-area parameters applied beneath anything passed on a run.
    #[serde(default)]
    pub area_defaults: BTreeMap<String, Params>,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_task_db() -> PathBuf {
    PathBuf::from(".bach/tasks.redb")
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for BachConfig {
    fn default() -> Self {
        Self {
            report_endpoint: None,
            enrichment_endpoint: None,
            task_db: default_task_db(),
            default_notifiers: Vec::new(),
            area_defaults: BTreeMap::new(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

impl BachConfig {
    /// Load `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: BachConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Problems that don't stop loading but are worth a warning.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.http_timeout_secs == 0 {
            warnings.push("http_timeout_secs is 0; every HTTP call will time out".to_string());
        }
        for (key, endpoint) in [
            ("report_endpoint", &self.report_endpoint),
            ("enrichment_endpoint", &self.enrichment_endpoint),
        ] {
            if let Some(endpoint) = endpoint {
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    warnings.push(format!("{key} '{endpoint}' is not an http(s) url"));
                }
            }
        }
        let mut seen = Vec::new();
        for name in &self.default_notifiers {
            if seen.contains(&name) {
                warnings.push(format!("default notifier '{name}' is listed twice"));
            }
            seen.push(name);
        }
        warnings
    }
}
