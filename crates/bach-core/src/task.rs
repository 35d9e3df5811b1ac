use crate::error::{BachError, Result};
use crate::params::Params;
use crate::query::QuerySource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// PluginRef
// ---------------------------------------------------------------------------

/// A plugin referenced by registry name plus the params it is built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub params: Params,
}

impl PluginRef {
    pub fn new(name: impl Into<String>, params: Params) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A saved pipeline configuration that can be replayed.
///
/// Tasks never carry a fetched report or action result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default = "new_task_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QuerySource>,
    pub accounts: Vec<String>,
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<PluginRef>,
    #[serde(default)]
    pub notifiers: Vec<PluginRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetcher: Option<PluginRef>,
    #[serde(default)]
    pub params: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn new_task_id() -> String {
    Uuid::new_v4().to_string()
}

impl Task {
    pub fn new(name: impl Into<String>, accounts: Vec<String>) -> Self {
        Self {
            id: new_task_id(),
            name: name.into(),
            query: None,
            accounts,
            rules: Vec::new(),
            actor: None,
            notifiers: Vec::new(),
            fetcher: None,
            params: Params::new(),
            schedule: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_schedule(mut self, schedule: &str) -> Result<Self> {
        validate_schedule(schedule)?;
        self.schedule = Some(schedule.split_whitespace().collect::<Vec<_>>().join(" "));
        Ok(self)
    }

    /// Parse a task from YAML. Missing `id` and `created_at` are generated.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let task: Task = serde_yaml::from_str(data)?;
        task.validate()?;
        Ok(task)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BachError::Configuration("task name is empty".into()));
        }
        if self.accounts.is_empty() {
            return Err(BachError::Configuration(format!(
                "task '{}' has no accounts",
                self.name
            )));
        }
        if let Some(schedule) = &self.schedule {
            validate_schedule(schedule)?;
        }
        Ok(())
    }
}

/// Cron-like schedule: 5 or 6 whitespace-separated fields made of digits,
/// names and `* / , - ? L W #`.
pub fn validate_schedule(schedule: &str) -> Result<()> {
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    let valid_field = |f: &&str| {
        f.chars()
            .all(|c| c.is_ascii_alphanumeric() || "*/,-?#".contains(c))
    };
    if !(5..=6).contains(&fields.len()) || !fields.iter().all(valid_field) {
        return Err(BachError::InvalidSchedule(schedule.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedules_need_five_or_six_fields() {
        assert!(validate_schedule("0 6 * * *").is_ok());
        assert!(validate_schedule("0 0 6 * * MON-FRI").is_ok());
        assert!(validate_schedule("*/15 * * * *").is_ok());
        assert!(matches!(
            validate_schedule("0 6 * *"),
            Err(BachError::InvalidSchedule(_))
        ));
        assert!(validate_schedule("0 6 * * * * *").is_err());
        assert!(validate_schedule("every day").is_err());
        assert!(validate_schedule("0 6 * * $").is_err());
    }

    #[test]
    fn with_schedule_normalises_whitespace() {
        let task = Task::new("daily", vec!["1".into()])
            .with_schedule("0  6 *\t* *")
            .unwrap();
        assert_eq!(task.schedule.as_deref(), Some("0 6 * * *"));
    }

    #[test]
    fn yaml_import_generates_id_and_timestamp() {
        let task = Task::from_yaml(
            "name: weekly placements\n\
             query:\n  area: placement\n\
             accounts: ['123']\n\
             rules: ['clicks > 10']\n\
             actor:\n  name: placement_exclusion\n  params:\n    exclusion_level: CAMPAIGN\n\
             notifiers:\n  - name: console\n\
             schedule: '0 6 * * 1'\n",
        )
        .unwrap();
        assert!(Uuid::parse_str(&task.id).is_ok());
        assert_eq!(task.query, Some(QuerySource::Area("placement".into())));
        assert_eq!(task.actor.unwrap().params["exclusion_level"], "CAMPAIGN");
        assert_eq!(task.notifiers[0].name, "console");
        assert!(task.notifiers[0].params.is_empty());
    }

    #[test]
    fn yaml_import_validates() {
        assert!(Task::from_yaml("name: x\naccounts: []\n").is_err());
        assert!(Task::from_yaml("name: x\naccounts: ['1']\nschedule: daily\n").is_err());
    }

    #[test]
    fn json_round_trip_keeps_everything() {
        let mut task = Task::new("t", vec!["1".into(), "2".into()]);
        task.query = Some(QuerySource::Raw("SELECT 1".into()));
        task.params.insert("campaign_type".into(), "VIDEO".into());
        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }
}
