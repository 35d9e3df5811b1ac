use thiserror::Error;

#[derive(Debug, Error)]
pub enum BachError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("syntax error in rule '{expression}': {reason}")]
    Syntax { expression: String, reason: String },

    #[error("rule '{rule}' references unknown field '{field}'")]
    Binding { rule: String, field: String },

    #[error("type error in rule '{rule}': {reason}")]
    Type { rule: String, reason: String },

    #[error("invalid state: cannot {operation} while {stage}")]
    State { operation: String, stage: String },

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("invalid report: {0}")]
    InvalidReport(String),

    #[error("invalid schedule '{0}': expected 5 or 6 cron fields")]
    InvalidSchedule(String),

    #[error("actor '{actor}' failed: {reason}")]
    Actor { actor: String, reason: String },

    #[error("notification to '{channel}' failed: {reason}")]
    Notification { channel: String, reason: String },

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("task worker panicked: {0}")]
    Worker(String),

    #[error("task store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BachError {
    pub(crate) fn syntax(expression: &str, reason: impl Into<String>) -> Self {
        Self::Syntax {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn state(operation: &str, stage: impl std::fmt::Display) -> Self {
        Self::State {
            operation: operation.to_string(),
            stage: stage.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BachError>;
