use crate::params::Params;
use serde::{Deserialize, Serialize};

/// One-shot pipeline invocation as sent by the CLI and the HTTP entrypoint.
///
/// The area's default actor handles the filtered rows. `area_parameters`
/// feed both the query template and the actor; `notification_parameters`
/// are passed to every channel in `notify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BachRequest {
    pub area: String,
    pub accounts: Vec<String>,
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub notify: Vec<String>,
    #[serde(default)]
    pub area_parameters: Params,
    #[serde(default)]
    pub notification_parameters: Params,
}

impl BachRequest {
    pub fn new(area: impl Into<String>, accounts: Vec<String>) -> Self {
        Self {
            area: area.into(),
            accounts,
            rules: Vec::new(),
            notify: Vec::new(),
            area_parameters: Params::new(),
            notification_parameters: Params::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_default_to_empty() {
        let req: BachRequest =
            serde_json::from_str(r#"{"area":"placement","accounts":["1"]}"#).unwrap();
        assert_eq!(req, BachRequest::new("placement", vec!["1".into()]));
    }
}
