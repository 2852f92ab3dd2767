//! Structural validation of model output.
//!
//! A generation response must parse into [`DocPayload`] before the agent
//! accepts it. The first validation failure on a node triggers one repair
//! attempt with the issue fed back; a second failure is treated as a
//! transient error and re-enters the retry loop.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The structured documentation payload expected from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocPayload {
    /// Documentation body (markdown)
    pub body: String,
    /// Names or ids of symbols the body fully explains
    #[serde(default)]
    pub described_symbols: Vec<String>,
    /// Names or ids the body mentions but defers to other units
    #[serde(default)]
    pub referenced_symbols: Vec<String>,
}

impl DocPayload {
    /// JSON schema sent with every generation request.
    pub fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["body"],
            "properties": {
                "body": { "type": "string" },
                "described_symbols": {
                    "type": "array",
                    "items": { "type": "string" }
                },
                "referenced_symbols": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            }
        })
    }
}

/// A structural problem in a model response.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: Option<String>,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "invalid '{}': {}", field, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Validate raw model content into a payload.
pub fn validate(content: &Value) -> std::result::Result<DocPayload, ValidationIssue> {
    if !content.is_object() {
        return Err(ValidationIssue {
            field: None,
            message: format!("expected a JSON object, got {}", json_type(content)),
        });
    }

    let payload: DocPayload = serde_json::from_value(content.clone()).map_err(|e| {
        ValidationIssue {
            field: None,
            message: e.to_string(),
        }
    })?;

    if payload.body.trim().is_empty() {
        return Err(ValidationIssue {
            field: Some("body".into()),
            message: "documentation body is empty".into(),
        });
    }

    Ok(payload)
}

/// Build the feedback prompt for the single repair attempt.
pub fn repair_prompt(original_prompt: &str, issue: &ValidationIssue) -> String {
    format!(
        "{original_prompt}\n\n\
         Your previous response failed validation: {issue}.\n\
         Respond again with a JSON object matching the required schema."
    )
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_payload() {
        let content = json!({
            "body": "## Parser\nParses things.",
            "described_symbols": ["class:a.rs:Parser"],
            "referenced_symbols": []
        });
        let payload = validate(&content).unwrap();
        assert_eq!(payload.described_symbols.len(), 1);
    }

    #[test]
    fn test_missing_body_rejected() {
        let issue = validate(&json!({"described_symbols": []})).unwrap_err();
        assert!(issue.message.contains("body"));
    }

    #[test]
    fn test_empty_body_rejected() {
        let issue = validate(&json!({"body": "   "})).unwrap_err();
        assert_eq!(issue.field.as_deref(), Some("body"));
    }

    #[test]
    fn test_non_object_rejected() {
        let issue = validate(&json!("just a string")).unwrap_err();
        assert!(issue.message.contains("string"));
    }

    #[test]
    fn test_repair_prompt_includes_issue() {
        let issue = ValidationIssue {
            field: Some("body".into()),
            message: "documentation body is empty".into(),
        };
        let prompt = repair_prompt("original", &issue);
        assert!(prompt.starts_with("original"));
        assert!(prompt.contains("documentation body is empty"));
    }
}
