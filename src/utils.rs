use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{McpError, McpResult};

/// Parse JSON value into a typed parameter struct
pub fn parse_params<T: DeserializeOwned>(tool: &str, params: Value) -> McpResult<T> {
    serde_json::from_value(params).map_err(|e| invalid_arguments(tool, e.to_string()))
}

/// Check that `params` is an object whose `field` is an array.
pub fn require_array_field(tool: &str, params: &Value, field: &str) -> McpResult<()> {
    let missing = format!("'{}' field is required and must be an array", field);

    // Absent or non-object arguments mean the field is missing too
    let Some(object) = params.as_object() else {
        return Err(invalid_arguments(
            tool,
            format!("{} (arguments must be an object)", missing),
        ));
    };

    match object.get(field) {
        Some(Value::Array(_)) => Ok(()),
        _ => Err(invalid_arguments(tool, missing)),
    }
}

pub fn invalid_arguments(tool: &str, message: impl Into<String>) -> McpError {
    McpError::InvalidArguments {
        tool: tool.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Params {
        messages: Vec<String>,
    }

    #[rstest]
    #[case(json!(null), "'messages' field is required and must be an array (arguments must be an object)")]
    #[case(json!("messages"), "'messages' field is required and must be an array (arguments must be an object)")]
    #[case(json!([]), "'messages' field is required and must be an array (arguments must be an object)")]
    #[case(json!({}), "'messages' field is required and must be an array")]
    #[case(json!({"messages": "hi"}), "'messages' field is required and must be an array")]
    #[case(json!({"messages": {"role": "user"}}), "'messages' field is required and must be an array")]
    #[case(json!({"messages": null}), "'messages' field is required and must be an array")]
    fn test_require_array_field_rejects(#[case] params: Value, #[case] expected: &str) {
        let err = require_array_field("perplexity_ask", &params, "messages").unwrap_err();
        match err {
            McpError::InvalidArguments { tool, message } => {
                assert_eq!(tool, "perplexity_ask");
                assert_eq!(message, expected);
            }
            other => panic!("expected InvalidArguments, got {:?}", other),
        }
    }

    #[test]
    fn test_require_array_field_accepts_empty_array() {
        assert!(require_array_field("perplexity_ask", &json!({"messages": []}), "messages").is_ok());
    }

    #[test]
    fn test_parse_params_reports_tool() {
        let err = parse_params::<Params>("perplexity_reason", json!({"messages": [1, 2]}))
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid arguments for perplexity_reason:"));
    }

    #[test]
    fn test_parse_params_ok() {
        let params: Params = parse_params("perplexity_ask", json!({"messages": ["a"]})).unwrap();
        assert_eq!(params.messages, vec!["a".to_string()]);
    }
}
