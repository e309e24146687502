use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::error::{McpError, McpResult};
use crate::perplexity::PerplexityClient;
use crate::tools::{CompletionTool, Tool, ToolKind};

use super::types::{CallToolResult, Property, Tool as McpTool, ToolInputSchema};

pub struct RequestHandler {
    tools: Vec<Box<dyn Tool + Send + Sync>>,
}

macro_rules! register_tool {
    ($tools:expr, $tool:expr) => {
        $tools.push(Box::new($tool));
    };
}

impl RequestHandler {
    pub fn new(client: Arc<PerplexityClient>) -> Self {
        let mut tools: Vec<Box<dyn Tool + Send + Sync>> = Vec::new();

        for kind in ToolKind::ALL {
            register_tool!(tools, CompletionTool::new(kind, client.clone()));
        }

        Self { tools }
    }

    pub fn list_tools(&self) -> Vec<McpTool> {
        self.tools
            .iter()
            .map(|tool| Self::tool_to_mcp_tool(tool.as_ref()))
            .collect()
    }

    /// Run a tool and wrap the outcome. Every failure, including an unknown
    /// tool name, comes back as a result with `isError` set.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> CallToolResult {
        match self.execute(name, arguments).await {
            Ok(text) => CallToolResult::text(text),
            Err(e) => {
                warn!(tool = name, "Tool call failed: {}", e);
                CallToolResult::error(format!("Error: {}", e))
            }
        }
    }

    async fn execute(&self, name: &str, arguments: Value) -> McpResult<String> {
        let tool = self
            .tools
            .iter()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| McpError::UnknownTool(name.to_string()))?;

        tool.execute(arguments).await
    }

    // Helper functions for creating tool schemas
    fn create_string_prop(description: &str) -> Property {
        Property {
            property_type: "string".to_string(),
            description: Some(description.to_string()),
            items: None,
            properties: None,
            required: None,
        }
    }

    fn create_object_prop(properties: HashMap<String, Property>, required: Vec<String>) -> Property {
        Property {
            property_type: "object".to_string(),
            description: None,
            items: None,
            properties: Some(properties),
            required: Some(required),
        }
    }

    fn create_array_prop(description: &str, items: Property) -> Property {
        Property {
            property_type: "array".to_string(),
            description: Some(description.to_string()),
            items: Some(Box::new(items)),
            properties: None,
            required: None,
        }
    }

    fn messages_schema() -> ToolInputSchema {
        let mut message_props = HashMap::new();
        message_props.insert(
            "role".to_string(),
            Self::create_string_prop("Role of the message (e.g. system, user, assistant)"),
        );
        message_props.insert(
            "content".to_string(),
            Self::create_string_prop("The content of the message"),
        );

        let message = Self::create_object_prop(
            message_props,
            vec!["role".to_string(), "content".to_string()],
        );

        let mut props = HashMap::new();
        props.insert(
            "messages".to_string(),
            Self::create_array_prop(
                "Array of conversation messages; the last one should come from the user",
                message,
            ),
        );

        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: props,
            required: vec!["messages".to_string()],
        }
    }

    fn tool_to_mcp_tool(tool: &(dyn Tool + Send + Sync)) -> McpTool {
        McpTool {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: Self::messages_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ConnectionConfig, PerplexityConfig};
    use crate::mcp::types::ToolContent;
    use crate::proxy::ProxyConfig;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn handler_for(base_url: &str) -> RequestHandler {
        let config = Config {
            perplexity: PerplexityConfig {
                api_key: "test-key".to_string(),
                base_url: base_url.to_string(),
            },
            connection: ConnectionConfig {
                timeout_seconds: 5,
                max_idle_per_host: 1,
                pool_idle_timeout_seconds: 5,
            },
            proxy: ProxyConfig::default(),
        };
        RequestHandler::new(Arc::new(PerplexityClient::new(&config).unwrap()))
    }

    fn text_of(result: &CallToolResult) -> &str {
        match &result.content[0] {
            ToolContent::Text { text } => text,
        }
    }

    fn user_messages() -> Value {
        json!({"messages": [{"role": "user", "content": "What is MCP?"}]})
    }

    #[test]
    fn test_list_tools_fixed_order_and_schema() {
        let handler = handler_for("http://127.0.0.1:9");
        let tools = handler.list_tools();

        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["perplexity_ask", "perplexity_research", "perplexity_reason"]
        );

        for tool in &tools {
            assert!(!tool.description.is_empty());
            let schema = serde_json::to_value(&tool.input_schema).unwrap();
            assert_eq!(schema["type"], "object");
            assert_eq!(schema["required"], json!(["messages"]));
            assert_eq!(schema["properties"]["messages"]["type"], "array");
            assert_eq!(schema["properties"]["messages"]["items"]["type"], "object");
            assert_eq!(
                schema["properties"]["messages"]["items"]["required"],
                json!(["role", "content"])
            );
            assert_eq!(
                schema["properties"]["messages"]["items"]["properties"]["content"]["type"],
                "string"
            );
        }
    }

    #[rstest]
    #[case("perplexity_ask", "sonar-pro")]
    #[case("perplexity_research", "sonar-deep-research")]
    #[case("perplexity_reason", "sonar-reasoning-pro")]
    #[tokio::test]
    async fn test_call_tool_success_with_citations(#[case] tool: &str, #[case] model: &str) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": model})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "MCP is a protocol."}}],
                "citations": ["https://modelcontextprotocol.io", "https://example.com/mcp"]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let handler = handler_for(&mock_server.uri());
        let result = handler.call_tool(tool, user_messages()).await;

        assert!(!result.is_error);
        assert_eq!(
            text_of(&result),
            "MCP is a protocol.\n\nCitations:\n[1] https://modelcontextprotocol.io\n[2] https://example.com/mcp"
        );
    }

    #[tokio::test]
    async fn test_call_tool_success_without_citations() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Just text."}}],
                "citations": []
            })))
            .mount(&mock_server)
            .await;

        let handler = handler_for(&mock_server.uri());
        let result = handler.call_tool("perplexity_ask", user_messages()).await;

        assert!(!result.is_error);
        assert_eq!(text_of(&result), "Just text.");
    }

    #[rstest]
    #[case(json!({}))]
    #[case(json!({"messages": "not an array"}))]
    #[case(json!(null))]
    #[tokio::test]
    async fn test_bad_arguments_make_no_http_call(#[case] arguments: Value) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let handler = handler_for(&mock_server.uri());
        let result = handler.call_tool("perplexity_research", arguments).await;

        assert!(result.is_error);
        let text = text_of(&result);
        assert!(text.contains("perplexity_research"));
        assert!(text.contains("'messages' field is required"));
    }

    #[tokio::test]
    async fn test_omitted_arguments_reported_as_missing_messages() {
        let handler = handler_for("http://127.0.0.1:9");
        let result = handler.call_tool("perplexity_ask", Value::Null).await;

        assert!(result.is_error);
        assert_eq!(
            text_of(&result),
            "Error: Invalid arguments for perplexity_ask: 'messages' field is required and must be an array (arguments must be an object)"
        );
    }

    #[tokio::test]
    async fn test_missing_messages_names_field() {
        let handler = handler_for("http://127.0.0.1:9");
        let result = handler.call_tool("perplexity_ask", json!({"query": "hi"})).await;

        assert!(result.is_error);
        assert_eq!(
            text_of(&result),
            "Error: Invalid arguments for perplexity_ask: 'messages' field is required and must be an array"
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_makes_no_http_call() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let handler = handler_for(&mock_server.uri());
        let result = handler.call_tool("perplexity_search", user_messages()).await;

        assert!(result.is_error);
        assert_eq!(text_of(&result), "Error: Unknown tool: perplexity_search");
    }

    #[tokio::test]
    async fn test_upstream_500_surfaces_status_and_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string(r#"{"error":"boom"}"#))
            .mount(&mock_server)
            .await;

        let handler = handler_for(&mock_server.uri());
        let result = handler.call_tool("perplexity_reason", user_messages()).await;

        assert!(result.is_error);
        let text = text_of(&result);
        assert!(text.contains("500"));
        assert!(text.contains(r#"{"error":"boom"}"#));
    }

    #[tokio::test]
    async fn test_network_failure_is_distinct_from_status_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let handler = handler_for(&format!("http://127.0.0.1:{}", port));
        let result = handler.call_tool("perplexity_ask", user_messages()).await;

        assert!(result.is_error);
        let text = text_of(&result);
        assert!(text.contains("no response received"));
        assert!(!text.contains("Perplexity API error"));
    }
}
