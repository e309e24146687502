use thiserror::Error;

/// Per-call failure kinds. The `Display` text is what the MCP client sees.
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Perplexity API error: {status} {status_text}\n{body}")]
    Api {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("Network error: no response received from Perplexity API: {0}")]
    NoResponse(String),

    #[error("Request setup error: {0}")]
    RequestSetup(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            McpError::RequestSetup(err.to_string())
        } else if err.is_connect() || err.is_timeout() || err.is_request() {
            McpError::NoResponse(err.to_string())
        } else {
            McpError::Unexpected(err.to_string())
        }
    }
}

pub type McpResult<T> = std::result::Result<T, McpError>;

/// Extension trait for converting errors to McpError with context
pub trait IntoMcpError<T> {
    fn mcp_context(self, context: &str) -> McpResult<T>;
}

impl<T, E: std::fmt::Display> IntoMcpError<T> for Result<T, E> {
    fn mcp_context(self, context: &str) -> McpResult<T> {
        self.map_err(|e| McpError::Unexpected(format!("{}: {}", context, e)))
    }
}
