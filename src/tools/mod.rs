pub mod completion;
pub mod response;

use crate::error::McpResult;
use async_trait::async_trait;
use serde_json::Value;

pub use completion::{CompletionTool, ToolKind};

#[async_trait]
pub trait Tool {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn execute(&self, params: Value) -> McpResult<String>;
}
