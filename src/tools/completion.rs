use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::Tool;
use super::response::append_citations;
use crate::error::McpResult;
use crate::perplexity::{CompletionRequest, Message, Model, PerplexityClient};
use crate::utils::{parse_params, require_array_field};

/// The three Perplexity-backed tools. They share an input schema and differ
/// only in the model they bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Ask,
    Research,
    Reason,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [ToolKind::Ask, ToolKind::Research, ToolKind::Reason];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Ask => "perplexity_ask",
            ToolKind::Research => "perplexity_research",
            ToolKind::Reason => "perplexity_reason",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolKind::Ask => {
                "Ask Perplexity a conversational question using the Sonar Pro model. \
                 Takes an array of messages (role and content) and returns the answer \
                 with numbered citations when sources are available."
            }
            ToolKind::Research => {
                "Run deep, multi-step research with Perplexity's deep research model. \
                 Takes an array of messages (role and content) and returns a thorough \
                 report with numbered citations."
            }
            ToolKind::Reason => {
                "Work through a problem step by step with Perplexity's reasoning model. \
                 Takes an array of messages (role and content) and returns a reasoned \
                 answer with numbered citations when sources are available."
            }
        }
    }

    pub fn model(self) -> Model {
        match self {
            ToolKind::Ask => Model::Fast,
            ToolKind::Research => Model::DeepResearch,
            ToolKind::Reason => Model::Reasoning,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

#[derive(Debug, Deserialize)]
struct CompletionParams {
    messages: Vec<Message>,
}

pub struct CompletionTool {
    kind: ToolKind,
    client: Arc<PerplexityClient>,
}

impl CompletionTool {
    pub fn new(kind: ToolKind, client: Arc<PerplexityClient>) -> Self {
        Self { kind, client }
    }

    /// Validate the raw arguments and bind this tool's model.
    pub fn build_request(&self, params: Value) -> McpResult<CompletionRequest> {
        let tool = self.kind.name();
        require_array_field(tool, &params, "messages")?;
        let params: CompletionParams = parse_params(tool, params)?;

        // Documented as required upstream but never enforced
        if params.messages.last().map(|m| m.role.as_str()) != Some("user") {
            warn!(tool, "Last message is not from the user; sending as-is");
        }

        Ok(CompletionRequest::new(self.kind.model(), params.messages))
    }
}

#[async_trait]
impl Tool for CompletionTool {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn description(&self) -> &str {
        self.kind.description()
    }

    async fn execute(&self, params: Value) -> McpResult<String> {
        let request = self.build_request(params)?;
        let result = self.client.chat_completion(&request).await?;

        info!(
            tool = self.kind.name(),
            citations = result.citations.len(),
            "Completion finished"
        );

        Ok(append_citations(result.text, &result.citations))
    }
}
