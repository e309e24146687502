use serde::{Deserialize, Serialize};

use crate::error::{McpError, McpResult};

/// Backend model variants, one per tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Fast,
    DeepResearch,
    Reasoning,
}

impl Model {
    pub fn as_str(self) -> &'static str {
        match self {
            Model::Fast => "sonar-pro",
            Model::DeepResearch => "sonar-deep-research",
            Model::Reasoning => "sonar-reasoning-pro",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Outbound body for `POST /chat/completions`
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
}

impl CompletionRequest {
    pub fn new(model: Model, messages: Vec<Message>) -> Self {
        Self {
            model: model.as_str().to_string(),
            messages,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub citations: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResult {
    pub text: String,
    pub citations: Vec<String>,
}

impl TryFrom<CompletionResponse> for CompletionResult {
    type Error = McpError;

    fn try_from(response: CompletionResponse) -> McpResult<Self> {
        let text = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                McpError::Unexpected("Perplexity API response contained no choices".to_string())
            })?;

        Ok(Self {
            text,
            citations: response.citations.unwrap_or_default(),
        })
    }
}
