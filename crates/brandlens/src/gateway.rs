pub mod client;
pub mod config;
pub mod extract;
pub mod mock;
pub mod retry;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::errors::GatewayResult;
use crate::models::message::{ChatMessage, Role};
use crate::models::tool::{Decision, ToolSpec};

pub use client::LlmGateway;
pub use config::{GatewayConfig, ModelEndpoint};
pub use retry::RetryPolicy;

/// Incremental text deltas from a streamed completion.
pub type TextStream = BoxStream<'static, GatewayResult<String>>;

/// How the model may use the offered tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
}

impl ToolChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolChoice::Auto => "auto",
            ToolChoice::None => "none",
        }
    }
}

/// A chat completion request before wire conversion.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub system_prompt: Option<String>,
    /// Model alias; `None` selects the gateway's default model.
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        CompletionRequest {
            messages,
            ..Default::default()
        }
    }

    pub fn with_system<S: Into<String>>(mut self, system_prompt: S) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// The final message list: a supplied system prompt replaces the content
    /// of a leading system message, or is inserted at the front.
    pub fn final_messages(&self) -> Vec<ChatMessage> {
        let mut messages = self.messages.clone();
        if let Some(system) = &self.system_prompt {
            match messages.first_mut() {
                Some(first) if first.role == Role::System => {
                    first.content = system.clone();
                }
                _ => messages.insert(0, ChatMessage::system(system.clone())),
            }
        }
        messages
    }
}

/// The LLM call surface the agents and the pipeline depend on.
///
/// `LlmGateway` is the HTTP implementation; `mock::MockLlm` is a scripted
/// double for tests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Blocking completion returning the assistant's text content.
    async fn generate(&self, request: CompletionRequest) -> GatewayResult<String>;

    /// Blocking completion in JSON mode. Attempts a direct parse of the
    /// response, then best-effort structured extraction; total failure is
    /// `GatewayError::NoStructuredOutput`.
    async fn generate_json(&self, request: CompletionRequest) -> GatewayResult<Value>;

    /// Streamed completion yielding incremental text deltas.
    async fn generate_stream(&self, request: CompletionRequest) -> GatewayResult<TextStream>;

    /// Tool-decision completion: the model either answers in text or selects
    /// tool invocations.
    async fn ask_tool(
        &self,
        request: CompletionRequest,
        tools: &[ToolSpec],
        tool_choice: ToolChoice,
    ) -> GatewayResult<Decision>;

    /// Sequential convenience wrapper over `generate`, one call per message
    /// list. Results come back in input order; the first failure aborts.
    async fn batch_generate(
        &self,
        message_lists: Vec<Vec<ChatMessage>>,
        system_prompt: Option<String>,
        model: Option<String>,
    ) -> GatewayResult<Vec<String>> {
        let mut results = Vec::with_capacity(message_lists.len());
        for messages in message_lists {
            let mut request = CompletionRequest::new(messages);
            request.system_prompt = system_prompt.clone();
            request.model = model.clone();
            results.push(self.generate(request).await?);
        }
        Ok(results)
    }
}
