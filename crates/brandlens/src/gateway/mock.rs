//! A scripted gateway for tests: replies are consumed in order regardless of
//! which operation is called, and an exhausted script returns empty output.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{CompletionRequest, LlmClient, TextStream, ToolChoice};
use crate::errors::{GatewayError, GatewayResult};
use crate::models::tool::{Decision, ToolSpec};

#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Json(Value),
    Decision(Decision),
    Stream(Vec<String>),
    Failure(String),
}

pub struct MockLlm {
    replies: Mutex<VecDeque<MockReply>>,
}

impl MockLlm {
    pub fn new(replies: Vec<MockReply>) -> Self {
        MockLlm {
            replies: Mutex::new(replies.into()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    fn next(&self) -> Option<MockReply> {
        self.replies.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn generate(&self, _request: CompletionRequest) -> GatewayResult<String> {
        match self.next() {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Json(value)) => Ok(value.to_string()),
            Some(MockReply::Stream(chunks)) => Ok(chunks.concat()),
            Some(MockReply::Decision(Decision::Text(text))) => Ok(text),
            Some(MockReply::Decision(Decision::ToolCalls(_))) => Ok(String::new()),
            Some(MockReply::Failure(message)) => Err(GatewayError::MalformedResponse(message)),
            None => Ok(String::new()),
        }
    }

    async fn generate_json(&self, _request: CompletionRequest) -> GatewayResult<Value> {
        match self.next() {
            Some(MockReply::Json(value)) => Ok(value),
            Some(MockReply::Text(text)) => super::extract::extract_structured_data(&text)
                .ok_or(GatewayError::NoStructuredOutput(text)),
            Some(MockReply::Failure(message)) => Err(GatewayError::MalformedResponse(message)),
            Some(_) => Ok(json!({})),
            None => Ok(json!({})),
        }
    }

    async fn generate_stream(&self, _request: CompletionRequest) -> GatewayResult<TextStream> {
        match self.next() {
            Some(MockReply::Stream(chunks)) => {
                Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
            }
            Some(MockReply::Text(text)) => {
                Ok(Box::pin(futures::stream::iter(vec![Ok(text)])))
            }
            Some(MockReply::Failure(message)) => {
                Err(GatewayError::MalformedResponse(message))
            }
            _ => Ok(Box::pin(futures::stream::empty())),
        }
    }

    async fn ask_tool(
        &self,
        _request: CompletionRequest,
        _tools: &[ToolSpec],
        _tool_choice: ToolChoice,
    ) -> GatewayResult<Decision> {
        match self.next() {
            Some(MockReply::Decision(decision)) => Ok(decision),
            Some(MockReply::Text(text)) => Ok(Decision::Text(text)),
            Some(MockReply::Failure(message)) => Err(GatewayError::MalformedResponse(message)),
            _ => Ok(Decision::Text(String::new())),
        }
    }
}
