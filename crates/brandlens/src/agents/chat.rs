//! The conversational front agent: a two-stage protocol that first asks the
//! model whether to invoke the query-rewrite capability, then either executes
//! that one call or streams generated text.

use std::sync::Arc;

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use indoc::indoc;

use crate::executor::ToolRegistry;
use crate::gateway::{CompletionRequest, LlmClient, ToolChoice};
use crate::models::envelope::Envelope;
use crate::models::message::{ChatMessage, Role};
use crate::models::tool::Decision;

pub const CHAT_SYSTEM_PROMPT: &str = indoc! {"
    You are the assistant of a brand-competition analytics service. Chat
    naturally with the user. When the user asks for social media data
    analysis — brand voice, competitor comparison, user review mining — call
    the query_rewrite tool to turn the request into a structured analysis
    task instead of answering directly. For everything else, just answer.
"};

pub struct ChatAgent {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
}

impl ChatAgent {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<ToolRegistry>) -> Self {
        ChatAgent { llm, tools }
    }

    /// Process one message list. Yields envelopes: exactly one result
    /// envelope for a tool decision, one envelope per text delta otherwise,
    /// and exactly one terminal error envelope on any failure. The stream
    /// itself never fails.
    pub fn chat(&self, messages: Vec<ChatMessage>) -> BoxStream<'static, Envelope> {
        let llm = Arc::clone(&self.llm);
        let tools = Arc::clone(&self.tools);

        Box::pin(stream! {
            // A leading system message overrides the default prompt.
            let has_system = matches!(messages.first(), Some(m) if m.role == Role::System);
            let (system_prompt, llm_messages) = if has_system {
                let mut rest = messages;
                let first = rest.remove(0);
                (first.content, rest)
            } else {
                (CHAT_SYSTEM_PROMPT.to_string(), messages)
            };

            let specs = tools.specs();
            let request = CompletionRequest::new(llm_messages.clone())
                .with_system(system_prompt.clone());

            match llm.ask_tool(request, &specs, ToolChoice::Auto).await {
                Err(error) => {
                    tracing::error!(%error, "tool decision failed");
                    yield Envelope::error_with_details(
                        "chat processing failed",
                        error.to_string(),
                    );
                }
                Ok(Decision::ToolCalls(calls)) => {
                    if let Some(call) = calls.first() {
                        // Only the first call runs; simultaneous extras are
                        // ignored.
                        if calls.len() > 1 {
                            tracing::debug!(
                                dropped = calls.len() - 1,
                                "ignoring additional simultaneous tool calls"
                            );
                        }
                        match tools.dispatch(&call.name, &call.arguments).await {
                            Ok(envelope) => {
                                yield envelope;
                            }
                            Err(error) => {
                                tracing::error!(%error, capability = %call.name, "tool execution failed");
                                yield Envelope::error_with_details(
                                    "chat processing failed",
                                    error.to_string(),
                                );
                            }
                        }
                    } else {
                        yield Envelope::error("tool decision contained no calls");
                    }
                }
                Ok(Decision::Text(_)) => {
                    let request = CompletionRequest::new(llm_messages)
                        .with_system(system_prompt);
                    match llm.generate_stream(request).await {
                        Err(error) => {
                            tracing::error!(%error, "failed to open text stream");
                            yield Envelope::error_with_details(
                                "chat processing failed",
                                error.to_string(),
                            );
                        }
                        Ok(mut deltas) => {
                            loop {
                                match deltas.next().await {
                                    Some(Ok(delta)) => {
                                        yield Envelope::stream_text(delta);
                                    }
                                    Some(Err(error)) => {
                                        tracing::error!(%error, "text stream failed mid-flight");
                                        yield Envelope::error_with_details(
                                            "chat processing failed",
                                            error.to_string(),
                                        );
                                        break;
                                    }
                                    None => break,
                                }
                            }
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ToolError;
    use crate::executor::Capability;
    use crate::gateway::mock::{MockLlm, MockReply};
    use crate::models::envelope::TaskType;
    use crate::models::tool::{ToolCallRequest, ToolSpec};
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    struct Rewrite {
        fail: bool,
    }

    #[async_trait]
    impl Capability for Rewrite {
        fn name(&self) -> &str {
            "query_rewrite"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec::new(self.name(), "rewrite", json!({"type": "object"}))
        }

        fn accepted_args(&self) -> &[&str] {
            &["query"]
        }

        async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
            if self.fail {
                return Err(ToolError::Execution("rewrite blew up".to_string()));
            }
            Ok(json!({"background": "bg", "task": args["query"]}))
        }
    }

    fn registry(fail: bool) -> Arc<ToolRegistry> {
        Arc::new(ToolRegistry::new(vec![Arc::new(Rewrite { fail })]).unwrap())
    }

    fn decision(calls: Vec<(&str, &str)>) -> MockReply {
        MockReply::Decision(Decision::ToolCalls(
            calls
                .into_iter()
                .map(|(name, arguments)| ToolCallRequest {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                })
                .collect(),
        ))
    }

    async fn collect(agent: &ChatAgent, messages: Vec<ChatMessage>) -> Vec<Envelope> {
        agent.chat(messages).collect().await
    }

    #[tokio::test]
    async fn test_tool_decision_yields_exactly_one_envelope() {
        let llm = Arc::new(MockLlm::new(vec![decision(vec![(
            "query_rewrite",
            "{\"query\": \"compare brands\"}",
        )])]));
        let agent = ChatAgent::new(llm, registry(false));

        let envelopes = collect(&agent, vec![ChatMessage::user("analyze alpha")]).await;
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].task_type, TaskType::CrawlTask);
        assert_eq!(envelopes[0].content["task"], "compare brands");
    }

    #[tokio::test]
    async fn test_only_the_first_of_multiple_calls_runs() {
        let llm = Arc::new(MockLlm::new(vec![decision(vec![
            ("query_rewrite", "{\"query\": \"first\"}"),
            ("query_rewrite", "{\"query\": \"second\"}"),
        ])]));
        let agent = ChatAgent::new(llm, registry(false));

        let envelopes = collect(&agent, vec![ChatMessage::user("go")]).await;
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].content["task"], "first");
    }

    #[tokio::test]
    async fn test_text_decision_streams_deltas() {
        let llm = Arc::new(MockLlm::new(vec![
            MockReply::Decision(Decision::Text("chatting".to_string())),
            MockReply::Stream(vec!["Hel".to_string(), "lo".to_string()]),
        ]));
        let agent = ChatAgent::new(llm, registry(false));

        let envelopes = collect(&agent, vec![ChatMessage::user("hi")]).await;
        assert_eq!(envelopes.len(), 2);
        assert!(envelopes.iter().all(|e| e.task_type == TaskType::Stream));
        assert_eq!(envelopes[0].content["content"], "Hel");
        assert_eq!(envelopes[1].content["content"], "lo");
    }

    #[tokio::test]
    async fn test_decision_failure_yields_single_terminal_error() {
        let llm = Arc::new(MockLlm::new(vec![MockReply::Failure(
            "upstream exploded".to_string(),
        )]));
        let agent = ChatAgent::new(llm, registry(false));

        let envelopes = collect(&agent, vec![ChatMessage::user("hi")]).await;
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].task_type, TaskType::Error);
        assert_eq!(envelopes[0].content["error"], "chat processing failed");
    }

    #[tokio::test]
    async fn test_tool_execution_failure_yields_single_terminal_error() {
        let llm = Arc::new(MockLlm::new(vec![decision(vec![(
            "query_rewrite",
            "{\"query\": \"x\"}",
        )])]));
        let agent = ChatAgent::new(llm, registry(true));

        let envelopes = collect(&agent, vec![ChatMessage::user("hi")]).await;
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].task_type, TaskType::Error);
        assert!(envelopes[0].content["details"]
            .as_str()
            .unwrap()
            .contains("rewrite blew up"));
    }

    #[tokio::test]
    async fn test_unknown_capability_is_reported_not_raised() {
        let llm = Arc::new(MockLlm::new(vec![decision(vec![("no_such_tool", "{}")])]));
        let agent = ChatAgent::new(llm, registry(false));

        let envelopes = collect(&agent, vec![ChatMessage::user("hi")]).await;
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].task_type, TaskType::Error);
    }
}
