//! Conversation history summarization.

use crate::errors::GatewayResult;
use crate::gateway::{CompletionRequest, LlmClient};
use crate::models::message::{ChatMessage, Role};

fn role_label(role: Role) -> &'static str {
    match role {
        Role::System => "System",
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::Tool => "Tool",
    }
}

/// Summarize a conversation history into one short text, optionally on a
/// specific model alias.
pub async fn summarize_history(
    llm: &dyn LlmClient,
    history: &[ChatMessage],
    model: Option<String>,
) -> GatewayResult<String> {
    let mut prompt = String::from(
        "Summarize the following conversation history concisely, capturing \
         the core content and key information:\n\n",
    );
    for message in history {
        prompt.push_str(&format!("{}: {}\n", role_label(message.role), message.content));
    }
    prompt.push_str("\nSummary:");

    let mut request = CompletionRequest::new(vec![ChatMessage::user(prompt)]);
    request.model = model;
    llm.generate(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::{MockLlm, MockReply};

    #[tokio::test]
    async fn test_summarize_returns_model_text() {
        let llm = MockLlm::new(vec![MockReply::Text("they discussed EV range".to_string())]);
        let history = vec![
            ChatMessage::user("how far does the alpha go?"),
            ChatMessage::assistant("around 700 km on the largest battery"),
        ];
        let summary = summarize_history(&llm, &history, None).await.unwrap();
        assert_eq!(summary, "they discussed EV range");
    }
}
