//! Conversation summarization endpoint.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use brandlens::agents::summarizer::summarize_history;
use brandlens::models::message::ChatMessage;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConversationSummaryRequest {
    messages: Vec<ChatMessage>,
    #[serde(default = "default_conversation_id")]
    conversation_id: String,
    #[serde(default)]
    model_id: Option<String>,
}

fn default_conversation_id() -> String {
    "unknown".to_string()
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<ConversationSummaryRequest>,
) -> Result<Json<Value>, ApiError> {
    tracing::info!(
        conversation_id = %request.conversation_id,
        messages = request.messages.len(),
        "summarizing conversation"
    );
    let summary = summarize_history(
        state.llm.as_ref(),
        &request.messages,
        request.model_id.clone(),
    )
    .await
    .map_err(ApiError::internal)?;

    Ok(Json(json!({
        "summary": summary,
        "conversation_id": request.conversation_id,
    })))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/conversation/summary", post(handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{GatewaySettings, Settings, TimeoutSettings};
    use axum::body::to_bytes;
    use axum::http::{Request, StatusCode};
    use brandlens::gateway::mock::{MockLlm, MockReply};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state(llm: MockLlm) -> AppState {
        AppState {
            llm: Arc::new(llm),
            settings: Arc::new(Settings {
                server: Default::default(),
                gateway: GatewaySettings {
                    api_key: "test".to_string(),
                    host: "http://unused".to_string(),
                    default_model: "deepseek-v3".to_string(),
                    insights_model: "doubao-lite".to_string(),
                },
                timeouts: TimeoutSettings::default(),
                runs_dir: "unused".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_summary_round_trip() {
        let llm = MockLlm::new(vec![MockReply::Text("they discussed pricing".to_string())]);
        let app = routes(test_state(llm));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/conversation/summary")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(
                        json!({
                            "messages": [
                                {"role": "user", "content": "how much is the alpha?"},
                                {"role": "assistant", "content": "around 30k"}
                            ],
                            "conversation_id": "c42"
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["summary"], "they discussed pricing");
        assert_eq!(body["conversation_id"], "c42");
    }
}
