//! Synchronous atomic-insights endpoint.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use brandlens::insights::InsightsPipeline;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DataProcessingRequest {
    raw_data: Vec<Map<String, Value>>,
}

/// Run the enrichment pipeline over the posted records and return them with
/// the analysis keys attached. The declared processing timeout is not
/// enforced here.
async fn handler(
    State(state): State<AppState>,
    Json(request): Json<DataProcessingRequest>,
) -> Result<Json<Value>, ApiError> {
    let raw_data = request.raw_data;
    tracing::info!(records = raw_data.len(), "starting data processing");

    let pipeline = InsightsPipeline::new(state.llm.clone())
        .with_model(state.settings.gateway.insights_model.clone());
    let processed = pipeline
        .run(raw_data.clone(), None)
        .await
        .map_err(ApiError::internal)?;

    // Rebuild each output on top of its original record so every original
    // field survives, then let the enrichment overlay its keys.
    let merged: Vec<Value> = processed
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let mut record = raw_data.get(i).cloned().unwrap_or_default();
            for (key, value) in item {
                record.insert(key, value);
            }
            Value::Object(record)
        })
        .collect();

    tracing::info!(records = merged.len(), "data processing complete");
    Ok(Json(json!({ "content": merged })))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/data/processing", post(handler))
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
    async fn test_processing_attaches_analysis_keys_and_keeps_originals() {
        let llm = MockLlm::new(vec![
            MockReply::Text("{\"alpha\": 2}".to_string()),
            MockReply::Text("{\"brand_pairs\": [], \"reason\": \"none\"}".to_string()),
            MockReply::Text(
                "{\"sentiment\": \"positive\", \"features\": {}, \"strengths\": [], \"weaknesses\": []}"
                    .to_string(),
            ),
        ]);
        let app = routes(test_state(llm));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/data/processing")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(
                        json!({"raw_data": [{"title": "t", "likes": 5}]}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        let record = &body["content"][0];
        assert_eq!(record["title"], "t");
        assert_eq!(record["likes"], 5);
        assert_eq!(record["brand_mentions"], json!({"alpha": 2}));
        assert_eq!(record["brand_sentiments"], json!({"alpha": "positive"}));
    }

    #[tokio::test]
    async fn test_empty_payload_round_trips() {
        let app = routes(test_state(MockLlm::empty()));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/data/processing")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(json!({"raw_data": []}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["content"], json!([]));
    }
}
