use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::config::{GatewayConfig, ModelEndpoint};
use super::extract::extract_structured_data;
use super::retry::RetryPolicy;
use super::{CompletionRequest, LlmClient, TextStream, ToolChoice};
use crate::errors::{GatewayError, GatewayResult};
use crate::models::tool::{Decision, ToolSpec};

/// HTTP gateway to an OpenAI-compatible chat-completions service.
///
/// Resolution of model aliases happens per call; transient upstream failures
/// are retried per the configured policy; identical requests are never
/// deduplicated or cached.
pub struct LlmGateway {
    client: Client,
    config: GatewayConfig,
    retry: RetryPolicy,
}

impl LlmGateway {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(LlmGateway {
            client,
            config,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn base_payload(&self, endpoint: &ModelEndpoint, request: &CompletionRequest, stream: bool) -> Value {
        let mut payload = json!({
            "model": endpoint.id,
            "messages": request.final_messages(),
            "stream": stream,
        });
        if let Some(temperature) = request.temperature {
            payload["temperature"] = json!(temperature);
        }
        payload
    }

    /// One POST, classified. 429 and 5xx are transient; everything else
    /// non-OK is rejected outright.
    async fn send_chat(
        &self,
        endpoint: &ModelEndpoint,
        payload: &Value,
    ) -> GatewayResult<reqwest::Response> {
        let response = self
            .client
            .post(endpoint.completions_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response),
            StatusCode::TOO_MANY_REQUESTS => Err(GatewayError::RateLimited),
            status if status.is_server_error() => Err(GatewayError::Upstream(status.as_u16())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(GatewayError::Rejected {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    async fn send_with_retry(
        &self,
        endpoint: &ModelEndpoint,
        payload: &Value,
    ) -> GatewayResult<reqwest::Response> {
        let mut attempt = 1;
        loop {
            match self.send_chat(endpoint, payload).await {
                Ok(response) => return Ok(response),
                Err(error) if self.retry.should_retry(&error, attempt) => {
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        model = %endpoint.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "transient upstream failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn post_chat(&self, endpoint: &ModelEndpoint, payload: &Value) -> GatewayResult<Value> {
        let response = self.send_with_retry(endpoint, payload).await?;
        let body: Value = response.json().await?;
        if let Some(error) = body.get("error") {
            return Err(GatewayError::MalformedResponse(error.to_string()));
        }
        Ok(body)
    }

    fn assistant_message(body: &Value) -> GatewayResult<&Value> {
        body.get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .ok_or_else(|| {
                GatewayError::MalformedResponse("response missing choices".to_string())
            })
    }
}

#[async_trait]
impl LlmClient for LlmGateway {
    async fn generate(&self, request: CompletionRequest) -> GatewayResult<String> {
        let endpoint = self.config.resolve(request.model.as_deref())?;
        let payload = self.base_payload(endpoint, &request, false);
        let body = self.post_chat(endpoint, &payload).await?;
        let message = Self::assistant_message(&body)?;
        Ok(message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn generate_json(&self, request: CompletionRequest) -> GatewayResult<Value> {
        let endpoint = self.config.resolve(request.model.as_deref())?;
        let mut payload = self.base_payload(endpoint, &request, false);
        payload["response_format"] = json!({ "type": "json_object" });
        let body = self.post_chat(endpoint, &payload).await?;
        let message = Self::assistant_message(&body)?;
        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if let Ok(value) = serde_json::from_str::<Value>(content) {
            return Ok(value);
        }
        extract_structured_data(content).ok_or_else(|| {
            let preview: String = content.chars().take(500).collect();
            GatewayError::NoStructuredOutput(preview)
        })
    }

    async fn generate_stream(&self, request: CompletionRequest) -> GatewayResult<TextStream> {
        let endpoint = self.config.resolve(request.model.as_deref())?;
        let payload = self.base_payload(endpoint, &request, true);
        let response = self.send_with_retry(endpoint, &payload).await?;

        let stream = async_stream::try_stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(GatewayError::Http)?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        break 'read;
                    }
                    let Ok(value) = serde_json::from_str::<Value>(data) else {
                        continue;
                    };
                    if let Some(delta) = value["choices"][0]["delta"]["content"].as_str() {
                        if !delta.is_empty() {
                            yield delta.to_string();
                        }
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn ask_tool(
        &self,
        request: CompletionRequest,
        tools: &[ToolSpec],
        tool_choice: ToolChoice,
    ) -> GatewayResult<Decision> {
        let endpoint = self.config.resolve(request.model.as_deref())?;
        let mut payload = self.base_payload(endpoint, &request, false);
        payload["tools"] = Value::Array(tools.iter().map(ToolSpec::to_wire).collect());
        payload["tool_choice"] = json!(tool_choice.as_str());
        let body = self.post_chat(endpoint, &payload).await?;
        let message = Self::assistant_message(&body)?;
        Ok(Decision::from_assistant_message(message))
    }
}
