//! The streaming query endpoint: one long-lived connection carrying
//! newline-delimited JSON events for user chats, server analysis runs and
//! (acknowledged, inert) interrupts.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use brandlens::agents::chat::ChatAgent;
use brandlens::agents::planner::{PlannerEvent, PlanningAgent};
use brandlens::agents::rewriter::QueryRewriter;
use brandlens::executor::ToolRegistry;
use brandlens::models::envelope::TaskType;
use brandlens::models::message::ChatMessage;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamingQueryRequest {
    #[serde(default)]
    qa_id: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    conversation_id: String,
    query_type: String,
    content: StreamingQueryContent,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamingQueryContent {
    #[serde(default)]
    messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    collected_data: Option<Vec<Value>>,
    #[serde(default)]
    interrupt_reason: Option<String>,
    #[serde(default)]
    structured_query: Option<Value>,
}

/// The outer wire unit: an envelope plus the request's identifiers.
#[derive(Debug, Serialize)]
struct StreamEvent<'a> {
    qa_id: &'a str,
    user_id: &'a str,
    conversation_id: &'a str,
    task_type: TaskType,
    content: Value,
}

#[derive(Debug, Clone)]
struct RequestIds {
    qa_id: String,
    user_id: String,
    conversation_id: String,
}

fn event_line(ids: &RequestIds, task_type: TaskType, content: Value) -> String {
    let event = StreamEvent {
        qa_id: &ids.qa_id,
        user_id: &ids.user_id,
        conversation_id: &ids.conversation_id,
        task_type,
        content,
    };
    let mut line = serde_json::to_string(&event).unwrap_or_default();
    line.push('\n');
    line
}

/// Newline-delimited JSON response body fed from an mpsc channel.
pub struct JsonLinesResponse {
    rx: ReceiverStream<String>,
}

impl JsonLinesResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for JsonLinesResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for JsonLinesResponse {
    fn into_response(self) -> axum::response::Response {
        let body = axum::body::Body::from_stream(self);

        http::Response::builder()
            .header("Content-Type", "application/json")
            .header("Cache-Control", "no-cache")
            .body(body)
            .unwrap()
    }
}

/// Sends one line; false means the client is gone and production can stop.
async fn send(
    tx: &mpsc::Sender<String>,
    ids: &RequestIds,
    task_type: TaskType,
    content: Value,
) -> bool {
    tx.send(event_line(ids, task_type, content)).await.is_ok()
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<StreamingQueryRequest>,
) -> Result<axum::response::Response, ApiError> {
    let ids = RequestIds {
        qa_id: request.qa_id,
        user_id: request.user_id,
        conversation_id: request.conversation_id,
    };

    match request.query_type.as_str() {
        "interrupt" => {
            let reason = request
                .content
                .interrupt_reason
                .filter(|reason| !reason.is_empty())
                .ok_or(ApiError::BadRequest)?;
            // Accepted and acknowledged; nothing is cancelled.
            tracing::info!(reason = %reason, "interrupt acknowledged without effect");
            Ok(Json(json!({"status": "interrupted", "reason": reason})).into_response())
        }
        "user" => Ok(user_stream(state, ids, request.content).into_response()),
        "server" => Ok(server_stream(state, ids, request.content).into_response()),
        other => {
            tracing::error!(query_type = other, "invalid query_type");
            Ok(unknown_query_stream(ids, other.to_string()).into_response())
        }
    }
}

fn user_stream(
    state: AppState,
    ids: RequestIds,
    content: StreamingQueryContent,
) -> JsonLinesResponse {
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        let messages = content.messages.unwrap_or_default();
        if messages.is_empty() {
            send(
                &tx,
                &ids,
                TaskType::Error,
                json!({"error": "missing 'messages' in content"}),
            )
            .await;
            return;
        }

        let registry =
            match ToolRegistry::new(vec![Arc::new(QueryRewriter::new(Arc::clone(&state.llm)))]) {
                Ok(registry) => Arc::new(registry),
                Err(error) => {
                    tracing::error!(%error, "failed to build chat registry");
                    send(
                        &tx,
                        &ids,
                        TaskType::Error,
                        json!({"error": "internal setup failure"}),
                    )
                    .await;
                    return;
                }
            };

        tracing::info!(qa_id = %ids.qa_id, conversation_id = %ids.conversation_id, "starting chat stream");
        let agent = ChatAgent::new(Arc::clone(&state.llm), registry);
        let mut envelopes = agent.chat(messages);
        while let Some(envelope) = envelopes.next().await {
            if !send(&tx, &ids, envelope.task_type, envelope.content).await {
                break;
            }
        }
        tracing::info!(qa_id = %ids.qa_id, "chat stream finished");
    });

    JsonLinesResponse::new(ReceiverStream::new(rx))
}

fn server_stream(
    state: AppState,
    ids: RequestIds,
    content: StreamingQueryContent,
) -> JsonLinesResponse {
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        let collected = content.collected_data.unwrap_or_default();
        if collected.is_empty() {
            send(
                &tx,
                &ids,
                TaskType::Error,
                json!({"error": "missing or empty 'collected_data' in content"}),
            )
            .await;
            return;
        }

        // Exclusively owned by this request; the timestamp keeps concurrent
        // runs for the same conversation apart (down to one second).
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let run_dir = PathBuf::from(&state.settings.runs_dir).join(format!(
            "conv_{}_qa_{}_{}",
            ids.conversation_id, ids.qa_id, timestamp
        ));
        if let Err(error) = std::fs::create_dir_all(&run_dir) {
            tracing::error!(%error, dir = %run_dir.display(), "failed to create output directory");
            send(
                &tx,
                &ids,
                TaskType::Error,
                json!({"error": "failed to create output directory"}),
            )
            .await;
            return;
        }

        if !send(
            &tx,
            &ids,
            TaskType::Stream,
            json!({"content": format!(
                "[SETUP] analysis setup complete, output dir: {}",
                run_dir.display()
            )}),
        )
        .await
        {
            return;
        }

        let agent = match PlanningAgent::new(Arc::clone(&state.llm), &run_dir) {
            Ok(agent) => agent,
            Err(error) => {
                tracing::error!(%error, "failed to build planning agent");
                send(
                    &tx,
                    &ids,
                    TaskType::Error,
                    json!({"error": "internal setup failure"}),
                )
                .await;
                return;
            }
        };

        tracing::info!(qa_id = %ids.qa_id, conversation_id = %ids.conversation_id, "starting analysis run");
        let mut events = agent.run_analysis(collected, content.structured_query);
        while let Some(event) = events.next().await {
            let alive = match event {
                PlannerEvent::Status(status) => {
                    send(&tx, &ids, TaskType::Stream, json!({"content": status})).await
                }
                PlannerEvent::TaskStart(task) => {
                    send(
                        &tx,
                        &ids,
                        TaskType::Stream,
                        json!({"content": format!("[TASK_START] {}", task)}),
                    )
                    .await
                }
                PlannerEvent::TaskSuccess(task) => {
                    send(
                        &tx,
                        &ids,
                        TaskType::Stream,
                        json!({"content": format!("[TASK_SUCCESS] {}", task)}),
                    )
                    .await
                }
                PlannerEvent::TaskError { task, error } => {
                    send(
                        &tx,
                        &ids,
                        TaskType::Stream,
                        json!({"content": format!("[TASK_ERROR] {}: {}", task, error)}),
                    )
                    .await
                }
                PlannerEvent::ReportStart => {
                    send(
                        &tx,
                        &ids,
                        TaskType::Stream,
                        json!({"content": "[REPORT_START] generating final report"}),
                    )
                    .await
                }
                PlannerEvent::ReportDone(path) => {
                    send(
                        &tx,
                        &ids,
                        TaskType::Stream,
                        json!({"content": format!("[REPORT_DONE] {}", path)}),
                    )
                    .await
                }
                PlannerEvent::Fatal(error) => {
                    // One terminal error line; no done follows.
                    send(&tx, &ids, TaskType::Error, json!({"error": error})).await;
                    return;
                }
                PlannerEvent::Finished(summary) => {
                    if let Some(path) = &summary.final_report_path {
                        stream_report_file(&tx, &ids, Path::new(path)).await;
                    }
                    let content = serde_json::to_value(&summary).unwrap_or_else(|_| json!({}));
                    send(&tx, &ids, TaskType::Done, content).await;
                    return;
                }
            };
            if !alive {
                return;
            }
        }
    });

    JsonLinesResponse::new(ReceiverStream::new(rx))
}

/// Stream the rendered report back line by line as `report` events.
async fn stream_report_file(tx: &mpsc::Sender<String>, ids: &RequestIds, path: &Path) {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "report path in summary but file missing");
        send(
            tx,
            ids,
            TaskType::Stream,
            json!({"content": format!("[WARN] report file not found: {}", path.display())}),
        )
        .await;
        return;
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if !send(
        tx,
        ids,
        TaskType::Stream,
        json!({"content": format!("[REPORT] starting report transmission from {}", name)}),
    )
    .await
    {
        return;
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => {
            for line in contents.lines() {
                if !send(tx, ids, TaskType::Report, json!({"content": line})).await {
                    return;
                }
            }
            send(
                tx,
                ids,
                TaskType::Stream,
                json!({"content": "[REPORT] report transmission complete"}),
            )
            .await;
        }
        Err(error) => {
            tracing::error!(%error, path = %path.display(), "failed to stream report file");
            send(
                tx,
                ids,
                TaskType::Stream,
                json!({"content": format!("[ERROR] failed to stream report file: {}", error)}),
            )
            .await;
        }
    }
}

/// Exactly one error line, never a done.
fn unknown_query_stream(ids: RequestIds, query_type: String) -> JsonLinesResponse {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        send(
            &tx,
            &ids,
            TaskType::Error,
            json!({"error": format!("invalid query_type: {}", query_type)}),
        )
        .await;
    });
    JsonLinesResponse::new(ReceiverStream::new(rx))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/streaming/query", post(handler))
        .with_state(state)
}
