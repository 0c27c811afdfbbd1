//! The planning agent: asks the model which analysis capabilities to run for
//! a structured query, executes them in the chosen order, and triggers
//! report generation.
//!
//! States: Idle → Planning → Executing → Reporting → Done, with a separate
//! PlanningFailed terminal reachable only from Planning.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_stream::stream;
use futures::stream::BoxStream;
use indoc::indoc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::analyzers::default_analyzers;
use crate::errors::PlanningError;
use crate::executor::ToolRegistry;
use crate::gateway::{CompletionRequest, LlmClient, ToolChoice};
use crate::models::message::ChatMessage;
use crate::models::tool::ToolSpec;
use crate::report::{HtmlReportGenerator, ReportGenerator};

pub const PLANNING_SYSTEM_PROMPT: &str = indoc! {"
    You plan social media brand analyses. Given a structured query, select
    the analysis tools that answer it by calling them; call
    generate_final_report as well if the user needs a consolidated report.
    Select only tools that are actually relevant to the query. Do not answer
    in text.
"};

/// The synthetic capability the planner offers alongside the analyzers.
pub const REPORT_TOOL_NAME: &str = "generate_final_report";

const REPORT_FILE: &str = "final_report.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerState {
    Idle,
    Planning,
    Executing,
    Reporting,
    Done,
    PlanningFailed,
}

/// The task list and report flag decided once per analysis run. The task
/// order is the model's choice and is never re-sorted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub analysis_tasks: Vec<String>,
    pub generate_report: bool,
}

/// Terminal payload of a run, serialized into the `done` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_report_path: Option<String>,
}

impl RunSummary {
    pub fn success(final_report_path: Option<String>) -> Self {
        RunSummary {
            status: "success".to_string(),
            message: Some("analysis complete".to_string()),
            error: None,
            final_report_path,
        }
    }

    pub fn failure<S: Into<String>>(error: S) -> Self {
        RunSummary {
            status: "failure".to_string(),
            message: None,
            error: Some(error.into()),
            final_report_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlannerEvent {
    Status(String),
    TaskStart(String),
    TaskSuccess(String),
    TaskError { task: String, error: String },
    ReportStart,
    ReportDone(String),
    /// Exactly one per run (unless the run dies with `Fatal`).
    Finished(RunSummary),
    /// Internal error; the consumer reports it and closes without a `done`.
    Fatal(String),
}

pub struct PlanningAgent {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    report_generator: Arc<dyn ReportGenerator>,
    data_dir: PathBuf,
    reports_dir: PathBuf,
}

impl PlanningAgent {
    /// Agent with the default analyzer registry and HTML report generator,
    /// writing under `output_dir/data` and `output_dir/reports`.
    pub fn new(llm: Arc<dyn LlmClient>, output_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = output_dir.join("data");
        let registry = ToolRegistry::new(default_analyzers(&data_dir))
            .map_err(|e| anyhow::anyhow!("building analyzer registry: {}", e))?;
        Self::with_components(llm, Arc::new(registry), Arc::new(HtmlReportGenerator), output_dir)
    }

    pub fn with_components(
        llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        report_generator: Arc<dyn ReportGenerator>,
        output_dir: &Path,
    ) -> anyhow::Result<Self> {
        let data_dir = output_dir.join("data");
        let reports_dir = output_dir.join("reports");
        std::fs::create_dir_all(&data_dir)?;
        std::fs::create_dir_all(&reports_dir)?;
        Ok(PlanningAgent {
            llm,
            registry,
            report_generator,
            data_dir,
            reports_dir,
        })
    }

    fn report_tool_spec() -> ToolSpec {
        ToolSpec::new(
            REPORT_TOOL_NAME,
            "After all selected analysis tasks are done, call this to \
             consolidate their results into the final comprehensive report.",
            json!({"type": "object", "properties": {}}),
        )
    }

    /// Ask the model to select tasks for a structured query. Zero tool calls
    /// is a hard planning failure, not a default plan.
    pub async fn plan_tasks(&self, structured_query: &Value) -> Result<Plan, PlanningError> {
        let query_str = serde_json::to_string_pretty(structured_query).unwrap_or_default();
        tracing::info!(query = %query_str, "planning analysis tasks");

        let mut specs = self.registry.specs();
        specs.push(Self::report_tool_spec());

        let request = CompletionRequest::new(vec![ChatMessage::user(format!(
            "Plan the analysis tasks for this structured query:\n```json\n{}\n```",
            query_str
        ))])
        .with_system(PLANNING_SYSTEM_PROMPT)
        .with_temperature(0.0);

        let decision = self.llm.ask_tool(request, &specs, ToolChoice::Auto).await?;
        let calls = decision.tool_calls().ok_or(PlanningError::Empty)?;
        if calls.is_empty() {
            return Err(PlanningError::Empty);
        }

        let mut analysis_tasks = Vec::new();
        let mut generate_report = false;
        for call in calls {
            if call.name == REPORT_TOOL_NAME {
                generate_report = true;
            } else if self.registry.contains(&call.name) {
                analysis_tasks.push(call.name.clone());
            } else {
                tracing::warn!(capability = %call.name, "planner selected unknown capability, dropping");
            }
        }

        let plan = Plan {
            analysis_tasks,
            generate_report,
        };
        tracing::info!(tasks = plan.analysis_tasks.len(), report = plan.generate_report, "plan ready");
        Ok(plan)
    }

    /// Run the full analysis flow. With a structured query the model plans;
    /// without one every registered task runs and a report is generated.
    pub fn run_analysis(
        self,
        records: Vec<Value>,
        structured_query: Option<Value>,
    ) -> BoxStream<'static, PlannerEvent> {
        Box::pin(stream! {
            let mut state = PlannerState::Idle;
            tracing::debug!(state = ?state, "planner transition");
            yield PlannerEvent::Status("[STATUS] starting full analysis pipeline".to_string());

            if records.is_empty() {
                tracing::warn!("analysis invoked with an empty dataset");
                yield PlannerEvent::Status(
                    "[WARNING] input dataset is empty, results may be inaccurate".to_string(),
                );
            }

            let (tasks, generate_report) = match &structured_query {
                Some(query) => {
                    state = PlannerState::Planning;
                    tracing::debug!(state = ?state, "planner transition");
                    match self.plan_tasks(query).await {
                        Ok(plan) => (plan.analysis_tasks, plan.generate_report),
                        Err(PlanningError::Empty) => {
                            state = PlannerState::PlanningFailed;
                            tracing::error!(state = ?state, "model selected no analysis tasks");
                            yield PlannerEvent::Finished(RunSummary::failure(
                                "the model selected no analysis tasks; the query may need clarification",
                            ));
                            return;
                        }
                        Err(PlanningError::Gateway(error)) => {
                            state = PlannerState::PlanningFailed;
                            tracing::error!(state = ?state, %error, "planning call failed");
                            yield PlannerEvent::Fatal(format!("planning failed: {}", error));
                            return;
                        }
                    }
                }
                None => (self.registry.names(), true),
            };

            state = PlannerState::Executing;
            tracing::debug!(state = ?state, tasks = tasks.len(), "planner transition");
            let arguments = json!({ "data": records }).to_string();
            for task in &tasks {
                yield PlannerEvent::TaskStart(task.clone());
                match self.registry.dispatch(task, &arguments).await {
                    Ok(envelope) if envelope.is_error() => {
                        let error = envelope.content["error"]
                            .as_str()
                            .unwrap_or("unknown error")
                            .to_string();
                        yield PlannerEvent::TaskError { task: task.clone(), error };
                    }
                    Ok(_) => {
                        yield PlannerEvent::TaskSuccess(task.clone());
                    }
                    Err(error) => {
                        // One task failing never aborts the remaining tasks.
                        tracing::error!(task = %task, %error, "analysis task failed");
                        yield PlannerEvent::TaskError {
                            task: task.clone(),
                            error: error.to_string(),
                        };
                    }
                }
            }

            let mut final_report_path = None;
            if generate_report {
                state = PlannerState::Reporting;
                tracing::debug!(state = ?state, "planner transition");
                yield PlannerEvent::ReportStart;
                let output_path = self.reports_dir.join(REPORT_FILE);
                match self
                    .report_generator
                    .generate(&self.data_dir, &output_path)
                    .await
                {
                    Ok(path) => {
                        let path = path.display().to_string();
                        final_report_path = Some(path.clone());
                        yield PlannerEvent::ReportDone(path);
                    }
                    Err(error) => {
                        tracing::error!(%error, "report generation failed");
                        yield PlannerEvent::Fatal(format!("report generation failed: {}", error));
                        return;
                    }
                }
            }

            state = PlannerState::Done;
            tracing::debug!(state = ?state, "planner transition");
            yield PlannerEvent::Finished(RunSummary::success(final_report_path));
        })
    }
}
