//! Rewrites a free-text user query into a structured analysis task.

use std::sync::Arc;

use async_trait::async_trait;
use indoc::indoc;
use serde_json::{json, Map, Value};

use crate::errors::ToolError;
use crate::executor::Capability;
use crate::gateway::{CompletionRequest, LlmClient};
use crate::models::message::ChatMessage;
use crate::models::tool::ToolSpec;

const REWRITE_SYSTEM_PROMPT: &str = indoc! {"
    You rewrite user requests about social media brand analysis into a
    structured task. Respond in JSON with exactly two fields:
    {
        \"background\": \"what the user cares about and why\",
        \"task\": \"the concrete analysis to perform\"
    }
    Return only the JSON, no other explanation.
"};

const KEYWORD_SYSTEM_PROMPT: &str = indoc! {"
    Given an analysis background and task, produce search keywords for each
    social platform. Respond in JSON, one array of keyword strings per
    platform key:
    {
        \"xiaohongshu\": [\"keyword\", ...],
        \"douyin\": [\"keyword\", ...]
    }
    Return only the JSON, no other explanation.
"};

/// Default model alias for rewriting: the online-search variant.
const REWRITE_MODEL: &str = "deepseek-v3-online";

pub struct QueryRewriter {
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        QueryRewriter {
            llm,
            model: REWRITE_MODEL.to_string(),
        }
    }

    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }

    async fn rewrite(&self, query: &str) -> Result<Value, ToolError> {
        let request = CompletionRequest::new(vec![ChatMessage::user(format!(
            "Now, please rewrite this query:\n{}",
            query
        ))])
        .with_system(REWRITE_SYSTEM_PROMPT)
        .with_model(self.model.clone());

        let response = self
            .llm
            .generate_json(request)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        let background = required_str(&response, "background")?;
        let task = required_str(&response, "task")?;
        let keywords = self.generate_keywords(&background, &task).await?;

        Ok(json!({
            "background": background,
            "task": task,
            "keywords": keywords,
        }))
    }

    async fn generate_keywords(&self, background: &str, task: &str) -> Result<Value, ToolError> {
        let request = CompletionRequest::new(vec![ChatMessage::user(format!(
            "Background: {}\nTask: {}",
            background, task
        ))])
        .with_system(KEYWORD_SYSTEM_PROMPT)
        .with_model(self.model.clone());

        self.llm
            .generate_json(request)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))
    }
}

fn required_str(response: &Value, field: &str) -> Result<String, ToolError> {
    response
        .get(field)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| ToolError::Execution(format!("rewrite response missing '{}'", field)))
}

#[async_trait]
impl Capability for QueryRewriter {
    fn name(&self) -> &str {
        "query_rewrite"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            self.name(),
            "Use when the user wants social media data analysis (brand \
             analysis, competitor analysis, user review analysis). Rewrites \
             the query or conversation history into a structured analysis task.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "the user's original query or a summary of the relevant conversation history",
                    }
                },
                "required": ["query"]
            }),
        )
    }

    fn accepted_args(&self) -> &[&str] {
        &["query"]
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("'query' must be a string".to_string()))?;
        self.rewrite(query).await
    }
}
