//! The atomic-insights enrichment pipeline: normalize heterogeneous raw
//! records into one schema, then run three batched LLM passes and merge the
//! results back onto the records.

pub mod normalize;
pub mod passes;

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Map, Value};

use crate::errors::{GatewayResult, InsightsError};
use crate::gateway::{CompletionRequest, LlmClient};
use crate::models::message::ChatMessage;

/// Keys the pipeline owns on the output record. Everything else passes
/// through unchanged.
pub const RESERVED_KEYS: &[&str] = &[
    "brand_mentions",
    "user_competition",
    "brand_sentiments",
    "brand_features",
    "brand_analysis",
];

const DEFAULT_BATCH_SIZE: usize = 20;
const BRAND_BATCH_SIZE: usize = 5;
const TOP_BRAND_LIMIT: usize = 5;
const OUTPUT_FILE: &str = "atomic_insights_results.json";

pub struct InsightsPipeline {
    llm: Arc<dyn LlmClient>,
    model: Option<String>,
    batch_size: usize,
}

impl InsightsPipeline {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        InsightsPipeline {
            llm,
            model: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run the full enrichment over a batch of raw records.
    pub async fn run(
        &self,
        records: Vec<Map<String, Value>>,
        output_dir: Option<&Path>,
    ) -> Result<Vec<Map<String, Value>>, InsightsError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        tracing::info!(records = records.len(), "starting atomic insights run");

        // Pure-CPU normalization runs off the async executor.
        let normalized =
            tokio::task::spawn_blocking(move || normalize::normalize_records(&records))
                .await
                .expect("normalization task panicked")?;

        let contents: Vec<String> = normalized.iter().map(passes::flatten_record).collect();

        // Pass a: brand mentions, one independent call per record.
        let mention_prompts: Vec<String> = contents
            .iter()
            .map(|content| passes::brand_mentions_prompt(content))
            .collect();
        let mention_responses = self.call_batched(mention_prompts).await?;
        let mentions: Vec<Map<String, Value>> = mention_responses
            .iter()
            .map(|response| passes::parse_brand_mentions(response))
            .collect();
        tracing::debug!("brand mention pass complete");

        // Pass b: competitive flow, with each record's top brands as context.
        let competition_prompts: Vec<String> = contents
            .iter()
            .zip(&mentions)
            .map(|(content, mentions)| {
                let top = passes::top_brands(mentions, TOP_BRAND_LIMIT);
                passes::competition_prompt(content, &top)
            })
            .collect();
        let competition_responses = self.call_batched(competition_prompts).await?;
        let competitions: Vec<Value> = competition_responses
            .iter()
            .map(|response| passes::parse_object(response))
            .collect();
        tracing::debug!("competition pass complete");

        // Pass c: one extra call per top brand per record.
        let mut brand_analyses: Vec<Map<String, Value>> = Vec::with_capacity(contents.len());
        for (content, record_mentions) in contents.iter().zip(&mentions) {
            let brands: Vec<String> = passes::top_brands(record_mentions, TOP_BRAND_LIMIT)
                .into_iter()
                .map(|(brand, _)| brand)
                .collect();
            brand_analyses.push(self.analyze_brands(content, &brands).await?);
        }
        tracing::debug!("brand analysis pass complete");

        let enriched: Vec<Map<String, Value>> = normalized
            .into_iter()
            .enumerate()
            .map(|(i, record)| merge_record(record, &mentions[i], &competitions[i], &brand_analyses[i]))
            .collect();

        if let Some(dir) = output_dir {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(OUTPUT_FILE);
            std::fs::write(&path, serde_json::to_string_pretty(&enriched)?)?;
            tracing::info!(path = %path.display(), "wrote atomic insights results");
        }

        Ok(enriched)
    }

    /// Sentiment/feature/strength-weakness extraction for each brand found
    /// in one record's content, keyed by brand.
    async fn analyze_brands(
        &self,
        content: &str,
        brands: &[String],
    ) -> GatewayResult<Map<String, Value>> {
        if brands.is_empty() {
            return Ok(Map::new());
        }
        let prompts: Vec<String> = brands
            .iter()
            .map(|brand| passes::brand_analysis_prompt(content, brand))
            .collect();
        let responses = self.call_concurrent(prompts, BRAND_BATCH_SIZE).await?;

        let mut analysis = Map::new();
        for (brand, response) in brands.iter().zip(responses) {
            analysis.insert(brand.clone(), passes::parse_object(&response));
        }
        Ok(analysis)
    }

    async fn call_batched(&self, prompts: Vec<String>) -> GatewayResult<Vec<String>> {
        self.call_concurrent(prompts, self.batch_size).await
    }

    /// Issue calls in sequential sub-batches; within a sub-batch the calls
    /// run concurrently and results are gathered in input order.
    async fn call_concurrent(
        &self,
        prompts: Vec<String>,
        batch_size: usize,
    ) -> GatewayResult<Vec<String>> {
        let mut results = Vec::with_capacity(prompts.len());
        for chunk in prompts.chunks(batch_size) {
            let mut calls = Vec::with_capacity(chunk.len());
            for prompt in chunk {
                let mut request = CompletionRequest::new(vec![ChatMessage::user(prompt.clone())]);
                request.model = self.model.clone();
                calls.push(self.llm.generate(request));
            }
            let mut gathered = futures::stream::iter(calls).buffered(batch_size);
            while let Some(result) = gathered.next().await {
                results.push(result?);
            }
        }
        Ok(results)
    }
}

fn merge_record(
    mut record: Map<String, Value>,
    mentions: &Map<String, Value>,
    competition: &Value,
    brand_analysis: &Map<String, Value>,
) -> Map<String, Value> {
    let mut sentiments = Map::new();
    let mut features = Map::new();
    let mut strengths_weaknesses = Map::new();
    for (brand, analysis) in brand_analysis {
        sentiments.insert(
            brand.clone(),
            analysis
                .get("sentiment")
                .cloned()
                .unwrap_or_else(|| json!("neutral")),
        );
        features.insert(
            brand.clone(),
            analysis.get("features").cloned().unwrap_or_else(|| json!({})),
        );
        strengths_weaknesses.insert(
            brand.clone(),
            json!({
                "strengths": analysis.get("strengths").cloned().unwrap_or_else(|| json!([])),
                "weaknesses": analysis.get("weaknesses").cloned().unwrap_or_else(|| json!([])),
            }),
        );
    }

    record.insert("brand_mentions".to_string(), Value::Object(mentions.clone()));
    record.insert("user_competition".to_string(), competition.clone());
    record.insert("brand_sentiments".to_string(), Value::Object(sentiments));
    record.insert("brand_features".to_string(), Value::Object(features));
    record.insert(
        "brand_analysis".to_string(),
        Value::Object(strengths_weaknesses),
    );
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::{MockLlm, MockReply};

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn mentions_reply() -> MockReply {
        MockReply::Text("{\"alpha\": 3}".to_string())
    }

    fn competition_reply() -> MockReply {
        MockReply::Text(
            "{\"brand_pairs\": [], \"reason\": \"no movement\"}".to_string(),
        )
    }

    fn analysis_reply() -> MockReply {
        MockReply::Text(
            "{\"sentiment\": \"positive\", \"features\": {\"range\": \"good\"}, \
             \"strengths\": [], \"weaknesses\": []}"
                .to_string(),
        )
    }

    #[tokio::test]
    async fn test_merge_is_strictly_additive() {
        // One record, so one reply per pass regardless of scheduling.
        let llm = Arc::new(MockLlm::new(vec![
            mentions_reply(),
            competition_reply(),
            analysis_reply(),
        ]));
        let pipeline = InsightsPipeline::new(llm);

        let input = vec![record(json!({
            "title": "road test",
            "detail_desc": "alpha drives well",
            "likes": 7
        }))];
        let enriched = pipeline.run(input.clone(), None).await.unwrap();

        assert_eq!(enriched.len(), 1);
        let output = &enriched[0];
        // Original keys survive unchanged.
        for (key, value) in &input[0] {
            assert_eq!(output.get(key), Some(value));
        }
        // The five reserved keys are attached.
        for key in RESERVED_KEYS {
            assert!(output.contains_key(*key), "missing {}", key);
        }
        assert_eq!(output["brand_mentions"], json!({"alpha": 3}));
        assert_eq!(output["brand_sentiments"], json!({"alpha": "positive"}));
        assert_eq!(output["brand_features"], json!({"alpha": {"range": "good"}}));
        assert_eq!(
            output["brand_analysis"],
            json!({"alpha": {"strengths": [], "weaknesses": []}})
        );
    }

    #[tokio::test]
    async fn test_poisoned_record_degrades_without_blocking_batch_mates() {
        // batch_size 1 forces deterministic call order: record 0 then 1.
        let llm = Arc::new(MockLlm::new(vec![
            MockReply::Text("total garbage, no json".to_string()),
            mentions_reply(),
            competition_reply(),
            competition_reply(),
            analysis_reply(),
        ]));
        let pipeline = InsightsPipeline::new(llm).with_batch_size(1);

        let input = vec![
            record(json!({"title": "bad"})),
            record(json!({"title": "good"})),
        ];
        let enriched = pipeline.run(input, None).await.unwrap();

        assert_eq!(enriched[0]["brand_mentions"], json!({}));
        assert_eq!(enriched[0]["brand_sentiments"], json!({}));
        assert_eq!(enriched[1]["brand_mentions"], json!({"alpha": 3}));
        assert_eq!(enriched[1]["brand_sentiments"], json!({"alpha": "positive"}));
    }

    #[tokio::test]
    async fn test_empty_input_is_empty_output() {
        let pipeline = InsightsPipeline::new(Arc::new(MockLlm::empty()));
        let enriched = pipeline.run(Vec::new(), None).await.unwrap();
        assert!(enriched.is_empty());
    }

    #[tokio::test]
    async fn test_results_written_when_output_dir_given() {
        let llm = Arc::new(MockLlm::new(vec![
            mentions_reply(),
            competition_reply(),
            analysis_reply(),
        ]));
        let pipeline = InsightsPipeline::new(llm);
        let dir = tempfile::tempdir().unwrap();

        pipeline
            .run(vec![record(json!({"title": "t"}))], Some(dir.path()))
            .await
            .unwrap();

        let written = std::fs::read_to_string(dir.path().join(OUTPUT_FILE)).unwrap();
        let parsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed[0]["brand_mentions"], json!({"alpha": 3}));
    }
}
