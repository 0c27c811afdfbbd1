//! The fixed set of analysis capabilities the planner can select. Each one
//! consumes the enriched dataset, computes a simple aggregate, writes its
//! artifact into the run's data directory and returns the same value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::errors::ToolError;
use crate::executor::Capability;
use crate::models::tool::ToolSpec;

/// All analyzers in their fixed registration order.
pub fn default_analyzers(data_dir: &Path) -> Vec<Arc<dyn Capability>> {
    vec![
        Arc::new(BrandMentionsAnalyzer::new(data_dir)),
        Arc::new(BrandSentimentAnalyzer::new(data_dir)),
        Arc::new(CompetitorAnalyzer::new(data_dir)),
        Arc::new(FeatureAnalyzer::new(data_dir)),
        Arc::new(KeywordAnalyzer::new(data_dir)),
        Arc::new(TrendAnalyzer::new(data_dir)),
        Arc::new(IpDistributionAnalyzer::new(data_dir)),
    ]
}

fn dataset_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "data": {
                "type": "array",
                "description": description,
            }
        },
        "required": ["data"]
    })
}

fn dataset<'a>(args: &'a Map<String, Value>) -> Result<&'a Vec<Value>, ToolError> {
    args.get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ToolError::InvalidArguments("'data' must be an array".to_string()))
}

fn save_artifact(data_dir: &Path, filename: &str, result: &Value) -> Result<(), ToolError> {
    std::fs::create_dir_all(data_dir)
        .and_then(|_| {
            std::fs::write(
                data_dir.join(filename),
                serde_json::to_string_pretty(result).unwrap_or_default(),
            )
        })
        .map_err(|e| ToolError::Execution(format!("failed to write {}: {}", filename, e)))
}

fn records(data: &[Value]) -> impl Iterator<Item = &Map<String, Value>> {
    data.iter().filter_map(Value::as_object)
}

fn num(value: Option<&Value>) -> f64 {
    value.and_then(Value::as_f64).unwrap_or(0.0)
}

/// Engagement-weighted heat of one content unit.
fn content_heat(record: &Map<String, Value>) -> f64 {
    num(record.get("like_count"))
        + 2.0 * num(record.get("comment_count"))
        + 3.0 * num(record.get("share_count"))
}

pub struct BrandMentionsAnalyzer {
    data_dir: PathBuf,
}

impl BrandMentionsAnalyzer {
    pub fn new(data_dir: &Path) -> Self {
        BrandMentionsAnalyzer {
            data_dir: data_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl Capability for BrandMentionsAnalyzer {
    fn name(&self) -> &str {
        "analyze_brand_mentions"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            self.name(),
            "Analyze brand mention counts and share of voice. Use this to see \
             which brands draw the most attention.",
            dataset_schema("the dataset to analyze, with content text and comments"),
        )
    }

    fn accepted_args(&self) -> &[&str] {
        &["data"]
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let data = dataset(&args)?;
        let mut counts: HashMap<String, i64> = HashMap::new();
        for record in records(data) {
            if let Some(Value::Object(mentions)) = record.get("brand_mentions") {
                for (brand, count) in mentions {
                    *counts.entry(brand.clone()).or_default() += count.as_i64().unwrap_or(0);
                }
            }
        }
        let total: i64 = counts.values().sum::<i64>().max(1);
        let mut ranked: Vec<(String, i64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(10);

        let brands: Vec<Value> = ranked
            .iter()
            .map(|(brand, count)| {
                json!({
                    "brand": brand,
                    "count": count,
                    "percentage": (*count as f64 * 1000.0 / total as f64).round() / 10.0,
                })
            })
            .collect();

        let insight = ranked.first().map(|(brand, count)| {
            json!({
                "content": format!(
                    "{} leads the discussion with {} mentions ({:.1}% of all brand mentions)",
                    brand, count, *count as f64 * 100.0 / total as f64
                ),
                "data_support": {"brand": brand, "count": count},
                "visualization": {"chart_type": "bar", "data": brands},
            })
        });

        let result = json!({
            "title": "Brand share of voice",
            "insights": insight.into_iter().collect::<Vec<_>>(),
        });
        save_artifact(&self.data_dir, "brand_mentions_analysis.json", &result)?;
        Ok(result)
    }
}

pub struct BrandSentimentAnalyzer {
    data_dir: PathBuf,
}

impl BrandSentimentAnalyzer {
    pub fn new(data_dir: &Path) -> Self {
        BrandSentimentAnalyzer {
            data_dir: data_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl Capability for BrandSentimentAnalyzer {
    fn name(&self) -> &str {
        "analyze_brand_sentiment"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            self.name(),
            "Analyze user sentiment toward each brand (positive, neutral, \
             negative). Use this to understand brand reputation.",
            dataset_schema("the dataset to analyze, with per-brand sentiment"),
        )
    }

    fn accepted_args(&self) -> &[&str] {
        &["data"]
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let data = dataset(&args)?;
        let mut tallies: HashMap<String, [i64; 3]> = HashMap::new();
        for record in records(data) {
            if let Some(Value::Object(sentiments)) = record.get("brand_sentiments") {
                for (brand, sentiment) in sentiments {
                    let slot = match sentiment.as_str() {
                        Some("positive") => 0,
                        Some("negative") => 2,
                        _ => 1,
                    };
                    tallies.entry(brand.clone()).or_default()[slot] += 1;
                }
            }
        }

        let mut per_brand: Vec<Value> = tallies
            .iter()
            .map(|(brand, [pos, neu, neg])| {
                json!({
                    "brand": brand,
                    "positive": pos,
                    "neutral": neu,
                    "negative": neg,
                })
            })
            .collect();
        per_brand.sort_by_key(|v| v["brand"].as_str().unwrap_or_default().to_string());

        let insight = tallies
            .iter()
            .max_by_key(|(_, [pos, _, _])| *pos)
            .map(|(brand, [pos, neu, neg])| {
                json!({
                    "content": format!(
                        "{} draws the most positive sentiment: {} positive, {} neutral, {} negative records",
                        brand, pos, neu, neg
                    ),
                    "data_support": {"brand": brand, "positive": pos},
                    "visualization": {"chart_type": "stacked_bar", "data": per_brand},
                })
            });

        let result = json!({
            "title": "Brand sentiment",
            "insights": insight.into_iter().collect::<Vec<_>>(),
        });
        save_artifact(&self.data_dir, "brand_sentiment_analysis.json", &result)?;
        Ok(result)
    }
}

pub struct CompetitorAnalyzer {
    data_dir: PathBuf,
}

impl CompetitorAnalyzer {
    pub fn new(data_dir: &Path) -> Self {
        CompetitorAnalyzer {
            data_dir: data_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl Capability for CompetitorAnalyzer {
    fn name(&self) -> &str {
        "analyze_competitor_relationships"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            self.name(),
            "Analyze relationships between leading brands and their \
             competitors, including users wavering or moving between brands.",
            dataset_schema("the dataset to analyze, with brand comparisons"),
        )
    }

    fn accepted_args(&self) -> &[&str] {
        &["data"]
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let data = dataset(&args)?;
        let mut pairs: HashMap<(String, String, String), (i64, String)> = HashMap::new();
        for record in records(data) {
            let Some(brand_pairs) = record
                .get("user_competition")
                .and_then(|c| c.get("brand_pairs"))
                .and_then(Value::as_array)
            else {
                continue;
            };
            for pair in brand_pairs.iter().filter_map(Value::as_object) {
                let key = (
                    pair.get("source_brand")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    pair.get("target_brand")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    pair.get("type")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                );
                let entry = pairs.entry(key).or_insert((0, String::new()));
                entry.0 += 1;
                if entry.1.is_empty() {
                    entry.1 = pair
                        .get("evidence")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                }
            }
        }

        let mut ranked: Vec<_> = pairs.into_iter().collect();
        ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then_with(|| a.0.cmp(&b.0)));
        let flows: Vec<Value> = ranked
            .iter()
            .take(10)
            .map(|((source, target, kind), (count, evidence))| {
                json!({
                    "source_brand": source,
                    "target_brand": target,
                    "type": kind,
                    "count": count,
                    "evidence": evidence,
                })
            })
            .collect();

        let insight = flows.first().map(|top| {
            json!({
                "content": format!(
                    "The strongest competitive flow runs from {} to {} ({} observations)",
                    top["source_brand"].as_str().unwrap_or_default(),
                    top["target_brand"].as_str().unwrap_or_default(),
                    top["count"]
                ),
                "data_support": top,
                "visualization": {"chart_type": "flow", "data": flows},
            })
        });

        let result = json!({
            "title": "Competitor relationships",
            "insights": insight.into_iter().collect::<Vec<_>>(),
        });
        save_artifact(&self.data_dir, "competitor_analysis.json", &result)?;
        Ok(result)
    }
}

pub struct FeatureAnalyzer {
    data_dir: PathBuf,
}

impl FeatureAnalyzer {
    pub fn new(data_dir: &Path) -> Self {
        FeatureAnalyzer {
            data_dir: data_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl Capability for FeatureAnalyzer {
    fn name(&self) -> &str {
        "analyze_product_features"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            self.name(),
            "Analyze the product features users discuss and how each brand \
             performs on those dimensions.",
            dataset_schema("the dataset to analyze, with feature evaluations"),
        )
    }

    fn accepted_args(&self) -> &[&str] {
        &["data"]
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let data = dataset(&args)?;
        let mut feature_counts: HashMap<String, i64> = HashMap::new();
        for record in records(data) {
            if let Some(Value::Object(brands)) = record.get("brand_features") {
                for features in brands.values().filter_map(Value::as_object) {
                    for feature in features.keys() {
                        *feature_counts.entry(feature.clone()).or_default() += 1;
                    }
                }
            }
        }
        let mut ranked: Vec<(String, i64)> = feature_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(15);

        let features: Vec<Value> = ranked
            .iter()
            .map(|(feature, count)| json!({"feature": feature, "mentions": count}))
            .collect();
        let insight = ranked.first().map(|(feature, count)| {
            json!({
                "content": format!(
                    "\"{}\" is the most discussed product dimension ({} mentions)",
                    feature, count
                ),
                "data_support": {"feature": feature, "mentions": count},
                "visualization": {"chart_type": "bar", "data": features},
            })
        });

        let result = json!({
            "title": "Product feature discussion",
            "insights": insight.into_iter().collect::<Vec<_>>(),
        });
        save_artifact(&self.data_dir, "feature_analysis.json", &result)?;
        Ok(result)
    }
}

pub struct KeywordAnalyzer {
    data_dir: PathBuf,
}

impl KeywordAnalyzer {
    pub fn new(data_dir: &Path) -> Self {
        KeywordAnalyzer {
            data_dir: data_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl Capability for KeywordAnalyzer {
    fn name(&self) -> &str {
        "analyze_keywords"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            self.name(),
            "Extract high-frequency keywords from the discussion and identify \
             positive and negative focal points.",
            dataset_schema("the dataset to analyze, with text and comments"),
        )
    }

    fn accepted_args(&self) -> &[&str] {
        &["data"]
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let data = dataset(&args)?;
        let mut counts: HashMap<String, i64> = HashMap::new();
        for record in records(data) {
            if let Some(keywords) = record.get("keywords").and_then(Value::as_array) {
                for keyword in keywords.iter().filter_map(Value::as_str) {
                    *counts.entry(keyword.to_lowercase()).or_default() += 1;
                }
                continue;
            }
            let title = record.get("title").and_then(Value::as_str).unwrap_or("");
            let detail = record
                .get("detail_desc")
                .and_then(Value::as_str)
                .unwrap_or("");
            for word in title.split_whitespace().chain(detail.split_whitespace()) {
                let word = word.trim_matches(|c: char| !c.is_alphanumeric());
                if word.chars().count() >= 3 {
                    *counts.entry(word.to_lowercase()).or_default() += 1;
                }
            }
        }
        let mut ranked: Vec<(String, i64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(20);

        let keywords: Vec<Value> = ranked
            .iter()
            .map(|(keyword, count)| json!({"keyword": keyword, "count": count}))
            .collect();
        let insight = ranked.first().map(|(keyword, count)| {
            json!({
                "content": format!("\"{}\" dominates the discussion ({} occurrences)", keyword, count),
                "data_support": {"keyword": keyword, "count": count},
                "visualization": {"chart_type": "word_cloud", "data": keywords},
            })
        });

        let result = json!({
            "title": "Keyword landscape",
            "insights": insight.into_iter().collect::<Vec<_>>(),
        });
        save_artifact(&self.data_dir, "keyword_analysis.json", &result)?;
        Ok(result)
    }
}

pub struct TrendAnalyzer {
    data_dir: PathBuf,
}

impl TrendAnalyzer {
    pub fn new(data_dir: &Path) -> Self {
        TrendAnalyzer {
            data_dir: data_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl Capability for TrendAnalyzer {
    fn name(&self) -> &str {
        "analyze_trends"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            self.name(),
            "Analyze discussion hotspots and trends over time, surfacing the \
             days with the highest engagement.",
            dataset_schema("the dataset to analyze, with timestamps and engagement"),
        )
    }

    fn accepted_args(&self) -> &[&str] {
        &["data"]
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let data = dataset(&args)?;
        let mut daily_heat: HashMap<String, f64> = HashMap::new();
        for record in records(data) {
            let day: String = record
                .get("publish_date")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .chars()
                .take(10)
                .collect();
            *daily_heat.entry(day).or_default() += 1.0 + content_heat(record);
        }
        let mut ranked: Vec<(String, f64)> = daily_heat.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let series: Vec<Value> = ranked
            .iter()
            .map(|(day, heat)| json!({"day": day, "heat": heat}))
            .collect();
        let insight = ranked.first().map(|(day, heat)| {
            json!({
                "content": format!("Discussion peaked on {} with a heat score of {:.1}", day, heat),
                "data_support": {"day": day, "heat": heat},
                "visualization": {"chart_type": "line", "data": series},
            })
        });

        let result = json!({
            "title": "Discussion trends",
            "insights": insight.into_iter().collect::<Vec<_>>(),
        });
        save_artifact(&self.data_dir, "trend_analysis.json", &result)?;
        Ok(result)
    }
}

pub struct IpDistributionAnalyzer {
    data_dir: PathBuf,
}

impl IpDistributionAnalyzer {
    pub fn new(data_dir: &Path) -> Self {
        IpDistributionAnalyzer {
            data_dir: data_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl Capability for IpDistributionAnalyzer {
    fn name(&self) -> &str {
        "analyze_ip_distribution"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            self.name(),
            "Analyze the geographic distribution of posters and commenters, \
             weighted by engagement.",
            dataset_schema("the dataset to analyze, with user locations"),
        )
    }

    fn accepted_args(&self) -> &[&str] {
        &["data"]
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let data = dataset(&args)?;
        let mut heat: HashMap<String, f64> = HashMap::new();
        let mut posts: HashMap<String, i64> = HashMap::new();
        let mut comments: HashMap<String, i64> = HashMap::new();

        for record in records(data) {
            if let Some(location) = record.get("location").and_then(Value::as_str) {
                if !location.is_empty() {
                    *heat.entry(location.to_string()).or_default() += 1.0 + content_heat(record);
                    *posts.entry(location.to_string()).or_default() += 1;
                }
            }
            if let Some(Value::Array(comment_list)) = record.get("comments_data") {
                for comment in comment_list.iter().filter_map(Value::as_object) {
                    let Some(location) = comment.get("comment_location").and_then(Value::as_str)
                    else {
                        continue;
                    };
                    if location.is_empty() {
                        continue;
                    }
                    *heat.entry(location.to_string()).or_default() +=
                        1.0 + num(comment.get("comment_like_count"));
                    *comments.entry(location.to_string()).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(String, f64)> = heat.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(15);

        let regions: Vec<Value> = ranked
            .iter()
            .map(|(location, heat)| {
                json!({
                    "location": location,
                    "heat": heat,
                    "post_count": posts.get(location).copied().unwrap_or(0),
                    "comment_count": comments.get(location).copied().unwrap_or(0),
                })
            })
            .collect();
        let insight = regions.first().map(|top| {
            json!({
                "content": format!(
                    "Users in {} are the most engaged, with a heat score of {:.1}",
                    top["location"].as_str().unwrap_or_default(),
                    top["heat"].as_f64().unwrap_or(0.0)
                ),
                "data_support": top,
                "visualization": {"chart_type": "bar", "data": regions},
            })
        });

        let result = json!({
            "title": "User geography",
            "insights": insight.into_iter().collect::<Vec<_>>(),
        });
        save_artifact(&self.data_dir, "ip_distribution_analysis.json", &result)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ToolRegistry;

    fn sample_data() -> Value {
        json!([
            {
                "title": "alpha review",
                "detail_desc": "the alpha sedan impressed everyone",
                "publish_date": "2025-03-01 10:00",
                "location": "Shanghai",
                "like_count": 4,
                "comment_count": 1,
                "brand_mentions": {"alpha": 3, "beta": 1},
                "brand_sentiments": {"alpha": "positive", "beta": "neutral"},
                "brand_features": {"alpha": {"range": "strong", "price": "high"}},
                "user_competition": {"brand_pairs": [
                    {"type": "flowing-out", "source_brand": "beta",
                     "target_brand": "alpha", "evidence": "switching to alpha"}
                ]},
                "comments_data": [
                    {"comment_user_nick": "u1", "comment_content": "nice",
                     "comment_location": "Beijing", "comment_like_count": 2}
                ]
            },
            {
                "title": "beta thoughts",
                "detail_desc": "beta still competitive",
                "publish_date": "2025-03-02 09:00",
                "location": "Shanghai",
                "brand_mentions": {"beta": 2},
                "brand_sentiments": {"beta": "negative"},
                "brand_features": {"beta": {"price": "fair"}},
                "user_competition": {"brand_pairs": []},
                "comments_data": []
            }
        ])
    }

    #[tokio::test]
    async fn test_registry_of_default_analyzers_is_unique() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new(default_analyzers(dir.path())).unwrap();
        assert_eq!(registry.names().len(), 7);
        assert_eq!(registry.names()[0], "analyze_brand_mentions");
    }

    #[tokio::test]
    async fn test_brand_mentions_aggregates_and_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = BrandMentionsAnalyzer::new(dir.path());
        let mut args = Map::new();
        args.insert("data".to_string(), sample_data());

        let result = analyzer.call(args).await.unwrap();
        let insights = result["insights"].as_array().unwrap();
        assert_eq!(insights.len(), 1);
        assert!(insights[0]["content"]
            .as_str()
            .unwrap()
            .starts_with("alpha leads"));

        let artifact = dir.path().join("brand_mentions_analysis.json");
        assert!(artifact.exists());
    }

    #[tokio::test]
    async fn test_ip_distribution_counts_posts_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = IpDistributionAnalyzer::new(dir.path());
        let mut args = Map::new();
        args.insert("data".to_string(), sample_data());

        let result = analyzer.call(args).await.unwrap();
        let data = result["insights"][0]["visualization"]["data"]
            .as_array()
            .unwrap();
        let shanghai = data
            .iter()
            .find(|r| r["location"] == "Shanghai")
            .expect("Shanghai aggregated");
        assert_eq!(shanghai["post_count"], json!(2));
        let beijing = data.iter().find(|r| r["location"] == "Beijing").unwrap();
        assert_eq!(beijing["comment_count"], json!(1));
    }

    #[tokio::test]
    async fn test_missing_data_argument_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = KeywordAnalyzer::new(dir.path());
        let err = analyzer.call(Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
