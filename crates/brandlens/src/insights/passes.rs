//! Prompt construction and response parsing for the three enrichment passes.

use serde_json::{Map, Value};

use crate::gateway::extract::extract_structured_data;

/// Cap on how much of a record's text goes into a prompt.
const CONTENT_CLAMP: usize = 2000;

fn clamp(content: &str) -> String {
    content.chars().take(CONTENT_CLAMP).collect()
}

fn str_field<'a>(record: &'a Map<String, Value>, key: &str) -> &'a str {
    record.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// One text blob per record: author + title + body, then each decoded
/// comment prefixed with commenter, location and date when present.
pub fn flatten_record(record: &Map<String, Value>) -> String {
    let author = str_field(record, "author_name");
    let title = str_field(record, "title");
    let detail = str_field(record, "detail_desc");
    let mut text = format!("{}: {} {}\n", author, title, detail);

    if let Some(Value::Array(comments)) = record.get("comments_data") {
        for comment in comments {
            let Some(comment) = comment.as_object() else {
                continue;
            };
            let user = str_field(comment, "comment_user_nick");
            let content = str_field(comment, "comment_content");
            let location = str_field(comment, "comment_location");
            let date = str_field(comment, "comment_date");

            let location_info = if location.is_empty() {
                String::new()
            } else {
                format!("[{}]", location)
            };
            let date_info = if date.is_empty() {
                String::new()
            } else {
                format!("({})", date)
            };
            text.push_str(&format!(
                "{}{}{}: {}\n",
                user, location_info, date_info, content
            ));
        }
    }
    text
}

pub fn brand_mentions_prompt(content: &str) -> String {
    format!(
        "Analyze the brands mentioned in the following content and how often \
         each one appears:\n\n{}\n\nRespond in JSON:\n{{\n    \"brand name 1\": mention count,\n    \
         \"brand name 2\": mention count\n}}\n\nReturn only the JSON, no other explanation.",
        clamp(content)
    )
}

pub fn competition_prompt(content: &str, top_brands: &[(String, i64)]) -> String {
    let brand_context = if top_brands.is_empty() {
        String::new()
    } else {
        let listed: Vec<String> = top_brands
            .iter()
            .map(|(brand, count)| format!("{} ({} mentions)", brand, count))
            .collect();
        format!(
            "Main brands found in this content: {}\n\n",
            listed.join(", ")
        )
    };
    format!(
        "{}Analyze user competition dynamics in the following content:\n\n{}\n\n\
         Look at the relationships between all brands, paying particular attention \
         to signs of users moving from one brand to another.\n\nRespond in JSON:\n\
         {{\n    \"brand_pairs\": [\n        {{\n            \"type\": \"wavering/flowing-out\",\n            \
         \"source_brand\": \"brand A\",\n            \"target_brand\": \"brand B\",\n            \
         \"evidence\": \"verbatim user quote\"\n        }}\n    ],\n    \"reason\": \"overall analysis\"\n}}\n\n\
         A flowing-out relationship means the user disparages one brand while praising \
         another; the flow runs from the disparaged brand to the praised one.\n\
         Return only the JSON, no other explanation.",
        brand_context,
        clamp(content)
    )
}

pub fn brand_analysis_prompt(content: &str, brand: &str) -> String {
    format!(
        "Analyze how the brand \"{}\" is evaluated in the following text:\n\n{}\n\n\
         Respond in JSON:\n{{\n    \"sentiment\": \"positive/neutral/negative\",\n    \
         \"features\": {{\"feature\": \"evaluation\"}},\n    \
         \"strengths\": [{{\"feature\": \"name\", \"description\": \"details\"}}],\n    \
         \"weaknesses\": [{{\"feature\": \"name\", \"description\": \"details\"}}]\n}}\n\n\
         Return only the JSON, no other explanation.",
        brand,
        clamp(content)
    )
}

/// Parse a brand→count map out of model text. Anything unparseable, or any
/// non-numeric count, is dropped; total failure is the empty map.
pub fn parse_brand_mentions(text: &str) -> Map<String, Value> {
    let Some(Value::Object(raw)) = extract_structured_data(text) else {
        return Map::new();
    };
    raw.into_iter()
        .filter(|(_, count)| count.is_i64() || count.is_u64() || count.is_f64())
        .collect()
}

/// Parse a JSON object out of model text, degrading to `{}` on failure.
pub fn parse_object(text: &str) -> Value {
    match extract_structured_data(text) {
        Some(value) if value.is_object() => value,
        _ => Value::Object(Map::new()),
    }
}

/// The most-mentioned brands, highest count first, at most `limit`.
pub fn top_brands(mentions: &Map<String, Value>, limit: usize) -> Vec<(String, i64)> {
    let mut ranked: Vec<(String, i64)> = mentions
        .iter()
        .filter_map(|(brand, count)| {
            if brand.is_empty() {
                return None;
            }
            let count = count.as_i64().or_else(|| count.as_f64().map(|f| f as i64))?;
            Some((brand.clone(), count))
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_includes_comments_with_prefixes() {
        let record = json!({
            "author_name": "amy",
            "title": "first drive",
            "detail_desc": "smooth ride",
            "comments_data": [
                {"comment_user_nick": "bob", "comment_content": "agreed",
                 "comment_location": "Berlin", "comment_date": "2025-03-01"},
                {"comment_user_nick": "cat", "comment_content": "not sure"}
            ]
        });
        let text = flatten_record(record.as_object().unwrap());
        assert!(text.starts_with("amy: first drive smooth ride\n"));
        assert!(text.contains("bob[Berlin](2025-03-01): agreed\n"));
        assert!(text.contains("cat: not sure\n"));
    }

    #[test]
    fn test_parse_brand_mentions_drops_non_numeric_counts() {
        let parsed = parse_brand_mentions("{\"alpha\": 3, \"beta\": \"many\"}");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["alpha"], json!(3));
    }

    #[test]
    fn test_parse_brand_mentions_degrades_to_empty() {
        assert!(parse_brand_mentions("nothing structured").is_empty());
    }

    #[test]
    fn test_top_brands_ranked_and_limited() {
        let mentions = json!({"a": 1, "b": 5, "c": 3, "d": 2, "e": 4, "f": 9});
        let top = top_brands(mentions.as_object().unwrap(), 5);
        assert_eq!(top.len(), 5);
        assert_eq!(top[0], ("f".to_string(), 9));
        assert_eq!(top[1], ("b".to_string(), 5));
    }

    #[test]
    fn test_prompt_clamps_long_content() {
        let long = "x".repeat(5000);
        let prompt = brand_mentions_prompt(&long);
        assert!(prompt.len() < 2600);
    }
}
