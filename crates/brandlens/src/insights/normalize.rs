//! Schema unification: widen every record to the union of all fields seen
//! across the batch, with type-appropriate defaults, and decode the
//! JSON-string-encoded fields into real structures.

use serde_json::{Map, Value};

use crate::errors::InsightsError;

/// Fields that arrive JSON-encoded as strings. An empty string decodes to
/// the empty collection of the field's natural shape.
const ENCODED_LIST_FIELDS: &[&str] = &["comments_data", "author_recent_content"];
const ENCODED_MAP_FIELDS: &[&str] = &["author_data"];

/// The union of field names across all records, each mapped to a default
/// matching the type of its first observed value.
pub fn collect_field_defaults(records: &[Map<String, Value>]) -> Map<String, Value> {
    let mut defaults = Map::new();
    for record in records {
        for (key, value) in record {
            if !defaults.contains_key(key) {
                defaults.insert(key.clone(), default_for(value));
            }
        }
    }
    defaults
}

fn default_for(value: &Value) -> Value {
    match value {
        Value::String(_) => Value::String(String::new()),
        Value::Array(_) => Value::Array(Vec::new()),
        Value::Object(_) => Value::Object(Map::new()),
        Value::Bool(_) => Value::Bool(false),
        Value::Number(n) => {
            if n.is_f64() {
                serde_json::json!(0.0)
            } else {
                serde_json::json!(0)
            }
        }
        Value::Null => Value::Null,
    }
}

/// Rewrite one record to contain every field in `defaults`, decoding the
/// string-encoded fields. Already-decoded fields pass through untouched, so
/// normalization is idempotent.
pub fn normalize_record(
    record: &Map<String, Value>,
    defaults: &Map<String, Value>,
) -> Result<Map<String, Value>, InsightsError> {
    let mut normalized = defaults.clone();
    for (key, value) in record {
        normalized.insert(key.clone(), value.clone());
    }

    for field in ENCODED_LIST_FIELDS {
        decode_in_place(&mut normalized, field, Value::Array(Vec::new()))?;
    }
    for field in ENCODED_MAP_FIELDS {
        decode_in_place(&mut normalized, field, Value::Object(Map::new()))?;
    }
    Ok(normalized)
}

fn decode_in_place(
    record: &mut Map<String, Value>,
    field: &str,
    empty: Value,
) -> Result<(), InsightsError> {
    let Some(Value::String(raw)) = record.get(field) else {
        return Ok(());
    };
    let decoded = if raw.is_empty() {
        empty
    } else {
        serde_json::from_str(raw).map_err(|source| InsightsError::BadEncodedField {
            field: field.to_string(),
            source,
        })?
    };
    record.insert(field.to_string(), decoded);
    Ok(())
}

/// Normalize a whole batch: compute the field union once, then rewrite each
/// record on a bounded pool of worker threads, preserving input order.
pub fn normalize_records(
    records: &[Map<String, Value>],
) -> Result<Vec<Map<String, Value>>, InsightsError> {
    let defaults = collect_field_defaults(records);
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(8);

    if records.len() < 2 || workers < 2 {
        return records
            .iter()
            .map(|record| normalize_record(record, &defaults))
            .collect();
    }

    let chunk_size = records.len().div_ceil(workers);
    let chunk_results = std::thread::scope(|scope| {
        let handles: Vec<_> = records
            .chunks(chunk_size)
            .map(|chunk| {
                let defaults = &defaults;
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|record| normalize_record(record, defaults))
                        .collect::<Result<Vec<_>, _>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("normalization worker panicked"))
            .collect::<Result<Vec<_>, _>>()
    })?;

    Ok(chunk_results.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_union_with_typed_defaults() {
        let records = vec![
            record(json!({"title": "a", "likes": 3})),
            record(json!({"detail_desc": "b", "score": 1.5, "pinned": true})),
        ];
        let normalized = normalize_records(&records).unwrap();

        assert_eq!(normalized[0]["detail_desc"], json!(""));
        assert_eq!(normalized[0]["score"], json!(0.0));
        assert_eq!(normalized[0]["pinned"], json!(false));
        assert_eq!(normalized[1]["title"], json!(""));
        assert_eq!(normalized[1]["likes"], json!(0));
    }

    #[test]
    fn test_empty_string_decodes_to_empty_collection() {
        let records = vec![record(json!({
            "comments_data": "",
            "author_data": "",
            "author_recent_content": ""
        }))];
        let normalized = normalize_records(&records).unwrap();
        assert_eq!(normalized[0]["comments_data"], json!([]));
        assert_eq!(normalized[0]["author_data"], json!({}));
        assert_eq!(normalized[0]["author_recent_content"], json!([]));
    }

    #[test]
    fn test_encoded_fields_decode_to_structures() {
        let records = vec![record(json!({
            "comments_data": "[{\"comment_content\": \"nice\"}]",
            "author_data": "{\"fans\": 10}"
        }))];
        let normalized = normalize_records(&records).unwrap();
        assert_eq!(
            normalized[0]["comments_data"],
            json!([{"comment_content": "nice"}])
        );
        assert_eq!(normalized[0]["author_data"], json!({"fans": 10}));
    }

    #[test]
    fn test_invalid_encoded_field_is_an_input_error() {
        let records = vec![record(json!({"comments_data": "{not json"}))];
        let err = normalize_records(&records).unwrap_err();
        assert!(matches!(err, InsightsError::BadEncodedField { field, .. } if field == "comments_data"));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let records = vec![
            record(json!({
                "title": "a",
                "comments_data": "[{\"comment_content\": \"x\"}]",
                "likes": 2
            })),
            record(json!({"detail_desc": "b", "author_data": ""})),
        ];
        let once = normalize_records(&records).unwrap();
        let twice = normalize_records(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_order_preserved_across_worker_chunks() {
        let records: Vec<_> = (0..50)
            .map(|i| record(json!({"title": format!("t{}", i)})))
            .collect();
        let normalized = normalize_records(&records).unwrap();
        for (i, item) in normalized.iter().enumerate() {
            assert_eq!(item["title"], json!(format!("t{}", i)));
        }
    }
}
