use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A capability definition offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the accepted argument object.
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        ToolSpec {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// The `{"type": "function", "function": {...}}` wrapper the
    /// chat-completions API expects.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// A single tool invocation requested by the model. Arguments are kept as
/// the raw JSON string the upstream returned; parsing happens at dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: String,
}

/// Outcome of a tool-decision call: the model either answered in text or
/// asked for tool invocations. The two branches are exclusive by
/// construction; when the upstream populates both, tool_calls wins.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Text(String),
    ToolCalls(Vec<ToolCallRequest>),
}

impl Decision {
    /// Build a decision from a chat-completions assistant message value.
    pub fn from_assistant_message(message: &Value) -> Self {
        if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
            let requests: Vec<ToolCallRequest> = calls
                .iter()
                .filter_map(|call| {
                    let function = call.get("function")?;
                    Some(ToolCallRequest {
                        name: function.get("name")?.as_str()?.to_string(),
                        arguments: function
                            .get("arguments")
                            .and_then(Value::as_str)
                            .unwrap_or("{}")
                            .to_string(),
                    })
                })
                .collect();
            if !requests.is_empty() {
                return Decision::ToolCalls(requests);
            }
        }

        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Decision::Text(content.to_string())
    }

    pub fn tool_calls(&self) -> Option<&[ToolCallRequest]> {
        match self {
            Decision::ToolCalls(calls) => Some(calls),
            Decision::Text(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decision_text() {
        let message = json!({"role": "assistant", "content": "plain answer"});
        let decision = Decision::from_assistant_message(&message);
        assert_eq!(decision, Decision::Text("plain answer".to_string()));
    }

    #[test]
    fn test_decision_tool_calls_take_precedence_over_text() {
        let message = json!({
            "role": "assistant",
            "content": "I will call a tool",
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "query_rewrite", "arguments": "{\"query\": \"x\"}"}
            }]
        });
        let decision = Decision::from_assistant_message(&message);
        match decision {
            Decision::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "query_rewrite");
                assert_eq!(calls[0].arguments, "{\"query\": \"x\"}");
            }
            Decision::Text(_) => panic!("tool_calls must take precedence"),
        }
    }

    #[test]
    fn test_decision_empty_tool_calls_falls_back_to_text() {
        let message = json!({
            "role": "assistant",
            "content": "nothing to call",
            "tool_calls": []
        });
        let decision = Decision::from_assistant_message(&message);
        assert_eq!(decision, Decision::Text("nothing to call".to_string()));
    }

    #[test]
    fn test_tool_spec_wire_format() {
        let spec = ToolSpec::new("echo", "Echoes input", json!({"type": "object"}));
        let wire = spec.to_wire();
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "echo");
    }
}
