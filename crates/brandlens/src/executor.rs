//! By-name dispatch of capabilities against a fixed registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::ToolError;
use crate::models::envelope::Envelope;
use crate::models::tool::ToolSpec;

/// Renaming table bridging generic caller argument names to target
/// signatures. A rename only fires when the original name is not itself
/// accepted by the target.
const ARG_ALIASES: &[(&str, &str)] = &[("result_data", "data")];

/// A named operation invokable with a JSON argument object.
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    /// The definition offered to the model.
    fn spec(&self) -> ToolSpec;

    /// Argument names the capability accepts, used by the renaming bridge.
    fn accepted_args(&self) -> &[&str];

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError>;
}

/// Name-to-capability map built once at startup. Registration order is
/// preserved in the listings offered to the model; duplicate names are
/// rejected at construction.
pub struct ToolRegistry {
    capabilities: Vec<Arc<dyn Capability>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new(capabilities: Vec<Arc<dyn Capability>>) -> Result<Self, ToolError> {
        let mut index = HashMap::new();
        for (i, capability) in capabilities.iter().enumerate() {
            let name = capability.name().to_string();
            if index.insert(name.clone(), i).is_some() {
                return Err(ToolError::DuplicateName(name));
            }
        }
        Ok(ToolRegistry {
            capabilities,
            index,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.index.get(name).map(|&i| &self.capabilities[i])
    }

    /// Capability names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.capabilities
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Specs for every registered capability, in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.capabilities.iter().map(|c| c.spec()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Execute a capability by name.
    ///
    /// An unknown name is reported as a structured error envelope, not an
    /// `Err`. Unparseable arguments and execution failures propagate to the
    /// caller, which decides how to surface them.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments_json: &str,
    ) -> Result<Envelope, ToolError> {
        let Some(capability) = self.get(name) else {
            tracing::warn!(capability = name, "dispatch target not found");
            return Ok(Envelope::error(format!(
                "capability '{}' not found",
                name
            )));
        };

        let mut args = parse_arguments(arguments_json)?;
        apply_arg_aliases(&mut args, capability.accepted_args(), name);

        tracing::debug!(capability = name, "executing capability");
        let result = capability.call(args).await?;
        Ok(Envelope::crawl_task(result))
    }
}

fn parse_arguments(arguments_json: &str) -> Result<Map<String, Value>, ToolError> {
    if arguments_json.trim().is_empty() {
        return Ok(Map::new());
    }
    let value: Value = serde_json::from_str(arguments_json)
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ToolError::InvalidArguments(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

fn apply_arg_aliases(args: &mut Map<String, Value>, accepted: &[&str], capability: &str) {
    for (original, replacement) in ARG_ALIASES {
        if args.contains_key(*original)
            && !accepted.contains(original)
            && accepted.contains(replacement)
        {
            if let Some(value) = args.remove(*original) {
                args.insert(replacement.to_string(), value);
                tracing::debug!(
                    capability,
                    from = original,
                    to = replacement,
                    "renamed argument for dispatch"
                );
            }
        }
    }
}
