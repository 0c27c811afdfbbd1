use std::sync::Arc;

use brandlens::gateway::LlmClient;

use crate::configuration::Settings;

/// Shared application state. Agents are constructed per request; only the
/// gateway and the immutable settings are shared.
#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<dyn LlmClient>,
    pub settings: Arc<Settings>,
}
