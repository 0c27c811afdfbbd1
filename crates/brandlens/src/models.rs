//! The objects passed between the gateway, the agents and the wire.
//!
//! There are three related formats in play:
//! - chat messages and tool specs, sent from the agents to the LLM service
//! - the tool-decision response, coming back from the LLM service
//! - tagged envelopes, sent from the agents to the streaming endpoint
//!
//! Upstream responses are converted into these internal structs immediately
//! at the gateway boundary; nothing downstream touches raw provider JSON.
pub mod envelope;
pub mod message;
pub mod tool;
