//! Agent trait definition.
//!
//! The planner, reflection controller and synthesis streamer each
//! implement this trait, which gives [`InferenceClient`] a uniform way to
//! turn a role plus a user message into a [`ChatRequest`].
//!
//! [`InferenceClient`]: super::client::InferenceClient

use super::message::{ChatRequest, TokenUsage, system_message, user_message};

/// Response from a non-streaming agent call.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// The agent's text output.
    pub content: String,
    /// Token usage for this call.
    pub usage: TokenUsage,
    /// Why the model stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
}

/// A model role with a fixed system prompt and sampling settings.
pub trait Agent: Send + Sync {
    /// Agent name for logging.
    fn name(&self) -> &'static str;

    /// Model identifier to use for this agent.
    fn model(&self) -> &str;

    /// System prompt that defines the agent's role.
    fn system_prompt(&self) -> &str;

    /// Whether to request JSON-formatted output.
    fn json_mode(&self) -> bool {
        false
    }

    /// Sampling temperature.
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response.
    fn max_tokens(&self) -> u32 {
        2048
    }

    /// Builds the request for one call.
    fn request(&self, user_msg: &str, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model().to_string(),
            messages: vec![system_message(self.system_prompt()), user_message(user_msg)],
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            json_mode: self.json_mode(),
            stream,
        }
    }
}
