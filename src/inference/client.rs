//! Provider factory and the deadline-enforcing inference client.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::agent::{Agent, AgentResponse};
use super::provider::{DeltaStream, LlmProvider};
use super::providers::OpenAiProvider;
use crate::config::ResearchConfig;
use crate::error::{ConfigError, InferenceError};

/// Creates an [`LlmProvider`] based on the configured provider name.
///
/// # Supported Providers
///
/// - `"openai"` (default): any OpenAI-compatible API via `async-openai`
///
/// # Errors
///
/// Returns [`ConfigError::UnsupportedProvider`] for unknown provider names
/// and [`ConfigError::MissingApiKey`] when no key is configured.
pub fn create_provider(config: &ResearchConfig) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        other => Err(ConfigError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}

/// Runs agent calls against a provider with a deadline on every call.
#[derive(Clone)]
pub struct InferenceClient {
    provider: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl InferenceClient {
    /// Wraps a provider. `timeout` bounds each completion and the opening
    /// of each stream.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Name of the underlying provider.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Runs a single non-streaming call.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Timeout`] when the deadline passes,
    /// [`InferenceError::Malformed`] for an empty answer, or the provider's
    /// own error.
    pub async fn complete(
        &self,
        agent: &dyn Agent,
        user_msg: &str,
    ) -> Result<AgentResponse, InferenceError> {
        let request = agent.request(user_msg, false);
        debug!(
            agent = agent.name(),
            model = agent.model(),
            prompt_chars = user_msg.chars().count(),
            "inference call"
        );

        let response = tokio::time::timeout(self.timeout, self.provider.chat(&request))
            .await
            .map_err(|_| InferenceError::Timeout {
                secs: self.timeout.as_secs(),
            })??;

        if response.content.trim().is_empty() {
            return Err(InferenceError::Malformed {
                message: "empty response".to_string(),
            });
        }

        Ok(AgentResponse {
            content: response.content,
            usage: response.usage,
            finish_reason: response.finish_reason,
        })
    }

    /// Opens a streaming call.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Timeout`] if the stream does not open in
    /// time, or the provider's own error.
    pub async fn stream(
        &self,
        agent: &dyn Agent,
        user_msg: &str,
    ) -> Result<DeltaStream, InferenceError> {
        let request = agent.request(user_msg, true);
        debug!(
            agent = agent.name(),
            model = agent.model(),
            prompt_chars = user_msg.chars().count(),
            "inference stream"
        );

        tokio::time::timeout(self.timeout, self.provider.chat_stream(&request))
            .await
            .map_err(|_| InferenceError::Timeout {
                secs: self.timeout.as_secs(),
            })?
    }
}

impl std::fmt::Debug for InferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceClient")
            .field("provider", &self.provider.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
