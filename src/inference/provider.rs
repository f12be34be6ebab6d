//! Pluggable LLM provider trait.
//!
//! Implementations translate provider-agnostic [`ChatRequest`]/[`ChatResponse`]
//! into provider-specific SDK calls, so research logic never touches a
//! vendor SDK directly.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use super::message::{ChatRequest, ChatResponse, StreamDelta};
use crate::error::InferenceError;

/// A stream of completion fragments.
///
/// A well-formed stream ends with [`StreamDelta::Done`]. A stream that
/// ends without it was cut off.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, InferenceError>> + Send>>;

/// Trait for LLM provider backends.
///
/// Implementations handle the transport layer for a specific provider
/// while presenting a uniform interface to the research components.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Unavailable`] when the backend cannot be
    /// reached or rejects the request.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, InferenceError>;

    /// Executes a streaming chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Unavailable`] if the stream cannot be
    /// opened. Failures after opening arrive as stream items.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<DeltaStream, InferenceError>;
}
