//! Inference backend abstraction.
//!
//! Research components describe a model call through the [`Agent`] trait;
//! [`InferenceClient`] runs it against a pluggable [`LlmProvider`] with a
//! deadline on every call. The only shipped provider speaks the
//! OpenAI-compatible chat completion API.
//!
//! ```text
//! QueryPlanner / ReflectionController / SynthesisStreamer (Agent)
//!   └── InferenceClient (timeouts)
//!         └── dyn LlmProvider
//!               └── OpenAiProvider (async-openai)
//! ```

pub mod agent;
pub mod client;
pub mod message;
pub mod provider;
pub mod providers;

pub use agent::{Agent, AgentResponse};
pub use client::{InferenceClient, create_provider};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, StreamDelta, TokenUsage};
pub use provider::{DeltaStream, LlmProvider};
