//! Error types for delve-rs.
//!
//! Each layer owns a focused error enum. Inference and search failures are
//! raised by the backend adapters; [`ResearchError`] is what a research run
//! surfaces to its consumer, either as a recorded notice or as the terminal
//! item of the report stream.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for delve-rs operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be resolved.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Inference backend failure.
    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),

    /// Search backend failure.
    #[error("search error: {0}")]
    Search(#[from] SearchError),

    /// Research session failure.
    #[error("research error: {0}")]
    Research(#[from] ResearchError),

    /// Report persistence failure.
    #[error("report error: {0}")]
    Report(#[from] ReportError),

    /// CLI command failure.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A backend credential was not provided.
    #[error("{backend} API key not configured (set {vars})")]
    MissingApiKey {
        /// Backend needing the key.
        backend: &'static str,
        /// Environment variables checked.
        vars: &'static str,
    },

    /// The configured inference provider is not supported.
    #[error("unsupported inference provider: {name}")]
    UnsupportedProvider {
        /// Provider name.
        name: String,
    },

    /// A setting has a value outside its accepted range.
    #[error("invalid value for {key}: {message}")]
    InvalidValue {
        /// Setting name.
        key: &'static str,
        /// Why the value was rejected.
        message: String,
    },

    /// A profile file could not be read or parsed.
    #[error("failed to load profile {path}: {message}")]
    ProfileLoad {
        /// Offending file.
        path: PathBuf,
        /// Underlying cause.
        message: String,
    },

    /// Writing default profiles failed.
    #[error("failed to write profile {path}: {source}")]
    ProfileWrite {
        /// Target file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Inference backend errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    /// The backend could not be reached or rejected the request.
    #[error("inference backend unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
        /// HTTP status code, if known.
        status: Option<u16>,
    },

    /// The backend answered but the output could not be used.
    #[error("malformed model output: {message}")]
    Malformed {
        /// What was wrong with the output.
        message: String,
    },

    /// A streaming response ended without its end-of-stream marker.
    #[error("inference stream interrupted: {message}")]
    StreamInterrupted {
        /// Error message.
        message: String,
    },

    /// The call exceeded its deadline.
    #[error("inference call timed out after {secs}s")]
    Timeout {
        /// Deadline in seconds.
        secs: u64,
    },
}

/// Search backend errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// The backend could not be reached or returned an error.
    #[error("search backend unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
        /// HTTP status code, if known.
        status: Option<u16>,
    },

    /// The call exceeded its deadline.
    #[error("search call timed out after {secs}s")]
    Timeout {
        /// Deadline in seconds.
        secs: u64,
    },
}

/// Errors and notices surfaced by a research run.
///
/// Only [`ResearchError::SessionFailed`] and
/// [`ResearchError::SynthesisInterrupted`] end a run; the other variants are
/// recorded on the session and the run carries on in a degraded mode.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResearchError {
    /// The planner failed; the run searches with the original query.
    #[error("planning degraded, searching with the original query: {reason}")]
    PlanningDegraded {
        /// Why planning failed.
        reason: String,
    },

    /// A sub-query produced no evidence.
    #[error("search skipped for '{subquery}': {reason}")]
    SearchSkipped {
        /// The sub-query text.
        subquery: String,
        /// Why no evidence was gathered.
        reason: String,
    },

    /// Reflection failed; the run proceeds straight to synthesis.
    #[error("reflection stopped the loop: {reason}")]
    ReflectionForcedStop {
        /// Why reflection failed.
        reason: String,
    },

    /// The report stream broke after some chunks were delivered.
    #[error("synthesis interrupted after {chunks_emitted} chunk(s): {reason}")]
    SynthesisInterrupted {
        /// Chunks delivered before the break.
        chunks_emitted: usize,
        /// Why the stream broke.
        reason: String,
    },

    /// The run could not produce a report.
    #[error("research session failed: {reason}")]
    SessionFailed {
        /// Why the run failed.
        reason: String,
    },
}

impl ResearchError {
    /// Stable machine-readable name of the variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PlanningDegraded { .. } => "planning_degraded",
            Self::SearchSkipped { .. } => "search_skipped",
            Self::ReflectionForcedStop { .. } => "reflection_forced_stop",
            Self::SynthesisInterrupted { .. } => "synthesis_interrupted",
            Self::SessionFailed { .. } => "session_failed",
        }
    }

    /// Whether this error ends the run.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::SynthesisInterrupted { .. } | Self::SessionFailed { .. }
        )
    }

    pub(crate) fn session_failed(reason: impl Into<String>) -> Self {
        Self::SessionFailed {
            reason: reason.into(),
        }
    }
}

/// Report persistence errors.
#[derive(Error, Debug)]
pub enum ReportError {
    /// The report names a profile that does not exist.
    #[error("unknown profile: {id}")]
    UnknownProfile {
        /// Requested profile id.
        id: String,
    },

    /// The report has no content.
    #[error("report content is empty")]
    EmptyContent,

    /// Writing the report file failed.
    #[error("failed to write report {path}: {source}")]
    Write {
        /// Target file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// CLI command errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command failed to run.
    #[error("command failed: {0}")]
    ExecutionFailed(String),

    /// Output could not be rendered.
    #[error("output error: {0}")]
    Output(String),
}
