//! # delve-rs
//!
//! Iterative deep research: decompose a question into focused sub-queries,
//! search the web for each, let a reflection step decide whether the
//! evidence suffices, and stream a report that cites its sources as `[n]`.
//!
//! ## Overview
//!
//! A [`research::Orchestrator`] owns the inference and search backends and
//! starts one [`research::ResearchRun`] per question. The run yields
//! [`research::ReportChunk`]s as the report is written and publishes
//! [`research::SessionSnapshot`]s describing its progress.
//!
//! ```text
//! question ─► QueryPlanner ─► SearchAggregator ─► EvidenceStore
//!                 ▲                                   │
//!                 └──── ReflectionController ◄────────┘
//!                              │ sufficient / budget spent
//!                              ▼
//!                     SynthesisStreamer ─► ReportChunk stream
//! ```
//!
//! ## Modules
//!
//! - [`config`]: engine configuration (builder, environment, defaults)
//! - [`profile`]: industry profiles (prompts, templates, keywords)
//! - [`inference`]: LLM provider abstraction and the OpenAI-compatible client
//! - [`search`]: web search abstraction and the Bocha client
//! - [`research`]: the research loop
//! - [`report`]: report persistence
//! - [`cli`]: command-line interface
//! - [`error`]: error types

pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
#[cfg(feature = "mcp")]
pub mod mcp;
pub mod profile;
pub mod report;
pub mod research;
pub mod search;
#[cfg(feature = "server")]
pub mod server;
pub mod telemetry;

pub use config::{MaxIterations, ResearchConfig};
pub use error::{Error, ResearchError, Result};
pub use profile::{IndustryProfile, ProfileRegistry};
pub use report::{FileReportStore, ReportSink};
pub use research::{
    Orchestrator, ReportChunk, ResearchRun, RunOutcome, SessionSnapshot, SessionStatus,
};
