//! The iterative research loop.
//!
//! [`Orchestrator::run`] plans sub-queries, searches them concurrently,
//! deduplicates the hits into an [`EvidenceStore`], lets the reflection
//! controller decide whether to search again, and finally streams a report
//! whose `[n]` markers refer to evidence citation ids.

pub mod aggregator;
pub mod analyzer;
pub mod evidence;
pub mod orchestrator;
mod parse;
pub mod planner;
pub mod prompt;
pub mod reflection;
pub mod session;
pub mod synthesis;

pub use aggregator::{IngestReport, SearchAggregator, SubQueryResult};
pub use analyzer::DataScan;
pub use evidence::{EvidenceItem, EvidenceRecord, EvidenceStore, Ingest};
pub use orchestrator::{Orchestrator, ResearchRun, RunEvent, RunOutcome};
pub use planner::{Plan, QueryPlanner};
pub use reflection::{ReflectionController, ReflectionDecision, Verdict};
pub use session::{ResearchSession, SessionSnapshot, SessionStatus, SubQuery, SubQueryOrigin};
pub use synthesis::{ReportChunk, ReportStream, SynthesisStreamer};
