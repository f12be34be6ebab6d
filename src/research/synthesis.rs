//! Streaming report synthesis.
//!
//! The synthesis call sees the whole evidence list under stable citation
//! ids and streams the report back. [`ReportStream`] turns provider deltas
//! into [`ReportChunk`]s and enforces an idle deadline between deltas.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use futures_util::StreamExt;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::analyzer::analysis_section;
use super::evidence::EvidenceStore;
use super::prompt::build_synthesis_prompt;
use crate::config::ResearchConfig;
use crate::error::{InferenceError, ResearchError};
use crate::inference::{Agent, DeltaStream, InferenceClient, StreamDelta};
use crate::profile::IndustryProfile;

#[allow(clippy::expect_used)]
static CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\d+(?:\s*[,，、]\s*\d+)*)\]").expect("citation pattern is valid")
});

/// One piece of the streamed report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportChunk {
    /// Position in the stream, starting at 0.
    pub sequence: usize,
    /// Report text.
    pub text: String,
    /// Known citation ids referenced in `text`, ascending.
    pub citations: Vec<u32>,
}

/// Citation ids in `1..=max_id` referenced by `[n]` or `[n, m]` markers.
#[must_use]
pub fn extract_citations(text: &str, max_id: u32) -> Vec<u32> {
    let mut ids: Vec<u32> = CITATION
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .flat_map(|m| {
            m.as_str()
                .split([',', '，', '、'])
                .filter_map(|n| n.trim().parse::<u32>().ok())
                .collect::<Vec<_>>()
        })
        .filter(|id| (1..=max_id).contains(id))
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Agent that writes the report.
pub struct SynthesisStreamer {
    model: String,
    max_tokens: u32,
    temperature: f32,
    budget_chars: usize,
    idle_timeout: Duration,
    profile: Arc<IndustryProfile>,
}

impl SynthesisStreamer {
    /// Creates a streamer for one profile.
    #[must_use]
    pub fn new(config: &ResearchConfig, profile: Arc<IndustryProfile>) -> Self {
        Self {
            model: config.synthesis_model.clone(),
            max_tokens: config.synthesis_max_tokens,
            temperature: config.synthesis_temperature,
            budget_chars: config.synthesis_budget_chars,
            idle_timeout: config.stream_idle_timeout,
            profile,
        }
    }

    /// Builds the report prompt from every evidence item.
    #[must_use]
    pub fn prompt(&self, query: &str, store: &EvidenceStore) -> String {
        let evidence = store.render_for_prompt(self.budget_chars);
        let analysis = analysis_section(store.all(), &self.profile.keywords);
        build_synthesis_prompt(&self.profile, query, &evidence, &analysis)
    }

    /// Opens the report stream.
    ///
    /// # Errors
    ///
    /// Returns the inference error when the stream cannot be opened.
    pub async fn open(
        &self,
        client: &InferenceClient,
        query: &str,
        store: &EvidenceStore,
    ) -> Result<ReportStream, InferenceError> {
        let prompt = self.prompt(query, store);
        let inner = client.stream(self, &prompt).await?;
        info!(evidence = store.len(), "report stream opened");
        Ok(ReportStream {
            inner,
            idle: self.idle_timeout,
            emitted: 0,
            finished: false,
            max_id: store.max_citation_id(),
        })
    }
}

impl Agent for SynthesisStreamer {
    fn name(&self) -> &'static str {
        "synthesis"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.profile.synthesizer_prompt
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// Report chunks read from an open synthesis stream.
pub struct ReportStream {
    inner: DeltaStream,
    idle: Duration,
    emitted: usize,
    finished: bool,
    max_id: u32,
}

impl ReportStream {
    /// Chunks delivered so far.
    #[must_use]
    pub const fn emitted(&self) -> usize {
        self.emitted
    }

    /// Next chunk.
    ///
    /// Returns `None` once the provider signals completion. A stream that
    /// errors, stalls past the idle deadline, or ends without a completion
    /// signal yields one [`ResearchError::SynthesisInterrupted`] and then
    /// `None`.
    pub async fn next_chunk(&mut self) -> Option<Result<ReportChunk, ResearchError>> {
        while !self.finished {
            let next = tokio::time::timeout(self.idle, self.inner.next()).await;
            let reason = match next {
                Ok(Some(Ok(StreamDelta::Text(text)))) => {
                    if text.is_empty() {
                        continue;
                    }
                    let chunk = ReportChunk {
                        sequence: self.emitted,
                        citations: extract_citations(&text, self.max_id),
                        text,
                    };
                    self.emitted += 1;
                    return Some(Ok(chunk));
                }
                Ok(Some(Ok(StreamDelta::Done { finish_reason }))) => {
                    self.finished = true;
                    debug!(chunks = self.emitted, finish_reason = ?finish_reason, "report stream complete");
                    if finish_reason.as_deref() == Some("length") {
                        warn!("report truncated by the token limit");
                    }
                    return None;
                }
                Ok(Some(Err(e))) => e.to_string(),
                Ok(None) => "stream ended without a completion signal".to_string(),
                Err(_) => format!("no data for {}s", self.idle.as_secs()),
            };
            self.finished = true;
            warn!(chunks = self.emitted, reason = %reason, "report stream interrupted");
            return Some(Err(ResearchError::SynthesisInterrupted {
                chunks_emitted: self.emitted,
                reason,
            }));
        }
        None
    }
}

impl std::fmt::Debug for ReportStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportStream")
            .field("emitted", &self.emitted)
            .field("finished", &self.finished)
            .field("max_id", &self.max_id)
            .finish_non_exhaustive()
    }
}
