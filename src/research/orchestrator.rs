//! Research orchestrator.
//!
//! Drives one session through plan, search, reflect and synthesize on a
//! dedicated task and hands the caller a [`ResearchRun`]: a stream of
//! report chunks plus a watch channel of session snapshots.
//!
//! ```text
//! Planning ─► Searching ─► Reflecting ─┬─► Searching (next iteration)
//!                 ▲                    │
//!                 └── budget left ─────┘
//!                                      └─► Synthesizing ─► Done | Failed
//! ```
//!
//! A run ends with exactly one of: the stream closing after `Done`, or a
//! single terminal [`ResearchError`] item.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::aggregator::{SearchAggregator, ingest};
use super::evidence::EvidenceStore;
use super::planner::QueryPlanner;
use super::reflection::{ReflectionController, Verdict};
use super::session::{ResearchSession, SessionSnapshot, SessionStatus};
use super::synthesis::{ReportChunk, SynthesisStreamer};
use crate::config::{MaxIterations, ResearchConfig};
use crate::error::{ConfigError, ResearchError};
use crate::inference::{InferenceClient, LlmProvider, create_provider};
use crate::profile::{IndustryProfile, ProfileRegistry};
use crate::search::{SearchClient, create_search_client};

/// Report chunks buffered ahead of a slow consumer.
const EVENT_BUFFER: usize = 64;

/// Item of a run's event stream.
pub type RunEvent = Result<ReportChunk, ResearchError>;

/// Entry point for research runs.
#[derive(Clone)]
pub struct Orchestrator {
    inference: InferenceClient,
    aggregator: SearchAggregator,
    config: Arc<ResearchConfig>,
    profiles: Arc<ProfileRegistry>,
}

impl Orchestrator {
    /// Builds an orchestrator over explicit backends.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        search: Arc<dyn SearchClient>,
        config: ResearchConfig,
        profiles: ProfileRegistry,
    ) -> Self {
        Self {
            inference: InferenceClient::new(provider, config.inference_timeout),
            aggregator: SearchAggregator::new(search, &config),
            config: Arc::new(config),
            profiles: Arc::new(profiles),
        }
    }

    /// Builds an orchestrator with the configured inference and search
    /// backends.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a backend cannot be created, most
    /// commonly because an API key is missing.
    pub fn from_config(config: ResearchConfig, profiles: ProfileRegistry) -> Result<Self, ConfigError> {
        let provider = create_provider(&config)?;
        let search = create_search_client(&config)?;
        Ok(Self::new(provider, search, config, profiles))
    }

    /// Loaded profiles.
    #[must_use]
    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Starts a research run on the current tokio runtime.
    ///
    /// `max_iterations` is clamped to the supported range. A blank query or
    /// unknown profile yields a run that has already failed; no backend is
    /// called.
    pub fn run(&self, query: &str, profile_id: &str, max_iterations: u32) -> ResearchRun {
        let max_iterations = MaxIterations::clamped(max_iterations);
        let query = query.trim();

        if query.is_empty() {
            return ResearchRun::rejected(
                profile_id,
                max_iterations,
                ResearchError::session_failed("query is empty"),
            );
        }
        let Some(profile) = self.profiles.get(profile_id) else {
            return ResearchRun::rejected(
                profile_id,
                max_iterations,
                ResearchError::session_failed(format!("unknown profile: {profile_id}")),
            );
        };

        let session = ResearchSession::new(query, Arc::clone(&profile), max_iterations);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot(&[]));
        let cancel = CancellationToken::new();

        let driver = Driver {
            inference: self.inference.clone(),
            aggregator: self.aggregator.clone(),
            config: Arc::clone(&self.config),
            profile,
            session,
            store: EvidenceStore::new(),
            events: events_tx,
            snapshot: snapshot_tx,
            cancel: cancel.clone(),
        };
        let span = info_span!(
            "research",
            run = %uuid::Uuid::new_v4().simple(),
            profile = profile_id,
            max_iterations = max_iterations.get()
        );
        tokio::spawn(driver.drive().instrument(span));

        ResearchRun {
            events: events_rx,
            snapshot: snapshot_rx,
            cancel,
        }
    }

    /// Runs a session to completion and collects the report.
    pub async fn research(&self, query: &str, profile_id: &str, max_iterations: u32) -> RunOutcome {
        self.run(query, profile_id, max_iterations)
            .collect_report()
            .await
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("inference", &self.inference)
            .field("aggregator", &self.aggregator)
            .field("profiles", &self.profiles.len())
            .finish_non_exhaustive()
    }
}

/// Handle to a running session.
///
/// Dropping the handle cancels the run.
#[derive(Debug)]
pub struct ResearchRun {
    events: mpsc::Receiver<RunEvent>,
    snapshot: watch::Receiver<SessionSnapshot>,
    cancel: CancellationToken,
}

impl ResearchRun {
    fn rejected(profile_id: &str, max_iterations: MaxIterations, error: ResearchError) -> Self {
        warn!(error = %error, "research request rejected");
        let (events_tx, events_rx) = mpsc::channel(1);
        // Capacity 1 and a fresh channel: this send cannot fail.
        let _ = events_tx.try_send(Err(error.clone()));
        let (_, snapshot_rx) =
            watch::channel(SessionSnapshot::rejected(profile_id, max_iterations, error));
        Self {
            events: events_rx,
            snapshot: snapshot_rx,
            cancel: CancellationToken::new(),
        }
    }

    /// Next report chunk, the terminal error, or `None` when the run is over.
    pub async fn next(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Current phase.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.snapshot.borrow().status
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that observes every snapshot change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Requests cancellation. The run stops at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this run when triggered.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drains the run, concatenating the report text.
    pub async fn collect_report(mut self) -> RunOutcome {
        let mut report = String::new();
        let mut chunks = Vec::new();
        let mut error = None;

        while let Some(event) = self.next().await {
            match event {
                Ok(chunk) => {
                    report.push_str(&chunk.text);
                    chunks.push(chunk);
                }
                Err(e) => error = Some(e),
            }
        }

        RunOutcome {
            report,
            chunks,
            error,
            snapshot: self.snapshot(),
        }
    }
}

impl Stream for ResearchRun {
    type Item = RunEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for ResearchRun {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Concatenated report text.
    pub report: String,
    /// Every chunk in order.
    pub chunks: Vec<ReportChunk>,
    /// The terminal error, if the run did not complete.
    pub error: Option<ResearchError>,
    /// Final snapshot.
    pub snapshot: SessionSnapshot,
}

impl RunOutcome {
    /// Whether the report stream ended normally.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.snapshot.status == SessionStatus::Done
    }

    /// Distinct citation ids used anywhere in the report, ascending.
    #[must_use]
    pub fn citations(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .chunks
            .iter()
            .flat_map(|c| c.citations.iter().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Why the driver stopped before `Done`.
enum Halt {
    Failed(ResearchError),
    Cancelled,
}

/// Owns one session for its whole lifetime.
struct Driver {
    inference: InferenceClient,
    aggregator: SearchAggregator,
    config: Arc<ResearchConfig>,
    profile: Arc<IndustryProfile>,
    session: ResearchSession,
    store: EvidenceStore,
    events: mpsc::Sender<RunEvent>,
    snapshot: watch::Sender<SessionSnapshot>,
    cancel: CancellationToken,
}

impl Driver {
    async fn drive(mut self) {
        info!(query = self.session.query(), "research started");
        match self.execute().await {
            Ok(()) => {
                self.transition(SessionStatus::Done);
                info!(
                    iterations = self.session.iteration(),
                    evidence = self.store.len(),
                    "research complete"
                );
            }
            Err(Halt::Failed(error)) => {
                warn!(error = %error, "research failed");
                self.session.record_notice(error.clone());
                self.transition(SessionStatus::Failed);
                let _ = self.events.send(Err(error)).await;
            }
            Err(Halt::Cancelled) => {
                info!("research cancelled");
                let error = ResearchError::session_failed("cancelled");
                self.session.record_notice(error.clone());
                self.transition(SessionStatus::Failed);
                let _ = self.events.try_send(Err(error));
            }
        }
    }

    async fn execute(&mut self) -> Result<(), Halt> {
        let query = self.session.query().to_string();

        let planner = QueryPlanner::new(&self.config, Arc::clone(&self.profile));
        let plan = self.guard(planner.plan(&self.inference, &query)).await?;
        if let Some(notice) = plan.degraded {
            self.session.record_notice(notice);
        }
        let mut next = plan.subqueries;

        let reflector = ReflectionController::new(&self.config, Arc::clone(&self.profile));
        while self.session.begin_iteration() {
            let iteration = self.session.iteration();
            self.transition(SessionStatus::Searching);
            debug!(iteration, subqueries = next.len(), "searching");

            let results = self.aggregator.search(&next, &self.cancel).await;
            self.checkpoint()?;
            self.session.mark_searched(&next);
            let report = ingest(&mut self.store, results, iteration);
            for notice in report.skipped {
                self.session.record_notice(notice);
            }
            self.publish();

            if !self.session.budget_remaining() {
                info!(iteration, "iteration budget spent");
                break;
            }

            self.transition(SessionStatus::Reflecting);
            let decision = self
                .guard(reflector.reflect(
                    &self.inference,
                    &query,
                    &self.store,
                    iteration + 1,
                    self.session.searched(),
                ))
                .await?;
            match decision {
                Ok(d) if d.verdict == Verdict::Sufficient => break,
                Ok(d) => next = d.next_subqueries,
                Err(notice) => {
                    self.session.record_notice(notice);
                    break;
                }
            }
        }

        if self.store.is_empty() {
            return Err(Halt::Failed(ResearchError::session_failed(
                "no evidence was gathered",
            )));
        }

        self.transition(SessionStatus::Synthesizing);
        let streamer = SynthesisStreamer::new(&self.config, Arc::clone(&self.profile));
        let mut stream = self
            .guard(streamer.open(&self.inference, &query, &self.store))
            .await?
            .map_err(|e| {
                Halt::Failed(ResearchError::session_failed(format!(
                    "report stream could not be opened: {e}"
                )))
            })?;

        loop {
            match self.guard(stream.next_chunk()).await? {
                None => return Ok(()),
                Some(Ok(chunk)) => {
                    let sent = self.guard(self.events.send(Ok(chunk))).await?;
                    if sent.is_err() {
                        return Err(Halt::Cancelled);
                    }
                }
                Some(Err(ResearchError::SynthesisInterrupted {
                    chunks_emitted: 0,
                    reason,
                })) => {
                    return Err(Halt::Failed(ResearchError::session_failed(format!(
                        "report stream failed before any content: {reason}"
                    ))));
                }
                Some(Err(e)) => return Err(Halt::Failed(e)),
            }
        }
    }

    /// Races `fut` against cancellation.
    async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Halt> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Halt::Cancelled),
            out = fut => Ok(out),
        }
    }

    fn checkpoint(&self) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            Err(Halt::Cancelled)
        } else {
            Ok(())
        }
    }

    fn transition(&mut self, status: SessionStatus) {
        self.session.set_status(status);
        self.publish();
    }

    fn publish(&self) {
        self.snapshot
            .send_replace(self.session.snapshot(self.store.all()));
    }
}
