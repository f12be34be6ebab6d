//! Research session state.
//!
//! A [`ResearchSession`] is owned by exactly one driver task. Consumers see
//! it only through [`SessionSnapshot`]s published on a watch channel.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::evidence::EvidenceItem;
use crate::config::MaxIterations;
use crate::error::ResearchError;
use crate::profile::IndustryProfile;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Decomposing the query.
    Planning,
    /// Running searches for the current iteration.
    Searching,
    /// Judging whether the evidence suffices.
    Reflecting,
    /// Streaming the report.
    Synthesizing,
    /// The report stream ended normally.
    Done,
    /// The run ended without a complete report.
    Failed,
}

impl SessionStatus {
    /// Whether no further transitions can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planning => "planning",
            Self::Searching => "searching",
            Self::Reflecting => "reflecting",
            Self::Synthesizing => "synthesizing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Who proposed a sub-query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubQueryOrigin {
    /// The initial decomposition (or its fallback).
    Planner,
    /// A follow-up proposed by reflection.
    Reflection,
}

/// A focused search query derived from the user's question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubQuery {
    text: String,
    origin: SubQueryOrigin,
    iteration: u32,
}

impl SubQuery {
    /// A sub-query from the planner, searched in iteration 1.
    #[must_use]
    pub fn planned(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: SubQueryOrigin::Planner,
            iteration: 1,
        }
    }

    /// A follow-up sub-query to be searched in `iteration`.
    #[must_use]
    pub fn follow_up(text: impl Into<String>, iteration: u32) -> Self {
        Self {
            text: text.into(),
            origin: SubQueryOrigin::Reflection,
            iteration,
        }
    }

    /// The query text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Who proposed it.
    #[must_use]
    pub const fn origin(&self) -> SubQueryOrigin {
        self.origin
    }

    /// Iteration in which it is searched.
    #[must_use]
    pub const fn iteration(&self) -> u32 {
        self.iteration
    }
}

/// Key used to recognise a sub-query that was already searched.
pub(crate) fn history_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Current phase.
    pub status: SessionStatus,
    /// Profile in use.
    pub profile: String,
    /// Iterations started so far.
    pub iteration: u32,
    /// Iteration budget.
    pub max_iterations: MaxIterations,
    /// Sub-queries dispatched so far.
    pub subqueries_issued: usize,
    /// Every piece of evidence in citation order.
    pub evidence: Vec<EvidenceItem>,
    /// Degradations recorded along the way, plus the terminal error if any.
    pub notices: Vec<ResearchError>,
}

impl SessionSnapshot {
    /// Snapshot of a run rejected before it started.
    #[must_use]
    pub fn rejected(profile: &str, max_iterations: MaxIterations, error: ResearchError) -> Self {
        Self {
            status: SessionStatus::Failed,
            profile: profile.to_string(),
            iteration: 0,
            max_iterations,
            subqueries_issued: 0,
            evidence: Vec::new(),
            notices: vec![error],
        }
    }

    /// Number of evidence items.
    #[must_use]
    pub fn evidence_count(&self) -> usize {
        self.evidence.len()
    }
}

/// One user request, from planning to the end of the report stream.
#[derive(Debug)]
pub struct ResearchSession {
    query: String,
    profile: Arc<IndustryProfile>,
    max_iterations: MaxIterations,
    iteration: u32,
    status: SessionStatus,
    searched: HashSet<String>,
    subqueries_issued: usize,
    notices: Vec<ResearchError>,
}

impl ResearchSession {
    /// Starts a session in [`SessionStatus::Planning`].
    #[must_use]
    pub fn new(
        query: impl Into<String>,
        profile: Arc<IndustryProfile>,
        max_iterations: MaxIterations,
    ) -> Self {
        Self {
            query: query.into(),
            profile,
            max_iterations,
            iteration: 0,
            status: SessionStatus::Planning,
            searched: HashSet::new(),
            subqueries_issued: 0,
            notices: Vec::new(),
        }
    }

    /// The user's question.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The profile driving prompts.
    #[must_use]
    pub fn profile(&self) -> &IndustryProfile {
        &self.profile
    }

    /// Current iteration, 0 before the first search.
    #[must_use]
    pub const fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Iteration budget.
    #[must_use]
    pub const fn max_iterations(&self) -> MaxIterations {
        self.max_iterations
    }

    /// Current phase.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Notices recorded so far.
    #[must_use]
    pub fn notices(&self) -> &[ResearchError] {
        &self.notices
    }

    /// Whether another iteration may start.
    #[must_use]
    pub const fn budget_remaining(&self) -> bool {
        self.iteration < self.max_iterations.get()
    }

    /// Whether a sub-query with this text was already searched.
    #[must_use]
    pub fn was_searched(&self, text: &str) -> bool {
        self.searched.contains(&history_key(text))
    }

    /// History keys of every searched sub-query.
    #[must_use]
    pub const fn searched(&self) -> &HashSet<String> {
        &self.searched
    }

    pub(crate) const fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
    }

    /// Starts the next iteration. Returns `false` once the budget is spent.
    pub(crate) const fn begin_iteration(&mut self) -> bool {
        if self.budget_remaining() {
            self.iteration += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn mark_searched(&mut self, subqueries: &[SubQuery]) {
        for sq in subqueries {
            self.searched.insert(history_key(sq.text()));
        }
        self.subqueries_issued += subqueries.len();
    }

    pub(crate) fn record_notice(&mut self, notice: ResearchError) {
        self.notices.push(notice);
    }

    /// Builds a snapshot with the given evidence list.
    #[must_use]
    pub fn snapshot(&self, evidence: &[EvidenceItem]) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            profile: self.profile.id.clone(),
            iteration: self.iteration,
            max_iterations: self.max_iterations,
            subqueries_issued: self.subqueries_issued,
            evidence: evidence.to_vec(),
            notices: self.notices.clone(),
        }
    }
}
