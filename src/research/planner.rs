//! Query planner.
//!
//! Decomposes the user's question into focused sub-queries. Planning never
//! fails a run: when the model call or its output is unusable, the planner
//! falls back to searching the original query.

use std::sync::Arc;

use tracing::{info, warn};

use super::parse::{extract_json, string_list};
use super::prompt::build_plan_prompt;
use super::session::SubQuery;
use crate::config::ResearchConfig;
use crate::error::{InferenceError, ResearchError};
use crate::inference::{Agent, InferenceClient};
use crate::profile::IndustryProfile;

/// Planner output.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Sub-queries for the first iteration; never empty for a non-blank query.
    pub subqueries: Vec<SubQuery>,
    /// Set when the planner fell back to the original query.
    pub degraded: Option<ResearchError>,
}

/// Agent that decomposes a query into sub-queries.
pub struct QueryPlanner {
    model: String,
    max_tokens: u32,
    temperature: f32,
    profile: Arc<IndustryProfile>,
}

impl QueryPlanner {
    /// Creates a planner for one profile.
    #[must_use]
    pub fn new(config: &ResearchConfig, profile: Arc<IndustryProfile>) -> Self {
        Self {
            model: config.planner_model.clone(),
            max_tokens: config.planner_max_tokens,
            temperature: config.planning_temperature,
            profile,
        }
    }

    /// Plans the first round of searches.
    pub async fn plan(&self, client: &InferenceClient, query: &str) -> Plan {
        let prompt = build_plan_prompt(&self.profile, query);
        let parsed = match client.complete(self, &prompt).await {
            Ok(response) => parse_subqueries(&response.content, self.profile.target_subqueries),
            Err(e) => Err(e),
        };

        match parsed {
            Ok(list) => {
                info!(count = list.len(), "query decomposed");
                Plan {
                    subqueries: list.into_iter().map(SubQuery::planned).collect(),
                    degraded: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "planning failed, searching the original query");
                Plan {
                    subqueries: vec![SubQuery::planned(query.trim())],
                    degraded: Some(ResearchError::PlanningDegraded {
                        reason: e.to_string(),
                    }),
                }
            }
        }
    }
}

/// Extracts sub-queries from a planner answer.
///
/// Accepts `{"subqueries": [...]}` (also `sub_queries` or `queries`) or a
/// bare array. Blank and repeated entries are dropped and the list is
/// capped at `cap`.
///
/// # Errors
///
/// Returns [`InferenceError::Malformed`] when no usable sub-query remains.
pub fn parse_subqueries(content: &str, cap: usize) -> Result<Vec<String>, InferenceError> {
    let value = extract_json(content)?;
    let list = if value.is_array() {
        Some(&value)
    } else {
        ["subqueries", "sub_queries", "queries"]
            .iter()
            .find_map(|key| value.get(key))
    };

    let mut subqueries = string_list(list);
    if subqueries.is_empty() {
        return Err(InferenceError::Malformed {
            message: "planner returned no sub-queries".to_string(),
        });
    }
    subqueries.truncate(cap.max(1));
    Ok(subqueries)
}

impl Agent for QueryPlanner {
    fn name(&self) -> &'static str {
        "planner"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.profile.assistant_prompt
    }

    fn json_mode(&self) -> bool {
        true
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}
