//! Reflection controller.
//!
//! After each round of searches the controller asks the model whether the
//! evidence answers the question and, if not, which follow-up sub-queries
//! to run. The iteration budget itself is enforced by the orchestrator,
//! which never calls reflection once the budget is spent.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::evidence::EvidenceStore;
use super::parse::{extract_json, string_list};
use super::prompt::build_reflection_prompt;
use super::session::{SubQuery, history_key};
use crate::config::ResearchConfig;
use crate::error::{InferenceError, ResearchError};
use crate::inference::{Agent, InferenceClient};
use crate::profile::IndustryProfile;

/// The controller's judgement on the evidence so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Enough evidence to write the report.
    Sufficient,
    /// Search again with the proposed sub-queries.
    Continue,
}

/// Parsed reflection answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectionDecision {
    /// Whether to stop searching.
    pub verdict: Verdict,
    /// The model's stated reason, possibly empty.
    pub rationale: String,
    /// New sub-queries for the next iteration; empty unless `Continue`.
    pub next_subqueries: Vec<SubQuery>,
    /// URLs the model judged irrelevant. Informational only.
    pub irrelevant_urls: Vec<String>,
}

/// Agent that judges evidence sufficiency.
pub struct ReflectionController {
    model: String,
    max_tokens: u32,
    temperature: f32,
    budget_chars: usize,
    profile: Arc<IndustryProfile>,
}

impl ReflectionController {
    /// Creates a controller for one profile.
    #[must_use]
    pub fn new(config: &ResearchConfig, profile: Arc<IndustryProfile>) -> Self {
        Self {
            model: config.reflection_model.clone(),
            max_tokens: config.reflection_max_tokens,
            temperature: config.planning_temperature,
            budget_chars: config.reflection_budget_chars,
            profile,
        }
    }

    /// Follow-ups accepted per reflection.
    fn cap(&self) -> usize {
        self.profile.target_subqueries.max(1)
    }

    /// Judges the evidence gathered so far.
    ///
    /// `next_iteration` tags proposed sub-queries; `searched` holds the
    /// history keys of sub-queries already run, which are never proposed
    /// again.
    ///
    /// # Errors
    ///
    /// Returns [`ResearchError::ReflectionForcedStop`] when the call fails
    /// or its output cannot be interpreted.
    pub async fn reflect(
        &self,
        client: &InferenceClient,
        query: &str,
        store: &EvidenceStore,
        next_iteration: u32,
        searched: &HashSet<String>,
    ) -> Result<ReflectionDecision, ResearchError> {
        let evidence = store.render_for_prompt(self.budget_chars);
        let prompt = build_reflection_prompt(&self.profile, query, &evidence, self.cap());

        let decision = client
            .complete(self, &prompt)
            .await
            .and_then(|response| {
                parse_decision(&response.content, next_iteration, self.cap(), searched)
            })
            .map_err(|e| {
                warn!(error = %e, "reflection failed, proceeding to synthesis");
                ResearchError::ReflectionForcedStop {
                    reason: e.to_string(),
                }
            })?;

        if !decision.irrelevant_urls.is_empty() {
            debug!(urls = ?decision.irrelevant_urls, "reflection flagged irrelevant sources");
        }
        info!(
            verdict = ?decision.verdict,
            follow_ups = decision.next_subqueries.len(),
            rationale = %decision.rationale,
            "reflection"
        );
        Ok(decision)
    }
}

/// Interprets a reflection answer.
///
/// The verdict comes from a `verdict` string (`"sufficient"`/`"continue"`)
/// or a `can_answer` boolean; any other `can_answer` value counts as
/// `false`. A `Continue` verdict with no new sub-queries is treated as
/// `Sufficient`, since searching nothing cannot add evidence.
///
/// # Errors
///
/// Returns [`InferenceError::Malformed`] when the answer is not a JSON object.
pub fn parse_decision(
    content: &str,
    next_iteration: u32,
    cap: usize,
    searched: &HashSet<String>,
) -> Result<ReflectionDecision, InferenceError> {
    let value = extract_json(content)?;
    let Some(object) = value.as_object() else {
        return Err(InferenceError::Malformed {
            message: "reflection answer is not a JSON object".to_string(),
        });
    };

    let verdict = match object.get("verdict").and_then(Value::as_str) {
        Some(v) if v.eq_ignore_ascii_case("sufficient") => Verdict::Sufficient,
        Some(v) if v.eq_ignore_ascii_case("continue") => Verdict::Continue,
        _ => {
            if object.get("can_answer").and_then(Value::as_bool) == Some(true) {
                Verdict::Sufficient
            } else {
                Verdict::Continue
            }
        }
    };

    let rationale = ["rationale", "reason"]
        .iter()
        .find_map(|k| object.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .trim()
        .to_string();

    let irrelevant_urls = string_list(object.get("irrelevant_urls"));

    let proposals = object
        .get("new_subqueries")
        .or_else(|| object.get("subqueries"));
    let next_subqueries: Vec<SubQuery> = if verdict == Verdict::Sufficient {
        Vec::new()
    } else {
        string_list(proposals)
            .into_iter()
            .filter(|q| !searched.contains(&history_key(q)))
            .take(cap)
            .map(|q| SubQuery::follow_up(q, next_iteration))
            .collect()
    };

    let verdict = if verdict == Verdict::Continue && next_subqueries.is_empty() {
        debug!("no new sub-queries proposed, treating evidence as sufficient");
        Verdict::Sufficient
    } else {
        verdict
    };

    Ok(ReflectionDecision {
        verdict,
        rationale,
        next_subqueries,
        irrelevant_urls,
    })
}

impl Agent for ReflectionController {
    fn name(&self) -> &'static str {
        "reflection"
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

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> ReflectionDecision {
        parse_decision(content, 2, 3, &HashSet::new()).unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn test_can_answer_true_is_sufficient() {
        let d = parse(r#"{"can_answer": true, "new_subqueries": ["ignored"]}"#);
        assert_eq!(d.verdict, Verdict::Sufficient);
        assert!(d.next_subqueries.is_empty());
    }

    #[test]
    fn test_continue_with_follow_ups() {
        let d = parse(
            r#"{"can_answer": false, "rationale": "缺少2024年数据",
                "irrelevant_urls": ["https://spam.example"],
                "new_subqueries": ["2024 出口量", "出口管制"]}"#,
        );
        assert_eq!(d.verdict, Verdict::Continue);
        assert_eq!(d.rationale, "缺少2024年数据");
        assert_eq!(d.irrelevant_urls, vec!["https://spam.example"]);
        let texts: Vec<&str> = d.next_subqueries.iter().map(SubQuery::text).collect();
        assert_eq!(texts, vec!["2024 出口量", "出口管制"]);
        assert!(d.next_subqueries.iter().all(|q| q.iteration() == 2));
    }

    #[test]
    fn test_non_bool_can_answer_counts_as_false() {
        let d = parse(r#"{"can_answer": "yes", "new_subqueries": ["more"]}"#);
        assert_eq!(d.verdict, Verdict::Continue);
    }

    #[test]
    fn test_verdict_string_wins() {
        let d = parse(r#"{"verdict": "SUFFICIENT", "can_answer": false}"#);
        assert_eq!(d.verdict, Verdict::Sufficient);
    }

    #[test]
    fn test_continue_without_new_queries_is_sufficient() {
        let d = parse(r#"{"can_answer": false, "new_subqueries": []}"#);
        assert_eq!(d.verdict, Verdict::Sufficient);
        assert!(d.next_subqueries.is_empty());
    }

    #[test]
    fn test_already_searched_queries_are_dropped() {
        let searched: HashSet<String> = [history_key("Chip Exports")].into_iter().collect();
        let d = parse_decision(
            r#"{"can_answer": false, "new_subqueries": ["chip  exports", "tariffs"]}"#,
            2,
            3,
            &searched,
        )
        .unwrap_or_else(|_| unreachable!());
        let texts: Vec<&str> = d.next_subqueries.iter().map(SubQuery::text).collect();
        assert_eq!(texts, vec!["tariffs"]);
    }

    #[test]
    fn test_proposals_are_capped() {
        let d = parse(r#"{"can_answer": false, "new_subqueries": ["a","b","c","d","e"]}"#);
        assert_eq!(d.next_subqueries.len(), 3);
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(parse_decision("[1, 2]", 2, 3, &HashSet::new()).is_err());
        assert!(parse_decision("maybe?", 2, 3, &HashSet::new()).is_err());
    }
}
