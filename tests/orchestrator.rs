//! End-to-end research runs against scripted backends.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    FakeSearch, PLANNER_MODEL, REFLECTION_MODEL, SYNTHESIS_MODEL, ScriptedProvider, StreamEnd,
    config_with_idle, orchestrator, orchestrator_with,
};
use delve_rs::error::{InferenceError, ResearchError};
use delve_rs::research::SessionStatus;
use delve_rs::search::SearchHit;

const PROFILE: &str = "deepResearch";
const PLAN_ABC: &str = r#"{"subqueries": ["a", "b", "c"]}"#;

#[tokio::test]
async fn test_happy_path_single_iteration() {
    let provider = Arc::new(ScriptedProvider::new(PLAN_ABC));
    let search = Arc::new(FakeSearch::new());
    let outcome = orchestrator(&provider, &search)
        .research("芯片出口", PROFILE, 3)
        .await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.report, "报告[1]完成");
    assert_eq!(outcome.citations(), vec![1]);
    assert_eq!(outcome.snapshot.status, SessionStatus::Done);
    assert_eq!(outcome.snapshot.iteration, 1);
    assert_eq!(outcome.snapshot.subqueries_issued, 3);

    let ids: Vec<u32> = outcome
        .snapshot
        .evidence
        .iter()
        .map(|e| e.citation_id())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(outcome.snapshot.evidence[0].subquery(), "a");

    assert_eq!(search.calls().len(), 3);
    assert_eq!(provider.calls_to(PLANNER_MODEL), 1);
    assert_eq!(provider.calls_to(REFLECTION_MODEL), 1);
    assert_eq!(provider.calls_to(SYNTHESIS_MODEL), 1);
}

#[tokio::test]
async fn test_synthesis_prompt_carries_every_citation() {
    let provider = Arc::new(ScriptedProvider::new(PLAN_ABC));
    let search = Arc::new(FakeSearch::new());
    orchestrator(&provider, &search)
        .research("芯片出口", PROFILE, 3)
        .await;

    let prompt = provider
        .last_prompt_to(SYNTHESIS_MODEL)
        .unwrap_or_default();
    for (id, q) in [(1, "a"), (2, "b"), (3, "c")] {
        assert!(prompt.contains(&format!("[{id}]")));
        assert!(prompt.contains(&format!("https://example.com/{q}")));
    }
    assert!(prompt.contains("芯片出口"));

    let requests = provider.requests();
    let synthesis = requests
        .iter()
        .find(|r| r.model == SYNTHESIS_MODEL)
        .unwrap_or_else(|| unreachable!());
    assert!(synthesis.stream);
    assert!(!synthesis.json_mode);
}

#[tokio::test]
async fn test_two_subqueries_three_snippets_single_iteration() {
    let provider = Arc::new(ScriptedProvider::new(
        r#"{"subqueries": ["AI芯片出货量", "AI芯片价格"]}"#,
    ));
    let search = Arc::new(
        FakeSearch::new()
            .hits(
                "AI芯片出货量",
                vec![
                    SearchHit::new("出货", "https://a.example/1", "2025年出货量预计增长 40%"),
                    SearchHit::new("产能", "https://a.example/2", "先进封装产能持续紧张"),
                ],
            )
            .hits(
                "AI芯片价格",
                vec![SearchHit::new("价格", "https://b.example/1", "高端加速卡均价上涨")],
            ),
    );
    let outcome = orchestrator(&provider, &search)
        .research("2025年AI芯片市场趋势", PROFILE, 1)
        .await;

    assert!(outcome.is_complete());
    let ids: Vec<u32> = outcome
        .snapshot
        .evidence
        .iter()
        .map(|e| e.citation_id())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(outcome.snapshot.evidence[1].url(), "https://a.example/2");
    assert_eq!(outcome.snapshot.evidence[2].subquery(), "AI芯片价格");
    assert!(provider.calls_to(REFLECTION_MODEL) <= 1);

    let prompt = provider
        .last_prompt_to(SYNTHESIS_MODEL)
        .unwrap_or_default();
    for id in 1..=3 {
        assert!(prompt.contains(&format!("[{id}]")), "missing [{id}]");
    }
    assert!(prompt.contains("先进封装产能持续紧张"));
}

#[tokio::test]
async fn test_duplicate_content_collapses_to_one_citation() {
    let provider = Arc::new(ScriptedProvider::new(r#"{"subqueries": ["a", "b"]}"#));
    let search = Arc::new(
        FakeSearch::new()
            .hits(
                "a",
                vec![SearchHit::new("A", "https://a.example", "<b>Same</b>  text")],
            )
            .hits(
                "b",
                vec![SearchHit::new("B", "https://b.example", "same TEXT")],
            ),
    );
    let outcome = orchestrator(&provider, &search)
        .research("q", PROFILE, 1)
        .await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.snapshot.evidence_count(), 1);
    assert_eq!(outcome.snapshot.evidence[0].url(), "https://a.example");
}

#[tokio::test]
async fn test_citations_outside_evidence_are_ignored() {
    let provider = Arc::new(
        ScriptedProvider::new(r#"{"subqueries": ["a"]}"#)
            .report(&["见[1]与[9]"], StreamEnd::Done),
    );
    let search = Arc::new(FakeSearch::new());
    let outcome = orchestrator(&provider, &search)
        .research("q", PROFILE, 1)
        .await;

    assert_eq!(outcome.chunks.len(), 1);
    assert_eq!(outcome.chunks[0].citations, vec![1]);
}

#[tokio::test]
async fn test_stream_error_keeps_partial_report() {
    let provider = Arc::new(
        ScriptedProvider::new(PLAN_ABC).report(&["第一段", "第二段"], StreamEnd::Error),
    );
    let search = Arc::new(FakeSearch::new());
    let mut run = orchestrator(&provider, &search).run("q", PROFILE, 1);

    let mut texts = Vec::new();
    let mut terminal = None;
    while let Some(event) = run.next().await {
        match event {
            Ok(chunk) => {
                assert!(terminal.is_none(), "chunk after terminal error");
                assert_eq!(chunk.sequence, texts.len());
                texts.push(chunk.text);
            }
            Err(e) => terminal = Some(e),
        }
    }

    assert_eq!(texts, vec!["第一段", "第二段"]);
    assert!(matches!(
        terminal,
        Some(ResearchError::SynthesisInterrupted {
            chunks_emitted: 2,
            ..
        })
    ));
    assert_eq!(run.status(), SessionStatus::Failed);
}

#[tokio::test]
async fn test_idle_stream_is_interrupted() {
    let provider =
        Arc::new(ScriptedProvider::new(PLAN_ABC).report(&["开头"], StreamEnd::Hang));
    let search = Arc::new(FakeSearch::new());
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator(&provider, &search).research("q", PROFILE, 1),
    )
    .await
    .unwrap_or_else(|_| unreachable!());

    assert_eq!(outcome.report, "开头");
    assert!(matches!(
        outcome.error,
        Some(ResearchError::SynthesisInterrupted {
            chunks_emitted: 1,
            ..
        })
    ));
}

#[tokio::test]
async fn test_stream_failing_before_content_fails_session() {
    let provider = Arc::new(ScriptedProvider::new(PLAN_ABC).report(&[], StreamEnd::Error));
    let search = Arc::new(FakeSearch::new());
    let outcome = orchestrator(&provider, &search)
        .research("q", PROFILE, 1)
        .await;

    assert!(outcome.report.is_empty());
    assert!(matches!(
        outcome.error,
        Some(ResearchError::SessionFailed { .. })
    ));
}

#[tokio::test]
async fn test_stream_open_failure_fails_session() {
    let provider = Arc::new(ScriptedProvider::new(PLAN_ABC).stream_open_error(
        InferenceError::Unavailable {
            message: "HTTP 500".to_string(),
            status: Some(500),
        },
    ));
    let search = Arc::new(FakeSearch::new());
    let outcome = orchestrator(&provider, &search)
        .research("q", PROFILE, 1)
        .await;

    assert!(matches!(
        outcome.error,
        Some(ResearchError::SessionFailed { .. })
    ));
    assert_eq!(outcome.snapshot.status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_empty_query_makes_no_calls() {
    let provider = Arc::new(ScriptedProvider::new(PLAN_ABC));
    let search = Arc::new(FakeSearch::new());
    let outcome = orchestrator(&provider, &search)
        .research("   ", PROFILE, 3)
        .await;

    assert!(matches!(
        outcome.error,
        Some(ResearchError::SessionFailed { .. })
    ));
    assert!(outcome.chunks.is_empty());
    assert!(provider.requests().is_empty());
    assert!(search.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_profile_makes_no_calls() {
    let provider = Arc::new(ScriptedProvider::new(PLAN_ABC));
    let search = Arc::new(FakeSearch::new());
    let outcome = orchestrator(&provider, &search)
        .research("q", "astrology", 3)
        .await;

    let reason = match outcome.error {
        Some(ResearchError::SessionFailed { reason }) => reason,
        _ => String::new(),
    };
    assert!(reason.contains("astrology"));
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn test_planner_failure_searches_original_query() {
    let provider = Arc::new(ScriptedProvider::new("").failing_plan(InferenceError::Timeout {
        secs: 120,
    }));
    let search = Arc::new(FakeSearch::new());
    let outcome = orchestrator(&provider, &search)
        .research("  原始问题  ", PROFILE, 1)
        .await;

    assert!(outcome.is_complete());
    assert_eq!(search.calls(), vec!["原始问题"]);
    assert!(
        outcome
            .snapshot
            .notices
            .iter()
            .any(|n| matches!(n, ResearchError::PlanningDegraded { .. }))
    );
}

#[tokio::test]
async fn test_unparseable_plan_falls_back() {
    let provider = Arc::new(ScriptedProvider::new("I think you should search for chips."));
    let search = Arc::new(FakeSearch::new());
    let outcome = orchestrator(&provider, &search)
        .research("chips", PROFILE, 1)
        .await;

    assert_eq!(search.calls(), vec!["chips"]);
    assert_eq!(outcome.snapshot.notices.len(), 1);
    assert_eq!(outcome.snapshot.notices[0].kind(), "planning_degraded");
}

#[tokio::test]
async fn test_continue_without_new_subqueries_stops() {
    let provider = Arc::new(
        ScriptedProvider::new(PLAN_ABC)
            .reflection(r#"{"can_answer": false, "new_subqueries": []}"#),
    );
    let search = Arc::new(FakeSearch::new());
    let outcome = orchestrator(&provider, &search)
        .research("q", PROFILE, 5)
        .await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.snapshot.iteration, 1);
    assert_eq!(provider.calls_to(REFLECTION_MODEL), 1);
    assert_eq!(search.calls().len(), 3);
}

#[tokio::test]
async fn test_repeated_follow_ups_are_not_searched_again() {
    let provider = Arc::new(
        ScriptedProvider::new(PLAN_ABC)
            .reflection(r#"{"can_answer": false, "new_subqueries": ["A", " b "]}"#),
    );
    let search = Arc::new(FakeSearch::new());
    let outcome = orchestrator(&provider, &search)
        .research("q", PROFILE, 5)
        .await;

    assert_eq!(outcome.snapshot.iteration, 1);
    assert_eq!(search.calls().len(), 3);
}

#[tokio::test]
async fn test_iteration_budget_bounds_reflection() {
    let provider = Arc::new(
        ScriptedProvider::new(r#"{"subqueries": ["a"]}"#)
            .reflection(r#"{"can_answer": false, "new_subqueries": ["x1"]}"#)
            .reflection(r#"{"can_answer": false, "new_subqueries": ["x2"]}"#)
            .reflection(r#"{"can_answer": false, "new_subqueries": ["x3"]}"#),
    );
    let search = Arc::new(FakeSearch::new());
    let outcome = orchestrator(&provider, &search)
        .research("q", PROFILE, 3)
        .await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.snapshot.iteration, 3);
    assert_eq!(provider.calls_to(REFLECTION_MODEL), 2);
    assert_eq!(search.calls(), vec!["a", "x1", "x2"]);

    let iterations: Vec<u32> = outcome
        .snapshot
        .evidence
        .iter()
        .map(|e| e.iteration())
        .collect();
    assert_eq!(iterations, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_single_iteration_skips_reflection() {
    let provider = Arc::new(ScriptedProvider::new(PLAN_ABC));
    let search = Arc::new(FakeSearch::new());
    let outcome = orchestrator(&provider, &search)
        .research("q", PROFILE, 1)
        .await;

    assert!(outcome.is_complete());
    assert_eq!(provider.calls_to(REFLECTION_MODEL), 0);
}

#[tokio::test]
async fn test_oversized_budget_is_clamped() {
    let provider = Arc::new(
        ScriptedProvider::new(r#"{"subqueries": ["a"]}"#)
            .default_reflection(r#"{"can_answer": false, "new_subqueries": ["more"]}"#),
    );
    let search = Arc::new(FakeSearch::new());
    let outcome = orchestrator(&provider, &search)
        .research("q", PROFILE, 99)
        .await;

    // "more" is searched once; the repeat collapses the loop.
    assert_eq!(outcome.snapshot.max_iterations.get(), 5);
    assert_eq!(outcome.snapshot.iteration, 2);
}

#[tokio::test]
async fn test_malformed_reflection_forces_synthesis() {
    let provider =
        Arc::new(ScriptedProvider::new(PLAN_ABC).reflection("the evidence looks fine to me"));
    let search = Arc::new(FakeSearch::new());
    let outcome = orchestrator(&provider, &search)
        .research("q", PROFILE, 3)
        .await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.snapshot.iteration, 1);
    assert!(
        outcome
            .snapshot
            .notices
            .iter()
            .any(|n| matches!(n, ResearchError::ReflectionForcedStop { .. }))
    );
    assert_eq!(provider.calls_to(SYNTHESIS_MODEL), 1);
}

#[tokio::test]
async fn test_failed_search_is_skipped() {
    let provider = Arc::new(ScriptedProvider::new(r#"{"subqueries": ["a", "b"]}"#));
    let search = Arc::new(FakeSearch::new().fails("b").hits("a", vec![common::hit_for("a")]));
    let outcome = orchestrator(&provider, &search)
        .research("q", PROFILE, 1)
        .await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.snapshot.evidence_count(), 1);
    assert!(outcome.snapshot.notices.iter().any(|n| matches!(
        n,
        ResearchError::SearchSkipped { subquery, .. } if subquery == "b"
    )));
}

#[tokio::test]
async fn test_no_evidence_fails_without_synthesis() {
    let provider = Arc::new(ScriptedProvider::new(r#"{"subqueries": ["a", "b"]}"#));
    let search = Arc::new(FakeSearch::new().fails("a").hits("b", Vec::new()));
    let outcome = orchestrator(&provider, &search)
        .research("q", PROFILE, 1)
        .await;

    assert!(matches!(
        outcome.error,
        Some(ResearchError::SessionFailed { .. })
    ));
    assert_eq!(provider.calls_to(SYNTHESIS_MODEL), 0);
    let skipped = outcome
        .snapshot
        .notices
        .iter()
        .filter(|n| n.kind() == "search_skipped")
        .count();
    assert_eq!(skipped, 2);
}

#[tokio::test]
async fn test_cancel_during_search_stops_the_run() {
    let provider = Arc::new(ScriptedProvider::new(PLAN_ABC));
    let search = Arc::new(FakeSearch::new().delay(Duration::from_secs(5)));
    let run = orchestrator(&provider, &search).run("q", PROFILE, 3);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(run.status(), SessionStatus::Searching);
    run.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(2), run.collect_report())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(outcome.chunks.is_empty());
    assert_eq!(outcome.snapshot.status, SessionStatus::Failed);
    assert_eq!(provider.calls_to(SYNTHESIS_MODEL), 0);
}

#[tokio::test]
async fn test_dropping_the_run_cancels_it() {
    let provider = Arc::new(ScriptedProvider::new(PLAN_ABC));
    let search = Arc::new(FakeSearch::new().delay(Duration::from_millis(200)));
    let run = orchestrator(&provider, &search).run("q", PROFILE, 3);
    let mut watch = run.watch();

    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(run);

    let terminal = tokio::time::timeout(
        Duration::from_secs(2),
        watch.wait_for(|s| s.status.is_terminal()),
    )
    .await
    .unwrap_or_else(|_| unreachable!())
    .map(|s| s.status)
    .unwrap_or(SessionStatus::Done);
    assert_eq!(terminal, SessionStatus::Failed);
    assert_eq!(provider.calls_to(REFLECTION_MODEL), 0);
}

#[tokio::test]
async fn test_cancel_while_streaming_keeps_received_chunks() {
    let provider = Arc::new(
        ScriptedProvider::new(r#"{"subqueries": ["a"]}"#)
            .report(&["第一段[1]", "第二段"], StreamEnd::Hang),
    );
    let search = Arc::new(FakeSearch::new());
    let config = config_with_idle(Duration::from_secs(30));
    let mut run = orchestrator_with(&provider, &search, config).run("q", PROFILE, 1);

    let first = run
        .next()
        .await
        .and_then(Result::ok)
        .unwrap_or_else(|| unreachable!());
    assert_eq!(first.text, "第一段[1]");
    assert_eq!(run.status(), SessionStatus::Synthesizing);

    let started = std::time::Instant::now();
    run.cancel();
    let rest = tokio::time::timeout(Duration::from_secs(2), run.collect_report())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(rest.snapshot.status, SessionStatus::Failed);
    assert!(matches!(
        rest.error,
        Some(ResearchError::SessionFailed { .. })
    ));
    let report = format!("{}{}", first.text, rest.report);
    assert!("第一段[1]第二段".starts_with(&report), "{report}");
    assert_eq!(provider.calls_to(SYNTHESIS_MODEL), 1);
}
