//! Prompt builders for the planning, reflection and synthesis calls.
//!
//! Profile templates carry `{name}` placeholders; these helpers fill them.
//! Unknown placeholders are left as they are, so literal braces in a
//! template (JSON examples) survive rendering. Placeholder-shaped text left
//! over after rendering is logged, since it usually means a profile file
//! uses a name this crate does not know.
//!
//! Accepted aliases: `{initial_query}` for `{query}`,
//! `{memory_context_for_llm}` and `{final_memory_context}` for
//! `{evidence}`, `{analysis_section}` for `{analysis}`.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::profile::IndustryProfile;

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z][a-z0-9_]*)\}").expect("placeholder pattern is valid"));

/// Alternative placeholder names and the canonical name they stand for.
const ALIASES: &[(&str, &str)] = &[
    ("initial_query", "query"),
    ("memory_context_for_llm", "evidence"),
    ("final_memory_context", "evidence"),
    ("analysis_section", "analysis"),
];

/// Text used in place of an empty evidence list.
pub const NO_EVIDENCE: &str = "（当前没有收集到任何信息）";

/// Replaces each `{key}` in `template` with its value in a single pass.
///
/// Substituted values are never scanned again.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let hit = after.find('}').and_then(|end| {
            let key = &after[..end];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, value)| (end, *value))
        });
        if let Some((end, value)) = hit {
            out.push_str(value);
            rest = &after[end + 1..];
        } else {
            out.push('{');
            rest = after;
        }
    }
    out.push_str(rest);
    out
}

/// Renders a profile template, resolving aliases and warning about
/// placeholders that stay unfilled.
fn fill(profile: &IndustryProfile, which: &str, template: &str, vars: &[(&str, &str)]) -> String {
    let mut all: Vec<(&str, &str)> = vars.to_vec();
    for (alias, canonical) in ALIASES {
        if let Some((_, value)) = vars.iter().find(|(k, _)| k == canonical) {
            all.push((*alias, *value));
        }
    }
    let out = render_template(template, &all);

    let leftover: Vec<&str> = PLACEHOLDER
        .captures_iter(&out)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .filter(|name| template.contains(&format!("{{{name}}}")))
        .collect();
    if !leftover.is_empty() {
        warn!(
            profile = %profile.id,
            template = which,
            placeholders = ?leftover,
            "template placeholders left unfilled"
        );
    }
    out
}

/// Builds the decomposition request.
#[must_use]
pub fn build_plan_prompt(profile: &IndustryProfile, query: &str) -> String {
    let max = profile.target_subqueries.to_string();
    fill(
        profile,
        "plan",
        &profile.plan_template,
        &[
            ("industry_name", &profile.name),
            ("max_subqueries", &max),
            ("query", query),
        ],
    )
}

/// Builds the sufficiency check over the rendered evidence.
#[must_use]
pub fn build_reflection_prompt(
    profile: &IndustryProfile,
    query: &str,
    evidence: &str,
    max_subqueries: usize,
) -> String {
    let max = max_subqueries.to_string();
    let evidence = if evidence.is_empty() { NO_EVIDENCE } else { evidence };
    fill(
        profile,
        "reflection",
        &profile.reflection_template,
        &[
            ("industry_name", &profile.name),
            ("max_subqueries", &max),
            ("evidence", evidence),
            ("query", query),
        ],
    )
}

/// Builds the report request.
///
/// `analysis` is the data-scan block; an empty string removes the
/// placeholder.
#[must_use]
pub fn build_synthesis_prompt(
    profile: &IndustryProfile,
    query: &str,
    evidence: &str,
    analysis: &str,
) -> String {
    let evidence = if evidence.is_empty() { NO_EVIDENCE } else { evidence };
    fill(
        profile,
        "synthesis",
        &profile.synthesis_template,
        &[
            ("industry_name", &profile.name),
            ("evidence", evidence),
            ("analysis", analysis),
            ("query", query),
        ],
    )
}
