//! Output formatting for CLI commands.

use std::fmt::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::ResearchError;
use crate::profile::ProfileSummary;
use crate::research::{RunOutcome, SessionSnapshot};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// A single JSON document.
    Json,
}

impl OutputFormat {
    /// Parses a format name; anything unrecognised is text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Renders the profile listing.
#[must_use]
pub fn format_profiles(profiles: &[ProfileSummary], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            for p in profiles {
                let _ = writeln!(out, "{:<14} {}", p.id, p.name);
            }
            out
        }
        OutputFormat::Json => to_json(&profiles),
    }
}

/// Footer printed after a streamed text report.
#[must_use]
pub fn format_footer(snapshot: &SessionSnapshot, saved: Option<&Path>) -> String {
    let mut out = String::from("\n\n---\n");
    let _ = writeln!(
        out,
        "status: {} | iterations: {}/{} | sub-queries: {} | sources: {}",
        snapshot.status,
        snapshot.iteration,
        snapshot.max_iterations.get(),
        snapshot.subqueries_issued,
        snapshot.evidence_count()
    );
    for notice in snapshot.notices.iter().filter(|n| !n.is_terminal()) {
        let _ = writeln!(out, "note: {notice}");
    }
    if !snapshot.evidence.is_empty() {
        out.push_str("\nSources:\n");
        for item in &snapshot.evidence {
            let _ = writeln!(out, "[{}] {} {}", item.citation_id(), item.title(), item.url());
        }
    }
    if let Some(path) = saved {
        let _ = writeln!(out, "\nSaved to {}", path.display());
    }
    out
}

#[derive(Serialize)]
struct OutcomeJson<'a> {
    report: &'a str,
    complete: bool,
    citations: Vec<u32>,
    error: Option<&'a ResearchError>,
    saved: Option<String>,
    #[serde(flatten)]
    snapshot: &'a SessionSnapshot,
}

/// Renders a finished run as one JSON document.
#[must_use]
pub fn format_outcome_json(outcome: &RunOutcome, saved: Option<&Path>) -> String {
    to_json(&OutcomeJson {
        report: &outcome.report,
        complete: outcome.is_complete(),
        citations: outcome.citations(),
        error: outcome.error.as_ref(),
        saved: saved.map(|p| p.display().to_string()),
        snapshot: &outcome.snapshot,
    })
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaxIterations;

    #[test]
    fn test_parse_format() {
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("yaml"), OutputFormat::Text);
    }

    #[test]
    fn test_format_profiles_text_and_json() {
        let profiles = vec![ProfileSummary {
            id: "tech".to_string(),
            name: "科技行业".to_string(),
        }];
        assert!(format_profiles(&profiles, OutputFormat::Text).starts_with("tech"));
        let json = format_profiles(&profiles, OutputFormat::Json);
        assert!(json.contains("\"id\": \"tech\""));
    }

    #[test]
    fn test_footer_hides_terminal_notice() {
        let snapshot = SessionSnapshot::rejected(
            "tech",
            MaxIterations::DEFAULT,
            ResearchError::SessionFailed {
                reason: "query is empty".to_string(),
            },
        );
        let footer = format_footer(&snapshot, None);
        assert!(footer.contains("status: failed"));
        assert!(!footer.contains("note:"));
    }
}
