//! Append-only, deduplicated evidence store.
//!
//! Every search hit is fingerprinted over its normalized body text. The
//! first hit with a given fingerprint mints the next citation id; later
//! hits with the same fingerprint resolve to that id. Ids start at 1,
//! increase by one, and are never reused or reassigned.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use unicode_segmentation::UnicodeSegmentation;

use crate::search::SearchHit;

#[allow(clippy::expect_used)]
static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("markup pattern is valid"));

const ELLIPSIS: char = '…';

/// Normalizes body text before fingerprinting.
///
/// Strips markup tags, decodes the common entities, lowercases and
/// collapses whitespace.
#[must_use]
pub fn normalize(text: &str) -> String {
    let stripped = MARKUP.replace_all(text, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Hex SHA-256 of the normalized text.
#[must_use]
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(normalize(text).as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// A search hit tagged with where it came from, before deduplication.
#[derive(Debug, Clone)]
pub struct EvidenceRecord {
    /// The raw hit.
    pub hit: SearchHit,
    /// Sub-query that produced it.
    pub subquery: String,
    /// Iteration in which it was found.
    pub iteration: u32,
}

/// A deduplicated piece of evidence with a stable citation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvidenceItem {
    citation_id: u32,
    url: String,
    title: String,
    snippet: String,
    subquery: String,
    iteration: u32,
    #[serde(skip)]
    fingerprint: String,
}

impl EvidenceItem {
    /// Citation id, starting at 1.
    #[must_use]
    pub const fn citation_id(&self) -> u32 {
        self.citation_id
    }

    /// Source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Page title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Body text as received.
    #[must_use]
    pub fn snippet(&self) -> &str {
        &self.snippet
    }

    /// Sub-query that first surfaced this content.
    #[must_use]
    pub fn subquery(&self) -> &str {
        &self.subquery
    }

    /// Iteration in which it was first seen.
    #[must_use]
    pub const fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Content fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn prefix(&self) -> String {
        if self.title.is_empty() {
            format!("[{}] ", self.citation_id)
        } else {
            format!("[{}] {} — ", self.citation_id, self.title)
        }
    }

    fn suffix(&self) -> String {
        format!(" ({})", self.url)
    }
}

/// Outcome of inserting one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// New content; a citation id was minted.
    Minted(u32),
    /// Already known under this id.
    Duplicate(u32),
    /// No body text to fingerprint.
    Rejected,
}

/// The session's evidence, in citation order.
#[derive(Debug, Default)]
pub struct EvidenceStore {
    items: Vec<EvidenceItem>,
    by_fingerprint: HashMap<String, u32>,
}

impl EvidenceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts one record.
    pub fn insert(&mut self, record: EvidenceRecord) -> Ingest {
        if normalize(&record.hit.snippet).is_empty() {
            return Ingest::Rejected;
        }
        let fp = fingerprint(&record.hit.snippet);
        if let Some(&id) = self.by_fingerprint.get(&fp) {
            return Ingest::Duplicate(id);
        }

        let id = self.next_id();
        self.by_fingerprint.insert(fp.clone(), id);
        self.items.push(EvidenceItem {
            citation_id: id,
            url: record.hit.url,
            title: record.hit.title.trim().to_string(),
            snippet: record.hit.snippet,
            subquery: record.subquery,
            iteration: record.iteration,
            fingerprint: fp,
        });
        Ingest::Minted(id)
    }

    /// Inserts records in order and returns only the newly minted items.
    pub fn add(&mut self, records: impl IntoIterator<Item = EvidenceRecord>) -> Vec<EvidenceItem> {
        let start = self.items.len();
        for record in records {
            self.insert(record);
        }
        self.items[start..].to_vec()
    }

    /// Every item in citation order.
    #[must_use]
    pub fn all(&self) -> &[EvidenceItem] {
        &self.items
    }

    /// Looks up an item by citation id.
    #[must_use]
    pub fn get(&self, citation_id: u32) -> Option<&EvidenceItem> {
        let index = usize::try_from(citation_id).ok()?.checked_sub(1)?;
        self.items.get(index)
    }

    /// Citation id already assigned to content with this fingerprint.
    #[must_use]
    pub fn citation_for(&self, fingerprint: &str) -> Option<u32> {
        self.by_fingerprint.get(fingerprint).copied()
    }

    /// Highest citation id minted so far (0 when empty).
    #[must_use]
    pub fn max_citation_id(&self) -> u32 {
        self.items.last().map_or(0, EvidenceItem::citation_id)
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn next_id(&self) -> u32 {
        self.max_citation_id() + 1
    }

    /// Renders every item as `[id] title — snippet (url)`, one per line,
    /// within `budget` characters.
    ///
    /// When the full text does not fit, snippet tails are cut at grapheme
    /// boundaries and marked with `…`. Short snippets are kept whole and
    /// the remaining room is shared evenly among longer ones, so no item is
    /// ever dropped. A snippet left with no room is omitted entirely. If
    /// ids, titles and URLs alone exceed the budget, the output may run over.
    #[must_use]
    pub fn render_for_prompt(&self, budget: usize) -> String {
        if self.items.is_empty() {
            return String::new();
        }

        let full: Vec<String> = self
            .items
            .iter()
            .map(|item| format!("{}{}{}", item.prefix(), item.snippet, item.suffix()))
            .collect();
        let newlines = self.items.len() - 1;
        let total: usize = full.iter().map(|l| l.chars().count()).sum::<usize>() + newlines;
        if total <= budget {
            return full.join("\n");
        }

        let fixed: usize = self
            .items
            .iter()
            .map(|item| item.prefix().chars().count() + item.suffix().chars().count())
            .sum::<usize>()
            + newlines;
        let lengths: Vec<usize> = self
            .items
            .iter()
            .map(|item| item.snippet.chars().count())
            .collect();
        let allowances = fair_shares(&lengths, budget.saturating_sub(fixed));

        self.items
            .iter()
            .zip(allowances)
            .map(|(item, allowance)| {
                format!(
                    "{}{}{}",
                    item.prefix(),
                    truncate_graphemes(&item.snippet, allowance),
                    item.suffix()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Splits `available` characters across snippets of the given lengths.
///
/// Snippets shorter than an even share keep their full length; what they
/// leave unused is shared among the rest.
fn fair_shares(lengths: &[usize], available: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..lengths.len()).collect();
    order.sort_by_key(|&i| lengths[i]);

    let mut shares = vec![0; lengths.len()];
    let mut remaining = available;
    for (pos, &i) in order.iter().enumerate() {
        let left = lengths.len() - pos;
        let even = remaining / left;
        let take = lengths[i].min(even);
        shares[i] = take;
        remaining -= take;
    }
    shares
}

/// Cuts `text` to at most `max_chars` characters, ending in `…` when cut.
///
/// With no room at all the result is empty.
fn truncate_graphemes(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let keep = max_chars.saturating_sub(1);
    let mut out = String::new();
    let mut used = 0;
    for g in text.graphemes(true) {
        let n = g.chars().count();
        if used + n > keep {
            break;
        }
        out.push_str(g);
        used += n;
    }
    out.push(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, snippet: &str) -> EvidenceRecord {
        EvidenceRecord {
            hit: SearchHit::new("Title", url, snippet),
            subquery: "sq".to_string(),
            iteration: 1,
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize("<b>Chip</b>   Exports&nbsp;ROSE\n 5%"),
            "chip exports rose 5%"
        );
        assert_eq!(normalize("  <p></p> "), "");
    }

    #[test]
    fn test_fingerprint_ignores_markup_and_case() {
        assert_eq!(
            fingerprint("Chip exports rose"),
            fingerprint("<em>chip</em>  EXPORTS rose")
        );
        assert_ne!(fingerprint("chip exports rose"), fingerprint("chip exports fell"));
        assert_eq!(fingerprint("x").len(), 64);
    }

    #[test]
    fn test_insert_dedups_by_content_not_url() {
        let mut store = EvidenceStore::new();
        assert_eq!(store.insert(record("https://a", "Same text")), Ingest::Minted(1));
        assert_eq!(store.insert(record("https://b", "same  TEXT")), Ingest::Duplicate(1));
        assert_eq!(store.insert(record("https://a", "Different")), Ingest::Minted(2));
        assert_eq!(store.insert(record("https://c", "<br/>")), Ingest::Rejected);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1).map(EvidenceItem::url), Some("https://a"));
        assert_eq!(store.citation_for(&fingerprint("different")), Some(2));
    }

    #[test]
    fn test_add_returns_only_new_items() {
        let mut store = EvidenceStore::new();
        store.insert(record("https://a", "one"));
        let minted = store.add(vec![
            record("https://b", "one"),
            record("https://c", "two"),
            record("https://d", "three"),
        ]);
        let ids: Vec<u32> = minted.iter().map(EvidenceItem::citation_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(store.max_citation_id(), 3);
    }

    #[test]
    fn test_get_out_of_range() {
        let store = EvidenceStore::new();
        assert!(store.get(0).is_none());
        assert!(store.get(1).is_none());
    }

    #[test]
    fn test_render_fits_untouched() {
        let mut store = EvidenceStore::new();
        store.insert(record("https://a", "alpha"));
        store.insert(record("https://b", "beta"));
        let text = store.render_for_prompt(10_000);
        assert_eq!(
            text,
            "[1] Title — alpha (https://a)\n[2] Title — beta (https://b)"
        );
    }

    #[test]
    fn test_render_truncates_long_snippets_and_keeps_all_items() {
        let mut store = EvidenceStore::new();
        store.insert(record("https://a", "short"));
        store.insert(record("https://b", &"长".repeat(500)));
        store.insert(record("https://c", &"x".repeat(500)));

        let budget = 200;
        let text = store.render_for_prompt(budget);
        assert!(text.chars().count() <= budget);
        assert!(text.contains("[1] Title — short (https://a)"));
        assert!(text.contains("[2] "));
        assert!(text.contains("[3] "));
        assert_eq!(text.matches('…').count(), 2);
    }

    #[test]
    fn test_render_empty_store() {
        assert!(EvidenceStore::new().render_for_prompt(100).is_empty());
    }

    #[test]
    fn test_fair_shares() {
        assert_eq!(fair_shares(&[2, 100, 100], 42), vec![2, 20, 20]);
        assert_eq!(fair_shares(&[5, 5], 100), vec![5, 5]);
        assert_eq!(fair_shares(&[10, 10], 0), vec![0, 0]);
    }

    #[test]
    fn test_truncate_keeps_grapheme_clusters() {
        let text = "e\u{301}e\u{301}e\u{301}";
        let cut = truncate_graphemes(text, 3);
        assert_eq!(cut, "e\u{301}…");
        assert_eq!(truncate_graphemes("abc", 3), "abc");
        assert_eq!(truncate_graphemes("abc", 1), "…");
        assert_eq!(truncate_graphemes("abc", 0), "");
    }

    #[test]
    fn test_render_budget_barely_above_fixed_parts() {
        let mut store = EvidenceStore::new();
        for i in 0..3 {
            store.insert(EvidenceRecord {
                hit: SearchHit::new("T", format!("u{i}"), format!("{i}{}", "s".repeat(100))),
                subquery: "sq".to_string(),
                iteration: 1,
            });
        }
        // "[n] T — " + " (un)" per item plus two newlines.
        let fixed = 3 * ("[1] T — ".chars().count() + " (u0)".chars().count()) + 2;

        for extra in 0..6 {
            let budget = fixed + extra;
            let text = store.render_for_prompt(budget);
            assert!(
                text.chars().count() <= budget,
                "budget {budget}: {text:?}"
            );
            for id in 1..=3 {
                assert!(text.contains(&format!("[{id}] T — ")), "{text:?}");
            }
        }
    }
}
