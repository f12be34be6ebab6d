//! Lightweight numeric and keyword scan over gathered evidence.
//!
//! The scan gives the report writer rough figures to mention alongside
//! the evidence. It runs only once enough items exist to make the numbers
//! meaningful.

use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::evidence::EvidenceItem;

/// Fewest evidence items for which a scan is included in the report prompt.
pub const MIN_ITEMS_FOR_SCAN: usize = 4;
/// Keywords listed in the summary.
const TOP_KEYWORDS: usize = 5;

#[allow(clippy::expect_used)]
static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+(?:,\d{3})*(?:\.\d+)?").expect("number pattern is valid")
});

#[allow(clippy::expect_used)]
static PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([+-]?\d+(?:\.\d+)?)\s*[%％]").expect("percent pattern is valid")
});

/// Min, max and mean of a set of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    /// Number of values.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
}

impl Stats {
    fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        #[allow(clippy::cast_precision_loss)]
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(Self {
            count: values.len(),
            mean,
            min,
            max,
        })
    }
}

/// Result of scanning evidence text.
#[derive(Debug, Clone, PartialEq)]
pub struct DataScan {
    /// Statistics over every number found.
    pub numbers: Option<Stats>,
    /// Statistics over percentages.
    pub percentages: Option<Stats>,
    /// Most frequent profile keywords with their counts.
    pub keywords: Vec<(String, usize)>,
    keywords_configured: bool,
}

impl DataScan {
    /// Scans the given texts for numbers, percentages and keyword hits.
    #[must_use]
    pub fn scan<'a>(texts: impl IntoIterator<Item = &'a str>, keywords: &[String]) -> Self {
        let full = texts.into_iter().collect::<Vec<_>>().join(" ");

        let numbers: Vec<f64> = NUMBER
            .find_iter(&full)
            .filter_map(|m| m.as_str().replace(',', "").parse().ok())
            .collect();
        let percentages: Vec<f64> = PERCENT
            .captures_iter(&full)
            .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse().ok()))
            .collect();

        let lower = full.to_lowercase();
        let mut counts: Vec<(String, usize)> = keywords
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| (k.clone(), lower.matches(&k.to_lowercase()).count()))
            .filter(|(_, n)| *n > 0)
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(TOP_KEYWORDS);

        debug!(
            numbers = numbers.len(),
            percentages = percentages.len(),
            keywords = counts.len(),
            "data scan"
        );

        Self {
            numbers: Stats::of(&numbers),
            percentages: Stats::of(&percentages),
            keywords: counts,
            keywords_configured: !keywords.is_empty(),
        }
    }

    /// Scans the snippets of the given evidence.
    #[must_use]
    pub fn of_evidence(items: &[EvidenceItem], keywords: &[String]) -> Self {
        Self::scan(items.iter().map(EvidenceItem::snippet), keywords)
    }

    /// Whether the scan found anything worth reporting.
    #[must_use]
    pub fn found_anything(&self) -> bool {
        self.numbers.is_some() || self.percentages.is_some() || !self.keywords.is_empty()
    }

    /// Renders the scan as a prompt section, or `None` when nothing was found.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        if !self.found_anything() {
            return None;
        }

        let mut out = String::from("\n数据扫描摘要（基于上述文本的初步扫描，仅供参考）：\n");
        match self.numbers {
            Some(s) => {
                let _ = writeln!(
                    out,
                    "- 扫描到 {} 个数值，平均值 {:.2}，最小值 {:.2}，最大值 {:.2}",
                    s.count, s.mean, s.min, s.max
                );
            }
            None => out.push_str("- 未扫描到可用于统计的数值\n"),
        }
        match self.percentages {
            Some(s) => {
                let _ = writeln!(
                    out,
                    "- 扫描到 {} 个百分比，平均值 {:.2}%，最小值 {:.2}%，最大值 {:.2}%",
                    s.count, s.mean, s.min, s.max
                );
            }
            None => out.push_str("- 未扫描到百分比\n"),
        }
        if !self.keywords.is_empty() {
            let listed: Vec<String> = self
                .keywords
                .iter()
                .map(|(k, n)| format!("{k}({n})"))
                .collect();
            let _ = writeln!(out, "- 主要关键词频率：{}", listed.join("，"));
        } else if self.keywords_configured {
            out.push_str("- 未扫描到相关关键词\n");
        }
        Some(out)
    }
}

/// Data-scan section for the report prompt, empty when too little
/// evidence exists or nothing was found.
#[must_use]
pub fn analysis_section(items: &[EvidenceItem], keywords: &[String]) -> String {
    if items.len() < MIN_ITEMS_FOR_SCAN {
        return String::new();
    }
    DataScan::of_evidence(items, keywords)
        .summary()
        .unwrap_or_default()
}
