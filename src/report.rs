//! Report persistence.
//!
//! The research core never touches the filesystem; callers hand a finished
//! report to a [`ReportSink`]. [`FileReportStore`] writes plain-text files
//! named after the profile prefix and a sanitised form of the query.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::info;

use crate::error::ReportError;
use crate::profile::{IndustryProfile, ProfileRegistry};

/// Characters of the query kept in a file name.
const QUERY_CHARS_IN_NAME: usize = 30;

#[allow(clippy::expect_used)]
static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("unsafe-char pattern is valid"));

#[allow(clippy::expect_used)]
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]+").expect("separator pattern is valid"));

/// Destination for finished reports.
pub trait ReportSink: Send + Sync {
    /// Persists a report and returns where it went.
    ///
    /// # Errors
    ///
    /// Returns a [`ReportError`] when the profile is unknown, the content is
    /// blank, or the write fails.
    fn save(&self, query: &str, profile_id: &str, content: &str) -> Result<PathBuf, ReportError>;
}

/// Writes reports as text files into one directory.
#[derive(Debug, Clone)]
pub struct FileReportStore {
    dir: PathBuf,
    profiles: Arc<ProfileRegistry>,
}

impl FileReportStore {
    /// Creates a store writing into `dir`, created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, profiles: Arc<ProfileRegistry>) -> Self {
        Self {
            dir: dir.into(),
            profiles,
        }
    }

    /// Target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a new report: `<prefix><query>_<8 hex>.txt`.
    #[must_use]
    pub fn file_name(profile: &IndustryProfile, query: &str) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "{}{}_{}.txt",
            profile.filename_prefix,
            sanitize_query(query),
            &id[..8]
        )
    }
}

impl ReportSink for FileReportStore {
    fn save(&self, query: &str, profile_id: &str, content: &str) -> Result<PathBuf, ReportError> {
        let profile = self
            .profiles
            .get(profile_id)
            .ok_or_else(|| ReportError::UnknownProfile {
                id: profile_id.to_string(),
            })?;
        if content.trim().is_empty() {
            return Err(ReportError::EmptyContent);
        }

        std::fs::create_dir_all(&self.dir).map_err(|source| ReportError::Write {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(Self::file_name(&profile, query));
        let body = format!("{}{content}", header(&profile, query));
        std::fs::write(&path, body).map_err(|source| ReportError::Write {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), bytes = content.len(), "report saved");
        Ok(path)
    }
}

/// Query text made safe for a file name.
#[must_use]
pub fn sanitize_query(query: &str) -> String {
    let head: String = query.chars().take(QUERY_CHARS_IN_NAME).collect();
    let cleaned = UNSAFE_CHARS.replace_all(&head, "");
    SEPARATORS.replace_all(cleaned.trim(), "_").into_owned()
}

fn header(profile: &IndustryProfile, query: &str) -> String {
    let rule = "=".repeat(10);
    format!(
        "分析主题：{}\n分析问题：{query}\n\n{rule} 分析报告 {rule}\n\n",
        profile.name
    )
}
