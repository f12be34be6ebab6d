//! Web search backend abstraction.
//!
//! A [`SearchClient`] turns one sub-query into zero or more
//! [`SearchHit`]s. Hits without a URL or without any body text are
//! discarded by the adapter, so every hit reaching the research loop has
//! something to fingerprint.

pub mod bocha;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ResearchConfig;
use crate::error::{ConfigError, SearchError};

pub use bocha::BochaClient;

/// One result returned by a search backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Page title; may be empty.
    pub title: String,
    /// Source URL.
    pub url: String,
    /// Body text (summary or snippet).
    pub snippet: String,
}

impl SearchHit {
    /// Convenience constructor.
    #[must_use]
    pub fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}

/// Trait for web search backends.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Backend name (e.g., `"bocha"`).
    fn name(&self) -> &'static str;

    /// Runs one search.
    ///
    /// An empty vector is a valid answer.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] when the backend cannot be reached or
    /// answers with an error.
    async fn query(&self, text: &str) -> Result<Vec<SearchHit>, SearchError>;
}

/// Creates the configured search backend.
///
/// # Errors
///
/// Returns [`ConfigError::MissingApiKey`] when no search key is set.
pub fn create_search_client(config: &ResearchConfig) -> Result<Arc<dyn SearchClient>, ConfigError> {
    Ok(Arc::new(BochaClient::new(config)?))
}
