//! Bocha web-search adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{SearchClient, SearchHit};
use crate::config::ResearchConfig;
use crate::error::{ConfigError, SearchError};

#[derive(Debug, Serialize)]
struct BochaRequest<'a> {
    query: &'a str,
    summary: bool,
    count: usize,
    page: u32,
}

#[derive(Debug, Default, Deserialize)]
struct BochaResponse {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<BochaData>,
}

#[derive(Debug, Default, Deserialize)]
struct BochaData {
    #[serde(rename = "webPages", default)]
    web_pages: Option<WebPages>,
}

#[derive(Debug, Default, Deserialize)]
struct WebPages {
    #[serde(default)]
    value: Option<Vec<WebPage>>,
}

#[derive(Debug, Default, Deserialize)]
struct WebPage {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

impl WebPage {
    /// Keeps pages that have a URL and some body text, preferring the
    /// longer summary over the snippet.
    fn into_hit(self) -> Option<SearchHit> {
        let url = self.url.filter(|u| !u.trim().is_empty())?;
        let body = self
            .summary
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.snippet.filter(|s| !s.trim().is_empty()))?;
        Some(SearchHit {
            title: self.name.unwrap_or_default(),
            url,
            snippet: body,
        })
    }
}

/// Client for the Bocha web-search API.
pub struct BochaClient {
    http: reqwest::Client,
    endpoint: String,
    authorization: String,
    count: usize,
    timeout_secs: u64,
}

impl BochaClient {
    /// Creates a client from research configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingApiKey`] if no search key is set, or
    /// [`ConfigError::InvalidValue`] if the HTTP client cannot be built.
    pub fn new(config: &ResearchConfig) -> Result<Self, ConfigError> {
        let key = config
            .search_api_key
            .as_deref()
            .ok_or(ConfigError::MissingApiKey {
                backend: "search",
                vars: "BOCHAAI_API_KEY or DELVE_SEARCH_API_KEY",
            })?;

        let http = reqwest::Client::builder()
            .timeout(config.search_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "search_url",
                message: e.to_string(),
            })?;

        let authorization = if key.starts_with("Bearer ") {
            key.to_string()
        } else {
            format!("Bearer {key}")
        };

        Ok(Self {
            http,
            endpoint: config.search_url.clone(),
            authorization,
            count: config.search_results,
            timeout_secs: config.search_timeout.as_secs(),
        })
    }

    fn parse(query: &str, body: BochaResponse) -> Result<Vec<SearchHit>, SearchError> {
        if let Some(code) = body.code.filter(|&c| c != 200) {
            return Err(SearchError::Unavailable {
                message: body.msg.unwrap_or_else(|| format!("backend returned code {code}")),
                status: u16::try_from(code).ok(),
            });
        }

        let Some(pages) = body
            .data
            .and_then(|d| d.web_pages)
            .and_then(|w| w.value)
        else {
            warn!(query, "search response has no result list");
            return Ok(Vec::new());
        };

        let total = pages.len();
        let hits: Vec<SearchHit> = pages.into_iter().filter_map(WebPage::into_hit).collect();
        debug!(query, total, usable = hits.len(), "search results");
        Ok(hits)
    }
}

impl std::fmt::Debug for BochaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BochaClient")
            .field("endpoint", &self.endpoint)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SearchClient for BochaClient {
    fn name(&self) -> &'static str {
        "bocha"
    }

    async fn query(&self, text: &str) -> Result<Vec<SearchHit>, SearchError> {
        let payload = BochaRequest {
            query: text,
            summary: true,
            count: self.count,
            page: 1,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", &self.authorization)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    SearchError::Unavailable {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::Unavailable {
                message: text.chars().take(200).collect(),
                status: Some(status.as_u16()),
            });
        }

        let body: BochaResponse = response.json().await.map_err(|e| SearchError::Unavailable {
            message: format!("invalid response body: {e}"),
            status: Some(status.as_u16()),
        })?;

        Self::parse(text, body)
    }
}
