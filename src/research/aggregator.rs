//! Concurrent search fan-out.
//!
//! Every sub-query of an iteration is searched in its own task. Results
//! come back in sub-query order regardless of completion order, so citation
//! ids minted from them are deterministic for a given set of answers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::evidence::{EvidenceRecord, EvidenceStore, Ingest};
use super::session::SubQuery;
use crate::config::ResearchConfig;
use crate::error::{ResearchError, SearchError};
use crate::search::{SearchClient, SearchHit};

/// Outcome of one sub-query.
#[derive(Debug, Clone)]
pub struct SubQueryResult {
    /// The sub-query searched.
    pub subquery: SubQuery,
    /// Hits, or why there are none.
    pub outcome: Result<Vec<SearchHit>, SearchError>,
}

/// Counts from merging one iteration's results into the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Newly minted evidence items.
    pub minted: usize,
    /// Hits whose content was already known.
    pub duplicates: usize,
    /// One notice per sub-query that produced nothing.
    pub skipped: Vec<ResearchError>,
}

/// Runs sub-queries against a search backend.
#[derive(Clone)]
pub struct SearchAggregator {
    client: Arc<dyn SearchClient>,
    timeout: Duration,
    request_delay: Duration,
}

impl SearchAggregator {
    /// Wraps a search backend with the configured per-call deadline and
    /// pacing delay.
    #[must_use]
    pub fn new(client: Arc<dyn SearchClient>, config: &ResearchConfig) -> Self {
        Self {
            client,
            timeout: config.search_timeout,
            request_delay: config.request_delay,
        }
    }

    /// Searches every sub-query concurrently.
    ///
    /// Returns one result per sub-query in input order. If `cancel` fires
    /// or the future is dropped, outstanding searches are aborted; a
    /// cancelled fan-out returns an empty vector.
    pub async fn search(
        &self,
        subqueries: &[SubQuery],
        cancel: &CancellationToken,
    ) -> Vec<SubQueryResult> {
        // One slot per sub-query: an iteration's searches all run at once.
        let semaphore = Arc::new(Semaphore::new(subqueries.len().max(1)));
        let mut handles = Vec::with_capacity(subqueries.len());

        for sq in subqueries {
            if cancel.is_cancelled() {
                break;
            }
            let sem = Arc::clone(&semaphore);
            let client = Arc::clone(&self.client);
            let text = sq.text().to_string();
            let timeout = self.timeout;
            let request_delay = self.request_delay;

            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire().await.map_err(|e| SearchError::Unavailable {
                    message: format!("semaphore closed: {e}"),
                    status: None,
                })?;

                if !request_delay.is_zero() {
                    tokio::time::sleep(request_delay).await;
                }

                tokio::time::timeout(timeout, client.query(&text))
                    .await
                    .map_err(|_| SearchError::Timeout {
                        secs: timeout.as_secs(),
                    })?
            }));
        }

        let _abort = AbortOnDrop(handles.iter().map(|h| h.abort_handle()).collect());
        let mut results = Vec::with_capacity(subqueries.len());
        let mut pending = handles.into_iter();
        for sq in subqueries {
            let Some(mut handle) = pending.next() else {
                break;
            };
            let outcome = tokio::select! {
                joined = &mut handle => joined.unwrap_or_else(|e| Err(SearchError::Unavailable {
                    message: format!("search task failed: {e}"),
                    status: None,
                })),
                () = cancel.cancelled() => {
                    debug!("search fan-out cancelled");
                    return Vec::new();
                }
            };
            if let Err(e) = &outcome {
                warn!(subquery = sq.text(), error = %e, "search failed");
            }
            results.push(SubQueryResult {
                subquery: sq.clone(),
                outcome,
            });
        }

        results
    }
}

/// Aborts outstanding searches when the fan-out is cancelled or dropped.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for SearchAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchAggregator")
            .field("client", &self.client.name())
            .field("timeout", &self.timeout)
            .field("request_delay", &self.request_delay)
            .finish()
    }
}

/// Merges search results into the store in sub-query order.
///
/// Sub-queries that failed or returned no hits each yield a
/// [`ResearchError::SearchSkipped`] notice.
pub fn ingest(store: &mut EvidenceStore, results: Vec<SubQueryResult>, iteration: u32) -> IngestReport {
    let mut report = IngestReport::default();

    for result in results {
        let subquery = result.subquery.text().to_string();
        let hits = match result.outcome {
            Ok(hits) if hits.is_empty() => {
                report.skipped.push(ResearchError::SearchSkipped {
                    subquery,
                    reason: "no results".to_string(),
                });
                continue;
            }
            Ok(hits) => hits,
            Err(e) => {
                report.skipped.push(ResearchError::SearchSkipped {
                    subquery,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        for hit in hits {
            let record = EvidenceRecord {
                hit,
                subquery: subquery.clone(),
                iteration,
            };
            match store.insert(record) {
                Ingest::Minted(_) => report.minted += 1,
                Ingest::Duplicate(_) => report.duplicates += 1,
                Ingest::Rejected => {}
            }
        }
    }

    debug!(
        minted = report.minted,
        duplicates = report.duplicates,
        skipped = report.skipped.len(),
        total = store.len(),
        "evidence merged"
    );
    report
}
