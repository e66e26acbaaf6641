use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clients::{ProviderError, ResultItem, SearchPage, SearchProvider};
use crate::db::Store;
use crate::services::search::{Identity, SearchError};

#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Cap on stored results per run, before the provider's own ceiling.
    pub max_results: u32,

    /// Attempts per page before the run is truncated.
    pub retry_attempts: u32,

    /// Base backoff between attempts; doubles per retry.
    pub retry_backoff_ms: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_results: 100,
            retry_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    pub search_query_id: i32,
    pub results_count: u64,
    pub search_timestamp: String,
}

/// Drives the search provider across pages for one query, deduplicates the
/// concatenated page set by link, and persists the batch. At most one run
/// per query is in flight at a time.
pub struct ExecutionEngine {
    store: Store,
    provider: Arc<dyn SearchProvider>,
    settings: ExecutionSettings,
    in_flight: Mutex<HashSet<i32>>,
}

/// Marks a query as running; dropping it releases the slot, including on
/// early returns and panics.
struct RunPermit<'a> {
    engine: &'a ExecutionEngine,
    query_id: i32,
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        self.engine
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.query_id);
    }
}

impl ExecutionEngine {
    #[must_use]
    pub fn new(store: Store, provider: Arc<dyn SearchProvider>, settings: ExecutionSettings) -> Self {
        Self {
            store,
            provider,
            settings,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn begin_run(&self, query_id: i32) -> Result<RunPermit<'_>, SearchError> {
        let mut running = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !running.insert(query_id) {
            return Err(SearchError::ExecutionInProgress(query_id));
        }

        Ok(RunPermit {
            engine: self,
            query_id,
        })
    }

    /// Run the query against the provider and persist this run's candidates.
    ///
    /// Results are additive across runs: nothing from earlier runs is
    /// deleted or merged, and `results_count` covers only this run. A page
    /// that keeps failing after the retry budget truncates the run; pages
    /// fetched before it are kept. Only a failure on the very first page
    /// (nothing fetched, nothing persisted) surfaces as an error.
    pub async fn execute(
        &self,
        query_id: i32,
        caller: Identity,
    ) -> Result<ExecutionSummary, SearchError> {
        let query = self
            .store
            .get_query(query_id)
            .await?
            .ok_or(SearchError::QueryNotFound(query_id))?;

        let _permit = self.begin_run(query_id)?;

        let run_started = chrono::Utc::now().to_rfc3339();

        let fetched = self.fetch_all(&query.generated_query).await?;
        let candidates = dedupe_by_link(fetched);

        let results_count = self
            .store
            .insert_result_batch(query_id, &candidates, caller.user_id, &run_started)
            .await?;

        self.store
            .touch_query_last_run(query_id, caller.user_id, &run_started)
            .await?;

        info!(query_id, results = results_count, "Search run complete");

        Ok(ExecutionSummary {
            search_query_id: query_id,
            results_count,
            search_timestamp: run_started,
        })
    }

    async fn fetch_all(&self, query: &str) -> Result<Vec<ResultItem>, SearchError> {
        let page_size = self.provider.page_size();
        let cap = self.settings.max_results.min(self.provider.result_ceiling()) as usize;

        let mut items: Vec<ResultItem> = Vec::new();
        let mut offset = 0u32;

        while items.len() < cap {
            match self.fetch_page_with_retry(query, offset).await {
                Ok(page) => {
                    let fetched = page.items.len();
                    items.extend(page.items);
                    if !page.has_more || fetched == 0 {
                        break;
                    }
                    offset += page_size;
                }
                Err(e) if items.is_empty() => return Err(e.into()),
                Err(e) => {
                    warn!(offset, error = %e, "Page failed after retry budget, truncating run");
                    break;
                }
            }
        }

        items.truncate(cap);
        Ok(items)
    }

    async fn fetch_page_with_retry(
        &self,
        query: &str,
        offset: u32,
    ) -> Result<SearchPage, ProviderError> {
        let mut attempt = 0u32;

        loop {
            match self.provider.fetch_page(query, offset).await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.settings.retry_attempts.max(1) || !e.is_transient() {
                        return Err(e);
                    }

                    let backoff = Duration::from_millis(
                        self.settings.retry_backoff_ms << (attempt - 1).min(6),
                    );
                    warn!(offset, attempt, error = %e, "Provider page failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Drop repeated links, keeping the first occurrence in page order. Items
/// without a link are kept as-is.
fn dedupe_by_link(items: Vec<ResultItem>) -> Vec<ResultItem> {
    let mut seen: HashSet<String> = HashSet::new();

    items
        .into_iter()
        .filter(|item| item.link.is_empty() || seen.insert(item.link.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn item(n: usize) -> ResultItem {
        ResultItem {
            title: format!("Profile {n}"),
            link: format!("https://linkedin.com/in/profile-{n}"),
            snippet: format!("Snippet for profile {n}"),
            display_domain: "linkedin.com".to_string(),
        }
    }

    /// Serves `total` distinct items in pages of 10, optionally repeating
    /// the first item on every page and failing pages past `fail_after`.
    struct FakeProvider {
        total: usize,
        repeat_first: bool,
        fail_from_offset: Option<u32>,
        transient_failures: AtomicU32,
        delay: Option<Duration>,
    }

    impl FakeProvider {
        fn with_total(total: usize) -> Self {
            Self {
                total,
                repeat_first: false,
                fail_from_offset: None,
                transient_failures: AtomicU32::new(0),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl SearchProvider for FakeProvider {
        fn page_size(&self) -> u32 {
            10
        }

        fn result_ceiling(&self) -> u32 {
            1000
        }

        async fn fetch_page(&self, _query: &str, offset: u32) -> Result<SearchPage, ProviderError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if self.transient_failures.load(Ordering::SeqCst) > 0 {
                self.transient_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ProviderError::Timeout);
            }

            if let Some(fail_from) = self.fail_from_offset
                && offset >= fail_from
            {
                return Err(ProviderError::Decode("malformed page".to_string()));
            }

            let start = offset as usize;
            let end = (start + 10).min(self.total);
            let mut items: Vec<ResultItem> = (start..end).map(item).collect();

            if self.repeat_first && offset > 0 && !items.is_empty() {
                items[0] = item(0);
            }

            Ok(SearchPage {
                has_more: end < self.total,
                items,
            })
        }
    }

    async fn engine_with(provider: FakeProvider, settings: ExecutionSettings) -> (ExecutionEngine, Store) {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let engine = ExecutionEngine::new(store.clone(), Arc::new(provider), settings);
        (engine, store)
    }

    async fn seed_query(store: &Store) -> i32 {
        store
            .create_query(
                "Python developers in Bangalore with AWS experience",
                "site:linkedin.com/in python bangalore aws",
                1,
            )
            .await
            .unwrap()
            .id
    }

    fn caller() -> Identity {
        Identity {
            user_id: 1,
            is_admin: true,
        }
    }

    #[test]
    fn dedupe_keeps_first_seen_order() {
        let items = vec![item(1), item(2), item(1), item(3), item(2)];
        let deduped = dedupe_by_link(items);
        assert_eq!(deduped, vec![item(1), item(2), item(3)]);
    }

    #[test]
    fn dedupe_keeps_linkless_items() {
        let mut a = item(1);
        a.link.clear();
        let mut b = item(2);
        b.link.clear();

        let deduped = dedupe_by_link(vec![a.clone(), b.clone()]);
        assert_eq!(deduped.len(), 2);
    }

    #[tokio::test]
    async fn run_stores_deduplicated_page_set() {
        let settings = ExecutionSettings {
            max_results: 200,
            ..Default::default()
        };
        let (engine, store) = engine_with(FakeProvider::with_total(124), settings).await;
        let query_id = seed_query(&store).await;

        let summary = engine.execute(query_id, caller()).await.unwrap();

        assert_eq!(summary.results_count, 124);
        assert_eq!(store.count_results_for_query(query_id).await.unwrap(), 124);

        let query = store.get_query(query_id).await.unwrap().unwrap();
        assert_eq!(query.last_search_date, Some(summary.search_timestamp));
        assert_eq!(query.last_run_user_id, Some(1));
    }

    #[tokio::test]
    async fn duplicate_links_across_pages_collapse_within_run() {
        let provider = FakeProvider {
            repeat_first: true,
            ..FakeProvider::with_total(30)
        };
        let settings = ExecutionSettings {
            max_results: 200,
            ..Default::default()
        };
        let (engine, store) = engine_with(provider, settings).await;
        let query_id = seed_query(&store).await;

        let summary = engine.execute(query_id, caller()).await.unwrap();

        // Pages 2 and 3 each repeat item 0, so two of 30 collapse.
        assert_eq!(summary.results_count, 28);
    }

    #[tokio::test]
    async fn reruns_are_additive() {
        let settings = ExecutionSettings {
            max_results: 50,
            ..Default::default()
        };
        let (engine, store) = engine_with(FakeProvider::with_total(25), settings).await;
        let query_id = seed_query(&store).await;

        engine.execute(query_id, caller()).await.unwrap();
        engine.execute(query_id, caller()).await.unwrap();

        assert_eq!(store.count_results_for_query(query_id).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn max_results_caps_the_run() {
        let settings = ExecutionSettings {
            max_results: 15,
            ..Default::default()
        };
        let (engine, store) = engine_with(FakeProvider::with_total(124), settings).await;
        let query_id = seed_query(&store).await;

        let summary = engine.execute(query_id, caller()).await.unwrap();
        assert_eq!(summary.results_count, 15);
    }

    #[tokio::test]
    async fn missing_query_is_not_found() {
        let (engine, _store) =
            engine_with(FakeProvider::with_total(10), ExecutionSettings::default()).await;

        let err = engine.execute(999, caller()).await.unwrap_err();
        assert!(matches!(err, SearchError::QueryNotFound(999)));
    }

    #[tokio::test]
    async fn first_page_failure_persists_nothing() {
        let provider = FakeProvider {
            fail_from_offset: Some(0),
            ..FakeProvider::with_total(50)
        };
        let (engine, store) = engine_with(provider, ExecutionSettings::default()).await;
        let query_id = seed_query(&store).await;

        let err = engine.execute(query_id, caller()).await.unwrap_err();
        assert!(matches!(err, SearchError::Provider(_)));

        assert_eq!(store.count_results_for_query(query_id).await.unwrap(), 0);
        let query = store.get_query(query_id).await.unwrap().unwrap();
        assert!(query.last_search_date.is_none());
    }

    #[tokio::test]
    async fn later_page_failure_truncates_but_keeps_fetched_pages() {
        let provider = FakeProvider {
            fail_from_offset: Some(20),
            ..FakeProvider::with_total(50)
        };
        let (engine, store) = engine_with(provider, ExecutionSettings::default()).await;
        let query_id = seed_query(&store).await;

        let summary = engine.execute(query_id, caller()).await.unwrap();

        assert_eq!(summary.results_count, 20);
        let query = store.get_query(query_id).await.unwrap().unwrap();
        assert!(query.last_search_date.is_some());
    }

    #[tokio::test]
    async fn transient_errors_are_retried_within_budget() {
        let provider = FakeProvider {
            transient_failures: AtomicU32::new(2),
            ..FakeProvider::with_total(10)
        };
        let settings = ExecutionSettings {
            retry_attempts: 3,
            retry_backoff_ms: 1,
            max_results: 50,
        };
        let (engine, store) = engine_with(provider, settings).await;
        let query_id = seed_query(&store).await;

        let summary = engine.execute(query_id, caller()).await.unwrap();
        assert_eq!(summary.results_count, 10);
    }

    #[tokio::test]
    async fn second_concurrent_run_is_rejected() {
        let provider = FakeProvider {
            delay: Some(Duration::from_millis(200)),
            ..FakeProvider::with_total(10)
        };
        let settings = ExecutionSettings {
            max_results: 50,
            ..Default::default()
        };
        let (engine, store) = engine_with(provider, settings).await;
        let query_id = seed_query(&store).await;
        let engine = Arc::new(engine);

        let first = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.execute(query_id, caller()).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = engine.execute(query_id, caller()).await;

        assert!(matches!(
            second.unwrap_err(),
            SearchError::ExecutionInProgress(id) if id == query_id
        ));

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.results_count, 10);

        // Slot is released once the first run finishes.
        let third = engine.execute(query_id, caller()).await.unwrap();
        assert_eq!(third.results_count, 10);
    }
}
