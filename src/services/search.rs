use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::clients::{ProviderError, TranslatorError};
use crate::db::Store;
use crate::entities::{search_queries, search_results};
use crate::services::execution::{ExecutionEngine, ExecutionSummary};
use crate::services::generator::QueryGenerator;

/// Resolved caller identity, passed explicitly into every core operation.
/// There is no ambient session state below the HTTP layer.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub user_id: i32,
    pub is_admin: bool,
}

/// Domain errors for the search core. Every variant maps to exactly one
/// HTTP status at the API boundary.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Search query {0} not found")]
    QueryNotFound(i32),

    #[error("Search result {0} not found")]
    ResultNotFound(i32),

    #[error("Not authorized to delete search query {0}")]
    Forbidden(i32),

    #[error("Query translation unavailable: {0}")]
    TranslationUnavailable(String),

    #[error("Search provider timed out")]
    ProviderTimeout,

    #[error("Search provider error: {0}")]
    Provider(String),

    #[error("An execution is already running for search query {0}")]
    ExecutionInProgress(i32),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for SearchError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<TranslatorError> for SearchError {
    fn from(err: TranslatorError) -> Self {
        Self::TranslationUnavailable(err.to_string())
    }
}

impl From<ProviderError> for SearchError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Timeout => Self::ProviderTimeout,
            other => Self::Provider(other.to_string()),
        }
    }
}

/// Orchestrates generate → execute and serves the read/mutation surface for
/// queries and their results, enforcing ownership uniformly: a query that is
/// invisible to the caller reads as absent, and only delete distinguishes
/// `Forbidden`.
pub struct SearchService {
    store: Store,
    generator: QueryGenerator,
    engine: Arc<ExecutionEngine>,
}

impl SearchService {
    #[must_use]
    pub fn new(store: Store, generator: QueryGenerator, engine: Arc<ExecutionEngine>) -> Self {
        Self {
            store,
            generator,
            engine,
        }
    }

    const fn can_view(query: &search_queries::Model, caller: Identity) -> bool {
        caller.is_admin || query.created_user_id == caller.user_id
    }

    /// Resolve a query the caller is allowed to see; invisible rows read as
    /// absent so existence never leaks to other users.
    async fn visible_query(
        &self,
        id: i32,
        caller: Identity,
    ) -> Result<search_queries::Model, SearchError> {
        let query = self
            .store
            .get_query(id)
            .await?
            .ok_or(SearchError::QueryNotFound(id))?;

        if !Self::can_view(&query, caller) {
            return Err(SearchError::QueryNotFound(id));
        }

        Ok(query)
    }

    pub async fn generate(
        &self,
        caller: Identity,
        text: &str,
    ) -> Result<search_queries::Model, SearchError> {
        self.generator.generate(caller, text).await
    }

    /// Execution is not ownership-restricted: any authenticated caller may
    /// run an existing query.
    pub async fn execute(
        &self,
        query_id: i32,
        caller: Identity,
    ) -> Result<ExecutionSummary, SearchError> {
        self.engine.execute(query_id, caller).await
    }

    /// Generate and immediately run. A generate failure leaves nothing
    /// behind; an execute failure still leaves the generated query
    /// persisted, with the execution error surfaced alongside it.
    pub async fn generate_and_execute(
        &self,
        caller: Identity,
        text: &str,
    ) -> Result<(search_queries::Model, Result<ExecutionSummary, SearchError>), SearchError> {
        let query = self.generator.generate(caller, text).await?;

        let execution = self.engine.execute(query.id, caller).await;
        if let Err(e) = &execution {
            warn!(query_id = query.id, error = %e, "Execution failed after generate");
        }

        // Re-read so the returned query reflects last_search_date when the
        // run succeeded.
        let query = self
            .store
            .get_query(query.id)
            .await?
            .ok_or(SearchError::QueryNotFound(query.id))?;

        Ok((query, execution))
    }

    /// Create a new query from an existing one plus refinement
    /// instructions. The source query must be visible to the caller.
    pub async fn refine(
        &self,
        caller: Identity,
        query_id: i32,
        instructions: &str,
    ) -> Result<search_queries::Model, SearchError> {
        let original = self.visible_query(query_id, caller).await?;
        self.generator.refine(caller, &original, instructions).await
    }

    /// Owner-scoped listing for regular users; admins see everything.
    pub async fn list_queries(
        &self,
        caller: Identity,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<search_queries::Model>, SearchError> {
        let rows = if caller.is_admin {
            self.store.list_queries(skip, limit).await?
        } else {
            self.store
                .list_queries_for_user(caller.user_id, skip, limit)
                .await?
        };

        Ok(rows)
    }

    pub async fn get_query(
        &self,
        caller: Identity,
        query_id: i32,
    ) -> Result<search_queries::Model, SearchError> {
        self.visible_query(query_id, caller).await
    }

    /// One page of a query's results plus the total stored count.
    pub async fn list_results(
        &self,
        caller: Identity,
        query_id: i32,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<search_results::Model>, u64), SearchError> {
        self.visible_query(query_id, caller).await?;

        let page = self.store.results_page(query_id, skip, limit).await?;
        Ok(page)
    }

    /// Delete a query and cascade its results. Owner or admin only; a
    /// visible-but-unowned query is the one place `Forbidden` applies.
    pub async fn delete_query(&self, caller: Identity, query_id: i32) -> Result<(), SearchError> {
        let query = self
            .store
            .get_query(query_id)
            .await?
            .ok_or(SearchError::QueryNotFound(query_id))?;

        if !Self::can_view(&query, caller) {
            return Err(SearchError::Forbidden(query_id));
        }

        self.store.delete_query_cascade(query_id).await?;

        info!(query_id, "Deleted search query and its results");

        Ok(())
    }

    /// Stamp a result as enriched. Re-stamping is allowed and overwrites
    /// the previous timestamp.
    pub async fn mark_result_enriched(
        &self,
        caller: Identity,
        result_id: i32,
    ) -> Result<search_results::Model, SearchError> {
        let result = self
            .store
            .get_result(result_id)
            .await?
            .ok_or(SearchError::ResultNotFound(result_id))?;

        self.visible_query(result.search_query_id, caller)
            .await
            .map_err(|_| SearchError::ResultNotFound(result_id))?;

        let enriched_at = chrono::Utc::now().to_rfc3339();
        let updated = self
            .store
            .mark_result_enriched(result_id, &enriched_at)
            .await?
            .ok_or(SearchError::ResultNotFound(result_id))?;

        Ok(updated)
    }

    /// Resolve the query backing an export; the exporter itself streams.
    pub async fn query_for_export(
        &self,
        caller: Identity,
        query_id: i32,
    ) -> Result<search_queries::Model, SearchError> {
        self.visible_query(query_id, caller).await
    }
}
