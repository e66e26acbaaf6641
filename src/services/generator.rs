use std::sync::Arc;

use tracing::info;

use crate::clients::QueryTranslator;
use crate::db::Store;
use crate::entities::search_queries;
use crate::services::search::{Identity, SearchError};

/// Wraps the translator collaborator and persists the outcome. A translator
/// failure leaves no partial row behind.
pub struct QueryGenerator {
    store: Store,
    translator: Arc<dyn QueryTranslator>,
}

impl QueryGenerator {
    #[must_use]
    pub fn new(store: Store, translator: Arc<dyn QueryTranslator>) -> Self {
        Self { store, translator }
    }

    /// Turn free-text input into a persisted `SearchQuery` owned by the
    /// caller, with no run recorded yet.
    pub async fn generate(
        &self,
        identity: Identity,
        text: &str,
    ) -> Result<search_queries::Model, SearchError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SearchError::InvalidInput(
                "user_input must not be empty".to_string(),
            ));
        }

        let generated = self.translator.translate(trimmed).await?;
        let generated = generated.trim();
        if generated.is_empty() {
            return Err(SearchError::TranslationUnavailable(
                "translator returned an empty query".to_string(),
            ));
        }

        let model = self
            .store
            .create_query(trimmed, generated, identity.user_id)
            .await?;

        info!(query_id = model.id, "Generated search query");

        Ok(model)
    }

    /// Refine an existing query's text into a brand-new `SearchQuery`.
    /// The original row is never edited; `generated_query` is immutable.
    pub async fn refine(
        &self,
        identity: Identity,
        original: &search_queries::Model,
        instructions: &str,
    ) -> Result<search_queries::Model, SearchError> {
        let trimmed = instructions.trim();
        if trimmed.is_empty() {
            return Err(SearchError::InvalidInput(
                "refinement instructions must not be empty".to_string(),
            ));
        }

        let refined = self
            .translator
            .refine(&original.generated_query, trimmed)
            .await?;
        let refined = refined.trim();
        if refined.is_empty() {
            return Err(SearchError::TranslationUnavailable(
                "translator returned an empty query".to_string(),
            ));
        }

        let model = self
            .store
            .create_query(trimmed, refined, identity.user_id)
            .await?;

        info!(
            query_id = model.id,
            refined_from = original.id,
            "Refined search query"
        );

        Ok(model)
    }
}
