use std::sync::Arc;
use tokio::sync::RwLock;

use crate::clients::{
    GoogleSearchClient, OpenAiClient, QueryTranslator, SearchProvider, SerperClient,
};
use crate::config::Config;
use crate::db::Store;
use crate::services::{ExecutionEngine, ExecutionSettings, QueryGenerator, SearchService};

/// Build a shared HTTP client with reasonable defaults for API calls.
/// Reused across all collaborator clients to enable connection pooling and
/// avoid socket exhaustion.
fn build_shared_http_client(timeout_seconds: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_seconds))
        .user_agent(concat!("Sourcerr/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub translator: Arc<dyn QueryTranslator>,

    pub provider: Arc<dyn SearchProvider>,

    pub search_service: Arc<SearchService>,
}

impl SharedState {
    /// Wire production collaborators from config.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = build_shared_http_client(config.search.request_timeout_seconds)?;

        let translator: Arc<dyn QueryTranslator> = Arc::new(OpenAiClient::with_shared_client(
            http_client.clone(),
            config.openai.api_key.clone(),
            config.openai.model.clone(),
        ));

        let provider: Arc<dyn SearchProvider> = if config.search.backend == "serper" {
            Arc::new(SerperClient::with_shared_client(
                http_client,
                config.search.serper_api_key.clone(),
            ))
        } else {
            Arc::new(GoogleSearchClient::with_shared_client(
                http_client,
                config.search.google_api_key.clone(),
                config.search.google_cse_id.clone(),
            ))
        };

        Self::with_collaborators(config, translator, provider).await
    }

    /// Wire the core around externally supplied collaborators; tests use
    /// this to drive the full stack with stubs.
    pub async fn with_collaborators(
        config: Config,
        translator: Arc<dyn QueryTranslator>,
        provider: Arc<dyn SearchProvider>,
    ) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let settings = ExecutionSettings {
            max_results: config.search.max_results,
            retry_attempts: config.search.retry_attempts,
            retry_backoff_ms: config.search.retry_backoff_ms,
        };

        let engine = Arc::new(ExecutionEngine::new(
            store.clone(),
            provider.clone(),
            settings,
        ));

        let generator = QueryGenerator::new(store.clone(), translator.clone());

        let search_service = Arc::new(SearchService::new(store.clone(), generator, engine));

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            translator,
            provider,
            search_service,
        })
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }
}
