//! External collaborator boundaries.
//!
//! The core never talks to OpenAI or a search backend directly; it goes
//! through these traits so an execution can be driven by stubs in tests and
//! so a different backend can be swapped in via config.

use async_trait::async_trait;
use thiserror::Error;

pub mod google;
pub mod openai;
pub mod serper;

pub use google::GoogleSearchClient;
pub use openai::OpenAiClient;
pub use serper::SerperClient;

/// One normalized item from a provider page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultItem {
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub display_domain: String,
}

/// One page of provider results. `has_more` is a hint; the execution engine
/// also stops on empty pages and its configured result cap.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub items: Vec<ResultItem>,
    pub has_more: bool,
}

#[derive(Debug, Error)]
pub enum TranslatorError {
    #[error("translator request timed out")]
    Timeout,

    #[error("translator API error: {0}")]
    Api(String),

    #[error("unexpected translator response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,

    #[error("provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Whether a per-page retry has any chance of succeeding.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

/// Natural-Language-to-Query Translator boundary.
#[async_trait]
pub trait QueryTranslator: Send + Sync {
    /// Turn free-text input into a single optimized search-engine query.
    async fn translate(&self, text: &str) -> Result<String, TranslatorError>;

    /// Rework an existing query according to the given instructions.
    async fn refine(
        &self,
        original_query: &str,
        instructions: &str,
    ) -> Result<String, TranslatorError>;
}

/// Web Search Provider boundary with cursor-style paging.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Items per page; also the offset stride during execution.
    fn page_size(&self) -> u32;

    /// Hard cap the backend imposes on results per query.
    fn result_ceiling(&self) -> u32;

    async fn fetch_page(&self, query: &str, offset: u32) -> Result<SearchPage, ProviderError>;
}
