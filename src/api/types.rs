use serde::Serialize;

use crate::entities::{search_queries, search_results};
use crate::services::ExecutionSummary;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchQueryDto {
    pub id: i32,
    pub user_input: String,
    pub generated_query: String,
    pub created_user_id: i32,
    pub last_run_user_id: Option<i32>,
    pub last_search_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<search_queries::Model> for SearchQueryDto {
    fn from(model: search_queries::Model) -> Self {
        Self {
            id: model.id,
            user_input: model.user_input,
            generated_query: model.generated_query,
            created_user_id: model.created_user_id,
            last_run_user_id: model.last_run_user_id,
            last_search_date: model.last_search_date,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResultDto {
    pub id: i32,
    pub search_query_id: i32,
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub display_domain: String,
    pub search_timestamp: String,
    pub enriched_timestamp: Option<String>,
    pub executed_by_user_id: i32,
    pub created_at: String,
}

impl From<search_results::Model> for SearchResultDto {
    fn from(model: search_results::Model) -> Self {
        Self {
            id: model.id,
            search_query_id: model.search_query_id,
            title: model.title,
            link: model.link,
            snippet: model.snippet,
            display_domain: model.display_domain,
            search_timestamp: model.search_timestamp,
            enriched_timestamp: model.enriched_timestamp,
            executed_by_user_id: model.executed_by_user_id,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExecutionSummaryDto {
    pub search_query_id: i32,
    pub results_count: u64,
    pub search_timestamp: String,
}

impl From<ExecutionSummary> for ExecutionSummaryDto {
    fn from(summary: ExecutionSummary) -> Self {
        Self {
            search_query_id: summary.search_query_id,
            results_count: summary.results_count,
            search_timestamp: summary.search_timestamp,
        }
    }
}

/// Page of results for one query, with the total across all pages.
#[derive(Debug, Serialize)]
pub struct ResultsPageDto {
    pub search_query_id: i32,
    pub total_results: u64,
    pub results: Vec<SearchResultDto>,
}

/// Combined response for generate-and-execute: the query always persists
/// once generation succeeds, even when the run itself fails.
#[derive(Debug, Serialize)]
pub struct GenerateAndExecuteDto {
    pub query: SearchQueryDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionSummaryDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnrichedResultDto {
    pub id: i32,
    pub enriched_timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime: u64,
    pub total_queries: u64,
    pub total_results: u64,
}
