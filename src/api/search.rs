use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::{ApiError, ApiResponse, AppState};
use super::auth::CurrentUser;
use super::types::{
    EnrichedResultDto, ExecutionSummaryDto, GenerateAndExecuteDto, ResultsPageDto, SearchQueryDto,
    SearchResultDto,
};
use crate::services::export;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub user_input: String,
}

#[derive(Debug, Deserialize)]
pub struct RefineRequest {
    pub instructions: String,
}

#[derive(Debug, Deserialize)]
pub struct QueriesPageParams {
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_query_limit")]
    pub limit: u64,
}

#[derive(Debug, Deserialize)]
pub struct ResultsPageParams {
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_result_limit")]
    pub limit: u64,
}

const fn default_query_limit() -> u64 {
    50
}

const fn default_result_limit() -> u64 {
    100
}

/// POST /search/generate
/// Translate free-text input into a persisted, reusable search query.
pub async fn generate(
    Extension(user): Extension<CurrentUser>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<ApiResponse<SearchQueryDto>>, ApiError> {
    let query = state
        .search_service()
        .generate(user.identity(), &request.user_input)
        .await?;

    Ok(Json(ApiResponse::success(SearchQueryDto::from(query))))
}

/// POST /search/execute/{id}
/// Run a saved query against the search provider and store this run's
/// deduplicated results.
pub async fn execute(
    Extension(user): Extension<CurrentUser>,
    State(state): State<Arc<AppState>>,
    Path(query_id): Path<i32>,
) -> Result<Json<ApiResponse<ExecutionSummaryDto>>, ApiError> {
    let summary = state
        .search_service()
        .execute(query_id, user.identity())
        .await?;

    Ok(Json(ApiResponse::success(ExecutionSummaryDto::from(
        summary,
    ))))
}

/// POST /search/generate-and-execute
/// Atomic-enough composition: generation failure leaves nothing behind; an
/// execution failure still returns the persisted query with the error
/// attached.
pub async fn generate_and_execute(
    Extension(user): Extension<CurrentUser>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<ApiResponse<GenerateAndExecuteDto>>, ApiError> {
    let (query, execution) = state
        .search_service()
        .generate_and_execute(user.identity(), &request.user_input)
        .await?;

    let (execution, execution_error) = match execution {
        Ok(summary) => (Some(ExecutionSummaryDto::from(summary)), None),
        Err(e) => (None, Some(e.to_string())),
    };

    Ok(Json(ApiResponse::success(GenerateAndExecuteDto {
        query: SearchQueryDto::from(query),
        execution,
        execution_error,
    })))
}

/// POST /search/queries/{id}/refine
/// Create a new query by refining an existing one; the original row is
/// never edited.
pub async fn refine_query(
    Extension(user): Extension<CurrentUser>,
    State(state): State<Arc<AppState>>,
    Path(query_id): Path<i32>,
    Json(request): Json<RefineRequest>,
) -> Result<Json<ApiResponse<SearchQueryDto>>, ApiError> {
    let query = state
        .search_service()
        .refine(user.identity(), query_id, &request.instructions)
        .await?;

    Ok(Json(ApiResponse::success(SearchQueryDto::from(query))))
}

/// GET /search/queries
/// Caller's queries in insertion order; admins see everyone's.
pub async fn list_queries(
    Extension(user): Extension<CurrentUser>,
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueriesPageParams>,
) -> Result<Json<ApiResponse<Vec<SearchQueryDto>>>, ApiError> {
    let queries = state
        .search_service()
        .list_queries(user.identity(), params.skip, params.limit)
        .await?;

    let dtos = queries.into_iter().map(SearchQueryDto::from).collect();

    Ok(Json(ApiResponse::success(dtos)))
}

/// GET /search/queries/{id}
pub async fn get_query(
    Extension(user): Extension<CurrentUser>,
    State(state): State<Arc<AppState>>,
    Path(query_id): Path<i32>,
) -> Result<Json<ApiResponse<SearchQueryDto>>, ApiError> {
    let query = state
        .search_service()
        .get_query(user.identity(), query_id)
        .await?;

    Ok(Json(ApiResponse::success(SearchQueryDto::from(query))))
}

/// GET /search/queries/{id}/results
/// One page of stored results plus the total count.
pub async fn list_results(
    Extension(user): Extension<CurrentUser>,
    State(state): State<Arc<AppState>>,
    Path(query_id): Path<i32>,
    Query(params): Query<ResultsPageParams>,
) -> Result<Json<ApiResponse<ResultsPageDto>>, ApiError> {
    let (results, total) = state
        .search_service()
        .list_results(user.identity(), query_id, params.skip, params.limit)
        .await?;

    Ok(Json(ApiResponse::success(ResultsPageDto {
        search_query_id: query_id,
        total_results: total,
        results: results.into_iter().map(SearchResultDto::from).collect(),
    })))
}

/// DELETE /search/queries/{id}
/// Remove a query and cascade all of its results.
pub async fn delete_query(
    Extension(user): Extension<CurrentUser>,
    State(state): State<Arc<AppState>>,
    Path(query_id): Path<i32>,
) -> Result<Json<ApiResponse<super::auth::MessageResponse>>, ApiError> {
    state
        .search_service()
        .delete_query(user.identity(), query_id)
        .await?;

    Ok(Json(ApiResponse::success(super::auth::MessageResponse {
        message: "Search query deleted successfully".to_string(),
    })))
}

/// POST /search/results/{id}/enrich
/// Mark a result as enriched (e.g. after scraping additional data).
/// Repeating the call re-stamps the timestamp.
pub async fn enrich_result(
    Extension(user): Extension<CurrentUser>,
    State(state): State<Arc<AppState>>,
    Path(result_id): Path<i32>,
) -> Result<Json<ApiResponse<EnrichedResultDto>>, ApiError> {
    let result = state
        .search_service()
        .mark_result_enriched(user.identity(), result_id)
        .await?;

    Ok(Json(ApiResponse::success(EnrichedResultDto {
        id: result.id,
        enriched_timestamp: result.enriched_timestamp,
    })))
}

/// GET /search/queries/{id}/export
/// Stream the query's results as CSV; memory stays flat however many rows
/// have accumulated.
pub async fn export_query(
    Extension(user): Extension<CurrentUser>,
    State(state): State<Arc<AppState>>,
    Path(query_id): Path<i32>,
) -> Result<Response, ApiError> {
    let query = state
        .search_service()
        .query_for_export(user.identity(), query_id)
        .await?;

    info!(query_id, "Exporting search results to CSV");

    let stream = export::csv_stream(state.store().clone(), query);

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "text/csv")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"search_results_{query_id}.csv\""),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::internal(format!("Failed to build export response: {e}")))?;

    Ok(response)
}
