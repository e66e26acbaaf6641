use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use sourcerr::api::{self, AppState};
use sourcerr::clients::{
    ProviderError, QueryTranslator, ResultItem, SearchPage, SearchProvider, TranslatorError,
};
use sourcerr::config::Config;
use sourcerr::state::SharedState;

/// Default API key seeded by migration (must match m20240101_initial.rs)
const DEFAULT_API_KEY: &str = "sourcerr_default_api_key_please_regenerate";

struct StubTranslator;

#[async_trait::async_trait]
impl QueryTranslator for StubTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslatorError> {
        Ok(format!("site:linkedin.com/in {}", text.to_lowercase()))
    }

    async fn refine(
        &self,
        original_query: &str,
        instructions: &str,
    ) -> Result<String, TranslatorError> {
        Ok(format!("{original_query} ({instructions})"))
    }
}

/// Serves `total` distinct profiles in pages of 10, sleeping `delay_ms`
/// per page so tests can overlap two runs.
struct StubProvider {
    total: usize,
    delay_ms: u64,
}

#[async_trait::async_trait]
impl SearchProvider for StubProvider {
    fn page_size(&self) -> u32 {
        10
    }

    fn result_ceiling(&self) -> u32 {
        1000
    }

    async fn fetch_page(&self, _query: &str, offset: u32) -> Result<SearchPage, ProviderError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }

        let start = offset as usize;
        let end = (start + 10).min(self.total);
        let items: Vec<ResultItem> = (start..end)
            .map(|n| ResultItem {
                title: format!("Candidate {n}"),
                link: format!("https://linkedin.com/in/candidate-{n}"),
                snippet: format!("Snippet for candidate {n}, with a comma"),
                display_domain: "linkedin.com".to_string(),
            })
            .collect();

        Ok(SearchPage {
            has_more: end < self.total,
            items,
        })
    }
}

async fn spawn_app_with(total: usize, delay_ms: u64) -> (Router, Arc<AppState>) {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.search.max_results = 200;

    let shared = SharedState::with_collaborators(
        config,
        Arc::new(StubTranslator),
        Arc::new(StubProvider { total, delay_ms }),
    )
    .await
    .expect("Failed to create shared state");

    let state = api::create_app_state(Arc::new(shared), None);
    let app = api::router(state.clone()).await;

    (app, state)
}

async fn spawn_app() -> (Router, Arc<AppState>) {
    spawn_app_with(124, 0).await
}

fn get(uri: &str) -> Request<Body> {
    get_as(uri, DEFAULT_API_KEY)
}

fn get_as(uri: &str, api_key: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("X-Api-Key", api_key)
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str) -> Request<Body> {
    post_as(uri, DEFAULT_API_KEY)
}

fn post_as(uri: &str, api_key: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("X-Api-Key", api_key)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    post_json_as(uri, body, DEFAULT_API_KEY)
}

fn post_json_as(uri: &str, body: &serde_json::Value, api_key: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("X-Api-Key", api_key)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn delete_as(uri: &str, api_key: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header("X-Api-Key", api_key)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn body_text(response: Response) -> String {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(body.to_vec()).unwrap()
}

/// Generate a query as the given key; returns its id.
async fn generate_query(app: &Router, api_key: &str) -> i64 {
    let response = app
        .clone()
        .oneshot(post_json_as(
            "/api/search/generate",
            &serde_json::json!({"user_input": "Python developers in Bangalore with AWS experience"}),
            api_key,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    body["data"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn auth_is_required() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/system/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(get_as("/api/system/status", "wrong-key"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(get("/api/system/status"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_returns_api_key() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({"username": "admin", "password": "password"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["username"], "admin");
    assert_eq!(body["data"]["api_key"], DEFAULT_API_KEY);
    assert_eq!(body["data"]["is_admin"], true);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({"username": "admin", "password": "nope"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn generate_persists_query_without_a_run() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/search/generate",
            &serde_json::json!({"user_input": "Python developers in Bangalore with AWS experience"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let generated = body["data"]["generated_query"].as_str().unwrap();
    assert!(generated.starts_with("site:linkedin.com/in"));
    assert!(body["data"]["last_search_date"].is_null());
    assert!(body["data"]["last_run_user_id"].is_null());
}

#[tokio::test]
async fn generate_rejects_blank_input() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/search/generate",
            &serde_json::json!({"user_input": "   "}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn execute_stores_deduplicated_results() {
    let (app, _state) = spawn_app().await;
    let id = generate_query(&app, DEFAULT_API_KEY).await;

    let response = app
        .clone()
        .oneshot(post(&format!("/api/search/execute/{id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["results_count"], 124);

    // Run metadata lands on the query.
    let response = app
        .clone()
        .oneshot(get(&format!("/api/search/queries/{id}")))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert!(body["data"]["last_search_date"].is_string());
    assert!(body["data"]["last_run_user_id"].is_number());

    // All 124 rows are stored and pagination reports the full total.
    let response = app
        .clone()
        .oneshot(get(&format!(
            "/api/search/queries/{id}/results?skip=0&limit=200"
        )))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["total_results"], 124);
    assert_eq!(body["data"]["results"].as_array().unwrap().len(), 124);

    // Default limit pages the same set.
    let response = app
        .clone()
        .oneshot(get(&format!("/api/search/queries/{id}/results")))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["total_results"], 124);
    assert_eq!(body["data"]["results"].as_array().unwrap().len(), 100);
}

#[tokio::test]
async fn reexecution_appends_instead_of_replacing() {
    let (app, _state) = spawn_app_with(25, 0).await;
    let id = generate_query(&app, DEFAULT_API_KEY).await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post(&format!("/api/search/execute/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(get(&format!("/api/search/queries/{id}/results")))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["total_results"], 50);
}

#[tokio::test]
async fn execute_unknown_query_is_404() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(post("/api/search/execute/999"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn concurrent_executions_conflict() {
    let (app, _state) = spawn_app_with(30, 150).await;
    let id = generate_query(&app, DEFAULT_API_KEY).await;

    let (first, second) = tokio::join!(
        app.clone().oneshot(post(&format!("/api/search/execute/{id}"))),
        app.clone().oneshot(post(&format!("/api/search/execute/{id}"))),
    );

    let statuses = [first.unwrap().status(), second.unwrap().status()];
    assert!(statuses.contains(&StatusCode::OK));
    assert!(statuses.contains(&StatusCode::CONFLICT));
}

#[tokio::test]
async fn generate_and_execute_combines_both_steps() {
    let (app, _state) = spawn_app_with(42, 0).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/search/generate-and-execute",
            &serde_json::json!({"user_input": "Rails developers in Hyderabad"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    assert!(body["data"]["query"]["generated_query"].is_string());
    assert!(body["data"]["query"]["last_search_date"].is_string());
    assert_eq!(body["data"]["execution"]["results_count"], 42);
    assert!(body["data"]["execution_error"].is_null());
}

#[tokio::test]
async fn refine_creates_a_new_query() {
    let (app, _state) = spawn_app().await;
    let id = generate_query(&app, DEFAULT_API_KEY).await;

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/search/queries/{id}/refine"),
            &serde_json::json!({"instructions": "only senior candidates"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let refined_id = body["data"]["id"].as_i64().unwrap();
    assert_ne!(refined_id, id);
    let refined_query = body["data"]["generated_query"].as_str().unwrap();
    assert!(refined_query.contains("only senior candidates"));

    // The original row is untouched.
    let response = app
        .clone()
        .oneshot(get(&format!("/api/search/queries/{id}")))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert!(
        !body["data"]["generated_query"]
            .as_str()
            .unwrap()
            .contains("only senior candidates")
    );
}

#[tokio::test]
async fn delete_cascades_results() {
    let (app, _state) = spawn_app_with(10, 0).await;
    let id = generate_query(&app, DEFAULT_API_KEY).await;

    let response = app
        .clone()
        .oneshot(post(&format!("/api/search/execute/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(delete_as(
            &format!("/api/search/queries/{id}"),
            DEFAULT_API_KEY,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/search/queries/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/search/queries/{id}/results")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ownership_hides_and_protects_other_users_queries() {
    let (app, state) = spawn_app_with(10, 0).await;

    let bob = state
        .store()
        .create_user("bob", "bobs-password", false, None)
        .await
        .unwrap();

    let id = generate_query(&app, DEFAULT_API_KEY).await;

    // Invisible to a non-owner, non-admin caller.
    let response = app
        .clone()
        .oneshot(get_as(&format!("/api/search/queries/{id}"), &bob.api_key))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Deleting someone else's query is the one Forbidden path.
    let response = app
        .clone()
        .oneshot(delete_as(&format!("/api/search/queries/{id}"), &bob.api_key))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Bob's listing is scoped to his own queries.
    let response = app
        .clone()
        .oneshot(get_as("/api/search/queries", &bob.api_key))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    // The admin sees bob's queries and may delete them.
    let bob_query = generate_query(&app, &bob.api_key).await;

    let response = app
        .clone()
        .oneshot(get(&format!("/api/search/queries/{bob_query}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(delete_as(
            &format!("/api/search/queries/{bob_query}"),
            DEFAULT_API_KEY,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn enrichment_stamps_and_restamps() {
    let (app, _state) = spawn_app_with(5, 0).await;
    let id = generate_query(&app, DEFAULT_API_KEY).await;

    app.clone()
        .oneshot(post(&format!("/api/search/execute/{id}")))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/search/queries/{id}/results")))
        .await
        .unwrap();
    let body = body_json(response).await;
    let result_id = body["data"]["results"][0]["id"].as_i64().unwrap();
    assert!(body["data"]["results"][0]["enriched_timestamp"].is_null());

    let response = app
        .clone()
        .oneshot(post(&format!("/api/search/results/{result_id}/enrich")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let first_stamp = body["data"]["enriched_timestamp"]
        .as_str()
        .unwrap()
        .to_string();

    // Repeating the call is not an error and refreshes the stamp.
    let response = app
        .clone()
        .oneshot(post(&format!("/api/search/results/{result_id}/enrich")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let second_stamp = body["data"]["enriched_timestamp"].as_str().unwrap();
    assert!(second_stamp >= first_stamp.as_str());
}

#[tokio::test]
async fn export_of_empty_query_is_header_only() {
    let (app, _state) = spawn_app().await;
    let id = generate_query(&app, DEFAULT_API_KEY).await;

    let response = app
        .clone()
        .oneshot(get(&format!("/api/search/queries/{id}/export")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap(),
        mime::TEXT_CSV.as_ref()
    );

    let body = body_text(response).await;
    assert_eq!(
        body,
        "user_input,generated_query,name,snippet,linkedin_url,created_time\n"
    );
}

#[tokio::test]
async fn export_streams_one_row_per_result() {
    let (app, _state) = spawn_app_with(12, 0).await;
    let id = generate_query(&app, DEFAULT_API_KEY).await;

    app.clone()
        .oneshot(post(&format!("/api/search/execute/{id}")))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/search/queries/{id}/export")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let disposition = response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains(&format!("search_results_{id}.csv")));

    let body = body_text(response).await;
    let lines: Vec<&str> = body.lines().collect();

    assert_eq!(lines.len(), 13);
    assert_eq!(
        lines[0],
        "user_input,generated_query,name,snippet,linkedin_url,created_time"
    );
    assert!(lines[1].contains("https://linkedin.com/in/candidate-0"));
    // Snippets contain a comma, so they come out quoted.
    assert!(lines[1].contains("\"Snippet for candidate 0, with a comma\""));
}

#[tokio::test]
async fn export_of_unknown_query_is_404() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(get("/api/search/queries/999/export"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn system_status_reports_counts() {
    let (app, _state) = spawn_app_with(10, 0).await;
    let id = generate_query(&app, DEFAULT_API_KEY).await;

    app.clone()
        .oneshot(post(&format!("/api/search/execute/{id}")))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get("/api/system/status"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["total_queries"], 1);
    assert_eq!(body["data"]["total_results"], 10);
    assert!(body["data"]["version"].is_string());
}
