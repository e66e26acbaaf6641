use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::clients::ResultItem;
use crate::config::SecurityConfig;
use crate::entities::{search_queries, search_results};

pub mod migrator;
pub mod repositories;

pub use repositories::user::User;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains("memory");

        if !in_memory {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        // Every pooled connection to ":memory:" gets its own empty database,
        // so in-memory stores must stay on a single connection.
        let (max_connections, min_connections) = if in_memory {
            (1, 1)
        } else {
            (max_connections, min_connections)
        };

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn query_repo(&self) -> repositories::search_query::SearchQueryRepository {
        repositories::search_query::SearchQueryRepository::new(self.conn.clone())
    }

    fn result_repo(&self) -> repositories::search_result::SearchResultRepository {
        repositories::search_result::SearchResultRepository::new(self.conn.clone())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    // ========== Search queries ==========

    pub async fn create_query(
        &self,
        user_input: &str,
        generated_query: &str,
        created_user_id: i32,
    ) -> Result<search_queries::Model> {
        self.query_repo()
            .create(user_input, generated_query, created_user_id)
            .await
    }

    pub async fn get_query(&self, id: i32) -> Result<Option<search_queries::Model>> {
        self.query_repo().get(id).await
    }

    pub async fn list_queries(&self, skip: u64, limit: u64) -> Result<Vec<search_queries::Model>> {
        self.query_repo().list_all(skip, limit).await
    }

    pub async fn list_queries_for_user(
        &self,
        user_id: i32,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<search_queries::Model>> {
        self.query_repo().list_by_user(user_id, skip, limit).await
    }

    pub async fn touch_query_last_run(
        &self,
        id: i32,
        last_run_user_id: i32,
        run_timestamp: &str,
    ) -> Result<()> {
        self.query_repo()
            .touch_last_run(id, last_run_user_id, run_timestamp)
            .await
    }

    pub async fn delete_query_cascade(&self, id: i32) -> Result<bool> {
        self.query_repo().delete_cascade(id).await
    }

    pub async fn count_queries(&self) -> Result<u64> {
        self.query_repo().count_all().await
    }

    // ========== Search results ==========

    pub async fn get_result(&self, id: i32) -> Result<Option<search_results::Model>> {
        self.result_repo().get(id).await
    }

    pub async fn insert_result_batch(
        &self,
        search_query_id: i32,
        items: &[ResultItem],
        executed_by_user_id: i32,
        run_timestamp: &str,
    ) -> Result<u64> {
        self.result_repo()
            .insert_batch(search_query_id, items, executed_by_user_id, run_timestamp)
            .await
    }

    pub async fn results_page(
        &self,
        search_query_id: i32,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<search_results::Model>, u64)> {
        self.result_repo()
            .page_for_query(search_query_id, skip, limit)
            .await
    }

    pub async fn results_chunk(
        &self,
        search_query_id: i32,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<search_results::Model>> {
        self.result_repo()
            .chunk_for_query(search_query_id, offset, limit)
            .await
    }

    pub async fn count_results_for_query(&self, search_query_id: i32) -> Result<u64> {
        self.result_repo().count_for_query(search_query_id).await
    }

    pub async fn count_results(&self) -> Result<u64> {
        self.result_repo().count_all().await
    }

    pub async fn mark_result_enriched(
        &self,
        id: i32,
        enriched_at: &str,
    ) -> Result<Option<search_results::Model>> {
        self.result_repo().mark_enriched(id, enriched_at).await
    }

    // ========== Users ==========

    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        is_admin: bool,
        config: Option<&SecurityConfig>,
    ) -> Result<User> {
        self.user_repo()
            .create(username, password, is_admin, config)
            .await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn get_user_by_id(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn verify_user_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>> {
        self.user_repo().verify_password(username, password).await
    }

    pub async fn update_user_password(
        &self,
        username: &str,
        new_password: &str,
        config: Option<&SecurityConfig>,
    ) -> Result<()> {
        self.user_repo()
            .update_password(username, new_password, config)
            .await
    }

    pub async fn verify_api_key(&self, api_key: &str) -> Result<Option<User>> {
        self.user_repo().verify_api_key(api_key).await
    }

    pub async fn get_user_api_key(&self, username: &str) -> Result<Option<String>> {
        self.user_repo().get_api_key(username).await
    }

    pub async fn regenerate_user_api_key(&self, username: &str) -> Result<String> {
        self.user_repo().regenerate_api_key(username).await
    }
}
