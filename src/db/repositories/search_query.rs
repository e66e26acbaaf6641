use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};

use crate::entities::{prelude::*, search_queries, search_results};

pub struct SearchQueryRepository {
    conn: DatabaseConnection,
}

impl SearchQueryRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Persist a freshly generated query. `last_run_user_id` and
    /// `last_search_date` stay null until the first execution.
    pub async fn create(
        &self,
        user_input: &str,
        generated_query: &str,
        created_user_id: i32,
    ) -> Result<search_queries::Model> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = search_queries::ActiveModel {
            user_input: Set(user_input.to_string()),
            generated_query: Set(generated_query.to_string()),
            created_user_id: Set(created_user_id),
            last_run_user_id: Set(None),
            last_search_date: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert search query")?;

        Ok(model)
    }

    pub async fn get(&self, id: i32) -> Result<Option<search_queries::Model>> {
        let query = SearchQueries::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query search query by id")?;

        Ok(query)
    }

    /// All queries in insertion order, offset-paginated.
    pub async fn list_all(&self, skip: u64, limit: u64) -> Result<Vec<search_queries::Model>> {
        let rows = SearchQueries::find()
            .order_by_asc(search_queries::Column::Id)
            .offset(skip)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to list search queries")?;

        Ok(rows)
    }

    /// Queries created by one user, insertion order, offset-paginated.
    pub async fn list_by_user(
        &self,
        user_id: i32,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<search_queries::Model>> {
        let rows = SearchQueries::find()
            .filter(search_queries::Column::CreatedUserId.eq(user_id))
            .order_by_asc(search_queries::Column::Id)
            .offset(skip)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to list search queries for user")?;

        Ok(rows)
    }

    /// Record an execution run: updates `last_search_date` and
    /// `last_run_user_id`, leaving everything else untouched.
    pub async fn touch_last_run(
        &self,
        id: i32,
        last_run_user_id: i32,
        run_timestamp: &str,
    ) -> Result<()> {
        let Some(model) = SearchQueries::find_by_id(id).one(&self.conn).await? else {
            anyhow::bail!("Search query {id} not found");
        };

        let mut active: search_queries::ActiveModel = model.into();
        active.last_search_date = Set(Some(run_timestamp.to_string()));
        active.last_run_user_id = Set(Some(last_run_user_id));
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        active.update(&self.conn).await?;

        Ok(())
    }

    /// Delete a query and all of its results atomically. Returns false if
    /// the query did not exist.
    pub async fn delete_cascade(&self, id: i32) -> Result<bool> {
        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to open delete transaction")?;

        let exists = SearchQueries::find_by_id(id).one(&txn).await?.is_some();
        if !exists {
            txn.rollback().await.ok();
            return Ok(false);
        }

        SearchResults::delete_many()
            .filter(search_results::Column::SearchQueryId.eq(id))
            .exec(&txn)
            .await?;

        SearchQueries::delete_by_id(id).exec(&txn).await?;

        txn.commit()
            .await
            .context("Failed to commit cascade delete")?;

        Ok(true)
    }

    pub async fn count_all(&self) -> Result<u64> {
        use sea_orm::PaginatorTrait;

        let count = SearchQueries::find().count(&self.conn).await?;
        Ok(count)
    }
}
