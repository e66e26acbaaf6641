use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};

use crate::clients::ResultItem;
use crate::entities::{prelude::*, search_results};

pub struct SearchResultRepository {
    conn: DatabaseConnection,
}

impl SearchResultRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, id: i32) -> Result<Option<search_results::Model>> {
        let row = SearchResults::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query search result by id")?;

        Ok(row)
    }

    /// Persist one run's deduplicated candidate batch. All rows commit or
    /// none do, so a mid-batch failure never leaves a partial run behind.
    pub async fn insert_batch(
        &self,
        search_query_id: i32,
        items: &[ResultItem],
        executed_by_user_id: i32,
        run_timestamp: &str,
    ) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().to_rfc3339();

        let models: Vec<search_results::ActiveModel> = items
            .iter()
            .map(|item| search_results::ActiveModel {
                search_query_id: Set(search_query_id),
                title: Set(item.title.clone()),
                link: Set(item.link.clone()),
                snippet: Set(item.snippet.clone()),
                display_domain: Set(item.display_domain.clone()),
                search_timestamp: Set(run_timestamp.to_string()),
                enriched_timestamp: Set(None),
                executed_by_user_id: Set(executed_by_user_id),
                created_at: Set(now.clone()),
                ..Default::default()
            })
            .collect();

        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to open batch insert transaction")?;

        SearchResults::insert_many(models).exec(&txn).await?;

        txn.commit()
            .await
            .context("Failed to commit result batch")?;

        Ok(items.len() as u64)
    }

    /// One page of a query's results in insertion order, plus the total
    /// count across all pages.
    pub async fn page_for_query(
        &self,
        search_query_id: i32,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<search_results::Model>, u64)> {
        let total = SearchResults::find()
            .filter(search_results::Column::SearchQueryId.eq(search_query_id))
            .count(&self.conn)
            .await?;

        let rows = SearchResults::find()
            .filter(search_results::Column::SearchQueryId.eq(search_query_id))
            .order_by_asc(search_results::Column::Id)
            .offset(skip)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to list search results")?;

        Ok((rows, total))
    }

    /// Ordered slice used by the streaming CSV exporter; callers advance
    /// `offset` until an empty chunk comes back.
    pub async fn chunk_for_query(
        &self,
        search_query_id: i32,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<search_results::Model>> {
        let rows = SearchResults::find()
            .filter(search_results::Column::SearchQueryId.eq(search_query_id))
            .order_by_asc(search_results::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to read export chunk")?;

        Ok(rows)
    }

    pub async fn count_for_query(&self, search_query_id: i32) -> Result<u64> {
        let count = SearchResults::find()
            .filter(search_results::Column::SearchQueryId.eq(search_query_id))
            .count(&self.conn)
            .await?;

        Ok(count)
    }

    pub async fn count_all(&self) -> Result<u64> {
        let count = SearchResults::find().count(&self.conn).await?;
        Ok(count)
    }

    /// Stamp (or re-stamp) the enrichment timestamp.
    pub async fn mark_enriched(
        &self,
        id: i32,
        enriched_at: &str,
    ) -> Result<Option<search_results::Model>> {
        let Some(model) = SearchResults::find_by_id(id).one(&self.conn).await? else {
            return Ok(None);
        };

        let mut active: search_results::ActiveModel = model.into();
        active.enriched_timestamp = Set(Some(enriched_at.to_string()));
        let updated = active.update(&self.conn).await?;

        Ok(Some(updated))
    }
}
