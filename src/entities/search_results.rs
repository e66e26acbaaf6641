use sea_orm::entity::prelude::*;

/// One candidate returned by a provider run. Rows are append-only: the only
/// permitted mutation is stamping `enriched_timestamp`. Deleting the owning
/// query removes its results in the same transaction.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "search_results")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(indexed)]
    pub search_query_id: i32,

    pub title: String,

    /// Profile URL; dedup key within a single run.
    pub link: String,

    #[sea_orm(column_type = "Text")]
    pub snippet: String,

    pub display_domain: String,

    /// RFC3339 start time of the run that produced this row.
    pub search_timestamp: String,

    /// Set by the enrichment marking; re-stamping overwrites it.
    pub enriched_timestamp: Option<String>,

    pub executed_by_user_id: i32,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::search_queries::Entity",
        from = "Column::SearchQueryId",
        to = "super::search_queries::Column::Id"
    )]
    SearchQuery,
}

impl Related<super::search_queries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SearchQuery.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
