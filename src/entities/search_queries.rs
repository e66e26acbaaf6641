use sea_orm::entity::prelude::*;

/// A persisted pairing of a user's natural-language request and the
/// search-engine query derived from it. `user_input`, `generated_query` and
/// `created_user_id` never change after creation; refinement creates a new
/// row instead.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "search_queries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(column_type = "Text")]
    pub user_input: String,

    #[sea_orm(column_type = "Text")]
    pub generated_query: String,

    pub created_user_id: i32,

    /// Set on every execution; null until the first run.
    pub last_run_user_id: Option<i32>,

    /// RFC3339 start time of the most recent run; null until the first run.
    pub last_search_date: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::search_results::Entity")]
    SearchResults,
}

impl Related<super::search_results::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SearchResults.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
