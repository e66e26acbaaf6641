pub use super::search_queries::Entity as SearchQueries;
pub use super::search_results::Entity as SearchResults;
pub use super::users::Entity as Users;
