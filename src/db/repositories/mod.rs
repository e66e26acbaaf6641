pub mod search_query;
pub mod search_result;
pub mod user;
