pub mod execution;
pub mod export;
pub mod generator;
pub mod search;

pub use execution::{ExecutionEngine, ExecutionSettings, ExecutionSummary};
pub use generator::QueryGenerator;
pub use search::{Identity, SearchError, SearchService};
