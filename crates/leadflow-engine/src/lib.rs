pub mod aggregate;
pub mod assign;
pub mod cache;
pub mod error;
pub mod filter;
pub mod query;
pub mod windows;

pub use assign::{AssignmentEngine, Selection};
pub use cache::{CacheConfig, QueryCache, TtlClass};
pub use error::EngineError;
pub use filter::LeadFilter;
pub use query::{LeadQuery, Page, QueryConfig};
