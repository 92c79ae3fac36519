pub mod agents;
pub mod automations;
pub mod cursors;
pub mod database;
pub mod error;
pub mod events;
pub mod leads;
pub mod lists;
pub mod row_helpers;
pub mod schema;
pub mod search;

pub use database::Database;
pub use error::StoreError;
