pub mod automations;
pub mod error;
pub mod leads;
pub mod server;
pub mod tenant;

pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
