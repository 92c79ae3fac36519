pub mod automation;
pub mod error;
pub mod ids;
pub mod stage;

pub use error::CrmError;
pub use ids::normalize_phone;
pub use stage::Stage;
