pub mod catalog;
pub mod config;
pub mod daemon;
pub mod driver;
pub mod fingerprint;
pub mod lifecycle;
pub mod models;
pub mod plugins;
pub mod scheduler;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use driver::{RunDriver, RunOutcome};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
