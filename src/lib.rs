pub mod change_detector;
pub mod config;
pub mod extractor;
pub mod failure_tracker;
pub mod fetcher;
pub mod models;
pub mod monitor;
pub mod plugins;
pub mod reports;
pub mod retry;
pub mod scheduler;
pub mod scraper;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::{AppConfig, ConfigHandle, ConfigSnapshot};
pub use monitor::{ItemOutcome, ItemReport, Monitor, PassReport};
pub use scheduler::{MonitorScheduler, PassRunner};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
