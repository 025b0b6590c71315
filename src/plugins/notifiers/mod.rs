// Notifier implementations
pub mod email;
pub mod log;
pub mod render;

pub use email::EmailNotifier;
pub use log::LogNotifier;
