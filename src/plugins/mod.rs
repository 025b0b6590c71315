pub mod notifiers;
pub mod traits;

pub use notifiers::{EmailNotifier, LogNotifier};
pub use traits::{NotificationResult, Notifier};
