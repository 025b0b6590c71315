pub mod notifier;

pub use notifier::{NotificationResult, Notifier};

#[cfg(test)]
pub use notifier::MockNotifier;
