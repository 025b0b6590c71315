use async_trait::async_trait;
use tracing::info;

use crate::models::AlertEvent;
use crate::plugins::notifiers::render::render;
use crate::plugins::traits::{NotificationResult, Notifier};
use crate::utils::error::Result;

/// Writes events to the log. Used when no SMTP relay is configured.
pub struct LogNotifier {
    currency_symbol: String,
}

impl LogNotifier {
    pub fn new(currency_symbol: &str) -> Self {
        Self {
            currency_symbol: currency_symbol.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &AlertEvent, recipients: &[String]) -> Result<NotificationResult> {
        let rendered = render(event, &self.currency_symbol);
        let payload = serde_json::to_string(event)?;

        info!(
            recipients = %recipients.join(", "),
            event = %payload,
            "{}",
            rendered.subject
        );

        Ok(NotificationResult::delivered(crate::models::generate_id()))
    }
}
