use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::AsyncSmtpTransportBuilder;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, warn};

use crate::config::{NotificationsConfig, SmtpConfig, SmtpTls};
use crate::models::AlertEvent;
use crate::plugins::notifiers::render::{RenderedMessage, render};
use crate::plugins::traits::{NotificationResult, Notifier};
use crate::utils::error::{AppError, Result};

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    currency_symbol: String,
}

impl EmailNotifier {
    pub fn new(notifications: &NotificationsConfig, currency_symbol: &str) -> Result<Self> {
        let smtp = notifications
            .smtp
            .as_ref()
            .ok_or_else(|| AppError::Validation("SMTP settings are required for email notifications".into()))?;

        Ok(Self {
            mailer: build_transport(smtp)?,
            from: format!("{} <{}>", smtp.from_name, notifications.sender).parse()?,
            currency_symbol: currency_symbol.to_string(),
        })
    }

    pub fn build_message(&self, rendered: &RenderedMessage, recipients: &[String]) -> Result<Message> {
        let mut builder = Message::builder().from(self.from.clone()).subject(rendered.subject.as_str());
        for recipient in recipients {
            builder = builder.to(recipient.parse()?);
        }

        let message = builder.multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(header::ContentType::TEXT_PLAIN)
                        .body(rendered.text.clone()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(header::ContentType::TEXT_HTML)
                        .body(rendered.html.clone()),
                ),
        )?;

        Ok(message)
    }

    pub async fn test_connection(&self) -> Result<bool> {
        Ok(self.mailer.test_connection().await?)
    }
}

fn transport_builder(smtp: &SmtpConfig) -> Result<AsyncSmtpTransportBuilder> {
    let builder = match smtp.tls {
        SmtpTls::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?,
        SmtpTls::Wrapper => AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?,
        SmtpTls::None => {
            warn!("SMTP connection to {} is not encrypted", smtp.host);
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
        }
    };
    Ok(builder.port(smtp.port))
}

fn build_transport(smtp: &SmtpConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
    let builder = transport_builder(smtp)?;

    let builder = match (&smtp.username, &smtp.password) {
        (Some(username), Some(password)) => builder.credentials(Credentials::new(username.clone(), password.clone())),
        _ => builder,
    };

    Ok(builder.build())
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn notify(&self, event: &AlertEvent, recipients: &[String]) -> Result<NotificationResult> {
        if recipients.is_empty() {
            warn!("No recipients configured, email not sent");
            return Ok(NotificationResult::failed("No recipients configured"));
        }

        let rendered = render(event, &self.currency_symbol);
        let message = self.build_message(&rendered, recipients)?;

        match self.mailer.send(message).await {
            Ok(response) => {
                debug!("Email '{}' accepted by relay", rendered.subject);
                let id = response.message().next().unwrap_or("queued").to_string();
                Ok(NotificationResult::delivered(id))
            }
            Err(e) => Ok(NotificationResult::failed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorKind, FailureStreakAlert, ItemRef};
    use rstest::rstest;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn notifications_config() -> NotificationsConfig {
        NotificationsConfig {
            sender: "monitor@example.com".to_string(),
            recipients: vec!["owner@example.com".to_string()],
            smtp: Some(SmtpConfig {
                host: "localhost".to_string(),
                port: 2525,
                username: None,
                password: None,
                from_name: "Price Sentinel".to_string(),
                tls: SmtpTls::None,
            }),
        }
    }

    fn streak_event() -> AlertEvent {
        AlertEvent::FailureStreak(FailureStreakAlert {
            item: ItemRef {
                url: "https://cars.example.com/1".to_string(),
                name: "1972 MGB Roadster".to_string(),
                category: "Cars".to_string(),
            },
            error_kind: ErrorKind::Forbidden,
            message: "HTTP 403".to_string(),
            consecutive_failures: 3,
        })
    }

    /// Plain SMTP relay that never offers STARTTLS. Returns its port.
    async fn plaintext_relay() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut lines = BufReader::new(read).lines();
                    if write.write_all(b"220 localhost ESMTP\r\n").await.is_err() {
                        return;
                    }
                    while let Ok(Some(line)) = lines.next_line().await {
                        let command = line.to_ascii_uppercase();
                        let reply: &[u8] = if command.starts_with("EHLO") {
                            b"250 localhost\r\n"
                        } else if command.starts_with("QUIT") {
                            b"221 Bye\r\n"
                        } else if command.starts_with("NOOP") {
                            b"250 OK\r\n"
                        } else {
                            b"502 Command not implemented\r\n"
                        };
                        if write.write_all(reply).await.is_err() || command.starts_with("QUIT") {
                            break;
                        }
                    }
                });
            }
        });

        port
    }

    #[rstest]
    #[case(SmtpTls::None, true)]
    #[case(SmtpTls::Starttls, false)]
    #[case(SmtpTls::Wrapper, false)]
    #[tokio::test]
    async fn test_tls_mode_selects_transport(#[case] tls: SmtpTls, #[case] connects: bool) {
        let mut config = notifications_config();
        if let Some(smtp) = config.smtp.as_mut() {
            smtp.host = "localhost".to_string();
            smtp.port = plaintext_relay().await;
            smtp.tls = tls;
        }

        let notifier = EmailNotifier::new(&config, "£").unwrap();
        let result = notifier.test_connection().await;

        // Encrypted modes refuse a relay that cannot negotiate TLS
        if connects {
            assert!(result.unwrap());
        } else {
            assert!(result.is_err(), "{:?} connected without TLS", tls);
        }
    }

    #[test]
    fn test_requires_smtp_settings() {
        let mut config = notifications_config();
        config.smtp = None;

        let result = EmailNotifier::new(&config, "£");
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_build_message() {
        let notifier = EmailNotifier::new(&notifications_config(), "£").unwrap();
        let rendered = render(&streak_event(), "£");

        let message = notifier
            .build_message(&rendered, &["a@example.com".to_string(), "b@example.com".to_string()])
            .unwrap();

        let envelope = message.envelope();
        assert_eq!(envelope.to().len(), 2);
        assert_eq!(envelope.from().map(|a| a.to_string()).as_deref(), Some("monitor@example.com"));

        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("multipart/alternative"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_error() {
        let notifier = EmailNotifier::new(&notifications_config(), "£").unwrap();
        let rendered = render(&streak_event(), "£");

        let result = notifier.build_message(&rendered, &["not an address".to_string()]);
        assert!(matches!(result, Err(AppError::Address(_))));
    }

    #[tokio::test]
    async fn test_no_recipients_is_reported() {
        let notifier = EmailNotifier::new(&notifications_config(), "£").unwrap();

        let result = notifier.notify(&streak_event(), &[]).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No recipients configured"));
    }
}
