use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::ScraperConfig;
use crate::models::ErrorKind;

pub const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Raw HTTP access. Implementations classify network-level failures but
/// leave status handling to the [`Fetcher`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                header_map.insert(name, value);
            }
        }

        let response = self
            .client
            .get(url)
            .headers(header_map)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify_reqwest_error(&e))?;

        Ok(HttpResponse { status, body })
    }
}

fn classify_reqwest_error(error: &reqwest::Error) -> TransportError {
    if error.is_timeout() {
        return TransportError::new(ErrorKind::Timeout, format!("Request timed out: {}", error));
    }

    let mut source = error.source();
    while let Some(cause) = source {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            match io_error.kind() {
                io::ErrorKind::ConnectionRefused => {
                    return TransportError::new(ErrorKind::ConnectionRefused, format!("Connection refused: {}", error));
                }
                io::ErrorKind::ConnectionReset => {
                    return TransportError::new(ErrorKind::ConnectionReset, format!("Connection reset: {}", error));
                }
                io::ErrorKind::TimedOut => {
                    return TransportError::new(ErrorKind::Timeout, format!("Request timed out: {}", error));
                }
                _ => {}
            }
        }
        source = cause.source();
    }

    TransportError::new(ErrorKind::Unknown, error.to_string())
}

/// Outcome of a single GET: either a page to extract from, or a classified failure.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpOutcome {
    Page { status: u16, body: String },
    Failed { kind: ErrorKind, message: String },
}

pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    user_agents: Vec<String>,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &ScraperConfig) -> Self {
        Self {
            transport,
            user_agents: config.user_agents.clone(),
            timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    pub async fn fetch(&self, url: &str) -> HttpOutcome {
        let headers = self.browser_headers(url);

        match self.transport.get(url, &headers, self.timeout).await {
            Ok(response) => match ErrorKind::from_status(response.status) {
                Some(kind) => HttpOutcome::Failed {
                    kind,
                    message: format!("HTTP {}", response.status),
                },
                None => HttpOutcome::Page {
                    status: response.status,
                    body: response.body,
                },
            },
            Err(error) => HttpOutcome::Failed {
                kind: error.kind,
                message: error.message,
            },
        }
    }

    /// Headers a desktop browser would send on a top-level navigation.
    pub fn browser_headers(&self, url: &str) -> Vec<(String, String)> {
        let user_agent = self
            .user_agents
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default();

        let mut headers = vec![
            ("User-Agent".to_string(), user_agent),
            (
                "Accept".to_string(),
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8".to_string(),
            ),
            ("Accept-Language".to_string(), "en-GB,en;q=0.9,en-US;q=0.8".to_string()),
            ("DNT".to_string(), "1".to_string()),
            ("Connection".to_string(), "keep-alive".to_string()),
            ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
            ("Sec-Fetch-Dest".to_string(), "document".to_string()),
            ("Sec-Fetch-Mode".to_string(), "navigate".to_string()),
            ("Sec-Fetch-Site".to_string(), "none".to_string()),
            ("Sec-Fetch-User".to_string(), "?1".to_string()),
            ("Cache-Control".to_string(), "max-age=0".to_string()),
        ];

        if let Some(origin) = origin_of(url) {
            headers.push(("Referer".to_string(), origin));
        }

        headers
    }
}

/// `scheme://host/` (port kept when non-default).
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{}://{}:{}/", parsed.scheme(), host, port)),
        None => Some(format!("{}://{}/", parsed.scheme(), host)),
    }
}
