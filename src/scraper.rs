use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::config::ScraperConfig;
use crate::extractor::Extractor;
use crate::fetcher::{Fetcher, HttpOutcome, HttpTransport};
use crate::models::{ErrorKind, truncate_snapshot};
use crate::retry::RetryPolicy;
use crate::utils::error::Result;

const PARSE_FAILURE_MESSAGE: &str = "Failed to extract price from page - price format may have changed";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapeResult {
    pub success: bool,
    pub price: Option<Decimal>,
    pub mileage: Option<u32>,
    pub description: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    /// Leading slice of the page, kept for parse failures only.
    pub html_snapshot: Option<String>,
    pub attempts: u32,
}

impl ScrapeResult {
    fn success(listing: Listing, attempts: u32) -> Self {
        Self {
            success: true,
            price: Some(listing.price),
            mileage: listing.mileage,
            description: Some(listing.description),
            error_kind: None,
            error: None,
            html_snapshot: None,
            attempts,
        }
    }

    fn failure(failure: AttemptFailure, attempts: u32) -> Self {
        Self {
            success: false,
            price: None,
            mileage: failure.mileage,
            description: failure.description,
            error_kind: Some(failure.kind),
            error: Some(failure.message),
            html_snapshot: failure.html_snapshot,
            attempts,
        }
    }
}

#[derive(Debug)]
struct Listing {
    price: Decimal,
    mileage: Option<u32>,
    description: String,
}

#[derive(Debug)]
struct AttemptFailure {
    kind: ErrorKind,
    message: String,
    html_snapshot: Option<String>,
    mileage: Option<u32>,
    description: Option<String>,
}

impl AttemptFailure {
    fn http(kind: ErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            html_snapshot: None,
            mileage: None,
            description: None,
        }
    }
}

pub struct Scraper {
    fetcher: Fetcher,
    extractor: Extractor,
    policy: RetryPolicy,
}

impl Scraper {
    pub fn new(fetcher: Fetcher, extractor: Extractor, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            extractor,
            policy,
        }
    }

    pub fn from_config(transport: Arc<dyn HttpTransport>, config: &ScraperConfig) -> Result<Self> {
        Ok(Self::new(
            Fetcher::new(transport, config),
            Extractor::new(&config.currency_symbol)?,
            RetryPolicy::from(config),
        ))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch and parse one listing. Failures come back as values; this never
    /// returns an error.
    pub async fn fetch_listing(&self, url: &str) -> ScrapeResult {
        let attempts = AtomicU32::new(0);
        let delays = self.policy.delays(&mut rand::thread_rng());

        let outcome = RetryIf::start(
            delays,
            || self.attempt(url, &attempts),
            |failure: &AttemptFailure| failure.kind.is_retryable(),
        )
        .await;

        let attempts = attempts.load(Ordering::SeqCst);

        match outcome {
            Ok(listing) => {
                metrics::counter!("price_sentinel_scrape_results_total", "outcome" => "success").increment(1);
                ScrapeResult::success(listing, attempts)
            }
            Err(mut failure) => {
                if failure.kind == ErrorKind::Forbidden {
                    failure.message = format!(
                        "HTTP 403 - Site blocking automated access (tried {} different approaches)",
                        attempts
                    );
                }
                warn!(
                    "Giving up on {} after {} attempt(s): {} ({})",
                    url, attempts, failure.message, failure.kind
                );
                metrics::counter!("price_sentinel_scrape_results_total", "outcome" => failure.kind.as_str())
                    .increment(1);
                ScrapeResult::failure(failure, attempts)
            }
        }
    }

    async fn attempt(&self, url: &str, attempts: &AtomicU32) -> std::result::Result<Listing, AttemptFailure> {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Fetching {} (attempt {}/{})", url, attempt, self.policy.max_attempts);

        let result = match self.fetcher.fetch(url).await {
            HttpOutcome::Failed { kind, message } => Err(AttemptFailure::http(kind, message)),
            HttpOutcome::Page { body, .. } => {
                let extraction = self.extractor.extract(&body);
                match extraction.price {
                    Some(price) => Ok(Listing {
                        price,
                        mileage: extraction.mileage,
                        description: extraction.description,
                    }),
                    None => Err(AttemptFailure {
                        kind: ErrorKind::ParseError,
                        message: PARSE_FAILURE_MESSAGE.to_string(),
                        html_snapshot: Some(truncate_snapshot(&body)),
                        mileage: extraction.mileage,
                        description: Some(extraction.description),
                    }),
                }
            }
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(failure) => failure.kind.as_str(),
        };
        metrics::counter!("price_sentinel_scrape_attempts_total", "outcome" => outcome).increment(1);

        if let Err(failure) = &result {
            if self.policy.should_retry(failure.kind, attempt) {
                warn!(
                    "Transient error on attempt {}/{} for {}: {} ({})",
                    attempt, self.policy.max_attempts, url, failure.message, failure.kind
                );
            }
        }

        result
    }
}
