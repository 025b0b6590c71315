use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod alert;
pub mod failure_record;
pub mod price_record;
pub mod tracked_item;

// Re-exports for convenience
pub use alert::*;
pub use failure_record::*;
pub use price_record::*;
pub use tracked_item::*;

/// Classification of a failed scrape.
///
/// Permanent kinds are never retried; everything else is retried up to the
/// attempt budget. `Forbidden` is retried too, and only becomes final once the
/// budget is spent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Gone,
    Forbidden,
    RateLimited,
    ServerError,
    Timeout,
    ConnectionRefused,
    ConnectionReset,
    ParseError,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Gone => "GONE",
            Self::Forbidden => "FORBIDDEN",
            Self::RateLimited => "RATE_LIMITED",
            Self::ServerError => "SERVER_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::ConnectionRefused => "CONNECTION_REFUSED",
            Self::ConnectionReset => "CONNECTION_RESET",
            Self::ParseError => "PARSE_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parse the stored representation. Unrecognised values map to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "NOT_FOUND" => Self::NotFound,
            "GONE" => Self::Gone,
            "FORBIDDEN" => Self::Forbidden,
            "RATE_LIMITED" => Self::RateLimited,
            "SERVER_ERROR" => Self::ServerError,
            "TIMEOUT" => Self::Timeout,
            "CONNECTION_REFUSED" => Self::ConnectionRefused,
            "CONNECTION_RESET" => Self::ConnectionReset,
            "PARSE_ERROR" => Self::ParseError,
            _ => Self::Unknown,
        }
    }

    /// Map an HTTP status to a failure kind. `None` means the response body
    /// should be handed to the extractor.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            404 => Some(Self::NotFound),
            410 => Some(Self::Gone),
            403 => Some(Self::Forbidden),
            429 => Some(Self::RateLimited),
            s if s >= 500 => Some(Self::ServerError),
            _ => None,
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::NotFound | Self::Gone | Self::ParseError)
    }

    pub fn is_retryable(&self) -> bool {
        !self.is_permanent()
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Increased,
    Decreased,
    Unchanged,
}

// Helper function to generate record ids
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
