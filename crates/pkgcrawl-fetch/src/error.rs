use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Failure to fetch a URL.
///
/// Messages are stored as strings so outcomes carrying a `FetchError` can be
/// cloned and replayed from a provider's per-run cache.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP error 404 downloading {url}.")]
    #[diagnostic(
        code(pkgcrawl_fetch::not_found),
        help("The resource may have been moved or deleted")
    )]
    NotFound { url: String },

    #[error("URL error host not found downloading {url}.")]
    #[diagnostic(
        code(pkgcrawl_fetch::host_unreachable),
        help("Check the hostname and your DNS configuration")
    )]
    HostUnreachable { url: String },

    #[error("Hit rate limit of {limit} for {domain}.")]
    #[diagnostic(
        code(pkgcrawl_fetch::rate_limited),
        help("Configure API credentials or run the crawl again later")
    )]
    RateLimited { domain: String, limit: String },

    #[error("Skipping {domain} due to rate limit.")]
    #[diagnostic(code(pkgcrawl_fetch::rate_limited_skip))]
    RateLimitedSkip { domain: String },

    #[error("TLS validation failed downloading {url}: {message}")]
    #[diagnostic(
        code(pkgcrawl_fetch::tls),
        help("The server certificate does not match the host or is not trusted")
    )]
    TlsValidationFailed { url: String, message: String },

    #[error("URL error {message} downloading {url}.")]
    #[diagnostic(
        code(pkgcrawl_fetch::transport),
        help("Check your internet connection or proxy settings")
    )]
    Transport { url: String, message: String },

    #[error("HTTP error {status} downloading {url}.")]
    #[diagnostic(code(pkgcrawl_fetch::http_status))]
    Http { status: u16, url: String },

    #[error("Invalid URL {url}: {message}")]
    #[diagnostic(code(pkgcrawl_fetch::invalid_url))]
    InvalidUrl { url: String, message: String },

    #[error("Error parsing JSON from {url}: {message}")]
    #[diagnostic(
        code(pkgcrawl_fetch::decode),
        help("The server returned malformed or unexpected JSON")
    )]
    Decode { url: String, message: String },

    #[error("Response cache error: {0}")]
    #[diagnostic(code(pkgcrawl_fetch::cache))]
    Cache(String),
}

impl FetchError {
    /// Whether the failure suggests the resource is gone rather than briefly unavailable.
    pub fn needs_review(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::HostUnreachable { .. })
    }

    /// Rate-limit outcomes are not faults and never touch the catalog.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::RateLimitedSkip { .. })
    }
}

/// Heuristic applied to persisted error text, matching [`FetchError::needs_review`].
pub fn message_needs_review(message: &str) -> bool {
    message.contains("HTTP error 404") || message.contains("URL error host not found")
}

#[derive(Error, Diagnostic, Debug)]
pub enum CacheError {
    #[error("Failed to {action} `{}`: {source}", path.display())]
    #[diagnostic(code(pkgcrawl_fetch::cache::io))]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Lock(#[from] pkgcrawl_utils::error::LockError),
}

impl From<CacheError> for FetchError {
    fn from(err: CacheError) -> Self {
        Self::Cache(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = FetchError::NotFound {
            url: "https://example.com/a.json".into(),
        };
        assert_eq!(
            err.to_string(),
            "HTTP error 404 downloading https://example.com/a.json."
        );

        let err = FetchError::RateLimited {
            domain: "api.github.com".into(),
            limit: "60".into(),
        };
        assert_eq!(err.to_string(), "Hit rate limit of 60 for api.github.com.");

        let err = FetchError::RateLimitedSkip {
            domain: "api.github.com".into(),
        };
        assert_eq!(err.to_string(), "Skipping api.github.com due to rate limit.");
    }

    #[test]
    fn test_needs_review() {
        assert!(FetchError::NotFound { url: "u".into() }.needs_review());
        assert!(FetchError::HostUnreachable { url: "u".into() }.needs_review());
        assert!(!FetchError::Http {
            status: 500,
            url: "u".into()
        }
        .needs_review());
        assert!(message_needs_review(
            &FetchError::HostUnreachable { url: "u".into() }.to_string()
        ));
        assert!(!message_needs_review("HTTP error 500 downloading u."));
    }

    #[test]
    fn test_rate_limit_classification() {
        assert!(FetchError::RateLimitedSkip { domain: "d".into() }.is_rate_limited());
        assert!(!FetchError::NotFound { url: "u".into() }.is_rate_limited());
    }
}
