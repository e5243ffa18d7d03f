//! Error types for the provider crate.
//!
//! [`ProviderError`] travels inside [`CrawlOutcome`](crate::record::CrawlOutcome)
//! values, so every variant is `Clone` and carries rendered messages only.

use miette::Diagnostic;
use pkgcrawl_fetch::{error::message_needs_review, FetchError};
use thiserror::Error;

/// Errors produced while turning a source into package records.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Fetch(#[from] FetchError),

    #[error("Error while {action}: {message}")]
    #[diagnostic(code(pkgcrawl_provider::io))]
    IoError { action: String, message: String },

    #[error("Error parsing JSON from {location}: {message}")]
    #[diagnostic(
        code(pkgcrawl_provider::parse),
        help("The manifest may be malformed or not valid JSON")
    )]
    Parse { location: String, message: String },

    #[error(
        "Error parsing {location}: the \"schema_version\" {version} is not recognized. \
         Must be one of: 1.0, 1.1, 1.2, 2.0, 3.0.0 or 4.0.0."
    )]
    #[diagnostic(
        code(pkgcrawl_provider::schema_version),
        help("Update the manifest to a supported schema version")
    )]
    SchemaVersionMismatch { location: String, version: String },

    #[error("{provider} unable to fetch repo information from \"{url}\".")]
    #[diagnostic(code(pkgcrawl_provider::repo_info))]
    RepoInfo { provider: &'static str, url: String },

    #[error("{provider} unable to fetch user information from \"{url}\".")]
    #[diagnostic(code(pkgcrawl_provider::user_info))]
    UserInfo { provider: &'static str, url: String },

    #[error("{provider} unable to fetch download information from \"{url}\".")]
    #[diagnostic(code(pkgcrawl_provider::download_info))]
    DownloadInfo { provider: &'static str, url: String },

    #[error("Invalid record \"{name}\" in {location}: {message}")]
    #[diagnostic(
        code(pkgcrawl_provider::invalid_record),
        help("Check the record for missing or mistyped keys")
    )]
    InvalidRecord {
        name: String,
        location: String,
        message: String,
    },

    #[error("No valid releases found for \"{name}\" in {location}.")]
    #[diagnostic(code(pkgcrawl_provider::no_releases))]
    NoReleases { name: String, location: String },
}

/// A specialized Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    /// Whether the failure looks like a removal rather than an outage.
    pub fn needs_review(&self) -> bool {
        match self {
            Self::Fetch(err) => err.needs_review(),
            other => message_needs_review(&other.to_string()),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Fetch(err) if err.is_rate_limited())
    }
}

/// Extension trait for adding context to I/O errors.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            ProviderError::IoError {
                action: context(),
                message: err.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::RepoInfo {
            provider: "GitHubRepositoryProvider",
            url: "https://github.com/foo/bar".into(),
        };
        assert_eq!(
            err.to_string(),
            "GitHubRepositoryProvider unable to fetch repo information from \
             \"https://github.com/foo/bar\"."
        );
    }

    #[test]
    fn test_needs_review_follows_fetch_error() {
        let err = ProviderError::from(FetchError::NotFound {
            url: "https://example.com/repo.json".into(),
        });
        assert!(err.needs_review());
        assert!(!err.is_rate_limited());

        let err = ProviderError::from(FetchError::RateLimited {
            domain: "api.github.com".into(),
            limit: "60".into(),
        });
        assert!(err.is_rate_limited());
        assert!(!err.needs_review());
    }

    #[test]
    fn test_with_context() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        ));
        let err = result.with_context(|| "reading repo.json".into()).unwrap_err();
        assert_eq!(err.to_string(), "Error while reading repo.json: gone");
    }
}
