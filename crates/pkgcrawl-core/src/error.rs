//! Error types for pkgcrawl-core.

use std::path::PathBuf;

use miette::Diagnostic;
use pkgcrawl_config::error::ConfigError;
use pkgcrawl_fetch::FetchError;
use pkgcrawl_provider::ProviderError;
use pkgcrawl_utils::error::LockError;
use thiserror::Error;

/// Errors that stop a crawl or removal pass as a whole.
///
/// Per-source and per-record failures never surface here; they become
/// catalog state instead.
#[derive(Error, Diagnostic, Debug)]
pub enum CoreError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Lock(#[from] LockError),

    #[error("Error while {action}")]
    #[diagnostic(code(pkgcrawl_core::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog file `{}` is corrupt: {message}", path.display())]
    #[diagnostic(
        code(pkgcrawl_core::catalog_corrupt),
        help("Restore the catalog from a backup or remove it to start over")
    )]
    CatalogCorrupt { path: PathBuf, message: String },

    #[error("Failed to serialize catalog: {0}")]
    #[diagnostic(code(pkgcrawl_core::serialize))]
    Serialize(String),

    #[error("Failed to start worker pool: {0}")]
    #[diagnostic(
        code(pkgcrawl_core::worker_pool),
        help("Lower `workers` in the configuration")
    )]
    WorkerPool(String),

    #[error("README rendering failed: {0}")]
    #[diagnostic(code(pkgcrawl_core::readme))]
    Render(String),

    #[error("Another crawl is already running")]
    #[diagnostic(
        code(pkgcrawl_core::busy),
        help("Wait for the running crawl to finish")
    )]
    Busy,
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Trait for adding context to IO errors.
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
            CoreError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_io_error_context() {
        let result: std::io::Result<()> = Err(std::io::Error::other("disk full"));
        let err = result.with_context(|| "writing catalog".into()).unwrap_err();

        assert_eq!(err.to_string(), "Error while writing catalog");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_transparent_provider_error() {
        let err = CoreError::from(ProviderError::NoReleases {
            name: "Foo".into(),
            location: "repo.json".into(),
        });
        assert!(err.to_string().contains("Foo"));
    }
}
