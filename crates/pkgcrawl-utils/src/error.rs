use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum PathError {
    #[error("Path is empty")]
    #[diagnostic(code(pkgcrawl_utils::path::empty))]
    Empty,

    #[error("Failed to get current directory: {source}")]
    #[diagnostic(code(pkgcrawl_utils::path::current_dir))]
    CurrentDir { source: std::io::Error },

    #[error("Environment variable `{var}` not set in `{input}`")]
    #[diagnostic(
        code(pkgcrawl_utils::path::missing_env),
        help("Export the variable or use an absolute path")
    )]
    MissingEnvVar { var: String, input: String },

    #[error("Unclosed variable expression starting at `{input}`")]
    #[diagnostic(code(pkgcrawl_utils::path::unclosed_variable))]
    UnclosedVariable { input: String },
}

#[derive(Error, Diagnostic, Debug)]
pub enum LockError {
    #[error("Failed to prepare lock file `{}`: {source}", path.display())]
    #[diagnostic(code(pkgcrawl_utils::lock::io))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to acquire lock: {0}")]
    #[diagnostic(
        code(pkgcrawl_utils::lock::acquire),
        help("Another process may be holding the lock")
    )]
    AcquireFailed(String),
}

pub type PathResult<T> = std::result::Result<T, PathError>;
pub type LockResult<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_path_error_display() {
        let err = PathError::MissingEnvVar {
            var: "VAR".to_string(),
            input: "$VAR/cache".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Environment variable `VAR` not set in `$VAR/cache`"
        );
        assert_eq!(PathError::Empty.to_string(), "Path is empty");
    }

    #[test]
    fn test_lock_error_source() {
        let err = LockError::Io {
            path: PathBuf::from("/locks/a.lock"),
            source: std::io::Error::other("denied"),
        };
        assert!(err.to_string().contains("/locks/a.lock"));
        assert!(err.source().is_some());
    }
}
