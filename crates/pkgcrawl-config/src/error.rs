use std::path::PathBuf;

use miette::Diagnostic;
use pkgcrawl_utils::error::PathError;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(pkgcrawl_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(pkgcrawl_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Configuration file already exists")]
    #[diagnostic(
        code(pkgcrawl_config::already_exists),
        help("Remove the existing config file or use a different location")
    )]
    ConfigAlreadyExists,

    #[error("No channel location configured")]
    #[diagnostic(
        code(pkgcrawl_config::missing_channel),
        help("Set `location` in the [channel] section of your config")
    )]
    MissingChannelLocation,

    #[error("Channel `search` and `replace` must be set together")]
    #[diagnostic(
        code(pkgcrawl_config::incomplete_rewrite),
        help("Either set both `search` and `replace`, or neither")
    )]
    IncompleteRewrite,

    #[error("Invalid duration for `{key}`: {value}")]
    #[diagnostic(
        code(pkgcrawl_config::invalid_duration),
        help("Use a duration like `30s`, `10m`, `4h` or `1d12h`")
    )]
    InvalidDuration { key: &'static str, value: String },

    #[error("Invalid value for `{key}`: {reason}")]
    #[diagnostic(code(pkgcrawl_config::invalid_value))]
    InvalidValue { key: &'static str, reason: String },

    #[error("Failed to read secrets file `{}`: {source}", path.display())]
    #[diagnostic(
        code(pkgcrawl_config::secrets),
        help("Check that the secrets file exists and is readable")
    )]
    Secrets {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    #[diagnostic(code(pkgcrawl_config::io))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),

    #[error("Failed to parse TOML: {0}")]
    #[diagnostic(code(pkgcrawl_config::toml))]
    Toml(#[from] toml_edit::TomlError),

    #[error("Encountered unexpected TOML item: {0}")]
    #[diagnostic(code(pkgcrawl_config::unexpected_toml_item))]
    UnexpectedTomlItem(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
