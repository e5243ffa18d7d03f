use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use documented::{Documented, DocumentedFields};
use pkgcrawl_utils::{
    path::{resolve_path, xdg_config_home, xdg_data_home},
    time::parse_std_duration,
};
use serde::{Deserialize, Serialize};
use toml_edit::DocumentMut;
use tracing::{debug, info};

use crate::{
    annotations::annotate_toml_table,
    channel::ChannelConfig,
    error::{ConfigError, Result},
    secrets::Secrets,
    settings::CrawlerSettings,
};

/// Application's configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct Config {
    /// Number of repository sources crawled in parallel.
    /// Default: 4
    pub workers: Option<usize>,

    /// Path of the JSON catalog file.
    /// Default: $XDG_DATA_HOME/pkgcrawl/catalog.json
    pub catalog_path: Option<String>,

    /// Path of the TOML secrets file holding API tokens.
    /// Default: $XDG_CONFIG_HOME/pkgcrawl/secrets.toml
    pub secrets_path: Option<String>,

    /// Records seen within this window are never considered for removal.
    /// Default: 24h
    pub removal_grace: Option<String>,

    /// Sources whose records were last seen longer ago than this are refreshed.
    /// Default: 4h
    pub outdated_after: Option<String>,

    /// Maximum number of outdated records refreshed per run.
    /// Default: 600
    pub outdated_limit: Option<usize>,

    /// HTTP and provider settings.
    #[serde(default)]
    pub crawler: CrawlerSettings,

    /// Channel location and source rewriting.
    #[serde(default)]
    pub channel: ChannelConfig,
}

/// Location of the config file, `$PKGCRAWL_CONFIG` or the XDG default.
pub fn default_config_path() -> PathBuf {
    match std::env::var("PKGCRAWL_CONFIG") {
        Ok(path) => PathBuf::from(path),
        Err(_) => xdg_config_home().join("pkgcrawl").join("config.toml"),
    }
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            workers: Some(4),
            catalog_path: Some(format!(
                "{}/pkgcrawl/catalog.json",
                xdg_data_home().display()
            )),
            secrets_path: None,
            removal_grace: Some("24h".into()),
            outdated_after: Some("4h".into()),
            outdated_limit: Some(600),
            crawler: CrawlerSettings::default_settings(),
            channel: ChannelConfig::default(),
        }
    }

    /// Loads the configuration from `path`, or from [`default_config_path`].
    ///
    /// A missing file yields the default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

        let mut config = match fs::read_to_string(&config_path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "No config at {}, using defaults",
                    config_path.display()
                );
                Self::default_config()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;

        Ok(config)
    }

    pub fn resolve(&mut self) -> Result<()> {
        self.workers.get_or_insert(4);
        self.outdated_limit.get_or_insert(600);
        self.removal_grace.get_or_insert_with(|| "24h".into());
        self.outdated_after.get_or_insert_with(|| "4h".into());

        if self.workers == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "workers",
                reason: "must be at least 1".into(),
            });
        }

        for (key, value) in [
            ("removal_grace", &self.removal_grace),
            ("outdated_after", &self.outdated_after),
        ] {
            if let Some(value) = value {
                if parse_std_duration(value).is_none() {
                    return Err(ConfigError::InvalidDuration {
                        key,
                        value: value.clone(),
                    });
                }
            }
        }

        self.crawler.resolve()?;
        self.channel.resolve()?;

        Ok(())
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or(4).max(1)
    }

    pub fn outdated_limit(&self) -> usize {
        self.outdated_limit.unwrap_or(600)
    }

    pub fn removal_grace(&self) -> Duration {
        self.removal_grace
            .as_deref()
            .and_then(parse_std_duration)
            .unwrap_or(Duration::from_secs(24 * 3600))
    }

    pub fn outdated_after(&self) -> Duration {
        self.outdated_after
            .as_deref()
            .and_then(parse_std_duration)
            .unwrap_or(Duration::from_secs(4 * 3600))
    }

    pub fn get_catalog_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("PKGCRAWL_CATALOG") {
            return Ok(resolve_path(&env_path)?);
        }
        match &self.catalog_path {
            Some(path) => Ok(resolve_path(path)?),
            None => Ok(xdg_data_home().join("pkgcrawl").join("catalog.json")),
        }
    }

    pub fn get_secrets_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("PKGCRAWL_SECRETS") {
            return Ok(resolve_path(&env_path)?);
        }
        match &self.secrets_path {
            Some(path) => Ok(resolve_path(path)?),
            None => Ok(xdg_config_home().join("pkgcrawl").join("secrets.toml")),
        }
    }

    /// Loads the secrets file. An explicitly configured file must exist.
    pub fn load_secrets(&self) -> Result<Secrets> {
        let path = self.get_secrets_path()?;
        if self.secrets_path.is_some() || std::env::var("PKGCRAWL_SECRETS").is_ok() {
            Secrets::load(&path)
        } else {
            Secrets::load_optional(&path)
        }
    }

    pub fn to_annotated_document(&self) -> Result<DocumentMut> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut doc = toml_string.parse::<DocumentMut>()?;

        annotate_toml_table::<Config>(doc.as_table_mut(), true)?;

        if let Some(table) = doc.get_mut("crawler").and_then(|item| item.as_table_mut()) {
            annotate_toml_table::<CrawlerSettings>(table, false)?;
        }
        if let Some(table) = doc.get_mut("channel").and_then(|item| item.as_table_mut()) {
            annotate_toml_table::<ChannelConfig>(table, false)?;
        }

        Ok(doc)
    }
}

/// Writes the annotated default configuration to `path`.
pub fn generate_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(ConfigError::ConfigAlreadyExists);
    }

    let annotated_doc = Config::default_config().to_annotated_document()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, annotated_doc.to_string())?;
    info!(
        "Default configuration file generated with documentation at: {}",
        path.display()
    );
    Ok(())
}
