use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use documented::{Documented, DocumentedFields};
use pkgcrawl_utils::{
    path::{resolve_path, xdg_cache_home},
    time::parse_std_duration,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::{ConfigError, Result},
    secrets::Secrets,
};

pub const DEFAULT_USER_AGENT: &str = concat!("pkgcrawl/", env!("CARGO_PKG_VERSION"));

/// Credentials sent as HTTP basic auth to a single host.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,

    /// Left empty to have it resolved from the secrets file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Settings for fetching remote metadata.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct CrawlerSettings {
    /// Directory holding cached HTTP responses.
    /// Default: $XDG_CACHE_HOME/pkgcrawl/http_cache
    pub cache_path: Option<String>,

    /// Cached responses older than this are removed by `cache sweep`.
    /// Default: 1h
    pub cache_length: Option<String>,

    /// Responses younger than this are served from cache without any request.
    /// Default: 10m
    pub max_age: Option<String>,

    /// Log every request and cache decision.
    /// Default: false
    pub debug: Option<bool>,

    /// Overall timeout for a single request.
    /// Default: 30s
    pub timeout: Option<String>,

    /// User agent sent with every request.
    /// Default: pkgcrawl/<version>
    pub user_agent: Option<String>,

    /// Proxy used for plain http:// requests.
    pub http_proxy: Option<String>,

    /// Proxy used for https:// requests (tunnelled with CONNECT).
    pub https_proxy: Option<String>,

    /// Username for proxy authentication.
    pub proxy_username: Option<String>,

    /// Password for proxy authentication.
    pub proxy_password: Option<String>,

    /// Maximum number of requests in flight at once.
    /// Default: 8
    pub max_connections: Option<usize>,

    /// Maximum number of tag releases kept per package, 0 for unlimited.
    /// Default: 0
    pub max_releases: Option<usize>,

    /// Skip optional API calls (per-tag commit dates, readme discovery).
    /// Default: false
    pub min_api_calls: Option<bool>,

    /// Extra query-string parameters appended to requests, keyed by domain.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query_string_params: BTreeMap<String, BTreeMap<String, String>>,

    /// Basic auth credentials keyed by host.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub http_basic_auth: BTreeMap<String, BasicAuth>,
}

/// Hosts whose basic-auth password is looked up in the secrets file.
const SECRET_HOSTS: [(&str, &str); 3] = [
    ("api.github.com", "github_access_token"),
    ("gitlab.com", "gitlab_access_token"),
    ("api.bitbucket.org", "bitbucket_app_password"),
];

impl CrawlerSettings {
    pub fn default_settings() -> Self {
        Self {
            cache_path: Some(format!(
                "{}/pkgcrawl/http_cache",
                xdg_cache_home().display()
            )),
            cache_length: Some("1h".into()),
            max_age: Some("10m".into()),
            debug: Some(false),
            timeout: Some("30s".into()),
            user_agent: Some(DEFAULT_USER_AGENT.into()),
            max_connections: Some(8),
            max_releases: Some(0),
            min_api_calls: Some(false),
            ..Default::default()
        }
    }

    pub fn resolve(&mut self) -> Result<()> {
        let defaults = Self::default_settings();

        if self.cache_path.is_none() {
            self.cache_path = defaults.cache_path;
        }
        self.cache_length.get_or_insert_with(|| "1h".into());
        self.max_age.get_or_insert_with(|| "10m".into());
        self.timeout.get_or_insert_with(|| "30s".into());
        self.user_agent.get_or_insert_with(|| DEFAULT_USER_AGENT.into());
        self.debug.get_or_insert(false);
        self.max_connections.get_or_insert(8);
        self.max_releases.get_or_insert(0);
        self.min_api_calls.get_or_insert(false);

        for (key, value) in [
            ("cache_length", &self.cache_length),
            ("max_age", &self.max_age),
            ("timeout", &self.timeout),
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

        if self.max_connections == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "max_connections",
                reason: "must be at least 1".into(),
            });
        }

        Ok(())
    }

    pub fn get_cache_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("PKGCRAWL_CACHE") {
            return Ok(resolve_path(&env_path)?);
        }
        match &self.cache_path {
            Some(path) => Ok(resolve_path(path)?),
            None => Ok(xdg_cache_home().join("pkgcrawl").join("http_cache")),
        }
    }

    pub fn cache_length(&self) -> Duration {
        duration_or(self.cache_length.as_deref(), Duration::from_secs(3600))
    }

    pub fn max_age(&self) -> Duration {
        duration_or(self.max_age.as_deref(), Duration::from_secs(600))
    }

    pub fn timeout(&self) -> Duration {
        duration_or(self.timeout.as_deref(), Duration::from_secs(30))
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn debug(&self) -> bool {
        self.debug.unwrap_or(false)
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections.unwrap_or(8).max(1)
    }

    pub fn max_releases(&self) -> usize {
        self.max_releases.unwrap_or(0)
    }

    pub fn min_api_calls(&self) -> bool {
        self.min_api_calls.unwrap_or(false)
    }

    /// Fills in basic-auth passwords for the hosting APIs from `secrets`.
    ///
    /// The secret name is `<prefix>_<username>`, e.g. `github_access_token_octocat`.
    /// Passwords set directly in the config are left alone.
    pub fn apply_secrets(&mut self, secrets: &Secrets) {
        for (host, prefix) in SECRET_HOSTS {
            let Some(auth) = self.http_basic_auth.get_mut(host) else {
                continue;
            };
            if auth.password.is_some() {
                continue;
            }
            let name = format!("{prefix}_{}", auth.username);
            match secrets.get(&name) {
                Some(value) => auth.password = Some(value.to_string()),
                None => warn!("No secret named `{}` for {}", name, host),
            }
        }
    }
}

fn duration_or(value: Option<&str>, fallback: Duration) -> Duration {
    value.and_then(parse_std_duration).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_fills_defaults() {
        let mut settings = CrawlerSettings::default();
        settings.resolve().unwrap();

        assert_eq!(settings.max_age(), Duration::from_secs(600));
        assert_eq!(settings.cache_length(), Duration::from_secs(3600));
        assert_eq!(settings.timeout(), Duration::from_secs(30));
        assert_eq!(settings.max_connections(), 8);
        assert_eq!(settings.max_releases(), 0);
        assert!(!settings.debug());
        assert!(settings.user_agent().starts_with("pkgcrawl/"));
    }

    #[test]
    fn test_resolve_rejects_bad_duration() {
        let mut settings = CrawlerSettings {
            max_age: Some("ten minutes".into()),
            ..Default::default()
        };
        assert!(matches!(
            settings.resolve(),
            Err(ConfigError::InvalidDuration { key: "max_age", .. })
        ));
    }

    #[test]
    fn test_resolve_rejects_zero_connections() {
        let mut settings = CrawlerSettings {
            max_connections: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            settings.resolve(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_apply_secrets() {
        let mut settings = CrawlerSettings::default();
        settings.http_basic_auth.insert(
            "api.github.com".into(),
            BasicAuth {
                username: "octocat".into(),
                password: None,
            },
        );
        settings.http_basic_auth.insert(
            "gitlab.com".into(),
            BasicAuth {
                username: "tanuki".into(),
                password: Some("inline".into()),
            },
        );
        settings.http_basic_auth.insert(
            "api.bitbucket.org".into(),
            BasicAuth {
                username: "bucket".into(),
                password: None,
            },
        );

        let secrets = Secrets::from_pairs([
            ("github_access_token_octocat", "ghp_token"),
            ("gitlab_access_token_tanuki", "unused"),
        ]);
        settings.apply_secrets(&secrets);

        let auth = &settings.http_basic_auth;
        assert_eq!(auth["api.github.com"].password.as_deref(), Some("ghp_token"));
        assert_eq!(auth["gitlab.com"].password.as_deref(), Some("inline"));
        assert_eq!(auth["api.bitbucket.org"].password, None);
    }
}
