use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use pkgcrawl_config::settings::CrawlerSettings;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use ureq::http::{HeaderMap, Method};
use url::Url;

use crate::{
    cache::ResponseCache,
    client::ClientConfig,
    error::{FetchError, Result},
    permits::ConnectionPermits,
    transport::{RawResponse, Transport},
};

/// Fetches URLs through a [`Transport`], backed by an optional [`ResponseCache`].
///
/// A single `Fetcher` is shared by every provider in a run. It remembers which
/// domains have exhausted their API quota so later requests to them are
/// skipped without any I/O.
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    cache: Option<ResponseCache>,
    max_age: Duration,
    query_string_params: BTreeMap<String, BTreeMap<String, String>>,
    permits: ConnectionPermits,
    rate_limited: Mutex<HashSet<String>>,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cache: None,
            max_age: Duration::from_secs(600),
            query_string_params: BTreeMap::new(),
            permits: ConnectionPermits::new(8),
            rate_limited: Mutex::new(HashSet::new()),
        }
    }

    /// Builds a fetcher with a real HTTP client and on-disk cache from settings.
    pub fn from_settings(settings: &CrawlerSettings) -> Result<Self> {
        let client = ClientConfig::from_settings(settings).build()?;
        let cache = ResponseCache::new(
            settings
                .get_cache_path()
                .map_err(|err| FetchError::Cache(err.to_string()))?,
        )?
        .with_debug(settings.debug());

        Ok(Self::new(Arc::new(client))
            .with_cache(cache)
            .with_settings(settings))
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Applies freshness window, query-string params and connection cap.
    pub fn with_settings(mut self, settings: &CrawlerSettings) -> Self {
        self.max_age = settings.max_age();
        self.query_string_params = settings.query_string_params.clone();
        self.permits = ConnectionPermits::new(settings.max_connections());
        self
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// Appends the configured query-string params for the URL's domain.
    pub fn prepare_url(&self, url: &str) -> String {
        let Some(params) = domain_of(url).and_then(|d| self.query_string_params.get(&d)) else {
            return url.to_string();
        };
        if params.is_empty() {
            return url.to_string();
        }

        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{url}{separator}{encoded}")
    }

    pub fn is_rate_limited(&self, domain: &str) -> bool {
        self.rate_limited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(domain)
    }

    fn mark_rate_limited(&self, domain: &str) {
        self.rate_limited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(domain.to_string());
    }

    /// Fetches `url`, using the cache for freshness checks and conditional requests.
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let url = self.prepare_url(url);
        let domain = domain_of(&url).unwrap_or_default();

        if self.is_rate_limited(&domain) {
            return Err(FetchError::RateLimitedSkip { domain });
        }

        let _lock = match &self.cache {
            Some(cache) => Some(cache.lock(&url)?),
            None => None,
        };

        let mut headers = HeaderMap::new();
        if let Some(cache) = &self.cache {
            if cache.is_fresh(&url, self.max_age) {
                if let Some(body) = cache.retrieve(&url) {
                    return Ok(body);
                }
            }
            headers = cache.conditional_headers(&url);
        }

        let response = {
            let _permit = self.permits.acquire();
            self.transport.get(&url, &headers)?
        };

        self.check_status(&url, &domain, &response)?;

        let RawResponse {
            status,
            headers,
            body,
        } = response;

        match &self.cache {
            Some(cache) => {
                match cache.record(&Method::GET, &url, status, &headers, body.clone()) {
                    Ok(body) => Ok(body),
                    Err(err) => {
                        warn!("Failed to cache response for {}: {}", url, err);
                        Ok(body)
                    }
                }
            }
            None => Ok(body),
        }
    }

    /// Fetches `url` and decodes the body as JSON.
    pub fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.fetch(url)?;
        serde_json::from_slice(&body).map_err(|err| {
            FetchError::Decode {
                url: url.to_string(),
                message: err.to_string(),
            }
        })
    }

    fn check_status(&self, url: &str, domain: &str, response: &RawResponse) -> Result<()> {
        let remaining = response.header("x-ratelimit-remaining");
        let exhausted = remaining.is_some_and(|r| r.trim() == "0");
        let limit = || {
            response
                .header("x-ratelimit-limit")
                .unwrap_or("unknown")
                .to_string()
        };

        match response.status {
            200..=299 | 304 => {
                if exhausted {
                    debug!("Quota for {} exhausted, skipping further requests", domain);
                    self.mark_rate_limited(domain);
                }
                Ok(())
            }
            429 => {
                self.mark_rate_limited(domain);
                Err(FetchError::RateLimited {
                    domain: domain.to_string(),
                    limit: limit(),
                })
            }
            403 if exhausted => {
                self.mark_rate_limited(domain);
                Err(FetchError::RateLimited {
                    domain: domain.to_string(),
                    limit: limit(),
                })
            }
            404 => {
                Err(FetchError::NotFound {
                    url: url.to_string(),
                })
            }
            status => {
                Err(FetchError::Http {
                    status,
                    url: url.to_string(),
                })
            }
        }
    }
}

/// Host part of a URL, if it has one.
pub fn domain_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}
