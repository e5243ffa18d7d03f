//! The provider contract and the state shared by providers during a run.

use std::{
    collections::HashSet,
    sync::{Arc, OnceLock},
};

use pkgcrawl_config::settings::CrawlerSettings;
use pkgcrawl_fetch::Fetcher;
use serde::de::DeserializeOwned;

use crate::{error::Result, record::CrawlOutcome};

/// Everything a provider needs to reach the network.
pub struct ProviderContext {
    pub fetcher: Arc<Fetcher>,
    /// Final tag releases kept per package, 0 for unlimited.
    pub max_releases: usize,
    /// Skip optional API calls such as per-tag commit lookups.
    pub min_api_calls: bool,
}

impl ProviderContext {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            max_releases: 0,
            min_api_calls: false,
        }
    }

    pub fn from_settings(fetcher: Arc<Fetcher>, settings: &CrawlerSettings) -> Self {
        Self {
            fetcher,
            max_releases: settings.max_releases(),
            min_api_calls: settings.min_api_calls(),
        }
    }

    pub fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        Ok(self.fetcher.fetch_json(url)?)
    }
}

/// Turns one source into package and library outcomes.
///
/// Results are computed once per provider instance and replayed on later
/// calls, so a provider must be dropped to observe a fresh crawl. A source
/// listed in `invalid_sources` yields nothing and performs no I/O.
pub trait Provider: Send + Sync {
    /// Provider type name, used in logs and error messages.
    fn name(&self) -> &'static str;

    /// The source this provider was built for.
    fn source(&self) -> &str;

    fn list_packages(&self, invalid_sources: &HashSet<String>) -> Vec<CrawlOutcome>;

    /// Libraries (formerly dependencies). Providers without them yield nothing.
    fn list_libraries(&self, _invalid_sources: &HashSet<String>) -> Vec<CrawlOutcome> {
        Vec::new()
    }

    /// Sources directly or transitively referenced by this one.
    fn sources(&self) -> Vec<String> {
        vec![self.source().to_string()]
    }
}

/// Memo of one list of outcomes for the lifetime of a provider.
#[derive(Default)]
pub struct OutcomeCache {
    cell: OnceLock<Vec<CrawlOutcome>>,
}

impl OutcomeCache {
    pub fn get_or_compute<F>(&self, compute: F) -> Vec<CrawlOutcome>
    where
        F: FnOnce() -> Vec<CrawlOutcome>,
    {
        self.cell.get_or_init(compute).clone()
    }

    pub fn is_computed(&self) -> bool {
        self.cell.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PackageRecord;

    #[test]
    fn test_outcome_cache_computes_once() {
        let cache = OutcomeCache::default();
        let mut calls = 0;

        for _ in 0..3 {
            let outcomes = cache.get_or_compute(|| {
                calls += 1;
                vec![CrawlOutcome::Found(PackageRecord {
                    name: "Foo".into(),
                    ..Default::default()
                })]
            });
            assert_eq!(outcomes.len(), 1);
        }

        assert_eq!(calls, 1);
        assert!(cache.is_computed());
    }
}
