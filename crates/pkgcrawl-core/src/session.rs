//! Wires configuration, secrets, fetcher, providers and catalog together.

use std::sync::Arc;

use pkgcrawl_config::{config::Config, secrets::Secrets};
use pkgcrawl_events::EventSinkHandle;
use pkgcrawl_fetch::Fetcher;
use pkgcrawl_provider::{ChannelWalker, ProviderContext, ProviderRegistry};
use pkgcrawl_utils::lock::FileLock;
use tracing::debug;

use crate::{
    error::{CoreError, Result},
    orchestrator::RefreshOrchestrator,
    removal::RemovalDetector,
    scrub::SecretScrubber,
    selection::Selection,
    store::JsonCatalog,
};

/// Everything one process needs to crawl or detect removals.
///
/// Secrets are resolved into the crawler settings once, here, and never
/// looked up again.
pub struct CrawlSession {
    config: Config,
    fetcher: Arc<Fetcher>,
    walker: Arc<ChannelWalker>,
    catalog: Arc<JsonCatalog>,
}

impl CrawlSession {
    pub fn open(mut config: Config, secrets: &Secrets) -> Result<Self> {
        config.crawler.apply_secrets(secrets);

        let fetcher = Arc::new(Fetcher::from_settings(&config.crawler)?);
        let ctx = ProviderContext::from_settings(fetcher.clone(), &config.crawler);
        let registry = Arc::new(ProviderRegistry::new(Arc::new(ctx)));
        let walker = Arc::new(ChannelWalker::new(config.channel.location()?, registry));

        let catalog_path = config.get_catalog_path()?;
        debug!("Using catalog {}", catalog_path.display());
        let catalog = Arc::new(JsonCatalog::open(catalog_path)?);

        Ok(Self {
            config,
            fetcher,
            walker,
            catalog,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    pub fn walker(&self) -> &Arc<ChannelWalker> {
        &self.walker
    }

    pub fn catalog(&self) -> &Arc<JsonCatalog> {
        &self.catalog
    }

    /// Takes the exclusive catalog lock, failing if another run holds it.
    pub fn lock(&self) -> Result<FileLock> {
        let path = self.config.get_catalog_path()?;
        let dir = path
            .parent()
            .map(|p| p.join("locks"))
            .unwrap_or_else(FileLock::default_dir);
        FileLock::try_acquire_in(&dir, "catalog")?.ok_or(CoreError::Busy)
    }

    pub fn scrubber(&self) -> SecretScrubber {
        SecretScrubber::new(
            &self.config.crawler.query_string_params,
            self.config.channel.clone(),
        )
    }

    /// Which sources a crawl refreshes: one package, everything, or the
    /// configured batch of outdated records.
    pub fn selection(&self, package: Option<String>, all: bool) -> Selection {
        match (package, all) {
            (Some(name), _) => Selection::Package(name),
            (None, true) => Selection::All,
            (None, false) => {
                Selection::Outdated {
                    older_than: self.config.outdated_after(),
                    limit: self.config.outdated_limit(),
                }
            }
        }
    }

    pub fn orchestrator(&self, events: EventSinkHandle) -> RefreshOrchestrator {
        RefreshOrchestrator::new(
            self.walker.clone(),
            self.catalog.clone(),
            self.config.channel.clone(),
            self.scrubber(),
        )
        .with_workers(self.config.workers())
        .with_events(events)
    }

    pub fn removal_detector(&self, events: EventSinkHandle) -> RemovalDetector {
        RemovalDetector::new(
            self.walker.clone(),
            self.catalog.clone(),
            self.config.channel.clone(),
        )
        .with_grace(self.config.removal_grace())
        .with_events(events)
    }
}
