//! Flags catalog records whose sources are no longer part of the channel.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use pkgcrawl_config::channel::ChannelConfig;
use pkgcrawl_events::{CrawlEvent, EntryKind, EventSinkHandle, NullSink};
use pkgcrawl_provider::{ChannelWalker, RecordKind};
use tracing::{debug, info};

use crate::{catalog::Catalog, error::Result};

/// Names flagged by one removal pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemovalSummary {
    pub packages: Vec<String>,
    pub libraries: Vec<String>,
}

impl RemovalSummary {
    pub fn names(&self, kind: RecordKind) -> &[String] {
        match kind {
            RecordKind::Package => &self.packages,
            RecordKind::Library => &self.libraries,
        }
    }

    fn names_mut(&mut self, kind: RecordKind) -> &mut Vec<String> {
        match kind {
            RecordKind::Package => &mut self.packages,
            RecordKind::Library => &mut self.libraries,
        }
    }
}

/// Marks records removed when none of their sources is reachable from the
/// channel any more.
///
/// Records currently flagged missing are never removed: their last crawl
/// failed, so their absence from the channel cannot be told apart from an
/// outage.
pub struct RemovalDetector {
    walker: Arc<ChannelWalker>,
    catalog: Arc<dyn Catalog>,
    channel: ChannelConfig,
    grace: Duration,
    events: EventSinkHandle,
}

impl RemovalDetector {
    pub fn new(walker: Arc<ChannelWalker>, catalog: Arc<dyn Catalog>, channel: ChannelConfig) -> Self {
        Self {
            walker,
            catalog,
            channel,
            grace: Duration::ZERO,
            events: Arc::new(NullSink),
        }
    }

    /// Records seen within `grace` are never candidates.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_events(mut self, events: EventSinkHandle) -> Self {
        self.events = events;
        self
    }

    /// Runs one pass. With `dry_run` the candidates are returned but not marked.
    pub fn detect(&self, dry_run: bool) -> Result<RemovalSummary> {
        let active = self.walker.active_sources(&self.channel)?;
        debug!("{} active sources", active.len());

        let grace = chrono::Duration::from_std(self.grace).unwrap_or(chrono::Duration::zero());
        let cutoff = Utc::now() - grace;

        let mut summary = RemovalSummary::default();
        for kind in RecordKind::ALL {
            let candidates = self.catalog.records_with_status(kind, &|entry| {
                !entry.status.is_removed() && !entry.status.is_missing() && entry.last_seen < cutoff
            })?;

            for entry in candidates {
                if entry.record.sources.iter().any(|source| active.contains(source)) {
                    continue;
                }

                if !dry_run {
                    self.catalog.mark_removed(kind, entry.name())?;
                    self.events.emit(CrawlEvent::RecordRemoved {
                        kind: match kind {
                            RecordKind::Package => EntryKind::Package,
                            RecordKind::Library => EntryKind::Library,
                        },
                        name: entry.name().to_string(),
                    });
                }
                summary.names_mut(kind).push(entry.record.name);
            }
        }

        if !dry_run {
            self.catalog.flush()?;
        }
        info!(
            packages = summary.packages.len(),
            libraries = summary.libraries.len(),
            dry_run,
            "removal pass finished"
        );
        Ok(summary)
    }
}
