//! Drives one crawl: channel, providers, catalog.
//!
//! Repositories are crawled on a bounded rayon pool. Found records are
//! written as soon as a worker produces them; failures are collected and
//! applied once every repository has been processed, so a source that is
//! both failing and shared between repositories is only marked once.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{Arc, Mutex},
};

use chrono::Utc;
use pkgcrawl_config::channel::ChannelConfig;
use pkgcrawl_events::{CrawlEvent, EntryKind, EventSinkHandle, NullSink, ReadmeStage};
use pkgcrawl_provider::{
    ChannelWalker, CrawlOutcome, PackageRecord, ProviderError, ReadmeClient, RecordKind,
};
use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::{
    catalog::{Catalog, MissingTarget, StoredReadme},
    error::{CoreError, Result},
    readme::{PlainRenderer, ReadmeRenderer},
    scrub::SecretScrubber,
    selection::InvalidSources,
};

/// Names touched by a crawl run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Packages found and stored.
    pub packages: Vec<String>,
    /// Libraries found and stored.
    pub libraries: Vec<String>,
    /// Records flagged missing, prefixed with their kind.
    pub missing: Vec<String>,
    /// Records that could not be built.
    pub broken: Vec<String>,
    /// Sources skipped because of API rate limits.
    pub rate_limited: Vec<String>,
}

impl RefreshSummary {
    pub fn names(&self, kind: RecordKind) -> &[String] {
        match kind {
            RecordKind::Package => &self.packages,
            RecordKind::Library => &self.libraries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
            && self.libraries.is_empty()
            && self.missing.is_empty()
            && self.broken.is_empty()
    }
}

struct Failure {
    kind: RecordKind,
    target: String,
    error: String,
    needs_review: bool,
}

/// What one worker learned about one repository.
#[derive(Default)]
struct RepositoryReport {
    found: Vec<(RecordKind, String)>,
    failed_sources: Vec<Failure>,
    broken: Vec<Failure>,
    rate_limited: Vec<String>,
}

fn entry_kind(kind: RecordKind) -> EntryKind {
    match kind {
        RecordKind::Package => EntryKind::Package,
        RecordKind::Library => EntryKind::Library,
    }
}

/// Per-name write locks so upsert, mark and README for one record never interleave.
#[derive(Default)]
struct NameLocks {
    locks: Mutex<HashMap<(RecordKind, String), Arc<Mutex<()>>>>,
}

impl NameLocks {
    fn for_name(&self, kind: RecordKind, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry((kind, name.to_string()))
            .or_default()
            .clone()
    }
}

pub struct RefreshOrchestrator {
    walker: Arc<ChannelWalker>,
    catalog: Arc<dyn Catalog>,
    channel: ChannelConfig,
    scrubber: SecretScrubber,
    renderer: Arc<dyn ReadmeRenderer>,
    events: EventSinkHandle,
    workers: usize,
    name_locks: NameLocks,
}

impl RefreshOrchestrator {
    pub fn new(
        walker: Arc<ChannelWalker>,
        catalog: Arc<dyn Catalog>,
        channel: ChannelConfig,
        scrubber: SecretScrubber,
    ) -> Self {
        Self {
            walker,
            catalog,
            channel,
            scrubber,
            renderer: Arc::new(PlainRenderer),
            events: Arc::new(NullSink),
            workers: 1,
            name_locks: NameLocks::default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_events(mut self, events: EventSinkHandle) -> Self {
        self.events = events;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ReadmeRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Crawls every repository of the channel, skipping `invalid` sources.
    ///
    /// `invalid` holds canonical sources, as stored in the catalog.
    pub fn refresh(&self, invalid: &InvalidSources) -> Result<RefreshSummary> {
        let local_invalid = self.to_local(invalid);
        let repositories = self.walker.repositories()?;

        info!(
            repositories = repositories.len(),
            workers = self.workers,
            "starting crawl"
        );
        self.events.emit(CrawlEvent::RefreshStarted {
            repositories: repositories.len(),
        });

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("pkgcrawl-worker-{i}"))
            .build()
            .map_err(|err| CoreError::WorkerPool(err.to_string()))?;

        let reports: Vec<RepositoryReport> = pool.install(|| {
            repositories
                .par_iter()
                .map(|repository| self.process_repository(repository, &local_invalid))
                .collect()
        });

        let summary = self.apply_failures(reports)?;
        self.catalog.flush()?;

        self.events.emit(CrawlEvent::RefreshComplete {
            packages: summary.packages.len(),
            libraries: summary.libraries.len(),
            failed: summary.missing.len(),
        });
        info!(
            packages = summary.packages.len(),
            libraries = summary.libraries.len(),
            missing = summary.missing.len(),
            "crawl finished"
        );
        Ok(summary)
    }

    fn to_local(&self, invalid: &InvalidSources) -> InvalidSources {
        let mut local = InvalidSources::default();
        for kind in RecordKind::ALL {
            *local.get_mut(kind) = invalid
                .get(kind)
                .iter()
                .map(|source| self.channel.to_local(source))
                .collect();
        }
        local
    }

    fn process_repository(&self, repository: &str, invalid: &InvalidSources) -> RepositoryReport {
        let provider = self.walker.registry().provider_for(repository);
        debug!("Crawling {} with {}", repository, provider.name());
        self.events.emit(CrawlEvent::RepositoryStarted {
            source: repository.to_string(),
            provider: provider.name(),
        });

        let mut report = RepositoryReport::default();
        for kind in RecordKind::ALL {
            let outcomes = match kind {
                RecordKind::Package => provider.list_packages(invalid.get(kind)),
                RecordKind::Library => provider.list_libraries(invalid.get(kind)),
            };
            for outcome in outcomes {
                self.handle_outcome(kind, outcome, &mut report);
            }
        }

        self.events.emit(CrawlEvent::RepositoryFinished {
            source: repository.to_string(),
            found: report.found.len(),
            failed: report.failed_sources.len() + report.broken.len(),
        });
        report
    }

    fn handle_outcome(&self, kind: RecordKind, outcome: CrawlOutcome, report: &mut RepositoryReport) {
        match outcome {
            CrawlOutcome::Found(record) => {
                let name = record.name.clone();
                match self.store_record(kind, record) {
                    Ok(()) => report.found.push((kind, name)),
                    Err(err) => warn!("Unable to store {} {}: {}", kind, name, err),
                }
            }
            CrawlOutcome::SourceFailed { source, error } => {
                if let Some(skipped) = self.rate_limited(&source, &error) {
                    report.rate_limited.push(skipped);
                    return;
                }
                report.failed_sources.push(self.failure(kind, source, &error));
            }
            CrawlOutcome::RecordBroken { name, error } => {
                if let Some(skipped) = self.rate_limited(&name, &error) {
                    report.rate_limited.push(skipped);
                    return;
                }
                report.broken.push(self.failure(kind, name, &error));
            }
        }
    }

    fn rate_limited(&self, target: &str, error: &ProviderError) -> Option<String> {
        if !error.is_rate_limited() {
            return None;
        }
        debug!("Skipping {}: {}", target, error);
        self.events.emit(CrawlEvent::RateLimited {
            source: target.to_string(),
            message: error.to_string(),
        });
        Some(target.to_string())
    }

    fn failure(&self, kind: RecordKind, target: String, error: &ProviderError) -> Failure {
        Failure {
            kind,
            target,
            error: self.scrubber.scrub(&error.to_string()),
            needs_review: error.needs_review(),
        }
    }

    fn store_record(&self, kind: RecordKind, mut record: PackageRecord) -> Result<()> {
        record.sources = record
            .sources
            .iter()
            .map(|source| self.channel.to_canonical(source))
            .collect();

        let lock = self.name_locks.for_name(kind, &record.name);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        self.catalog.upsert_record(kind, &record)?;
        self.catalog.mark_active(kind, &record.name, Utc::now())?;
        trace!("Stored {} {}", kind, record.name);
        self.events.emit(CrawlEvent::RecordStored {
            kind: entry_kind(kind),
            name: record.name.clone(),
        });

        if kind == RecordKind::Package {
            self.store_readme(&record)?;
        }
        Ok(())
    }

    fn store_readme(&self, record: &PackageRecord) -> Result<()> {
        let stored = match record.readme.as_deref() {
            Some(url) => self.fetch_readme(url),
            None => None,
        };

        let stage = match stored {
            Some(readme) => {
                self.catalog.store_readme(&record.name, readme)?;
                ReadmeStage::Stored
            }
            None => {
                self.catalog.delete_readme(&record.name)?;
                ReadmeStage::Deleted
            }
        };
        self.events.emit(CrawlEvent::Readme {
            name: record.name.clone(),
            stage,
        });
        Ok(())
    }

    fn fetch_readme(&self, url: &str) -> Option<StoredReadme> {
        let ctx = self.walker.registry().context();
        let info = match ReadmeClient::new(ctx).readme_info(url) {
            Ok(Some(info)) => info,
            Ok(None) => return None,
            Err(err) => {
                debug!("Unable to fetch README {}: {}", url, self.scrubber.scrub(&err.to_string()));
                return None;
            }
        };

        match self.renderer.render(&info) {
            Ok(html) => {
                Some(StoredReadme {
                    filename: info.filename,
                    format: info.format.to_string(),
                    source: url.to_string(),
                    rendered_html: html,
                })
            }
            Err(err) => {
                debug!("Unable to render README {}: {}", url, err);
                None
            }
        }
    }

    /// Marks failed sources and broken records missing.
    ///
    /// A failed source marks records of both kinds, since a manifest holds
    /// packages and libraries alike.
    fn apply_failures(&self, reports: Vec<RepositoryReport>) -> Result<RefreshSummary> {
        let mut summary = RefreshSummary::default();
        let mut missing = BTreeSet::new();
        let mut seen_sources = HashSet::new();

        for report in reports {
            for (kind, name) in report.found {
                match kind {
                    RecordKind::Package => summary.packages.push(name),
                    RecordKind::Library => summary.libraries.push(name),
                }
            }
            summary.rate_limited.extend(report.rate_limited);

            for failure in report.failed_sources {
                let source = self.channel.to_canonical(&failure.target);
                if !seen_sources.insert(source.clone()) {
                    continue;
                }
                warn!("Source {} failed: {}", source, failure.error);
                for kind in RecordKind::ALL {
                    let marked = self.catalog.mark_missing(
                        kind,
                        MissingTarget::Source(&source),
                        &failure.error,
                        failure.needs_review,
                    )?;
                    missing.extend(marked.into_iter().map(|name| format!("{kind}:{name}")));
                }
                self.events.emit(CrawlEvent::SourceFailed {
                    kind: entry_kind(failure.kind),
                    source,
                    error: failure.error,
                    needs_review: failure.needs_review,
                });
            }

            for failure in report.broken {
                warn!("{} {} is broken: {}", failure.kind, failure.target, failure.error);
                let marked = self.catalog.mark_missing(
                    failure.kind,
                    MissingTarget::Name(&failure.target),
                    &failure.error,
                    failure.needs_review,
                )?;
                missing.extend(
                    marked
                        .into_iter()
                        .map(|name| format!("{}:{name}", failure.kind)),
                );
                summary.broken.push(failure.target.clone());
                self.events.emit(CrawlEvent::RecordBroken {
                    kind: entry_kind(failure.kind),
                    name: failure.target,
                    error: failure.error,
                    needs_review: failure.needs_review,
                });
            }
        }

        summary.packages.sort();
        summary.packages.dedup();
        summary.libraries.sort();
        summary.libraries.dedup();
        summary.broken.sort();
        summary.broken.dedup();
        summary.rate_limited.sort();
        summary.rate_limited.dedup();
        summary.missing = missing.into_iter().collect();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use pkgcrawl_events::CollectorSink;
    use pkgcrawl_fetch::{FetchError, Fetcher, MemoryTransport, RawResponse};
    use pkgcrawl_provider::{ProviderContext, ProviderRegistry};

    use super::*;
    use crate::{catalog::CatalogStatus, store::JsonCatalog};

    const CHANNEL: &str = "https://example.com/channel.json";
    const REPO_A: &str = "https://example.com/repoA.json";

    struct Harness {
        transport: Arc<MemoryTransport>,
        catalog: Arc<JsonCatalog>,
        events: Arc<CollectorSink>,
    }

    impl Harness {
        fn new() -> Self {
            let transport = Arc::new(MemoryTransport::new());
            transport.insert_json(
                CHANNEL,
                &format!(r#"{{"schema_version": "3.0.0", "repositories": ["{REPO_A}"]}}"#),
            );
            Self {
                transport,
                catalog: Arc::new(JsonCatalog::in_memory()),
                events: Arc::new(CollectorSink::default()),
            }
        }

        /// A fresh orchestrator, as a new process would build it.
        fn orchestrator(&self) -> RefreshOrchestrator {
            let fetcher = Fetcher::new(self.transport.clone());
            let ctx = Arc::new(ProviderContext::new(Arc::new(fetcher)));
            let registry = Arc::new(ProviderRegistry::new(ctx));
            let walker = Arc::new(ChannelWalker::new(CHANNEL, registry));
            let channel = ChannelConfig {
                location: Some(CHANNEL.into()),
                ..Default::default()
            };
            let scrubber = SecretScrubber::new(&Default::default(), channel.clone());

            RefreshOrchestrator::new(walker, self.catalog.clone(), channel, scrubber)
                .with_workers(2)
                .with_events(self.events.clone())
        }
    }

    fn repo_with(packages: &str) -> String {
        format!(r#"{{"schema_version": "3.0.0", "packages": [{packages}]}}"#)
    }

    fn package(name: &str) -> String {
        format!(
            r#"{{"name": "{name}", "readme": "https://example.com/{name}/README.md",
                "releases": [{{"version": "1.0.0", "url": "https://example.com/{name}.zip",
                "date": "2020-01-01 00:00:00", "sublime_text": ">=3000", "platforms": ["*"]}}]}}"#
        )
    }

    #[test]
    fn test_found_records_are_active() {
        let harness = Harness::new();
        harness.transport.insert_json(REPO_A, &repo_with(&package("Foo")));
        harness.transport.insert(
            "https://example.com/Foo/README.md",
            RawResponse::new(200, "# Foo"),
        );

        let summary = harness
            .orchestrator()
            .refresh(&InvalidSources::default())
            .unwrap();
        assert_eq!(summary.packages, vec!["Foo"]);
        assert!(summary.missing.is_empty());

        let entry = harness
            .catalog
            .entry(RecordKind::Package, "Foo")
            .unwrap()
            .unwrap();
        assert_eq!(entry.status, CatalogStatus::Active);
        assert_eq!(entry.record.sources, vec![REPO_A]);
        assert_eq!(
            entry.record.releases[0].platforms,
            vec!["windows", "osx", "linux"]
        );

        let readme = harness.catalog.readme("Foo").unwrap().unwrap();
        assert_eq!(readme.format, "markdown");
        assert!(readme.rendered_html.contains("# Foo"));
    }

    #[test]
    fn test_missing_readme_is_deleted() {
        let harness = Harness::new();
        harness.catalog
            .store_readme(
                "Foo",
                StoredReadme {
                    filename: "README.md".into(),
                    format: "markdown".into(),
                    source: "https://example.com/Foo/README.md".into(),
                    rendered_html: "stale".into(),
                },
            )
            .unwrap();
        harness.transport.insert_json(REPO_A, &repo_with(&package("Foo")));

        harness
            .orchestrator()
            .refresh(&InvalidSources::default())
            .unwrap();

        assert!(harness.catalog.readme("Foo").unwrap().is_none());
        let entry = harness.catalog.entry(RecordKind::Package, "Foo").unwrap().unwrap();
        assert_eq!(entry.status, CatalogStatus::Active);
    }

    #[test]
    fn test_failed_source_marks_missing() {
        let harness = Harness::new();
        harness.transport.insert_json(REPO_A, &repo_with(&package("Foo")));
        harness
            .orchestrator()
            .refresh(&InvalidSources::default())
            .unwrap();

        harness.transport.insert_error(
            REPO_A,
            FetchError::NotFound {
                url: REPO_A.into(),
            },
        );
        let summary = harness
            .orchestrator()
            .refresh(&InvalidSources::default())
            .unwrap();
        assert_eq!(summary.missing, vec!["package:Foo"]);

        let entry = harness.catalog.entry(RecordKind::Package, "Foo").unwrap().unwrap();
        match entry.status {
            CatalogStatus::Missing {
                error,
                needs_review,
            } => {
                assert!(error.starts_with("HTTP error 404"));
                assert!(needs_review);
            }
            other => panic!("unexpected status {other:?}"),
        }

        assert!(harness.events.events().iter().any(|e| matches!(
            e,
            CrawlEvent::SourceFailed {
                needs_review: true,
                ..
            }
        )));
    }

    #[test]
    fn test_failed_include_marks_its_records_missing() {
        const SUB: &str = "https://example.com/sub.json";
        let harness = Harness::new();
        harness.transport.insert_json(
            REPO_A,
            &format!(
                r#"{{"schema_version": "3.0.0", "includes": ["{SUB}"], "packages": [{}]}}"#,
                package("Top")
            ),
        );
        harness.transport.insert_json(SUB, &repo_with(&package("Inc")));

        let summary = harness
            .orchestrator()
            .refresh(&InvalidSources::default())
            .unwrap();
        assert_eq!(summary.packages, vec!["Inc", "Top"]);
        let inc = harness.catalog.entry(RecordKind::Package, "Inc").unwrap().unwrap();
        assert_eq!(inc.record.sources, vec![SUB]);

        harness.transport.insert_error(
            SUB,
            FetchError::NotFound {
                url: SUB.into(),
            },
        );
        let summary = harness
            .orchestrator()
            .refresh(&InvalidSources::default())
            .unwrap();
        assert_eq!(summary.packages, vec!["Top"]);
        assert_eq!(summary.missing, vec!["package:Inc"]);

        let inc = harness.catalog.entry(RecordKind::Package, "Inc").unwrap().unwrap();
        assert!(matches!(
            inc.status,
            CatalogStatus::Missing {
                needs_review: true,
                ..
            }
        ));
        let top = harness.catalog.entry(RecordKind::Package, "Top").unwrap().unwrap();
        assert_eq!(top.status, CatalogStatus::Active);
    }

    #[test]
    fn test_broken_record_is_isolated() {
        let harness = Harness::new();
        let broken = r#"{"name": "Three", "releases": [{"version": "1.0.0", "url": "https://x/3.zip"}]}"#;
        let packages = [
            package("One"),
            package("Two"),
            broken.to_string(),
            package("Four"),
            package("Five"),
        ]
        .join(",");
        harness.transport.insert_json(REPO_A, &repo_with(&packages));
        harness
            .catalog
            .upsert_record(
                RecordKind::Package,
                &PackageRecord {
                    name: "Three".into(),
                    sources: vec![REPO_A.into()],
                    ..Default::default()
                },
            )
            .unwrap();

        let summary = harness
            .orchestrator()
            .refresh(&InvalidSources::default())
            .unwrap();

        assert_eq!(summary.packages, vec!["Five", "Four", "One", "Two"]);
        assert_eq!(summary.broken, vec!["Three"]);
        assert_eq!(summary.missing, vec!["package:Three"]);

        let three = harness.catalog.entry(RecordKind::Package, "Three").unwrap().unwrap();
        assert!(matches!(
            three.status,
            CatalogStatus::Missing {
                needs_review: false,
                ..
            }
        ));
    }

    #[test]
    fn test_rate_limited_source_is_untouched() {
        let harness = Harness::new();
        harness.transport.insert_json(REPO_A, &repo_with(&package("Foo")));
        harness
            .orchestrator()
            .refresh(&InvalidSources::default())
            .unwrap();

        harness.transport.insert_error(
            REPO_A,
            FetchError::RateLimited {
                domain: "example.com".into(),
                limit: "60".into(),
            },
        );
        let summary = harness
            .orchestrator()
            .refresh(&InvalidSources::default())
            .unwrap();

        assert!(summary.missing.is_empty());
        assert_eq!(summary.rate_limited, vec![REPO_A]);
        let entry = harness.catalog.entry(RecordKind::Package, "Foo").unwrap().unwrap();
        assert_eq!(entry.status, CatalogStatus::Active);
    }

    #[test]
    fn test_invalid_sources_are_skipped() {
        let harness = Harness::new();
        harness.transport.insert_json(REPO_A, &repo_with(&package("Foo")));

        let invalid = InvalidSources {
            packages: HashSet::from([REPO_A.to_string()]),
            libraries: HashSet::from([REPO_A.to_string()]),
        };
        let summary = harness.orchestrator().refresh(&invalid).unwrap();

        assert!(summary.is_empty());
        assert!(!harness.transport.requests().iter().any(|url| url == REPO_A));
    }
}
