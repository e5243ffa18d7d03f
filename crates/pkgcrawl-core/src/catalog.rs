//! The narrow read/write interface the crawler has onto the package catalog.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use pkgcrawl_provider::{PackageRecord, RecordKind};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Lifecycle of a catalog record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CatalogStatus {
    Active,
    Missing { error: String, needs_review: bool },
    Removed,
}

impl CatalogStatus {
    pub fn is_missing(&self) -> bool {
        matches!(self, CatalogStatus::Missing { .. })
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, CatalogStatus::Removed)
    }

    /// Removed records and suspicious failures are surfaced to a curator.
    pub fn needs_review(&self) -> bool {
        match self {
            CatalogStatus::Active => false,
            CatalogStatus::Missing { needs_review, .. } => *needs_review,
            CatalogStatus::Removed => true,
        }
    }
}

/// A stored record with its crawl bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub record: PackageRecord,
    pub status: CatalogStatus,
    /// Last time a crawl found the record.
    pub last_seen: DateTime<Utc>,
    pub platforms: Vec<String>,
    pub st_versions: Vec<u8>,
}

impl CatalogEntry {
    pub fn new(record: PackageRecord, seen: DateTime<Utc>) -> Self {
        Self {
            platforms: record.platforms(),
            st_versions: record.st_versions(),
            record,
            status: CatalogStatus::Active,
            last_seen: seen,
        }
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }
}

/// A rendered README attached to a package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredReadme {
    pub filename: String,
    pub format: String,
    pub source: String,
    pub rendered_html: String,
}

/// How `mark_missing` picks the records to flag.
#[derive(Clone, Copy, Debug)]
pub enum MissingTarget<'a> {
    /// Every record whose sources contain this source.
    Source(&'a str),
    /// The one record with this name.
    Name(&'a str),
}

/// Persistence collaborator for crawl outcomes.
///
/// Implementations must be safe to call from several worker threads; the
/// orchestrator serializes writes that touch the same name.
pub trait Catalog: Send + Sync {
    /// Inserts or replaces a record, keeping its current status.
    fn upsert_record(&self, kind: RecordKind, record: &PackageRecord) -> Result<()>;

    /// Clears any missing or removed state and records when it was seen.
    fn mark_active(&self, kind: RecordKind, name: &str, seen: DateTime<Utc>) -> Result<()>;

    /// Flags records as missing. Returns the names that were flagged.
    fn mark_missing(
        &self,
        kind: RecordKind,
        target: MissingTarget<'_>,
        error: &str,
        needs_review: bool,
    ) -> Result<Vec<String>>;

    fn mark_removed(&self, kind: RecordKind, name: &str) -> Result<()>;

    fn records_with_status(
        &self,
        kind: RecordKind,
        predicate: &dyn Fn(&CatalogEntry) -> bool,
    ) -> Result<Vec<CatalogEntry>>;

    fn entry(&self, kind: RecordKind, name: &str) -> Result<Option<CatalogEntry>>;

    fn sources_of(&self, kind: RecordKind, name: &str) -> Result<Vec<String>>;

    fn store_readme(&self, name: &str, readme: StoredReadme) -> Result<()>;

    fn delete_readme(&self, name: &str) -> Result<()>;

    fn readme(&self, name: &str) -> Result<Option<StoredReadme>>;

    /// Sources of the `limit` least recently seen non-removed records that
    /// have not been seen since `older_than`.
    fn outdated_sources(
        &self,
        kind: RecordKind,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>>;

    /// Sources of every non-removed record.
    fn known_sources(&self, kind: RecordKind) -> Result<HashSet<String>>;

    /// Persists pending writes. In-memory catalogs do nothing.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
