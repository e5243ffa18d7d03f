//! A catalog kept in memory and persisted as one JSON document.

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use chrono::{DateTime, Utc};
use pkgcrawl_provider::{PackageRecord, RecordKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    catalog::{Catalog, CatalogEntry, CatalogStatus, MissingTarget, StoredReadme},
    error::{CoreError, ErrorContext, Result},
};

#[derive(Default, Serialize, Deserialize)]
struct CatalogState {
    #[serde(default)]
    packages: BTreeMap<String, CatalogEntry>,
    #[serde(default)]
    libraries: BTreeMap<String, CatalogEntry>,
    #[serde(default)]
    readmes: BTreeMap<String, StoredReadme>,
}

impl CatalogState {
    fn table(&self, kind: RecordKind) -> &BTreeMap<String, CatalogEntry> {
        match kind {
            RecordKind::Package => &self.packages,
            RecordKind::Library => &self.libraries,
        }
    }

    fn table_mut(&mut self, kind: RecordKind) -> &mut BTreeMap<String, CatalogEntry> {
        match kind {
            RecordKind::Package => &mut self.packages,
            RecordKind::Library => &mut self.libraries,
        }
    }
}

/// JSON-file catalog.
///
/// All reads and writes go to memory; [`Catalog::flush`] writes the whole
/// document to a temporary file and renames it over the old one.
pub struct JsonCatalog {
    path: Option<PathBuf>,
    state: RwLock<CatalogState>,
    dirty: AtomicBool,
}

impl JsonCatalog {
    /// Opens the catalog at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let content = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_slice(&content).map_err(|err| {
                CoreError::CatalogCorrupt {
                    path: path.clone(),
                    message: err.to_string(),
                }
            })?
        } else {
            CatalogState::default()
        };

        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
            dirty: AtomicBool::new(false),
        })
    }

    /// A catalog that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(CatalogState::default()),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.dirty.store(true, Ordering::Release);
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save(&self, path: &Path) -> Result<()> {
        let content = {
            let state = self.read();
            serde_json::to_vec_pretty(&*state).map_err(|err| CoreError::Serialize(err.to_string()))?
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("json.part");
        fs::write(&tmp_path, &content)
            .with_context(|| format!("writing {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("renaming {} to {}", tmp_path.display(), path.display()))?;

        debug!("Saved catalog to {} ({} bytes)", path.display(), content.len());
        Ok(())
    }
}

impl Catalog for JsonCatalog {
    fn upsert_record(&self, kind: RecordKind, record: &PackageRecord) -> Result<()> {
        let mut state = self.write();
        let table = state.table_mut(kind);

        match table.get_mut(&record.name) {
            Some(entry) => {
                entry.platforms = record.platforms();
                entry.st_versions = record.st_versions();
                entry.record = record.clone();
            }
            None => {
                trace!("New {} {}", kind, record.name);
                table.insert(
                    record.name.clone(),
                    CatalogEntry::new(record.clone(), Utc::now()),
                );
            }
        }
        Ok(())
    }

    fn mark_active(&self, kind: RecordKind, name: &str, seen: DateTime<Utc>) -> Result<()> {
        let mut state = self.write();
        if let Some(entry) = state.table_mut(kind).get_mut(name) {
            entry.status = CatalogStatus::Active;
            entry.last_seen = seen;
        }
        Ok(())
    }

    fn mark_missing(
        &self,
        kind: RecordKind,
        target: MissingTarget<'_>,
        error: &str,
        needs_review: bool,
    ) -> Result<Vec<String>> {
        let mut state = self.write();
        let mut marked = Vec::new();

        for entry in state.table_mut(kind).values_mut() {
            let hit = match target {
                MissingTarget::Source(source) => entry.record.sources.iter().any(|s| s == source),
                MissingTarget::Name(name) => entry.record.name == name,
            };
            if !hit || entry.status.is_removed() {
                continue;
            }
            entry.status = CatalogStatus::Missing {
                error: error.to_string(),
                needs_review,
            };
            marked.push(entry.record.name.clone());
        }

        Ok(marked)
    }

    fn mark_removed(&self, kind: RecordKind, name: &str) -> Result<()> {
        let mut state = self.write();
        if let Some(entry) = state.table_mut(kind).get_mut(name) {
            entry.status = CatalogStatus::Removed;
        }
        Ok(())
    }

    fn records_with_status(
        &self,
        kind: RecordKind,
        predicate: &dyn Fn(&CatalogEntry) -> bool,
    ) -> Result<Vec<CatalogEntry>> {
        Ok(self
            .read()
            .table(kind)
            .values()
            .filter(|entry| predicate(entry))
            .cloned()
            .collect())
    }

    fn entry(&self, kind: RecordKind, name: &str) -> Result<Option<CatalogEntry>> {
        Ok(self.read().table(kind).get(name).cloned())
    }

    fn sources_of(&self, kind: RecordKind, name: &str) -> Result<Vec<String>> {
        Ok(self
            .read()
            .table(kind)
            .get(name)
            .map(|entry| entry.record.sources.clone())
            .unwrap_or_default())
    }

    fn store_readme(&self, name: &str, readme: StoredReadme) -> Result<()> {
        self.write().readmes.insert(name.to_string(), readme);
        Ok(())
    }

    fn delete_readme(&self, name: &str) -> Result<()> {
        if self.read().readmes.contains_key(name) {
            self.write().readmes.remove(name);
        }
        Ok(())
    }

    fn readme(&self, name: &str) -> Result<Option<StoredReadme>> {
        Ok(self.read().readmes.get(name).cloned())
    }

    fn outdated_sources(
        &self,
        kind: RecordKind,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let state = self.read();
        let mut outdated: Vec<&CatalogEntry> = state
            .table(kind)
            .values()
            .filter(|entry| !entry.status.is_removed() && entry.last_seen < older_than)
            .collect();
        outdated.sort_by_key(|entry| entry.last_seen);

        let mut sources = Vec::new();
        for entry in outdated.into_iter().take(limit) {
            for source in &entry.record.sources {
                if !sources.contains(source) {
                    sources.push(source.clone());
                }
            }
        }
        Ok(sources)
    }

    fn known_sources(&self, kind: RecordKind) -> Result<HashSet<String>> {
        Ok(self
            .read()
            .table(kind)
            .values()
            .filter(|entry| !entry.status.is_removed())
            .flat_map(|entry| entry.record.sources.iter().cloned())
            .collect())
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.save(path)
    }
}
