//! Picks which known sources a crawl should leave alone.

use std::{collections::HashSet, time::Duration};

use chrono::Utc;
use pkgcrawl_provider::RecordKind;
use tracing::debug;

use crate::{catalog::Catalog, error::Result};

/// What a crawl run should refresh.
#[derive(Clone, Debug, Default)]
pub enum Selection {
    /// Refresh every source.
    #[default]
    All,
    /// Refresh only the sources of one named package.
    Package(String),
    /// Refresh the least recently seen records.
    Outdated { older_than: Duration, limit: usize },
}

/// Sources that should be skipped this run, per record kind.
#[derive(Clone, Debug, Default)]
pub struct InvalidSources {
    pub packages: HashSet<String>,
    pub libraries: HashSet<String>,
}

impl InvalidSources {
    pub fn get(&self, kind: RecordKind) -> &HashSet<String> {
        match kind {
            RecordKind::Package => &self.packages,
            RecordKind::Library => &self.libraries,
        }
    }

    pub fn get_mut(&mut self, kind: RecordKind) -> &mut HashSet<String> {
        match kind {
            RecordKind::Package => &mut self.packages,
            RecordKind::Library => &mut self.libraries,
        }
    }
}

/// Known sources of `kind` that are not selected for refresh.
///
/// An explicitly requested package selects its own sources and no library
/// sources at all.
pub fn select_invalid_sources(
    catalog: &dyn Catalog,
    kind: RecordKind,
    selection: &Selection,
) -> Result<HashSet<String>> {
    let valid: HashSet<String> = match (selection, kind) {
        (Selection::All, _) => return Ok(HashSet::new()),
        (Selection::Package(name), RecordKind::Package) => {
            catalog.sources_of(kind, name)?.into_iter().collect()
        }
        (Selection::Package(_), RecordKind::Library) => HashSet::new(),
        (Selection::Outdated { older_than, limit }, _) => {
            let age = chrono::Duration::from_std(*older_than).unwrap_or(chrono::Duration::zero());
            let cutoff = Utc::now() - age;
            catalog
                .outdated_sources(kind, cutoff, *limit)?
                .into_iter()
                .collect()
        }
    };

    let invalid: HashSet<String> = catalog
        .known_sources(kind)?
        .into_iter()
        .filter(|source| !valid.contains(source))
        .collect();

    debug!(
        "Selected {} {} sources, skipping {}",
        valid.len(),
        kind,
        invalid.len()
    );
    Ok(invalid)
}

/// Builds the skip lists for both record kinds.
pub fn select(catalog: &dyn Catalog, selection: &Selection) -> Result<InvalidSources> {
    let mut invalid = InvalidSources::default();
    for kind in RecordKind::ALL {
        *invalid.get_mut(kind) = select_invalid_sources(catalog, kind, selection)?;
    }
    Ok(invalid)
}
