//! Normalized package and library records and per-source crawl outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{error::ProviderError, normalize};

/// Which catalog table a record belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Package,
    Library,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::Package, RecordKind::Library];
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Package => write!(f, "package"),
            RecordKind::Library => write!(f, "library"),
        }
    }
}

/// One downloadable version of a package.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub version: String,
    /// Compatibility selector in canonical form, e.g. `>=3000` or `*`.
    pub sublime_text: String,
    pub platforms: Vec<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS`
    pub date: String,
    #[serde(default)]
    pub python_versions: Vec<String>,
    #[serde(default)]
    pub libraries: Vec<String>,
}

/// A package (or library) as stored in the catalog.
///
/// `name` is the identity; `previous_names` lets an external process carry
/// history over when a package is renamed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub homepage: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub readme: Option<String>,
    pub issues: Option<String>,
    pub donate: Option<String>,
    pub buy: Option<String>,
    #[serde(default)]
    pub previous_names: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub releases: Vec<ReleaseRecord>,
    pub last_modified: Option<String>,
}

impl PackageRecord {
    /// Platforms supported by any release, with architecture suffixes dropped.
    pub fn platforms(&self) -> Vec<String> {
        normalize::summary_platforms(&self.releases)
    }

    /// Major editor versions (2, 3, 4) supported by any release.
    pub fn st_versions(&self) -> Vec<u8> {
        normalize::record_st_versions(&self.releases)
    }
}

/// Result of crawling one source, for one package or for the source as a whole.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CrawlOutcome {
    Found(PackageRecord),
    /// The source (or a sub-resource such as one repository of a user) failed.
    SourceFailed {
        source: String,
        error: ProviderError,
    },
    /// A single record inside an otherwise good source is unusable.
    RecordBroken {
        name: String,
        error: ProviderError,
    },
}

impl CrawlOutcome {
    pub fn source_failed(source: impl Into<String>, error: impl Into<ProviderError>) -> Self {
        Self::SourceFailed {
            source: source.into(),
            error: error.into(),
        }
    }

    pub fn record_broken(name: impl Into<String>, error: impl Into<ProviderError>) -> Self {
        Self::RecordBroken {
            name: name.into(),
            error: error.into(),
        }
    }

    pub fn found(&self) -> Option<&PackageRecord> {
        match self {
            Self::Found(record) => Some(record),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ProviderError> {
        match self {
            Self::Found(_) => None,
            Self::SourceFailed { error, .. } | Self::RecordBroken { error, .. } => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(sublime_text: &str, platforms: &[&str]) -> ReleaseRecord {
        ReleaseRecord {
            version: "1.0.0".into(),
            sublime_text: sublime_text.into(),
            platforms: platforms.iter().map(|p| p.to_string()).collect(),
            url: "https://codeload.github.com/foo/bar/zip/1.0.0".into(),
            date: "2020-01-01 00:00:00".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_summary() {
        let record = PackageRecord {
            name: "Foo".into(),
            releases: vec![
                release("<3000", &["linux-x64"]),
                release(">=3000", &["windows-x32", "osx-x64"]),
            ],
            ..Default::default()
        };

        assert_eq!(record.platforms(), vec!["windows", "osx", "linux"]);
        assert_eq!(record.st_versions(), vec![2, 3, 4]);
    }

    #[test]
    fn test_outcome_accessors() {
        let found = CrawlOutcome::Found(PackageRecord {
            name: "Foo".into(),
            ..Default::default()
        });
        assert_eq!(found.found().map(|r| r.name.as_str()), Some("Foo"));
        assert!(found.error().is_none());

        let broken = CrawlOutcome::record_broken(
            "Bar",
            ProviderError::NoReleases {
                name: "Bar".into(),
                location: "repo.json".into(),
            },
        );
        assert!(broken.found().is_none());
        assert!(broken.error().is_some());
    }

    #[test]
    fn test_record_kind_display() {
        assert_eq!(RecordKind::Package.to_string(), "package");
        assert_eq!(RecordKind::Library.to_string(), "library");
    }
}
