//! Provider for JSON repository manifests.
//!
//! A manifest lists packages and libraries, and may include further
//! manifests. Every release is either spelled out or resolved through a
//! hosting API from a `details`/`base` URL plus `tags` or `branch`.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, OnceLock},
};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    error::{ProviderError, Result},
    hosting::{client_for, empty_is_none, DownloadInfo, RepoInfo},
    loader::{load_json, resolve_relative},
    normalize::{normalize_record, split_authors},
    provider::{OutcomeCache, Provider, ProviderContext},
    record::{CrawlOutcome, PackageRecord, RecordKind, ReleaseRecord},
    schema::SchemaVersion,
};

const PROVIDER_NAME: &str = "JsonRepositoryProvider";

/// Date used for legacy releases that carry none.
const LEGACY_RELEASE_DATE: &str = "2011-08-01 00:00:00";

/// Upper bound on nested `includes`.
const MAX_INCLUDE_DEPTH: usize = 8;

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value.clone()],
            OneOrMany::Many(values) => values.clone(),
        }
    }
}

/// `tags: true` or `tags: "prefix-"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TagSpec {
    Enabled(bool),
    Prefix(String),
}

#[derive(Deserialize)]
struct RawRelease {
    #[serde(default, deserialize_with = "empty_is_none")]
    version: Option<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    url: Option<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    date: Option<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    sha256: Option<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    sublime_text: Option<String>,
    #[serde(default)]
    platforms: Option<OneOrMany>,
    #[serde(default)]
    python_versions: Option<OneOrMany>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    libraries: Vec<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    details: Option<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    base: Option<String>,
    #[serde(default)]
    tags: Option<TagSpec>,
    #[serde(default, deserialize_with = "empty_is_none")]
    branch: Option<String>,
}

#[derive(Deserialize)]
struct LegacyDownload {
    version: String,
    url: String,
}

#[derive(Deserialize)]
struct RawPackage {
    #[serde(default, deserialize_with = "empty_is_none")]
    name: Option<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    details: Option<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    description: Option<String>,
    #[serde(default)]
    author: Option<OneOrMany>,
    #[serde(default, deserialize_with = "empty_is_none")]
    homepage: Option<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    readme: Option<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    issues: Option<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    donate: Option<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    buy: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    previous_names: Vec<String>,
    #[serde(default)]
    releases: Vec<RawRelease>,
    #[serde(default)]
    platforms: Option<BTreeMap<String, Vec<LegacyDownload>>>,
    #[serde(default, deserialize_with = "empty_is_none")]
    last_modified: Option<String>,
}

/// One loaded manifest, or the reason it could not be loaded.
enum Manifest {
    Loaded {
        location: String,
        schema: SchemaVersion,
        packages: Vec<Value>,
        libraries: Vec<Value>,
    },
    Failed {
        location: String,
        error: ProviderError,
    },
}

/// Packages and libraries from a JSON repository manifest and its includes.
pub struct JsonRepositoryProvider {
    source: String,
    ctx: Arc<ProviderContext>,
    manifests: OnceLock<(Vec<String>, Vec<Manifest>)>,
    packages: OutcomeCache,
    libraries: OutcomeCache,
}

impl JsonRepositoryProvider {
    pub fn new(source: &str, ctx: Arc<ProviderContext>) -> Self {
        Self {
            source: source.to_string(),
            ctx,
            manifests: OnceLock::new(),
            packages: OutcomeCache::default(),
            libraries: OutcomeCache::default(),
        }
    }

    /// Loads the manifest and every include once. Returns the include list too.
    fn manifests(&self) -> &(Vec<String>, Vec<Manifest>) {
        self.manifests.get_or_init(|| {
            let mut includes = Vec::new();
            let mut manifests = Vec::new();
            let mut visited = HashSet::new();
            self.load_manifest(&self.source, 0, &mut visited, &mut includes, &mut manifests);
            (includes, manifests)
        })
    }

    fn load_manifest(
        &self,
        location: &str,
        depth: usize,
        visited: &mut HashSet<String>,
        includes: &mut Vec<String>,
        manifests: &mut Vec<Manifest>,
    ) {
        if !visited.insert(location.to_string()) {
            return;
        }

        let loaded = load_json(&self.ctx.fetcher, location).and_then(|doc| {
            let schema = SchemaVersion::from_value(doc.get("schema_version"), location)?;
            Ok((schema, doc))
        });
        let (schema, mut doc) = match loaded {
            Ok(loaded) => loaded,
            Err(error) => {
                warn!("Unable to load repository {}: {}", location, error);
                manifests.push(Manifest::Failed {
                    location: location.to_string(),
                    error,
                });
                return;
            }
        };

        let mut take_list = |key: &str| -> Vec<Value> {
            match doc.get_mut(key).map(Value::take) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            }
        };

        let packages = take_list("packages");
        let libraries = take_list(schema.libraries_key());
        let nested: Vec<String> = take_list("includes")
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| resolve_relative(location, s)))
            .collect();

        debug!(
            "Loaded {} (schema {}) with {} packages, {} libraries",
            location,
            schema,
            packages.len(),
            libraries.len()
        );
        manifests.push(Manifest::Loaded {
            location: location.to_string(),
            schema,
            packages,
            libraries,
        });

        for include in nested {
            includes.push(include.clone());
            if depth + 1 >= MAX_INCLUDE_DEPTH {
                warn!("Not following {}: includes nested too deeply", include);
                continue;
            }
            self.load_manifest(&include, depth + 1, visited, includes, manifests);
        }
    }

    fn list(&self, kind: RecordKind) -> Vec<CrawlOutcome> {
        let (_, manifests) = self.manifests();
        let mut outcomes = Vec::new();
        let mut seen = HashSet::new();

        for manifest in manifests {
            let (location, schema, entries) = match manifest {
                Manifest::Failed { location, error } => {
                    outcomes.push(CrawlOutcome::source_failed(location, error.clone()));
                    continue;
                }
                Manifest::Loaded {
                    location,
                    schema,
                    packages,
                    libraries,
                } => match kind {
                    RecordKind::Package => (location, *schema, packages),
                    RecordKind::Library => (location, *schema, libraries),
                },
            };

            for entry in entries {
                let outcome = match self.build_record(schema, location, entry) {
                    Ok(record) => CrawlOutcome::Found(record),
                    Err((name, error)) => {
                        warn!("Broken {} {} in {}: {}", kind, name, location, error);
                        CrawlOutcome::record_broken(name, error)
                    }
                };

                let name = match &outcome {
                    CrawlOutcome::Found(record) => record.name.clone(),
                    CrawlOutcome::RecordBroken { name, .. } => name.clone(),
                    CrawlOutcome::SourceFailed { source, .. } => source.clone(),
                };
                if seen.insert(name.clone()) {
                    outcomes.push(outcome);
                } else {
                    debug!("Ignoring duplicate {} {} in {}", kind, name, self.source);
                }
            }
        }

        outcomes
    }

    /// Builds one record from the manifest at `location`. Errors carry the
    /// best name available for the entry.
    fn build_record(
        &self,
        schema: SchemaVersion,
        location: &str,
        entry: &Value,
    ) -> std::result::Result<PackageRecord, (String, ProviderError)> {
        let fallback_name = entry
            .get("name")
            .and_then(Value::as_str)
            .or_else(|| entry.get("details").and_then(Value::as_str))
            .unwrap_or("unknown")
            .to_string();

        let raw: RawPackage = serde_json::from_value(entry.clone()).map_err(|err| {
            (
                fallback_name.clone(),
                ProviderError::InvalidRecord {
                    name: fallback_name.clone(),
                    location: location.to_string(),
                    message: err.to_string(),
                },
            )
        })?;

        self.resolve_package(schema, location, raw)
            .map_err(|err| (fallback_name, err))
    }

    /// Records are stored under the manifest they were loaded from, so a
    /// failing include marks exactly its own records missing.
    fn resolve_package(
        &self,
        schema: SchemaVersion,
        location: &str,
        mut raw: RawPackage,
    ) -> Result<PackageRecord> {
        let info = match raw.details.as_deref() {
            Some(details) => Some(self.repo_info(details)?),
            None => None,
        };

        let name = raw
            .name
            .clone()
            .or_else(|| info.as_ref().map(|i| i.name.clone()))
            .ok_or_else(|| {
                ProviderError::InvalidRecord {
                    name: "unknown".into(),
                    location: location.to_string(),
                    message: "missing \"name\" and \"details\"".into(),
                }
            })?;

        let releases = match raw.platforms.take() {
            Some(platforms) if schema == SchemaVersion::Legacy => {
                legacy_releases(platforms, raw.last_modified.as_deref())
            }
            _ => self.resolve_releases(schema, location, &name, &raw)?,
        };

        if releases.is_empty() {
            return Err(ProviderError::NoReleases {
                name,
                location: location.to_string(),
            });
        }

        let authors = match (raw.author, &info) {
            (Some(OneOrMany::One(author)), _) => split_authors(&author),
            (Some(OneOrMany::Many(authors)), _) => authors,
            (None, Some(info)) => vec![info.author.clone()],
            (None, None) => Vec::new(),
        };

        let mut record = PackageRecord {
            name,
            description: raw
                .description
                .or_else(|| info.as_ref().map(|i| i.description.clone())),
            authors,
            homepage: raw
                .homepage
                .or_else(|| info.as_ref().and_then(|i| i.homepage.clone())),
            labels: raw.labels,
            readme: raw
                .readme
                .or_else(|| info.as_ref().and_then(|i| i.readme.clone())),
            issues: raw
                .issues
                .or_else(|| info.as_ref().and_then(|i| i.issues.clone())),
            donate: raw
                .donate
                .or_else(|| info.as_ref().and_then(|i| i.donate.clone())),
            buy: raw.buy,
            previous_names: raw.previous_names,
            sources: vec![location.to_string()],
            releases,
            last_modified: raw.last_modified,
        };
        normalize_record(&mut record);
        Ok(record)
    }

    fn repo_info(&self, url: &str) -> Result<RepoInfo> {
        let not_found = || {
            ProviderError::RepoInfo {
                provider: PROVIDER_NAME,
                url: url.to_string(),
            }
        };
        let client = client_for(url, &self.ctx).ok_or_else(not_found)?;
        client.repo_info(url)?.ok_or_else(not_found)
    }

    fn resolve_releases(
        &self,
        schema: SchemaVersion,
        location: &str,
        name: &str,
        raw: &RawPackage,
    ) -> Result<Vec<ReleaseRecord>> {
        let mut releases = Vec::new();
        for release in &raw.releases {
            let template = ReleaseRecord {
                sublime_text: release.sublime_text.clone().unwrap_or_else(|| "*".into()),
                platforms: release
                    .platforms
                    .as_ref()
                    .map(OneOrMany::to_vec)
                    .unwrap_or_else(|| vec!["*".into()]),
                sha256: release.sha256.clone(),
                python_versions: release
                    .python_versions
                    .as_ref()
                    .map(OneOrMany::to_vec)
                    .unwrap_or_default(),
                libraries: match schema {
                    SchemaVersion::V4 => release.libraries.clone(),
                    _ => release.dependencies.clone(),
                },
                ..Default::default()
            };

            if let (Some(version), Some(url)) = (&release.version, &release.url) {
                let date = release.date.clone().ok_or_else(|| {
                    ProviderError::InvalidRecord {
                        name: name.to_string(),
                        location: location.to_string(),
                        message: format!("release {version} is missing \"date\""),
                    }
                })?;
                releases.push(ReleaseRecord {
                    version: version.clone(),
                    url: url.clone(),
                    date,
                    ..template
                });
                continue;
            }

            for download in self.download_info(schema, location, name, raw, release)? {
                releases.push(ReleaseRecord {
                    version: download.version,
                    url: download.url,
                    date: download.date,
                    ..template.clone()
                });
            }
        }
        Ok(releases)
    }

    /// Resolves a release without an explicit url through the hosting API.
    fn download_info(
        &self,
        schema: SchemaVersion,
        location: &str,
        name: &str,
        raw: &RawPackage,
        release: &RawRelease,
    ) -> Result<Vec<DownloadInfo>> {
        let invalid = |message: &str| {
            ProviderError::InvalidRecord {
                name: name.to_string(),
                location: location.to_string(),
                message: message.to_string(),
            }
        };

        let (url, downloads) = if schema.uses_base() {
            let base = release
                .base
                .as_deref()
                .or(raw.details.as_deref())
                .ok_or_else(|| invalid("release has no \"base\" and package has no \"details\""))?;
            let client = client_for(base, &self.ctx)
                .ok_or_else(|| invalid("\"base\" is not a supported code host"))?;

            let downloads = match (&release.tags, &release.branch) {
                (Some(TagSpec::Prefix(prefix)), _) => {
                    client.download_info_from_tags(base, Some(prefix))?
                }
                (Some(TagSpec::Enabled(true)), _) => client.download_info_from_tags(base, None)?,
                (_, Some(branch)) => client.download_info_from_branch(base, Some(branch))?,
                _ => return Err(invalid("release needs \"tags\" or \"branch\"")),
            };
            (base, downloads)
        } else {
            let details = release
                .details
                .as_deref()
                .ok_or_else(|| invalid("release has no \"url\" and no \"details\""))?;
            let client = client_for(details, &self.ctx)
                .ok_or_else(|| invalid("\"details\" is not a supported code host"))?;
            (details, client.download_info(details, None)?)
        };

        downloads.filter(|d| !d.is_empty()).ok_or_else(|| {
            ProviderError::DownloadInfo {
                provider: PROVIDER_NAME,
                url: url.to_string(),
            }
        })
    }
}

/// Converts a legacy `platforms` map into releases limited to the old editor.
fn legacy_releases(
    platforms: BTreeMap<String, Vec<LegacyDownload>>,
    last_modified: Option<&str>,
) -> Vec<ReleaseRecord> {
    platforms
        .into_iter()
        .filter_map(|(platform, downloads)| {
            let download = downloads.into_iter().next()?;
            Some(ReleaseRecord {
                version: download.version,
                sublime_text: "<3000".into(),
                platforms: vec![platform],
                url: download.url,
                date: last_modified.unwrap_or(LEGACY_RELEASE_DATE).to_string(),
                ..Default::default()
            })
        })
        .collect()
}

/// Drops outcomes that belong to an include listed in `invalid_sources`.
fn without_invalid_includes(
    outcomes: Vec<CrawlOutcome>,
    invalid_sources: &HashSet<String>,
) -> Vec<CrawlOutcome> {
    if invalid_sources.is_empty() {
        return outcomes;
    }
    outcomes
        .into_iter()
        .filter(|outcome| {
            match outcome {
                CrawlOutcome::Found(record) => {
                    !record
                        .sources
                        .iter()
                        .all(|source| invalid_sources.contains(source))
                }
                CrawlOutcome::SourceFailed { source, .. } => !invalid_sources.contains(source),
                CrawlOutcome::RecordBroken { .. } => true,
            }
        })
        .collect()
}

impl Provider for JsonRepositoryProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn list_packages(&self, invalid_sources: &HashSet<String>) -> Vec<CrawlOutcome> {
        if invalid_sources.contains(&self.source) {
            return Vec::new();
        }
        let outcomes = self.packages.get_or_compute(|| self.list(RecordKind::Package));
        without_invalid_includes(outcomes, invalid_sources)
    }

    fn list_libraries(&self, invalid_sources: &HashSet<String>) -> Vec<CrawlOutcome> {
        if invalid_sources.contains(&self.source) {
            return Vec::new();
        }
        let outcomes = self.libraries.get_or_compute(|| self.list(RecordKind::Library));
        without_invalid_includes(outcomes, invalid_sources)
    }

    fn sources(&self) -> Vec<String> {
        let (includes, _) = self.manifests();
        let mut sources = vec![self.source.clone()];
        for include in includes {
            if !sources.contains(include) {
                sources.push(include.clone());
            }
        }
        sources
    }
}
