//! Walks a channel manifest into the repositories it lists.

use std::{
    collections::HashSet,
    sync::{Arc, OnceLock},
};

use pkgcrawl_config::channel::ChannelConfig;
use serde::Deserialize;
use tracing::debug;

use crate::{
    error::{ProviderError, Result},
    loader::{is_remote, load_json, resolve_relative},
    registry::ProviderRegistry,
    schema::SchemaVersion,
};

#[derive(Deserialize)]
struct ChannelDocument {
    #[serde(default)]
    repositories: Vec<String>,
}

/// A loaded channel. The document is fetched once per walker.
pub struct ChannelWalker {
    location: String,
    registry: Arc<ProviderRegistry>,
    repositories: OnceLock<Result<Vec<String>>>,
}

impl ChannelWalker {
    pub fn new(location: &str, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            location: location.to_string(),
            registry,
            repositories: OnceLock::new(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Repository locations in channel order, relative entries resolved.
    pub fn repositories(&self) -> Result<Vec<String>> {
        self.repositories
            .get_or_init(|| self.load())
            .clone()
    }

    /// The channel's own declared sources, the roots of reachability.
    ///
    /// For a channel these are exactly its repositories; nested sources are
    /// only discovered by [`active_sources`](Self::active_sources).
    pub fn sources(&self) -> Result<Vec<String>> {
        self.repositories()
    }

    fn load(&self) -> Result<Vec<String>> {
        let value = load_json(&self.registry.context().fetcher, &self.location)?;
        SchemaVersion::from_value(value.get("schema_version"), &self.location)?;

        let document: ChannelDocument = serde_json::from_value(value).map_err(|err| {
            ProviderError::Parse {
                location: self.location.clone(),
                message: err.to_string(),
            }
        })?;

        let mut seen = HashSet::new();
        let repositories: Vec<String> = document
            .repositories
            .iter()
            .map(|entry| resolve_relative(&self.location, entry))
            .filter(|repo| seen.insert(repo.clone()))
            .collect();

        debug!(
            "Channel {} lists {} repositories",
            self.location,
            repositories.len()
        );
        Ok(repositories)
    }

    /// Every source that is still reachable from the channel, in canonical form.
    ///
    /// Local repositories contribute their includes as well, since those
    /// files live in the channel checkout and their packages are stored under
    /// the include's own location.
    pub fn active_sources(&self, channel: &ChannelConfig) -> Result<HashSet<String>> {
        let mut active = HashSet::new();
        for repository in self.sources()? {
            if !is_remote(&repository) {
                let provider = self.registry.provider_for(&repository);
                for source in provider.sources() {
                    active.insert(channel.to_canonical(&source));
                }
            }
            active.insert(channel.to_canonical(&repository));
        }
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::hosting::test_support::context;

    fn walker(location: &str) -> (Arc<pkgcrawl_fetch::MemoryTransport>, ChannelWalker) {
        let (transport, ctx) = context();
        let registry = Arc::new(ProviderRegistry::new(Arc::new(ctx)));
        (transport, ChannelWalker::new(location, registry))
    }

    #[test]
    fn test_repositories_resolved_and_deduped() {
        let (transport, walker) = walker("https://example.com/channel/channel.json");
        transport.insert_json(
            "https://example.com/channel/channel.json",
            r#"{
                "schema_version": "3.0.0",
                "repositories": [
                    "https://github.com/foo/bar",
                    "./repository/a.json",
                    "https://example.com/channel/repository/a.json"
                ]
            }"#,
        );

        let repositories = walker.repositories().unwrap();
        assert_eq!(
            repositories,
            vec![
                "https://github.com/foo/bar",
                "https://example.com/channel/repository/a.json",
            ]
        );

        assert_eq!(walker.sources().unwrap(), repositories);
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn test_bad_schema_is_error() {
        let (transport, walker) = walker("https://example.com/channel.json");
        transport.insert_json(
            "https://example.com/channel.json",
            r#"{"schema_version": "0.5", "repositories": []}"#,
        );

        assert!(matches!(
            walker.repositories(),
            Err(ProviderError::SchemaVersionMismatch { .. })
        ));
    }

    #[test]
    fn test_active_sources_include_local_includes_once() {
        let dir = tempdir().unwrap();
        let channel_path = dir.path().join("channel.json");
        fs::write(
            &channel_path,
            r#"{"schema_version": "3.0.0", "repositories": ["./repository.json", "https://github.com/foo/bar"]}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("repository.json"),
            r#"{"schema_version": "3.0.0", "includes": ["./repository/a.json"], "packages": []}"#,
        )
        .unwrap();
        fs::create_dir(dir.path().join("repository")).unwrap();
        fs::write(
            dir.path().join("repository").join("a.json"),
            r#"{"schema_version": "3.0.0", "packages": []}"#,
        )
        .unwrap();

        let local_root = dir.path().to_string_lossy().into_owned();
        let channel = ChannelConfig {
            location: Some(channel_path.to_string_lossy().into_owned()),
            search: Some(local_root.clone()),
            replace: Some("https://raw.example.com/channel".into()),
            ignore: Vec::new(),
        };

        let (_transport, walker) = walker(channel.location.as_deref().unwrap());
        let active = walker.active_sources(&channel).unwrap();

        let mut active: Vec<_> = active.into_iter().collect();
        active.sort();
        assert_eq!(
            active,
            vec![
                "https://github.com/foo/bar",
                "https://raw.example.com/channel/repository.json",
                "https://raw.example.com/channel/repository/a.json",
            ]
        );
    }
}
