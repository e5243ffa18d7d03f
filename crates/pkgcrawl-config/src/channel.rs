use documented::{Documented, DocumentedFields};
use pkgcrawl_utils::path::resolve_path;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Location of the root channel and how its source URLs map between the
/// local checkout and their canonical public form.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct ChannelConfig {
    /// Channel manifest, either an http(s) URL or a local path.
    pub location: Option<String>,

    /// Prefix of local sources to rewrite, usually a checkout of the channel repository.
    pub search: Option<String>,

    /// Canonical prefix that `search` is rewritten to before sources are stored.
    pub replace: Option<String>,

    /// Canonical sources that are never mapped back to their local form.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

impl ChannelConfig {
    pub fn resolve(&mut self) -> Result<()> {
        if self.search.is_some() != self.replace.is_some() {
            return Err(ConfigError::IncompleteRewrite);
        }

        if let Some(location) = &self.location {
            if !is_remote(location) {
                self.location = Some(resolve_path(location)?.to_string_lossy().into_owned());
            }
        }
        if let Some(search) = &self.search {
            if !is_remote(search) {
                self.search = Some(resolve_path(search)?.to_string_lossy().into_owned());
            }
        }

        Ok(())
    }

    pub fn location(&self) -> Result<&str> {
        self.location
            .as_deref()
            .ok_or(ConfigError::MissingChannelLocation)
    }

    fn rewrite_pair(&self) -> Option<(&str, &str)> {
        match (self.search.as_deref(), self.replace.as_deref()) {
            (Some(search), Some(replace)) if !search.is_empty() => Some((search, replace)),
            _ => None,
        }
    }

    /// Maps a local source to the canonical form stored in the catalog.
    pub fn to_canonical(&self, source: &str) -> String {
        match self.rewrite_pair() {
            Some((search, replace)) => source.replace(search, replace),
            None => source.to_string(),
        }
    }

    /// Maps a canonical source back to the form the crawler sees locally.
    pub fn to_local(&self, source: &str) -> String {
        if self.ignore.iter().any(|ignored| ignored == source) {
            return source.to_string();
        }
        match self.rewrite_pair() {
            Some((search, replace)) if !replace.is_empty() => source.replace(replace, search),
            _ => source.to_string(),
        }
    }
}
