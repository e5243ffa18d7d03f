use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Named secrets (API tokens, app passwords) loaded once per process.
///
/// The file is a flat TOML table of `name = "value"` pairs.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Secrets {
    values: HashMap<String, String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.values.keys().collect();
        names.sort();
        f.debug_struct("Secrets").field("names", &names).finish()
    }
}

impl Secrets {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| {
            ConfigError::Secrets {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Loads the secrets file if it exists, otherwise returns an empty set.
    pub fn load_optional(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_secrets_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, "github_access_token_octocat = \"abc\"\n").unwrap();

        let secrets = Secrets::load(&path).unwrap();
        assert_eq!(secrets.get("github_access_token_octocat"), Some("abc"));
        assert_eq!(secrets.get("missing"), None);
    }

    #[test]
    fn test_load_optional_missing_file() {
        let dir = tempdir().unwrap();
        let secrets = Secrets::load_optional(&dir.path().join("nope.toml")).unwrap();
        assert!(secrets.is_empty());
    }

    #[test]
    fn test_debug_hides_values() {
        let secrets = Secrets::from_pairs([("token", "hunter2")]);
        let rendered = format!("{secrets:?}");
        assert!(rendered.contains("token"));
        assert!(!rendered.contains("hunter2"));
    }
}
