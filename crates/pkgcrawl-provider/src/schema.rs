use std::fmt;

use serde_json::Value;

use crate::error::{ProviderError, Result};

/// Supported manifest schema versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchemaVersion {
    /// 1.0 through 1.2: packages carry a `platforms` map instead of releases.
    Legacy,
    V2,
    V3,
    V4,
}

impl SchemaVersion {
    /// Parses the `schema_version` value of a manifest located at `location`.
    ///
    /// Numbers are accepted as well as strings; an integer `2` reads as `2.0`.
    pub fn from_value(value: Option<&Value>, location: &str) -> Result<Self> {
        let raw = match value {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => format!("{n}.0"),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => other.to_string(),
            None => "missing".to_string(),
        };

        match raw.as_str() {
            "1.0" | "1.1" | "1.2" => Ok(Self::Legacy),
            "2.0" => Ok(Self::V2),
            "3.0.0" => Ok(Self::V3),
            "4.0.0" => Ok(Self::V4),
            _ => {
                Err(ProviderError::SchemaVersionMismatch {
                    location: location.to_string(),
                    version: raw,
                })
            }
        }
    }

    /// Schema 4 renamed `dependencies` to `libraries`.
    pub fn libraries_key(self) -> &'static str {
        match self {
            Self::V4 => "libraries",
            _ => "dependencies",
        }
    }

    /// Schema 3 and later resolve releases through `base` instead of `details`.
    pub fn uses_base(self) -> bool {
        self >= Self::V3
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Legacy => "1.2",
            Self::V2 => "2.0",
            Self::V3 => "3.0.0",
            Self::V4 => "4.0.0",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_from_value() {
        let parse = |v: Value| SchemaVersion::from_value(Some(&v), "repo.json");

        assert_eq!(parse(json!("3.0.0")).unwrap(), SchemaVersion::V3);
        assert_eq!(parse(json!("4.0.0")).unwrap(), SchemaVersion::V4);
        assert_eq!(parse(json!(2)).unwrap(), SchemaVersion::V2);
        assert_eq!(parse(json!(2.0)).unwrap(), SchemaVersion::V2);
        assert_eq!(parse(json!(1.2)).unwrap(), SchemaVersion::Legacy);
        assert_eq!(parse(json!("1.1")).unwrap(), SchemaVersion::Legacy);
    }

    #[test]
    fn test_unsupported_versions() {
        let err = SchemaVersion::from_value(Some(&json!("5.0.0")), "repo.json").unwrap_err();
        assert!(matches!(
            err,
            ProviderError::SchemaVersionMismatch { ref version, .. } if version == "5.0.0"
        ));

        assert!(SchemaVersion::from_value(Some(&json!("3.0")), "repo.json").is_err());
        assert!(SchemaVersion::from_value(None, "repo.json").is_err());
    }

    #[test]
    fn test_keys() {
        assert_eq!(SchemaVersion::V3.libraries_key(), "dependencies");
        assert_eq!(SchemaVersion::V4.libraries_key(), "libraries");
        assert!(!SchemaVersion::V2.uses_base());
        assert!(SchemaVersion::V3.uses_base());
    }
}
