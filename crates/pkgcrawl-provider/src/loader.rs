//! Loading manifest documents from local paths or over the fetcher.

use std::{fs, io::Read, path::Path};

use pkgcrawl_fetch::Fetcher;
use serde_json::Value;
use tracing::trace;
use url::Url;

use crate::error::{ErrorContext, ProviderError, Result};

/// Magic bytes identifying zstd-compressed content.
pub const ZST_MAGIC_BYTES: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Resolves `entry` against the manifest it was declared in.
///
/// Remote and absolute entries are returned unchanged.
pub fn resolve_relative(base: &str, entry: &str) -> String {
    if is_remote(entry) || Path::new(entry).is_absolute() {
        return entry.to_string();
    }

    if is_remote(base) {
        return Url::parse(base)
            .and_then(|b| b.join(entry))
            .map(String::from)
            .unwrap_or_else(|_| entry.to_string());
    }

    let parent = Path::new(base).parent().unwrap_or_else(|| Path::new(""));
    let joined = parent.join(entry.strip_prefix("./").unwrap_or(entry));
    joined.to_string_lossy().into_owned()
}

/// Decompresses zstd content, passing anything else through.
pub fn decode_content(content: Vec<u8>, location: &str) -> Result<Vec<u8>> {
    if content.len() < 4 || content[..4] != ZST_MAGIC_BYTES {
        return Ok(content);
    }

    trace!("Decompressing zstd manifest from {}", location);
    let mut decoder =
        zstd::Decoder::new(content.as_slice()).with_context(|| "creating zstd decoder".into())?;
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .with_context(|| format!("decoding zstd from {location}"))?;
    Ok(decoded)
}

/// Reads the raw bytes of a manifest from disk or the network.
pub fn load_bytes(fetcher: &Fetcher, location: &str) -> Result<Vec<u8>> {
    let content = if is_remote(location) {
        fetcher.fetch(location)?
    } else {
        fs::read(location).with_context(|| format!("reading {location}"))?
    };
    decode_content(content, location)
}

/// Loads and parses a JSON manifest.
pub fn load_json(fetcher: &Fetcher, location: &str) -> Result<Value> {
    let content = load_bytes(fetcher, location)?;
    serde_json::from_slice(&content).map_err(|err| {
        ProviderError::Parse {
            location: location.to_string(),
            message: err.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pkgcrawl_fetch::MemoryTransport;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            resolve_relative("https://example.com/channel/channel.json", "./repo.json"),
            "https://example.com/channel/repo.json"
        );
        assert_eq!(
            resolve_relative("https://example.com/channel.json", "https://other.com/r.json"),
            "https://other.com/r.json"
        );
        assert_eq!(
            resolve_relative("/srv/channel/channel.json", "repository/a.json"),
            "/srv/channel/repository/a.json"
        );
        assert_eq!(
            resolve_relative("/srv/channel/channel.json", "/abs/b.json"),
            "/abs/b.json"
        );
    }

    #[test]
    fn test_load_json_local_zstd() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repo.json.zst");
        let compressed = zstd::encode_all(&br#"{"schema_version": "3.0.0"}"#[..], 3).unwrap();
        assert_eq!(compressed[..4], ZST_MAGIC_BYTES);
        fs::write(&path, compressed).unwrap();

        let fetcher = Fetcher::new(Arc::new(MemoryTransport::new()));
        let value = load_json(&fetcher, path.to_str().unwrap()).unwrap();
        assert_eq!(value["schema_version"], "3.0.0");
    }

    #[test]
    fn test_load_json_remote_errors() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert_json("https://example.com/bad.json", "{not json");
        let fetcher = Fetcher::new(transport);

        let err = load_json(&fetcher, "https://example.com/bad.json").unwrap_err();
        assert!(matches!(err, ProviderError::Parse { .. }));

        let err = load_json(&fetcher, "https://example.com/missing.json").unwrap_err();
        assert!(err.needs_review());
    }

    #[test]
    fn test_load_missing_local_file() {
        let fetcher = Fetcher::new(Arc::new(MemoryTransport::new()));
        let err = load_json(&fetcher, "/nonexistent/pkgcrawl/repo.json").unwrap_err();
        assert!(matches!(err, ProviderError::IoError { .. }));
    }
}
