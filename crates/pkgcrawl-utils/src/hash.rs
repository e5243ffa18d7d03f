/// Hashes a string into a stable, filesystem-safe hex key.
///
/// Used to derive response-cache entry names from request URLs, so the
/// same URL always maps to the same entry regardless of process.
pub fn hash_key(input: &str) -> String {
    hash_bytes(input.as_bytes())
}

/// Hashes raw bytes with blake3 and returns the hex digest.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(data);
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_key_is_stable() {
        let a = hash_key("https://example.com/repository.json");
        let b = hash_key("https://example.com/repository.json");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hash_key_differs_per_input() {
        assert_ne!(
            hash_key("https://example.com/a.json"),
            hash_key("https://example.com/b.json")
        );
    }

    #[test]
    fn test_hash_bytes_known_value() {
        assert_eq!(
            hash_bytes(b"hello world\n"),
            "dc5a4edb8240b018124052c330270696f96771a63b45250a5c17d3000e823355"
        );
    }
}
