use sha2::{Digest, Sha256};

/// Calculates the SHA-256 digest of the given data as lowercase hex.
/// This is the dedup key for all stored content.
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Storage key of the blob holding content with this hash. Content-addressed:
/// identical bytes always map to the same key, so the key can be re-derived
/// from any catalog row sharing the hash.
pub fn blob_key(file_hash: &str) -> String {
    format!("blobs/{file_hash}")
}

/// Escape LIKE wildcard characters in user-supplied search input.
pub fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_known_digest() {
        assert_eq!(
            calculate_sha256(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn blob_key_is_derived_from_hash() {
        assert_eq!(blob_key("abc123"), "blobs/abc123");
    }

    #[test]
    fn escape_like_escapes_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
