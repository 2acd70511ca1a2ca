//! Content digests for upload verification
//!
//! Files are hashed with SHA-256 by streaming through a fixed-size buffer,
//! so memory use does not depend on file size.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest as _, Sha256};
use tokio::io::AsyncReadExt;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Lowercase hex SHA-256 of some content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Wrap a hex digest, normalizing case
    pub fn from_hex(hex: impl AsRef<str>) -> Self {
        Self(hex.as_ref().trim().to_ascii_lowercase())
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of comparing local and remote digests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Integrity {
    /// Store reported the same digest as the local file
    Verified,
    /// Store accepted the bytes but reported a different digest
    Mismatch,
    /// No remote digest, verification disabled, or not uploaded
    Unavailable,
}

/// Hash a file without loading it into memory
pub async fn digest_file(path: &Path) -> std::io::Result<Digest> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(Digest::from_bytes(&hasher.finalize()))
}

/// Hash an in-memory buffer
pub fn digest_bytes(data: &[u8]) -> Digest {
    Digest::from_bytes(&Sha256::digest(data))
}

/// Whether the store holds the same bytes as the local file
pub fn verify(local: &Digest, remote: &Digest) -> bool {
    local == remote
}

/// Classify a completed upload
pub fn check(local: Option<&Digest>, remote: Option<&Digest>) -> Integrity {
    match (local, remote) {
        (Some(local), Some(remote)) if verify(local, remote) => Integrity::Verified,
        (Some(_), Some(_)) => Integrity::Mismatch,
        _ => Integrity::Unavailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[tokio::test]
    async fn test_digest_file_matches_known_value() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();

        let digest = digest_file(&path).await.unwrap();
        assert_eq!(digest.as_str(), HELLO_SHA256);
    }

    #[tokio::test]
    async fn test_digest_file_spanning_buffers() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("large.bin");
        let data: Vec<u8> = (0..(READ_BUFFER_SIZE * 3 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        std::fs::write(&path, &data).unwrap();

        let streamed = digest_file(&path).await.unwrap();
        assert_eq!(streamed, digest_bytes(&data));
    }

    #[tokio::test]
    async fn test_digest_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = digest_file(&temp.path().join("nope")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_from_hex_normalizes_case() {
        let upper = Digest::from_hex(HELLO_SHA256.to_uppercase());
        assert_eq!(upper, Digest::from_hex(HELLO_SHA256));
        assert!(verify(&upper, &digest_bytes(b"hello")));
    }

    #[test]
    fn test_check() {
        let a = digest_bytes(b"a");
        let b = digest_bytes(b"b");
        assert_eq!(check(Some(&a), Some(&a)), Integrity::Verified);
        assert_eq!(check(Some(&a), Some(&b)), Integrity::Mismatch);
        assert_eq!(check(Some(&a), None), Integrity::Unavailable);
        assert_eq!(check(None, Some(&a)), Integrity::Unavailable);
    }
}
