use sha2::{Digest, Sha256};
use std::path::Path;

/// Content fingerprint of a source file: hex SHA-256 over the raw bytes.
/// Changes iff the underlying bytes changed.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn fingerprint_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(fingerprint_bytes(&bytes))
}
