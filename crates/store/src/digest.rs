use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`; the format used for both payload
/// hashes in the log and the log's own seal.
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
