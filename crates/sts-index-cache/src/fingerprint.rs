use sha2::{Digest, Sha256};
use std::fmt;

/// Compact identity of a file path for in-memory bookkeeping.
///
/// Timestamp tables can hold every source file of a large workspace for every cache key, so
/// they store a truncated SHA-256 of the path rather than the path string itself.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct FileId([u8; 16]);

impl FileId {
    pub(crate) fn from_path(path: &str) -> Self {
        let digest = Sha256::digest(path.as_bytes());
        let mut id = [0u8; 16];
        id.copy_from_slice(&digest[..16]);
        Self(id)
    }

    pub(crate) fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.to_hex())
    }
}
