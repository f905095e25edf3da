use crate::fingerprint::FileId;
use crate::key::IndexCacheKey;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory copy of the recorded modification times, per key.
///
/// A key is either *loaded* (its table mirrors the persisted entry) or absent, in which case
/// callers fall back to reading the entry from disk.
#[derive(Debug, Default)]
pub(crate) struct TimestampTable {
    keys: RwLock<HashMap<IndexCacheKey, HashMap<FileId, i64>>>,
}

impl TimestampTable {
    /// `None` if `key` is not loaded; `Some(0)` for a file the loaded key does not record.
    pub(crate) fn lookup(&self, key: &IndexCacheKey, file: &str) -> Option<i64> {
        let keys = self.keys.read();
        let files = keys.get(key)?;
        Some(files.get(&FileId::from_path(file)).copied().unwrap_or(0))
    }

    /// Replaces the table of `key` with `files`.
    pub(crate) fn load<'a>(
        &self,
        key: &IndexCacheKey,
        files: impl IntoIterator<Item = (&'a str, i64)>,
    ) {
        let table = files
            .into_iter()
            .map(|(file, mtime)| (FileId::from_path(file), mtime))
            .collect();
        self.keys.write().insert(key.clone(), table);
    }

    /// Records new times for `files` if `key` is loaded; otherwise the next lookup loads from disk.
    pub(crate) fn record<'a>(
        &self,
        key: &IndexCacheKey,
        files: impl IntoIterator<Item = (&'a str, i64)>,
    ) {
        let mut keys = self.keys.write();
        if let Some(table) = keys.get_mut(key) {
            table.extend(
                files
                    .into_iter()
                    .map(|(file, mtime)| (FileId::from_path(file), mtime)),
            );
        }
    }

    pub(crate) fn forget_files<S: AsRef<str>>(&self, key: &IndexCacheKey, files: &[S]) {
        let mut keys = self.keys.write();
        if let Some(table) = keys.get_mut(key) {
            for file in files {
                table.remove(&FileId::from_path(file.as_ref()));
            }
        }
    }

    pub(crate) fn forget(&self, key: &IndexCacheKey) {
        self.keys.write().remove(key);
    }
}
