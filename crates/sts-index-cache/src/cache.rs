use crate::cacheable::IndexCacheable;
use crate::entry::{CacheHit, DependencyMap};
use crate::error::Result;
use crate::key::IndexCacheKey;
use std::collections::BTreeSet;

/// Persistent, incrementally updatable store of index results.
///
/// Implemented by [`crate::IndexCacheOnDisk`] (one snapshot file per key) and
/// [`crate::DeltaIndexCache`] (append-only log per key). Both agree on every observable
/// behavior documented here; they differ only in how updates hit the disk.
pub trait IndexCache: Send + Sync {
    /// Replaces whatever is stored for `key` with the result of a full scan of `files`.
    ///
    /// Each file is recorded with its current modification time; files that do not exist are
    /// skipped. Older generations of the same partition are deleted afterwards.
    fn store<T, S>(
        &self,
        key: &IndexCacheKey,
        files: &[S],
        symbols: Vec<T>,
        dependencies: DependencyMap,
    ) -> Result<()>
    where
        T: IndexCacheable,
        S: AsRef<str>;

    /// Returns the stored symbols and dependencies if the entry for `key` records exactly the
    /// existing subset of `files`, each with its current modification time.
    fn retrieve<T, S>(&self, key: &IndexCacheKey, files: &[S]) -> Option<CacheHit<T>>
    where
        T: IndexCacheable,
        S: AsRef<str>;

    fn retrieve_symbols<T, S>(&self, key: &IndexCacheKey, files: &[S]) -> Option<Vec<T>>
    where
        T: IndexCacheable,
        S: AsRef<str>,
    {
        self.retrieve(key, files).map(|hit| hit.symbols)
    }

    /// Replaces the symbols and dependencies of one file; all `symbols` are attributed to it.
    ///
    /// An empty `dependencies` set clears the file's dependencies. Does nothing when no entry
    /// exists for `key`.
    fn update<T>(
        &self,
        key: &IndexCacheKey,
        file: &str,
        last_modified: i64,
        symbols: Vec<T>,
        dependencies: BTreeSet<String>,
    ) -> Result<()>
    where
        T: IndexCacheable;

    /// Batch form of [`IndexCache::update`]; `files[i]` was modified at `last_modified[i]`.
    ///
    /// Symbols are attributed to the batch files by document URI. The batch is applied and
    /// persisted as a whole or not at all.
    fn update_many<T, S>(
        &self,
        key: &IndexCacheKey,
        files: &[S],
        last_modified: &[i64],
        symbols: Vec<T>,
        dependencies: DependencyMap,
    ) -> Result<()>
    where
        T: IndexCacheable,
        S: AsRef<str>;

    fn remove_file(&self, key: &IndexCacheKey, file: &str) -> Result<()> {
        self.remove_files(key, &[file])
    }

    /// Drops the records of `files` from the entry for `key`, keeping all other files.
    fn remove_files<S>(&self, key: &IndexCacheKey, files: &[S]) -> Result<()>
    where
        S: AsRef<str>;

    /// Deletes the entry for `key`.
    fn remove(&self, key: &IndexCacheKey) -> Result<()>;

    /// Recorded modification time of `file` in the entry for `key`, or `0` if unknown.
    fn modification_timestamp(&self, key: &IndexCacheKey, file: &str) -> i64;
}
