use crate::cache::IndexCache;
use crate::cacheable::IndexCacheable;
use crate::entry::{CacheEntry, CacheHit, DependencyMap, EntryPatch};
use crate::error::{CacheError, Result};
use crate::gc::{delete_outdated_generations, sweep_stale_temp_files};
use crate::key::IndexCacheKey;
use crate::lock::KeyLocks;
use crate::snapshot::{read_snapshot, write_snapshot};
use crate::timestamps::TimestampTable;
use crate::util::current_timestamps;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

/// Index cache that persists each key as one JSON snapshot, rewritten atomically on every
/// change.
///
/// Layout: `<cache_dir>/<project>-<indexer>-<category>-<version>.json`.
#[derive(Debug)]
pub struct IndexCacheOnDisk {
    state: DiskState,
}

impl IndexCacheOnDisk {
    /// Opens (creating if necessary) the cache stored in `cache_dir`.
    pub fn new(cache_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            state: DiskState::open(cache_dir.as_ref())?,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        self.state.dir()
    }

    fn apply_patch(&self, key: &IndexCacheKey, patch: EntryPatch) -> Result<()> {
        let path = self.state.entry_path(key);
        let _guard = self.state.locks.lock(key);

        let Some(mut entry) = read_snapshot(&path, key) else {
            self.state.timestamps.forget(key);
            tracing::debug!(
                target = "sts.index_cache",
                key = %key,
                "no cache entry to update"
            );
            return Ok(());
        };

        entry.apply(patch);
        write_snapshot(&path, key, &entry)?;
        self.state.timestamps.load(key, entry.timestamps());
        Ok(())
    }
}

impl IndexCache for IndexCacheOnDisk {
    fn store<T, S>(
        &self,
        key: &IndexCacheKey,
        files: &[S],
        symbols: Vec<T>,
        dependencies: DependencyMap,
    ) -> Result<()>
    where
        T: IndexCacheable,
        S: AsRef<str>,
    {
        let entry = CacheEntry::build(current_timestamps(files), symbols, dependencies)?;
        let path = self.state.entry_path(key);
        {
            let _guard = self.state.locks.lock(key);
            write_snapshot(&path, key, &entry)?;
            self.state.timestamps.load(key, entry.timestamps());
        }
        tracing::debug!(
            target = "sts.index_cache",
            key = %key,
            files = entry.file_count(),
            "stored cache entry"
        );

        self.state.collect_outdated_generations(key);
        Ok(())
    }

    fn retrieve<T, S>(&self, key: &IndexCacheKey, files: &[S]) -> Option<CacheHit<T>>
    where
        T: IndexCacheable,
        S: AsRef<str>,
    {
        let path = self.state.entry_path(key);
        let _guard = self.state.locks.lock(key);

        let Some(entry) = read_snapshot(&path, key) else {
            self.state.timestamps.forget(key);
            tracing::debug!(target = "sts.index_cache", key = %key, "cache miss: no entry");
            return None;
        };
        self.state.validated_hit(key, entry, files)
    }

    fn update<T>(
        &self,
        key: &IndexCacheKey,
        file: &str,
        last_modified: i64,
        symbols: Vec<T>,
        dependencies: BTreeSet<String>,
    ) -> Result<()>
    where
        T: IndexCacheable,
    {
        let patch = EntryPatch::single(file, last_modified, symbols, dependencies)?;
        self.apply_patch(key, patch)
    }

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
        S: AsRef<str>,
    {
        let patch = EntryPatch::batch(files, last_modified, symbols, dependencies)?;
        self.apply_patch(key, patch)
    }

    fn remove_files<S>(&self, key: &IndexCacheKey, files: &[S]) -> Result<()>
    where
        S: AsRef<str>,
    {
        if files.is_empty() {
            return Ok(());
        }

        let path = self.state.entry_path(key);
        let _guard = self.state.locks.lock(key);

        let Some(mut entry) = read_snapshot(&path, key) else {
            self.state.timestamps.forget(key);
            return Ok(());
        };
        entry.remove_files(files);
        write_snapshot(&path, key, &entry)?;
        self.state.timestamps.load(key, entry.timestamps());
        Ok(())
    }

    fn remove(&self, key: &IndexCacheKey) -> Result<()> {
        self.state.remove_entry(key)
    }

    fn modification_timestamp(&self, key: &IndexCacheKey, file: &str) -> i64 {
        self.state
            .modification_timestamp(key, file, |path| read_snapshot(path, key))
    }
}

/// Directory, locks and timestamp table shared by both storage backends.
#[derive(Debug)]
pub(crate) struct DiskState {
    dir: PathBuf,
    pub(crate) locks: KeyLocks,
    pub(crate) timestamps: TimestampTable,
}

impl DiskState {
    pub(crate) fn open(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)?;
        sweep_stale_temp_files(cache_dir);
        Ok(Self {
            dir: cache_dir.to_path_buf(),
            locks: KeyLocks::default(),
            timestamps: TimestampTable::default(),
        })
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn entry_path(&self, key: &IndexCacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Must be called without holding the guard of `key`'s siblings.
    pub(crate) fn collect_outdated_generations(&self, key: &IndexCacheKey) {
        let report = delete_outdated_generations(&self.dir, key, &self.locks);
        for deleted in &report.deleted {
            self.timestamps.forget(deleted);
        }
        if !report.busy.is_empty() {
            tracing::debug!(
                target = "sts.index_cache",
                key = %key,
                busy = report.busy.len(),
                "some outdated generations were in use and were kept"
            );
        }
    }

    /// Checks `entry` against the current state of `files` and decodes it on success.
    ///
    /// The caller holds the guard of `key`.
    pub(crate) fn validated_hit<T, S>(
        &self,
        key: &IndexCacheKey,
        entry: CacheEntry,
        files: &[S],
    ) -> Option<CacheHit<T>>
    where
        T: DeserializeOwned,
        S: AsRef<str>,
    {
        self.timestamps.load(key, entry.timestamps());

        let mut distinct = BTreeSet::new();
        if !files.iter().all(|file| distinct.insert(file.as_ref())) {
            tracing::debug!(
                target = "sts.index_cache",
                key = %key,
                "cache miss: a file is requested more than once"
            );
            return None;
        }

        let current = current_timestamps(files);
        if !entry.matches(&current) {
            tracing::debug!(
                target = "sts.index_cache",
                key = %key,
                recorded = entry.file_count(),
                requested = current.len(),
                "cache miss: entry is stale"
            );
            return None;
        }

        match entry.into_hit() {
            Ok(hit) => Some(hit),
            Err(err) => {
                tracing::warn!(
                    target = "sts.index_cache",
                    key = %key,
                    error = %err,
                    "failed to decode cached symbols"
                );
                None
            }
        }
    }

    pub(crate) fn remove_entry(&self, key: &IndexCacheKey) -> Result<()> {
        let path = self.entry_path(key);
        let _guard = self.locks.lock(key);

        self.timestamps.forget(key);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(target = "sts.index_cache", key = %key, "removed cache entry");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CacheError::from(err)),
        }
    }

    pub(crate) fn modification_timestamp(
        &self,
        key: &IndexCacheKey,
        file: &str,
        load: impl FnOnce(&Path) -> Option<CacheEntry>,
    ) -> i64 {
        let _guard = self.locks.lock(key);
        if let Some(mtime) = self.timestamps.lookup(key, file) {
            return mtime;
        }

        match load(&self.entry_path(key)) {
            Some(entry) => {
                self.timestamps.load(key, entry.timestamps());
                entry.last_modified(file).unwrap_or(0)
            }
            None => 0,
        }
    }
}
