use crate::cache::IndexCache;
use crate::cacheable::IndexCacheable;
use crate::delta::{DeltaIndexCache, DEFAULT_COMPACTION_THRESHOLD};
use crate::disk::IndexCacheOnDisk;
use crate::entry::{CacheHit, DependencyMap};
use crate::error::Result;
use crate::key::IndexCacheKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// How cache entries are laid out on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// One JSON snapshot per key, rewritten on every change.
    #[default]
    Snapshot,
    /// Snapshot plus appended change records, compacted periodically.
    Delta,
}

/// User-facing index cache settings, usually embedded in the server's configuration.
///
/// ```
/// use sts_index_cache::{IndexCacheConfig, StorageMode};
///
/// let config: IndexCacheConfig = serde_json::from_str(r#"{ "storage": "delta" }"#).unwrap();
/// assert_eq!(config.storage, StorageMode::Delta);
/// assert_eq!(config.compaction_threshold, 20);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexCacheConfig {
    pub storage: StorageMode,
    /// Appended records after which a delta log is compacted. Ignored in snapshot mode.
    pub compaction_threshold: usize,
}

impl Default for IndexCacheConfig {
    fn default() -> Self {
        Self {
            storage: StorageMode::default(),
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
        }
    }
}

impl IndexCacheConfig {
    /// Opens the cache in `cache_dir` with the configured backend.
    pub fn open(&self, cache_dir: impl AsRef<Path>) -> Result<ConfiguredIndexCache> {
        let cache_dir = cache_dir.as_ref();
        tracing::debug!(
            target = "sts.index_cache",
            dir = %cache_dir.display(),
            storage = ?self.storage,
            "opening index cache"
        );
        Ok(match self.storage {
            StorageMode::Snapshot => {
                ConfiguredIndexCache::Snapshot(IndexCacheOnDisk::new(cache_dir)?)
            }
            StorageMode::Delta => ConfiguredIndexCache::Delta(
                DeltaIndexCache::with_compaction_threshold(cache_dir, self.compaction_threshold)?,
            ),
        })
    }
}

/// The backend selected by an [`IndexCacheConfig`].
#[derive(Debug)]
pub enum ConfiguredIndexCache {
    Snapshot(IndexCacheOnDisk),
    Delta(DeltaIndexCache),
}

impl ConfiguredIndexCache {
    pub fn storage(&self) -> StorageMode {
        match self {
            Self::Snapshot(_) => StorageMode::Snapshot,
            Self::Delta(_) => StorageMode::Delta,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        match self {
            Self::Snapshot(cache) => cache.cache_dir(),
            Self::Delta(cache) => cache.cache_dir(),
        }
    }
}

impl IndexCache for ConfiguredIndexCache {
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
        match self {
            Self::Snapshot(cache) => cache.store(key, files, symbols, dependencies),
            Self::Delta(cache) => cache.store(key, files, symbols, dependencies),
        }
    }

    fn retrieve<T, S>(&self, key: &IndexCacheKey, files: &[S]) -> Option<CacheHit<T>>
    where
        T: IndexCacheable,
        S: AsRef<str>,
    {
        match self {
            Self::Snapshot(cache) => cache.retrieve(key, files),
            Self::Delta(cache) => cache.retrieve(key, files),
        }
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
        match self {
            Self::Snapshot(cache) => cache.update(key, file, last_modified, symbols, dependencies),
            Self::Delta(cache) => cache.update(key, file, last_modified, symbols, dependencies),
        }
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
        match self {
            Self::Snapshot(cache) => {
                cache.update_many(key, files, last_modified, symbols, dependencies)
            }
            Self::Delta(cache) => {
                cache.update_many(key, files, last_modified, symbols, dependencies)
            }
        }
    }

    fn remove_files<S>(&self, key: &IndexCacheKey, files: &[S]) -> Result<()>
    where
        S: AsRef<str>,
    {
        match self {
            Self::Snapshot(cache) => cache.remove_files(key, files),
            Self::Delta(cache) => cache.remove_files(key, files),
        }
    }

    fn remove(&self, key: &IndexCacheKey) -> Result<()> {
        match self {
            Self::Snapshot(cache) => cache.remove(key),
            Self::Delta(cache) => cache.remove(key),
        }
    }

    fn modification_timestamp(&self, key: &IndexCacheKey, file: &str) -> i64 {
        match self {
            Self::Snapshot(cache) => cache.modification_timestamp(key, file),
            Self::Delta(cache) => cache.modification_timestamp(key, file),
        }
    }
}
