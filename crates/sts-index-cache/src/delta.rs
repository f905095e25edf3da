//! Append-only storage backend.
//!
//! Each key's file is a newline-delimited JSON log: one `snapshot` record followed by `update`
//! and `delete` records. Incremental changes append a single line instead of rewriting the
//! whole entry; once enough records have piled up the log is compacted back into a single
//! snapshot.

use crate::cache::IndexCache;
use crate::cacheable::IndexCacheable;
use crate::disk::DiskState;
use crate::entry::{CacheEntry, CacheHit, DependencyMap, EntryPatch};
use crate::error::{CacheError, Result};
use crate::key::IndexCacheKey;
use crate::snapshot::{PersistedEntry, PersistedEntryOwned, Rejected};
use crate::timestamps::TimestampTable;
use crate::util::{
    append_line, atomic_write, current_timestamps, read_file_limited, remove_file_best_effort,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Number of appended records after which a log is compacted.
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 20;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DeltaRecord<'a> {
    Snapshot(PersistedEntry<'a>),
    Update(&'a EntryPatch),
    Delete { files: Vec<&'a str> },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DeltaRecordOwned {
    Snapshot(PersistedEntryOwned),
    Update(EntryPatch),
    Delete { files: Vec<String> },
}

/// Result of replaying a log: the entry plus the number of records appended after its snapshot.
#[derive(Debug)]
struct Replay {
    entry: CacheEntry,
    appended: usize,
}

/// Index cache backed by per-key delta logs.
#[derive(Debug)]
pub struct DeltaIndexCache {
    state: DiskState,
    compaction_threshold: usize,
    /// Records appended since the last snapshot, for logs this instance has read or written.
    appended: Mutex<HashMap<IndexCacheKey, usize>>,
}

impl DeltaIndexCache {
    pub fn new(cache_dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_compaction_threshold(cache_dir, DEFAULT_COMPACTION_THRESHOLD)
    }

    pub fn with_compaction_threshold(
        cache_dir: impl AsRef<Path>,
        compaction_threshold: usize,
    ) -> Result<Self> {
        Ok(Self {
            state: DiskState::open(cache_dir.as_ref())?,
            compaction_threshold,
            appended: Mutex::new(HashMap::new()),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        self.state.dir()
    }

    pub fn compaction_threshold(&self) -> usize {
        self.compaction_threshold
    }

    /// Appends `record` to the log of `key`, then compacts the log if it grew past the
    /// threshold. `on_appended` brings the in-memory timestamp table up to date.
    fn append(
        &self,
        key: &IndexCacheKey,
        record: &DeltaRecord<'_>,
        on_appended: impl FnOnce(&TimestampTable),
    ) -> Result<()> {
        let line = serde_json::to_vec(record)?;
        let path = self.state.entry_path(key);

        let compacted = {
            let _guard = self.state.locks.lock(key);
            // A log this instance has not read yet is replayed once so its owner and record
            // count are known before anything is appended to it.
            let known = self.appended.lock().contains_key(key);
            if !path.is_file() || (!known && self.load_locked(key, &path).is_none()) {
                self.state.timestamps.forget(key);
                tracing::debug!(
                    target = "sts.index_cache",
                    key = %key,
                    "no cache entry to update"
                );
                return Ok(());
            }

            append_line(&path, &line)?;
            on_appended(&self.state.timestamps);

            let appended = {
                let mut counts = self.appended.lock();
                let count = counts.entry(key.clone()).or_insert(0);
                *count += 1;
                *count
            };
            appended > self.compaction_threshold
                && settle_compaction(key, self.compact_locked(key, &path))
        };

        if compacted {
            self.state.collect_outdated_generations(key);
        }
        Ok(())
    }

    /// Rewrites the log of `key` as a single snapshot. The caller holds the guard of `key`.
    fn compact_locked(&self, key: &IndexCacheKey, path: &Path) -> Result<bool> {
        let Some(replay) = replay(path, key) else {
            self.state.timestamps.forget(key);
            self.appended.lock().remove(key);
            return Ok(false);
        };

        write_log_snapshot(path, key, &replay.entry)?;
        self.state.timestamps.load(key, replay.entry.timestamps());
        self.appended.lock().insert(key.clone(), 0);
        tracing::info!(
            target = "sts.index_cache",
            key = %key,
            records = replay.appended,
            files = replay.entry.file_count(),
            "compacted delta log"
        );
        Ok(true)
    }

    fn load_locked(&self, key: &IndexCacheKey, path: &Path) -> Option<CacheEntry> {
        match replay(path, key) {
            Some(replay) => {
                self.appended.lock().insert(key.clone(), replay.appended);
                Some(replay.entry)
            }
            None => {
                self.appended.lock().remove(key);
                None
            }
        }
    }
}

impl IndexCache for DeltaIndexCache {
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
            write_log_snapshot(&path, key, &entry)?;
            self.state.timestamps.load(key, entry.timestamps());

            let name = key.file_name();
            let mut counts = self.appended.lock();
            counts.retain(|other, _| other.file_name() != name);
            counts.insert(key.clone(), 0);
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

        let Some(entry) = self.load_locked(key, &path) else {
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
        self.append(key, &DeltaRecord::Update(&patch), |timestamps| {
            timestamps.record(key, patch.files())
        })
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
        self.append(key, &DeltaRecord::Update(&patch), |timestamps| {
            timestamps.record(key, patch.files())
        })
    }

    fn remove_files<S>(&self, key: &IndexCacheKey, files: &[S]) -> Result<()>
    where
        S: AsRef<str>,
    {
        if files.is_empty() {
            return Ok(());
        }

        let record = DeltaRecord::Delete {
            files: files.iter().map(AsRef::as_ref).collect(),
        };
        self.append(key, &record, |timestamps| timestamps.forget_files(key, files))
    }

    fn remove(&self, key: &IndexCacheKey) -> Result<()> {
        self.state.remove_entry(key)?;
        self.appended.lock().remove(key);
        Ok(())
    }

    fn modification_timestamp(&self, key: &IndexCacheKey, file: &str) -> i64 {
        self.state
            .modification_timestamp(key, file, |path| self.load_locked(key, path))
    }
}

/// A failed compaction only logs: the appended record is already on disk and a later append
/// retries.
fn settle_compaction(key: &IndexCacheKey, result: Result<bool>) -> bool {
    match result {
        Ok(compacted) => compacted,
        Err(err) => {
            tracing::warn!(
                target = "sts.index_cache",
                key = %key,
                error = %err,
                "failed to compact delta log"
            );
            false
        }
    }
}

fn write_log_snapshot(path: &Path, key: &IndexCacheKey, entry: &CacheEntry) -> Result<()> {
    let mut line = serde_json::to_vec(&DeltaRecord::Snapshot(PersistedEntry::new(key, entry)))?;
    line.push(b'\n');
    atomic_write(path, &line)
}

/// Rebuilds the entry of `key` from its log.
///
/// A final line without a terminating newline is an interrupted append and is ignored. Any
/// other unreadable record, a log that does not start with a snapshot, or a snapshot of an
/// older layout makes the whole log unusable: it is deleted and `None` returned. A log owned
/// by another key with a colliding file name is a miss and stays in place.
fn replay(path: &Path, key: &IndexCacheKey) -> Option<Replay> {
    let bytes = read_file_limited(path)?;

    let mut lines: Vec<&[u8]> = bytes.split(|&b| b == b'\n').collect();
    let torn = lines.pop().unwrap_or_default();
    if !torn.is_empty() {
        tracing::debug!(
            target = "sts.index_cache",
            key = %key,
            bytes = torn.len(),
            "ignoring torn record at end of delta log"
        );
    }

    let mut replay: Option<Replay> = None;
    for (idx, line) in lines.into_iter().enumerate() {
        if line.is_empty() {
            continue;
        }

        let record: DeltaRecordOwned = match serde_json::from_slice(line) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(
                    target = "sts.index_cache",
                    key = %key,
                    line = idx + 1,
                    error = %CacheError::from(err),
                    "failed to decode delta log record; deleting log"
                );
                return discard(path, "delta.decode_failed");
            }
        };

        match record {
            DeltaRecordOwned::Snapshot(persisted) => match persisted.into_entry_for(key) {
                Ok(entry) => replay = Some(Replay { entry, appended: 0 }),
                Err(Rejected::Schema) => return discard(path, "delta.schema_mismatch"),
                Err(Rejected::OtherKey) => return None,
            },
            DeltaRecordOwned::Update(patch) => {
                let Some(current) = replay.as_mut() else {
                    return missing_snapshot(path, key);
                };
                current.entry.apply(patch);
                current.appended += 1;
            }
            DeltaRecordOwned::Delete { files } => {
                let Some(current) = replay.as_mut() else {
                    return missing_snapshot(path, key);
                };
                current.entry.remove_files(&files);
                current.appended += 1;
            }
        }
    }

    if replay.is_none() {
        return discard(path, "delta.empty");
    }
    replay
}

fn missing_snapshot(path: &Path, key: &IndexCacheKey) -> Option<Replay> {
    tracing::warn!(
        target = "sts.index_cache",
        key = %key,
        "delta log does not start with a snapshot; deleting log"
    );
    discard(path, "delta.missing_snapshot")
}

fn discard(path: &Path, reason: &'static str) -> Option<Replay> {
    remove_file_best_effort(path, reason);
    None
}
