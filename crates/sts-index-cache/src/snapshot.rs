use crate::entry::CacheEntry;
use crate::error::Result;
use crate::key::IndexCacheKey;
use crate::util::{atomic_write, now_millis, read_file_limited, remove_file_best_effort};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Version of the persisted entry layout. Bumping it turns every existing file into a miss.
pub const ENTRY_SCHEMA_VERSION: u32 = 1;

/// Envelope written around a [`CacheEntry`]. The full key is stored alongside the entry so a
/// file that was renamed or copied under another key's name is rejected.
#[derive(Debug, Serialize)]
pub(crate) struct PersistedEntry<'a> {
    pub(crate) schema_version: u32,
    pub(crate) key: &'a IndexCacheKey,
    pub(crate) saved_at_millis: u64,
    pub(crate) entry: &'a CacheEntry,
}

impl<'a> PersistedEntry<'a> {
    pub(crate) fn new(key: &'a IndexCacheKey, entry: &'a CacheEntry) -> Self {
        Self {
            schema_version: ENTRY_SCHEMA_VERSION,
            key,
            saved_at_millis: now_millis(),
            entry,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PersistedEntryOwned {
    pub(crate) schema_version: u32,
    pub(crate) key: IndexCacheKey,
    pub(crate) entry: CacheEntry,
}

/// Why a decoded envelope was not accepted for the requested key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Rejected {
    /// Written with another layout version. The file is useless to every reader.
    Schema,
    /// Written for a different key whose file name collides with the requested one.
    OtherKey,
}

impl PersistedEntryOwned {
    /// Returns the entry if it was written with the current layout for exactly `key`.
    pub(crate) fn into_entry_for(
        self,
        key: &IndexCacheKey,
    ) -> std::result::Result<CacheEntry, Rejected> {
        if self.schema_version != ENTRY_SCHEMA_VERSION {
            tracing::debug!(
                target = "sts.index_cache",
                key = %key,
                found = self.schema_version,
                expected = ENTRY_SCHEMA_VERSION,
                "cache entry schema mismatch"
            );
            return Err(Rejected::Schema);
        }
        if &self.key != key {
            tracing::debug!(
                target = "sts.index_cache",
                key = %key,
                found = %self.key,
                "cache entry belongs to another key"
            );
            return Err(Rejected::OtherKey);
        }
        Ok(self.entry)
    }
}

pub(crate) fn write_snapshot(path: &Path, key: &IndexCacheKey, entry: &CacheEntry) -> Result<()> {
    let bytes = serde_json::to_vec(&PersistedEntry::new(key, entry))?;
    atomic_write(path, &bytes)
}

/// Loads the entry stored at `path`. Corrupt files and files of an older layout are deleted
/// and reported as `None`; a valid file owned by another key is left alone.
pub(crate) fn read_snapshot(path: &Path, key: &IndexCacheKey) -> Option<CacheEntry> {
    let bytes = read_file_limited(path)?;

    let persisted: PersistedEntryOwned = match serde_json::from_slice(&bytes) {
        Ok(persisted) => persisted,
        Err(err) => {
            tracing::warn!(
                target = "sts.index_cache",
                key = %key,
                path = %path.display(),
                error = %crate::error::CacheError::from(err),
                "failed to decode cache entry; deleting it"
            );
            remove_file_best_effort(path, "snapshot.decode_failed");
            return None;
        }
    };

    match persisted.into_entry_for(key) {
        Ok(entry) => Some(entry),
        Err(Rejected::Schema) => {
            remove_file_best_effort(path, "snapshot.schema_mismatch");
            None
        }
        Err(Rejected::OtherKey) => None,
    }
}
