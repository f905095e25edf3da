//! Persistent, incrementally updatable cache for workspace index results.
//!
//! Indexers (beans, properties, cron expressions, ...) are expensive to run over a whole
//! workspace. This crate persists their output per [`IndexCacheKey`] so a restarted language
//! server can reuse it, and lets single-file edits replace just that file's share of the
//! result:
//! - [`IndexCache::store`] records a full scan together with the modification time of every
//!   scanned file
//! - [`IndexCache::retrieve`] hands the result back only if the same set of files still exists
//!   with the same modification times (whole-cache validity)
//! - [`IndexCache::update`], [`IndexCache::update_many`] and [`IndexCache::remove_files`] patch
//!   the entry for individual files
//!
//! Two backends implement [`IndexCache`]: [`IndexCacheOnDisk`] rewrites a JSON snapshot on
//! every change, [`DeltaIndexCache`] appends change records and compacts them periodically.
//! [`IndexCacheConfig`] selects one at runtime.
//!
//! ## On-disk layout (inventory)
//!
//! Everything lives directly in the `cache_dir` handed to the cache:
//! - `<project>-<indexer>-<category>-<version>.json`:
//!   - snapshot backend: one JSON document, schema [`ENTRY_SCHEMA_VERSION`], holding the key,
//!     the per-file table (`last_modified`, symbols, dependencies) and the unattributed bucket
//!   - delta backend: newline-delimited JSON records, a `snapshot` record (same envelope)
//!     followed by `update`/`delete` records
//! - `<file>.tmp.<pid>.<counter>`:
//!   - in-flight atomic writes; leftovers of other processes are swept when a cache is opened
//!
//! Storing a new `version` deletes the files of older generations of the same
//! `(project, indexer, category)`, plus legacy files of the same project and indexer that
//! carry no category.

mod cache;
mod cacheable;
mod config;
mod delta;
mod disk;
mod entry;
mod error;
mod fingerprint;
mod gc;
mod key;
mod lock;
mod snapshot;
mod timestamps;
mod util;

pub use cache::IndexCache;
pub use cacheable::{CachedSymbol, IndexCacheable};
pub use config::{ConfiguredIndexCache, IndexCacheConfig, StorageMode};
pub use delta::{DeltaIndexCache, DEFAULT_COMPACTION_THRESHOLD};
pub use disk::IndexCacheOnDisk;
pub use entry::{CacheHit, DependencyMap};
pub use error::{CacheError, Result};
pub use key::IndexCacheKey;
pub use snapshot::ENTRY_SCHEMA_VERSION;
pub use util::{atomic_write, doc_uri_for_path, file_mtime_millis, now_millis, MAX_ENTRY_BYTES};
