use crate::key::IndexCacheKey;
use crate::lock::KeyLocks;
use crate::util::{remove_file_best_effort, temp_file_owner};
use std::path::Path;

/// Persisted entries that a store of `current` made obsolete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct GenerationGcReport {
    pub(crate) deleted: Vec<IndexCacheKey>,
    /// Superseded entries left in place because another operation held their key.
    pub(crate) busy: Vec<IndexCacheKey>,
}

/// Deletes every persisted entry in `cache_dir` that `current` supersedes.
///
/// Only `*.json` files whose name parses as a key are considered; everything else in the
/// directory is left alone. Sibling keys are locked with `try_lock` so two concurrent stores of
/// different generations cannot deadlock; a busy sibling is collected by a later store.
pub(crate) fn delete_outdated_generations(
    cache_dir: &Path,
    current: &IndexCacheKey,
    locks: &KeyLocks,
) -> GenerationGcReport {
    let mut report = GenerationGcReport::default();

    let entries = match std::fs::read_dir(cache_dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::debug!(
                target = "sts.index_cache",
                dir = %cache_dir.display(),
                error = %err,
                "failed to scan cache directory for outdated generations"
            );
            return report;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(
                    target = "sts.index_cache",
                    dir = %cache_dir.display(),
                    error = %err,
                    "failed to read cache directory entry"
                );
                continue;
            }
        };

        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if !file_name.ends_with(".json") {
            continue;
        }
        let Some(key) = IndexCacheKey::parse(file_name) else {
            continue;
        };
        if !current.supersedes(&key) {
            continue;
        }

        let Some(_guard) = locks.try_lock(&key) else {
            tracing::debug!(
                target = "sts.index_cache",
                key = %key,
                "outdated cache generation is busy; leaving it for a later store"
            );
            report.busy.push(key);
            continue;
        };

        if remove_file_best_effort(&entry.path(), "gc.outdated_generation") {
            tracing::debug!(
                target = "sts.index_cache",
                key = %key,
                superseded_by = %current,
                "deleted outdated cache generation"
            );
            report.deleted.push(key);
        }
    }

    report.deleted.sort();
    report.busy.sort();
    report
}

/// Removes temporary files left behind by writers of other (crashed) processes.
///
/// Returns the number of files removed.
pub(crate) fn sweep_stale_temp_files(cache_dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(cache_dir) else {
        return 0;
    };

    let own_pid = std::process::id();
    let mut removed = 0;
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(owner) = file_name.to_str().and_then(temp_file_owner) else {
            continue;
        };
        if owner == own_pid {
            continue;
        }
        if entry.file_type().is_ok_and(|ty| ty.is_file())
            && remove_file_best_effort(&entry.path(), "gc.stale_temp_file")
        {
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::debug!(
            target = "sts.index_cache",
            dir = %cache_dir.display(),
            removed,
            "removed stale temporary cache files"
        );
    }
    removed
}
