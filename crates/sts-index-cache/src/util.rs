use crate::error::CacheError;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Upper bound for a cache file we are willing to read back into memory.
///
/// A larger file is treated as corrupt: it is deleted and reported as a miss.
pub const MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

const TMP_MARKER: &str = ".tmp.";

pub fn now_millis() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as u64,
        Err(err) => {
            static REPORTED: OnceLock<()> = OnceLock::new();
            if REPORTED.set(()).is_ok() {
                tracing::debug!(
                    target = "sts.index_cache",
                    error = %err,
                    "system time is before unix epoch; using 0 for now_millis"
                );
            }
            0
        }
    }
}

/// Modification time of `path` in milliseconds since the Unix epoch, or `None` if the file
/// does not exist or cannot be inspected.
pub fn file_mtime_millis(path: &Path) -> Option<i64> {
    let modified = match fs::metadata(path).and_then(|meta| meta.modified()) {
        Ok(modified) => modified,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    target = "sts.index_cache",
                    path = %path.display(),
                    error = %err,
                    "failed to read file modification time"
                );
            }
            return None;
        }
    };

    Some(match modified.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_millis() as i64,
        Err(before) => -(before.duration().as_millis() as i64),
    })
}

/// Current modification times of those `files` that exist on disk, keyed by the path as given.
pub(crate) fn current_timestamps<S: AsRef<str>>(files: &[S]) -> BTreeMap<String, i64> {
    files
        .iter()
        .filter_map(|file| {
            let file = file.as_ref();
            file_mtime_millis(Path::new(file)).map(|mtime| (file.to_string(), mtime))
        })
        .collect()
}

/// `file://` URI for an absolute path; `None` for relative paths.
pub fn doc_uri_for_path(path: &str) -> Option<String> {
    url::Url::from_file_path(path)
        .ok()
        .map(|url| url.to_string())
}

pub(crate) fn read_file_limited(path: &Path) -> Option<Vec<u8>> {
    // Avoid following symlinks out of the cache directory.
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    target = "sts.index_cache",
                    path = %path.display(),
                    error = %err,
                    "failed to stat cache file"
                );
            }
            return None;
        }
    };
    if meta.file_type().is_symlink() || !meta.is_file() {
        remove_file_best_effort(path, "read_file_limited.invalid_type");
        return None;
    }
    if meta.len() > MAX_ENTRY_BYTES {
        remove_file_best_effort(path, "read_file_limited.oversize");
        return None;
    }

    let mut bytes = Vec::with_capacity(meta.len() as usize);
    let read = fs::File::open(path)
        .and_then(|file| file.take(MAX_ENTRY_BYTES + 1).read_to_end(&mut bytes));
    match read {
        Ok(len) if len as u64 > MAX_ENTRY_BYTES => {
            remove_file_best_effort(path, "read_file_limited.oversize_read");
            None
        }
        Ok(_) => Some(bytes),
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    target = "sts.index_cache",
                    path = %path.display(),
                    error = %err,
                    "failed to read cache file"
                );
            }
            None
        }
    }
}

pub(crate) fn remove_file_best_effort(path: &Path, reason: &'static str) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            tracing::debug!(
                target = "sts.index_cache",
                path = %path.display(),
                reason,
                error = %err,
                "failed to remove cache file"
            );
            false
        }
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Replaces `path` with `bytes` so that readers observe either the old or the new content.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    atomic_write_with(path, |file| {
        file.write_all(bytes)?;
        Ok(())
    })
}

pub(crate) fn atomic_write_with(
    path: &Path,
    write: impl FnOnce(&mut fs::File) -> Result<(), CacheError>,
) -> Result<(), CacheError> {
    let parent = parent_dir(path)?;
    fs::create_dir_all(parent)?;

    let (tmp_path, mut file) = open_unique_tmp_file(path, parent)?;
    let write_result = (|| -> Result<(), CacheError> {
        write(&mut file)?;
        file.sync_all()?;
        Ok(())
    })();
    drop(file);
    if let Err(err) = write_result {
        remove_file_best_effort(&tmp_path, "atomic_write.write_failed");
        return Err(err);
    }

    match rename_replacing(&tmp_path, path) {
        Ok(()) => {
            sync_dir_best_effort(parent);
            Ok(())
        }
        Err(err) => {
            remove_file_best_effort(&tmp_path, "atomic_write.rename_failed");
            Err(CacheError::from(err))
        }
    }
}

/// Appends one newline-terminated record to `path`, creating the file if needed.
///
/// If a previous append was cut short (the file does not end in `\n`), the torn tail is
/// truncated away first so the new record follows the last complete one.
pub(crate) fn append_line(path: &Path, line: &[u8]) -> Result<(), CacheError> {
    let parent = parent_dir(path)?;
    fs::create_dir_all(parent)?;

    let mut file = fs::OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;

    let len = file.metadata()?.len();
    let complete = complete_prefix_len(&mut file, len)?;
    if complete < len {
        tracing::debug!(
            target = "sts.index_cache",
            path = %path.display(),
            bytes = len - complete,
            "truncating torn record before append"
        );
        file.set_len(complete)?;
    }

    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line);
    buf.push(b'\n');

    file.write_all(&buf)?;
    file.sync_data()?;
    Ok(())
}

/// Length of the longest prefix of `file` that ends in `\n` (0 if there is none).
fn complete_prefix_len(file: &mut fs::File, len: u64) -> io::Result<u64> {
    const CHUNK: u64 = 4096;

    let mut buf = [0u8; CHUNK as usize];
    let mut end = len;
    while end > 0 {
        let start = end.saturating_sub(CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}

/// Returns the writer pid if `file_name` is a temporary file created by [`atomic_write`].
pub(crate) fn temp_file_owner(file_name: &str) -> Option<u32> {
    let (_, suffix) = file_name.rsplit_once(TMP_MARKER)?;
    let (pid, counter) = suffix.split_once('.')?;
    counter.parse::<u64>().ok()?;
    pid.parse().ok()
}

fn parent_dir(path: &Path) -> io::Result<&Path> {
    let Some(parent) = path.parent() else {
        return Err(io::Error::other("path has no parent"));
    };
    Ok(if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    })
}

fn rename_replacing(from: &Path, to: &Path) -> io::Result<()> {
    const MAX_RENAME_ATTEMPTS: usize = 1024;

    let mut attempts = 0usize;
    loop {
        match fs::rename(from, to) {
            Ok(()) => return Ok(()),
            Err(err) if cfg!(windows) && (err.kind() == io::ErrorKind::AlreadyExists || to.exists()) => {
                // Windows `rename` does not overwrite; concurrent writers may race the removal.
                match fs::remove_file(to) {
                    Ok(()) => {}
                    Err(remove_err) if remove_err.kind() == io::ErrorKind::NotFound => {}
                    Err(remove_err) => return Err(remove_err),
                }
                attempts += 1;
                if attempts >= MAX_RENAME_ATTEMPTS {
                    return Err(err);
                }
            }
            Err(err) => return Err(err),
        }
    }
}

fn sync_dir_best_effort(dir: &Path) {
    #[cfg(unix)]
    {
        static SYNC_DIR_ERROR_LOGGED: OnceLock<()> = OnceLock::new();
        match fs::File::open(dir).and_then(|dir| dir.sync_all()) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                if SYNC_DIR_ERROR_LOGGED.set(()).is_ok() {
                    tracing::debug!(
                        target = "sts.index_cache",
                        dir = %dir.display(),
                        error = %err,
                        "failed to sync cache directory (best effort)"
                    );
                }
            }
        }
    }

    #[cfg(not(unix))]
    let _ = dir;
}

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, fs::File)> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    let pid = std::process::id();

    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!("{TMP_MARKER}{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}
