//! In-memory form of one cache entry and the patches applied to it.
//!
//! Symbols are kept as `serde_json::Value` so that removal, patching and persistence never
//! need the concrete symbol type; they are decoded only when handed back to a caller.

use crate::cacheable::IndexCacheable;
use crate::error::{CacheError, Result};
use crate::util::doc_uri_for_path;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Dependencies recorded per source file.
pub type DependencyMap = BTreeMap<String, BTreeSet<String>>;

/// A successful, fully validated cache lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheHit<T> {
    pub symbols: Vec<T>,
    pub dependencies: DependencyMap,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct FileRecord {
    pub(crate) last_modified: i64,
    #[serde(default)]
    pub(crate) symbols: Vec<Value>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub(crate) dependencies: BTreeSet<String>,
}

/// A symbol whose document is not one of the entry's recorded files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct UnattributedSymbol {
    doc_uri: String,
    symbol: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Unattributed {
    #[serde(default)]
    symbols: Vec<UnattributedSymbol>,
    #[serde(default)]
    dependencies: DependencyMap,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct CacheEntry {
    files: BTreeMap<String, FileRecord>,
    #[serde(default)]
    unattributed: Unattributed,
}

impl CacheEntry {
    /// Builds an entry from a full scan: `timestamps` holds the files that existed at store time.
    pub(crate) fn build<T: IndexCacheable>(
        timestamps: BTreeMap<String, i64>,
        symbols: Vec<T>,
        dependencies: DependencyMap,
    ) -> Result<Self> {
        let mut files: BTreeMap<String, FileRecord> = timestamps
            .into_iter()
            .map(|(file, last_modified)| {
                let record = FileRecord {
                    last_modified,
                    ..FileRecord::default()
                };
                (file, record)
            })
            .collect();
        let mut unattributed = Unattributed::default();

        let owners = Attribution::new(files.keys());
        for symbol in symbols {
            let value = serde_json::to_value(&symbol)?;
            match owners.owner_of(symbol.doc_uri()) {
                Some(owner) => {
                    if let Some(record) = files.get_mut(owner) {
                        record.symbols.push(value);
                    }
                }
                None => unattributed.symbols.push(UnattributedSymbol {
                    doc_uri: symbol.doc_uri().to_string(),
                    symbol: value,
                }),
            }
        }

        for (file, deps) in dependencies {
            if deps.is_empty() {
                continue;
            }
            match files.get_mut(&file) {
                Some(record) => record.dependencies = deps,
                None => {
                    unattributed.dependencies.insert(file, deps);
                }
            }
        }

        Ok(Self {
            files,
            unattributed,
        })
    }

    pub(crate) fn last_modified(&self, file: &str) -> Option<i64> {
        self.files.get(file).map(|record| record.last_modified)
    }

    pub(crate) fn timestamps(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.files
            .iter()
            .map(|(file, record)| (file.as_str(), record.last_modified))
    }

    pub(crate) fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Whole-cache validity: exactly the same files, each with the same modification time.
    pub(crate) fn matches(&self, current: &BTreeMap<String, i64>) -> bool {
        self.files.len() == current.len()
            && current.iter().all(|(file, mtime)| {
                self.files
                    .get(file)
                    .is_some_and(|record| record.last_modified == *mtime)
            })
    }

    pub(crate) fn apply(&mut self, patch: EntryPatch) {
        let owners = Attribution::new(patch.records.keys());
        self.unattributed
            .symbols
            .retain(|symbol| owners.owner_of(&symbol.doc_uri).is_none());

        for (file, record) in patch.records {
            self.unattributed.dependencies.remove(&file);
            self.files.insert(file, record);
        }
        self.unattributed.symbols.extend(patch.unattributed);
    }

    pub(crate) fn remove_files<S: AsRef<str>>(&mut self, files: &[S]) {
        for file in files {
            let file = file.as_ref();
            self.files.remove(file);
            self.unattributed.dependencies.remove(file);
        }

        let owners = Attribution::new(files);
        self.unattributed
            .symbols
            .retain(|symbol| owners.owner_of(&symbol.doc_uri).is_none());
    }

    /// Decodes the entry into caller-facing symbols: files in path order (symbol order within
    /// each file preserved), followed by unattributed symbols.
    pub(crate) fn into_hit<T: DeserializeOwned>(self) -> Result<CacheHit<T>> {
        let mut symbols = Vec::new();
        let mut dependencies = DependencyMap::new();

        for (file, record) in self.files {
            for value in record.symbols {
                symbols.push(serde_json::from_value(value)?);
            }
            if !record.dependencies.is_empty() {
                dependencies.insert(file, record.dependencies);
            }
        }
        for unattributed in self.unattributed.symbols {
            symbols.push(serde_json::from_value(unattributed.symbol)?);
        }
        for (file, deps) in self.unattributed.dependencies {
            dependencies.entry(file).or_default().extend(deps);
        }

        Ok(CacheHit {
            symbols,
            dependencies,
        })
    }
}

/// Replacement records for a set of files, applied to an existing entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct EntryPatch {
    records: BTreeMap<String, FileRecord>,
    #[serde(default)]
    unattributed: Vec<UnattributedSymbol>,
}

impl EntryPatch {
    /// Every symbol is attributed to `file`, whatever its document URI says.
    pub(crate) fn single<T: IndexCacheable>(
        file: &str,
        last_modified: i64,
        symbols: Vec<T>,
        dependencies: BTreeSet<String>,
    ) -> Result<Self> {
        let symbols = symbols
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut records = BTreeMap::new();
        records.insert(
            file.to_string(),
            FileRecord {
                last_modified,
                symbols,
                dependencies,
            },
        );
        Ok(Self {
            records,
            unattributed: Vec::new(),
        })
    }

    /// Symbols are attributed to batch files by document URI; dependencies are looked up per
    /// batch file and entries for other files are ignored.
    pub(crate) fn batch<T: IndexCacheable, S: AsRef<str>>(
        files: &[S],
        last_modified: &[i64],
        symbols: Vec<T>,
        mut dependencies: DependencyMap,
    ) -> Result<Self> {
        if files.len() != last_modified.len() {
            return Err(CacheError::BatchLengthMismatch {
                files: files.len(),
                timestamps: last_modified.len(),
            });
        }

        let mut records = BTreeMap::new();
        for (file, &last_modified) in files.iter().zip(last_modified) {
            let file = file.as_ref();
            let record = FileRecord {
                last_modified,
                symbols: Vec::new(),
                dependencies: dependencies.remove(file).unwrap_or_default(),
            };
            records.insert(file.to_string(), record);
        }

        let mut unattributed = Vec::new();
        let owners = Attribution::new(records.keys());
        for symbol in symbols {
            let value = serde_json::to_value(&symbol)?;
            match owners.owner_of(symbol.doc_uri()) {
                Some(owner) => {
                    if let Some(record) = records.get_mut(owner) {
                        record.symbols.push(value);
                    }
                }
                None => unattributed.push(UnattributedSymbol {
                    doc_uri: symbol.doc_uri().to_string(),
                    symbol: value,
                }),
            }
        }

        Ok(Self {
            records,
            unattributed,
        })
    }

    pub(crate) fn files(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.records
            .iter()
            .map(|(file, record)| (file.as_str(), record.last_modified))
    }
}

/// Maps document URIs back to the file paths they were produced from.
struct Attribution {
    by_uri: HashMap<String, String>,
}

impl Attribution {
    fn new<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut by_uri = HashMap::new();
        for file in files {
            let file = file.as_ref();
            if let Some(uri) = doc_uri_for_path(file) {
                by_uri.insert(uri, file.to_string());
            }
            by_uri.insert(file.to_string(), file.to_string());
        }
        Self { by_uri }
    }

    fn owner_of(&self, doc_uri: &str) -> Option<&str> {
        if let Some(file) = self.by_uri.get(doc_uri) {
            return Some(file);
        }
        // Tolerate equivalent spellings such as `file:/ws/A.java` or percent-encoded paths.
        let path = url::Url::parse(doc_uri).ok()?.to_file_path().ok()?;
        self.by_uri.get(path.to_str()?).map(String::as_str)
    }
}
