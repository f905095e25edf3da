use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: char = '-';
const FILE_EXTENSION: &str = ".json";

/// Identifies one persisted cache entry.
///
/// `(project, indexer, category)` names a partition; `version` names a generation within that
/// partition. Storing a new generation garbage-collects the older ones (see
/// [`IndexCacheKey::supersedes`]).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexCacheKey {
    project: String,
    indexer: String,
    category: String,
    version: String,
}

impl IndexCacheKey {
    pub fn new(
        project: impl Into<String>,
        indexer: impl Into<String>,
        category: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            indexer: indexer.into(),
            category: category.into(),
            version: version.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn indexer(&self) -> &str {
        &self.indexer
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// File name of the persisted entry: `<project>-<indexer>-<category>-<version>.json`.
    pub fn file_name(&self) -> String {
        format!("{self}{FILE_EXTENSION}")
    }

    /// Parses a key from a cache file name (with or without the `.json` extension).
    ///
    /// Segments are assigned from the right: the last one is the version, then category, then
    /// indexer; whatever remains (re-joined with `-`) is the project. Missing leading segments
    /// become empty strings, so names written by older releases with fewer segments still
    /// parse. `indexer--version` is the legacy shape with an empty category.
    ///
    /// Returns `None` only for an empty base name.
    pub fn parse(name: &str) -> Option<Self> {
        let base = name.strip_suffix(FILE_EXTENSION).unwrap_or(name);
        if base.is_empty() {
            return None;
        }

        let mut segments: Vec<&str> = base.split(SEPARATOR).collect();
        let version = segments.pop().unwrap_or_default();
        let category = segments.pop().unwrap_or_default();
        let indexer = segments.pop().unwrap_or_default();
        let project = segments.join("-");

        Some(Self::new(project, indexer, category, version))
    }

    /// Whether `self` and `other` belong to the same `(project, indexer, category)` partition.
    pub fn same_partition(&self, other: &IndexCacheKey) -> bool {
        self.project == other.project
            && self.indexer == other.indexer
            && self.category == other.category
    }

    /// Whether storing `self` makes the persisted entry for `other` obsolete.
    ///
    /// True for other generations of the same partition, and for entries of the same
    /// project/indexer written before categories existed (empty category).
    pub fn supersedes(&self, other: &IndexCacheKey) -> bool {
        if self == other {
            return false;
        }
        self.project == other.project
            && self.indexer == other.indexer
            && (self.category == other.category || other.category.is_empty())
    }
}

impl fmt::Display for IndexCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.project, self.indexer, self.category, self.version
        )
    }
}
