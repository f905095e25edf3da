use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A symbol (or any other index element) that can be persisted in the index cache.
///
/// The cache never looks inside the payload. It only needs the owning document URI to
/// attribute the element to a file, so that re-indexing one file replaces exactly that file's
/// elements.
pub trait IndexCacheable: Serialize + DeserializeOwned + Send {
    /// URI of the document this element was produced from, e.g. `file:///ws/src/Foo.java`.
    fn doc_uri(&self) -> &str;

    /// Modification time (ms since the Unix epoch) of the document when the element was
    /// generated.
    fn last_modified(&self) -> i64;
}

/// Generic carrier pairing an indexer-specific payload with the document it came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSymbol<P> {
    pub doc_uri: String,
    pub last_modified: i64,
    pub payload: P,
}

impl<P> CachedSymbol<P> {
    pub fn new(doc_uri: impl Into<String>, last_modified: i64, payload: P) -> Self {
        Self {
            doc_uri: doc_uri.into(),
            last_modified,
            payload,
        }
    }
}

impl<P> IndexCacheable for CachedSymbol<P>
where
    P: Serialize + DeserializeOwned + Send,
{
    fn doc_uri(&self) -> &str {
        &self.doc_uri
    }

    fn last_modified(&self) -> i64 {
        self.last_modified
    }
}
