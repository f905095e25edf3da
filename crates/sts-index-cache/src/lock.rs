use crate::key::IndexCacheKey;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::collections::HashMap;
use std::sync::Arc;

/// Held for the duration of one cache operation on a key.
pub(crate) type KeyGuard = ArcMutexGuard<RawMutex, ()>;

/// One mutex per cache key.
///
/// Every operation on a key (including reads) runs under that key's guard; operations on
/// different keys never contend beyond the short map lookup.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    slots: Mutex<HashMap<IndexCacheKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    /// Blocks until the guard for `key` is available.
    pub(crate) fn lock(&self, key: &IndexCacheKey) -> KeyGuard {
        self.slot(key).lock_arc()
    }

    /// Returns the guard for `key` only if nobody else holds it.
    pub(crate) fn try_lock(&self, key: &IndexCacheKey) -> Option<KeyGuard> {
        self.slot(key).try_lock_arc()
    }

    // Slots are never evicted: a guard outliving its slot would let a second caller
    // create a fresh mutex for the same key.
    fn slot(&self, key: &IndexCacheKey) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock();
        if let Some(existing) = slots.get(key) {
            return existing.clone();
        }
        let slot = Arc::new(Mutex::new(()));
        slots.insert(key.clone(), slot.clone());
        slot
    }
}
