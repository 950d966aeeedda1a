use std::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Single-slot memo keyed by product identity.
///
/// Only the most recent write is retained. A read hits only while the stored
/// identity equals the requested one and the entry is younger than the TTL;
/// anything else is a miss and the slot is left for the next `set` to
/// overwrite. Expiry is evaluated lazily on read.
///
/// Timestamps come from `tokio::time::Instant`, so tests running with a
/// paused runtime drive expiry through `tokio::time::advance`.
pub struct TtlCache<K, V> {
    ttl: Duration,
    slot: Mutex<Option<CacheEntry<K, V>>>,
}

#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    pub value: V,
    pub key: K,
    pub stored_at: Instant,
}

impl<K, V> TtlCache<K, V>
where
    K: PartialEq + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let guard = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = guard.as_ref()?;
        if entry.key != *key {
            return None;
        }
        if Instant::now().duration_since(entry.stored_at) >= self.ttl {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn set(&self, key: K, value: V) {
        let mut guard = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(CacheEntry {
            value,
            key,
            stored_at: Instant::now(),
        });
    }
}
