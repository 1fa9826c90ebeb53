//! Bounded shared-secret cache
//!
//! Keyed by the remote public key. Evicts the least recently used entry
//! once `capacity` is reached. Owned by [`IdentityCrypto`] and cleared
//! whenever the local key pair changes.
//!
//! [`IdentityCrypto`]: crate::crypto::identity::IdentityCrypto

use std::collections::HashMap;

use crate::crypto::keys::{PublicKey, SharedKey};

/// Default number of peers whose shared keys are kept
pub const DEFAULT_CAPACITY: usize = 256;

struct Entry {
    key: SharedKey,
    last_used: u64,
}

pub struct SharedSecretCache {
    entries: HashMap<PublicKey, Entry>,
    capacity: usize,
    clock: u64,
}

impl SharedSecretCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
        }
    }

    pub fn get(&mut self, peer: &PublicKey) -> Option<SharedKey> {
        self.clock += 1;
        let now = self.clock;
        self.entries.get_mut(peer).map(|entry| {
            entry.last_used = now;
            entry.key.clone()
        })
    }

    pub fn insert(&mut self, peer: PublicKey, key: SharedKey) {
        self.clock += 1;
        if !self.entries.contains_key(&peer) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            peer,
            Entry {
                key,
                last_used: self.clock,
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(peer, _)| *peer);
        if let Some(peer) = oldest {
            tracing::trace!(peer = %peer.short_id(), "Evicting cached shared key");
            self.entries.remove(&peer);
        }
    }
}

impl Default for SharedSecretCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(byte: u8) -> PublicKey {
        PublicKey::from_bytes([byte; 32])
    }

    fn shared(byte: u8) -> SharedKey {
        SharedKey::from_bytes([byte; 32])
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = SharedSecretCache::new(4);
        cache.insert(peer(1), shared(10));
        assert_eq!(cache.get(&peer(1)), Some(shared(10)));
        assert_eq!(cache.get(&peer(2)), None);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = SharedSecretCache::new(2);
        cache.insert(peer(1), shared(1));
        cache.insert(peer(2), shared(2));

        // Touch peer 1 so peer 2 becomes the eviction candidate
        assert!(cache.get(&peer(1)).is_some());
        cache.insert(peer(3), shared(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&peer(1)).is_some());
        assert!(cache.get(&peer(2)).is_none());
        assert!(cache.get(&peer(3)).is_some());
    }

    #[test]
    fn test_reinsert_does_not_evict() {
        let mut cache = SharedSecretCache::new(2);
        cache.insert(peer(1), shared(1));
        cache.insert(peer(2), shared(2));
        cache.insert(peer(2), shared(22));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&peer(2)), Some(shared(22)));
    }

    #[test]
    fn test_clear() {
        let mut cache = SharedSecretCache::default();
        cache.insert(peer(1), shared(1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
