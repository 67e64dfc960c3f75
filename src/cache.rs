//! Duplicate-suppression cache for at-most-once invocation semantics.
//!
//! Clients on an unreliable transport retransmit unacknowledged calls. A
//! byte-identical retransmission from the same sender must not re-execute a
//! non-idempotent handler, so the listener replays the previously computed
//! reply from this cache instead. The cache is an idempotency shield keyed
//! by raw bytes, not a semantic result cache: two differently-serialized but
//! equivalent requests are distinct keys, and a retry that bumps its
//! sequence ID bypasses suppression entirely.

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use bytes::Bytes;
use lru::LruCache;

/// Default number of cached replies.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Separator between the address text and the raw request bytes. 0xFF never
/// appears in the ASCII rendering of a socket address.
const KEY_SEPARATOR: u8 = 0xFF;

/// Bounded LRU map from (sender address, raw request bytes) to the raw
/// reply bytes. Lookups and insertions are atomic with respect to each
/// other; a lookup refreshes recency.
#[derive(Debug)]
pub struct ReplyCache {
    inner: Mutex<LruCache<Vec<u8>, Bytes>>,
}

impl ReplyCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Previously computed reply for this exact (sender, request) pair.
    pub fn get(&self, peer: SocketAddr, request: &[u8]) -> Option<Bytes> {
        let key = Self::key(peer, request);
        let mut cache = self.lock();
        cache.get(&key).cloned()
    }

    /// Record the reply produced for this request, evicting the
    /// least-recently-used entry when at capacity.
    pub fn put(&self, peer: SocketAddr, request: &[u8], reply: Bytes) {
        let key = Self::key(peer, request);
        let mut cache = self.lock();
        cache.put(key, reply);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<Vec<u8>, Bytes>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key(peer: SocketAddr, request: &[u8]) -> Vec<u8> {
        let addr = peer.to_string();
        let mut key = Vec::with_capacity(addr.len() + 1 + request.len());
        key.extend_from_slice(addr.as_bytes());
        key.push(KEY_SEPARATOR);
        key.extend_from_slice(request);
        key
    }
}

impl Default for ReplyCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn test_hit_returns_identical_bytes() {
        let cache = ReplyCache::new();
        let reply = Bytes::from_static(b"\x00\x00\x00\x02ok");

        assert!(cache.get(addr(1000), b"req").is_none());
        cache.put(addr(1000), b"req", reply.clone());
        assert_eq!(cache.get(addr(1000), b"req").unwrap(), reply);
    }

    #[test]
    fn test_same_bytes_different_sender_are_distinct() {
        let cache = ReplyCache::new();
        cache.put(addr(1000), b"req", Bytes::from_static(b"a"));

        assert!(cache.get(addr(1001), b"req").is_none());
    }

    #[test]
    fn test_different_bytes_same_sender_are_distinct() {
        // A bumped sequence ID changes the raw bytes and bypasses the cache.
        let cache = ReplyCache::new();
        cache.put(addr(1000), b"call-seq-1", Bytes::from_static(b"a"));

        assert!(cache.get(addr(1000), b"call-seq-2").is_none());
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache = ReplyCache::with_capacity(2);
        cache.put(addr(1), b"a", Bytes::from_static(b"1"));
        cache.put(addr(1), b"b", Bytes::from_static(b"2"));

        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get(addr(1), b"a").is_some());

        cache.put(addr(1), b"c", Bytes::from_static(b"3"));
        assert!(cache.get(addr(1), b"b").is_none());
        assert!(cache.get(addr(1), b"a").is_some());
        assert!(cache.get(addr(1), b"c").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_overflow_evicts_oldest_first() {
        let cache = ReplyCache::with_capacity(3);
        for i in 0u8..4 {
            cache.put(addr(1), &[i], Bytes::copy_from_slice(&[i]));
        }
        assert!(cache.get(addr(1), &[0]).is_none());
        for i in 1u8..4 {
            assert!(cache.get(addr(1), &[i]).is_some());
        }
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let cache = ReplyCache::with_capacity(0);
        cache.put(addr(1), b"x", Bytes::from_static(b"y"));
        assert_eq!(cache.len(), 1);
    }
}
