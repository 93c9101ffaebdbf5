//! Key-Value Store with Expiry Support
//!
//! A single `Mutex<HashMap>` holds every entry. Each operation takes the lock,
//! touches the map and releases it, so `get`, `set` and a sweep pass are
//! atomic with respect to each other. The lock is never held across I/O.
//!
//! Expiry is enforced in two places:
//!
//! 1. **Lazy**: `get` checks the deadline and removes the entry if it has passed.
//! 2. **Active**: the [`ExpirySweeper`](crate::storage::ExpirySweeper) calls
//!    [`Store::purge_expired`] on a timer so unread dead keys don't pile up.
//!
//! `get` never depends on the sweeper having run.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates an entry that expires `ttl` after `now`, or never if `ttl` is `None`.
    ///
    /// A deadline past what `Instant` can represent also means never.
    pub fn new(value: Bytes, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            value,
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
        }
    }

    /// An entry is expired once `now` reaches its deadline.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// Counters describing store activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    /// Entries removed by `get` after their deadline passed
    pub expired_lazily: u64,
    /// Entries removed by sweep passes
    pub expired_actively: u64,
}

/// The shared key-value map.
///
/// Created once at startup, wrapped in an `Arc` and handed to every
/// connection's command handler and to the expiry sweeper.
///
/// # Example
///
/// ```
/// use flintkv::storage::Store;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let store = Store::new();
///
/// store.set(Bytes::from("name"), Bytes::from("Ariz"), None);
/// assert_eq!(store.get(&Bytes::from("name")), Some(Bytes::from("Ariz")));
///
/// store.set(Bytes::from("session"), Bytes::from("abc123"), Some(Duration::from_secs(60)));
/// assert_eq!(store.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct Store {
    data: Mutex<HashMap<Bytes, Entry>>,

    get_count: AtomicU64,
    set_count: AtomicU64,
    lazy_expired_count: AtomicU64,
    swept_count: AtomicU64,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the map lock.
    ///
    /// Every critical section leaves the map consistent, so a panic in
    /// another holder is not a reason to stop serving.
    fn lock(&self) -> MutexGuard<'_, HashMap<Bytes, Entry>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or overwrites `key`.
    ///
    /// With a `ttl` the entry expires that long from now; without one it never
    /// expires, and any previous deadline on the key is discarded.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        self.set_at(key, value, ttl, Instant::now());
    }

    /// Like [`Store::set`], measuring the TTL from `now`.
    pub fn set_at(&self, key: Bytes, value: Bytes, ttl: Option<Duration>, now: Instant) {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        let entry = Entry::new(value, ttl, now);
        self.lock().insert(key, entry);
    }

    /// Returns the value for `key` if it exists and has not expired.
    ///
    /// An expired entry is removed on the spot. Reading never extends a TTL.
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        self.get_at(key, Instant::now())
    }

    /// Like [`Store::get`], judging expiry against `now`.
    pub fn get_at(&self, key: &Bytes, now: Instant) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.lock();
        match data.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
            Some(_) => {}
        }

        data.remove(key);
        self.lazy_expired_count.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Removes every entry whose deadline has passed.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> u64 {
        self.purge_expired_at(Instant::now())
    }

    /// Like [`Store::purge_expired`], judging expiry against `now`.
    pub fn purge_expired_at(&self, now: Instant) -> u64 {
        let removed = {
            let mut data = self.lock();
            let before = data.len();
            data.retain(|_, entry| !entry.is_expired_at(now));
            (before - data.len()) as u64
        };

        if removed > 0 {
            self.swept_count.fetch_add(removed, Ordering::Relaxed);
        }
        removed
    }

    /// Number of entries in the map, including expired ones not yet removed.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the raw entry without checking or enforcing expiry.
    pub fn peek(&self, key: &Bytes) -> Option<Entry> {
        self.lock().get(key).cloned()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            keys: self.len() as u64,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            expired_lazily: self.lazy_expired_count.load(Ordering::Relaxed),
            expired_actively: self.swept_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn key(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_set_and_get() {
        let store = Store::new();
        store.set(key("name"), key("Ariz"), None);
        assert_eq!(store.get(&key("name")), Some(key("Ariz")));
    }

    #[test]
    fn test_get_nonexistent() {
        let store = Store::new();
        assert_eq!(store.get(&key("missing")), None);
    }

    #[test]
    fn test_overwrite() {
        let store = Store::new();
        store.set(key("k"), key("v1"), None);
        store.set(key("k"), key("v2"), None);
        assert_eq!(store.get(&key("k")), Some(key("v2")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_overwrite_clears_ttl() {
        let store = Store::new();
        let t0 = Instant::now();
        store.set_at(key("k"), key("v1"), Some(Duration::from_millis(10)), t0);
        store.set_at(key("k"), key("v2"), None, t0);

        let later = t0 + Duration::from_secs(3600);
        assert_eq!(store.get_at(&key("k"), later), Some(key("v2")));
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let store = Store::new();
        let t0 = Instant::now();
        store.set_at(key("k"), key("v"), None, t0);

        let far = t0 + Duration::from_secs(10 * 365 * 24 * 3600);
        assert_eq!(store.get_at(&key("k"), far), Some(key("v")));
        assert_eq!(store.purge_expired_at(far), 0);
    }

    #[test]
    fn test_expiry_boundary() {
        let store = Store::new();
        let t0 = Instant::now();
        let ttl = Duration::from_millis(50);
        store.set_at(key("k"), key("v"), Some(ttl), t0);

        assert_eq!(store.get_at(&key("k"), t0), Some(key("v")));
        assert_eq!(
            store.get_at(&key("k"), t0 + Duration::from_millis(10)),
            Some(key("v"))
        );
        assert_eq!(
            store.get_at(&key("k"), t0 + ttl - Duration::from_nanos(1)),
            Some(key("v"))
        );

        // Expired exactly at the deadline
        assert_eq!(store.get_at(&key("k"), t0 + ttl), None);
    }

    #[test]
    fn test_lazy_expiry_removes_entry() {
        let store = Store::new();
        let t0 = Instant::now();
        store.set_at(key("k"), key("v"), Some(Duration::from_millis(50)), t0);

        assert_eq!(store.get_at(&key("k"), t0 + Duration::from_millis(60)), None);
        assert!(store.peek(&key("k")).is_none());
        assert_eq!(store.stats().expired_lazily, 1);
    }

    #[test]
    fn test_reading_does_not_extend_ttl() {
        let store = Store::new();
        let t0 = Instant::now();
        store.set_at(key("k"), key("v"), Some(Duration::from_millis(50)), t0);

        for ms in [10, 20, 30, 40] {
            assert!(store.get_at(&key("k"), t0 + Duration::from_millis(ms)).is_some());
        }
        assert_eq!(store.peek(&key("k")).unwrap().expires_at, Some(t0 + Duration::from_millis(50)));
        assert_eq!(store.get_at(&key("k"), t0 + Duration::from_millis(50)), None);
    }

    #[test]
    fn test_unrepresentable_deadline_never_expires() {
        let store = Store::new();
        let now = Instant::now();
        store.set_at(key("k"), key("v"), Some(Duration::from_millis(u64::MAX)), now);
        store.set_at(key("max"), key("v"), Some(Duration::MAX), now);

        assert!(store.peek(&key("max")).unwrap().expires_at.is_none());
        let later = now + Duration::from_secs(86_400);
        assert_eq!(store.get_at(&key("k"), later), Some(key("v")));
        assert_eq!(store.get_at(&key("max"), later), Some(key("v")));
        assert_eq!(store.purge_expired_at(later), 0);
    }

    #[test]
    fn test_zero_ttl_is_immediately_expired() {
        let store = Store::new();
        let t0 = Instant::now();
        store.set_at(key("k"), key("v"), Some(Duration::ZERO), t0);
        assert_eq!(store.get_at(&key("k"), t0), None);
    }

    #[test]
    fn test_purge_expired() {
        let store = Store::new();
        let t0 = Instant::now();

        for i in 0..10 {
            store.set_at(
                key(&format!("temp{}", i)),
                key("value"),
                Some(Duration::from_millis(50)),
                t0,
            );
        }
        store.set_at(key("long"), key("value"), Some(Duration::from_secs(60)), t0);
        store.set_at(key("persistent"), key("value"), None, t0);
        assert_eq!(store.len(), 12);

        assert_eq!(store.purge_expired_at(t0 + Duration::from_millis(49)), 0);
        assert_eq!(store.purge_expired_at(t0 + Duration::from_millis(50)), 10);
        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().expired_actively, 10);
    }

    #[test]
    fn test_expiry_with_real_clock() {
        let store = Store::new();
        store.set(key("temp"), key("value"), Some(Duration::from_millis(50)));
        assert_eq!(store.get(&key("temp")), Some(key("value")));

        thread::sleep(Duration::from_millis(80));
        assert_eq!(store.get(&key("temp")), None);
    }

    #[test]
    fn test_stats() {
        let store = Store::new();
        store.set(key("a"), key("1"), None);
        store.set(key("b"), key("2"), None);
        store.get(&key("a"));
        store.get(&key("zzz"));

        let stats = store.stats();
        assert_eq!(stats.keys, 2);
        assert_eq!(stats.set_ops, 2);
        assert_eq!(stats.get_ops, 2);
    }

    #[test]
    fn test_concurrent_access() {
        let store = Arc::new(Store::new());
        let mut handles = vec![];

        for t in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let k = key(&format!("key:{}:{}", t, i));
                    let v = key(&format!("value:{}:{}", t, i));
                    store.set(k.clone(), v.clone(), Some(Duration::from_secs(60)));
                    assert_eq!(store.get(&k), Some(v));
                }
            }));
        }

        let sweeper = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..50 {
                    store.purge_expired();
                }
            })
        };

        for handle in handles {
            handle.join().unwrap();
        }
        sweeper.join().unwrap();

        assert_eq!(store.len(), 1000);
    }
}
