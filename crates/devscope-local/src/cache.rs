//! In-memory memo table for extracted page text.
//!
//! Bounded by entry count (least-recently-used eviction) and optionally by age. The clock is
//! injectable so expiry can be driven deterministically in tests.

use lru::LruCache;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_CAPACITY: usize = 32;

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    text: String,
    stored_at: Instant,
}

type Key = (String, usize);

#[derive(Debug)]
pub struct PageCache {
    entries: Mutex<LruCache<Key, Entry>>,
    ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl PageCache {
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
            ttl: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up text for `(url, max_chars)`. Expired entries are dropped and reported as a miss.
    pub fn get(&self, url: &str, max_chars: usize) -> Option<String> {
        let key = (url.to_string(), max_chars);
        let now = self.clock.now();
        let mut entries = self.lock();
        let stored_at = entries.get(&key)?.stored_at;
        if let Some(ttl) = self.ttl {
            if now.saturating_duration_since(stored_at) > ttl {
                entries.pop(&key);
                return None;
            }
        }
        entries.get(&key).map(|e| e.text.clone())
    }

    pub fn put(&self, url: &str, max_chars: usize, text: String) {
        let stored_at = self.clock.now();
        self.lock()
            .put((url.to_string(), max_chars), Entry { text, stored_at });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<Key, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
