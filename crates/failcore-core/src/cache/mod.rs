// crates/failcore-core/src/cache/mod.rs
// ============================================================================
// Module: Failcore Scan Cache
// Description: Run-scoped, hash-keyed deduplication of expensive scans.
// Purpose: Scan identical payloads once per run across gate and enrichers.
// Dependencies: crate::core::{hashing, taint, time}, lru, serde
// ============================================================================

//! ## Overview
//! The scan cache memoises pattern scans under a key derived from the
//! scanner type and the normalised payload. It is strictly run-scoped:
//! caches are created at RUN_START and dropped at RUN_END, never shared
//! across runs. Eviction is a bounded LRU; expiry uses caller-supplied
//! timestamps so behaviour stays deterministic under replay. The writer
//! computes under the cache lock, so exactly one computation happens per
//! key while readers observe either the finished record or a miss.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;

use lru::LruCache;
use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::ContentHash;
use crate::core::taint::Sensitivity;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default bound on cached scan records per run.
pub const DEFAULT_SCAN_CACHE_CAPACITY: usize = 1024;
/// Default logical time-to-live for cached records, in milliseconds.
pub const DEFAULT_SCAN_CACHE_TTL_MS: i64 = 300_000;

// ============================================================================
// SECTION: Match Summary
// ============================================================================

/// Shareable summary of one pattern match inside a scanned payload.
///
/// # Invariants
/// - Carries only `(hash, last4, category)` style data; never the match text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatchSummary {
    /// Matching pattern name.
    pub pattern: String,
    /// Pattern category label.
    pub category: String,
    /// Pattern severity.
    pub severity: u8,
    /// Sensitivity implied by the category.
    pub sensitivity: Sensitivity,
    /// Shortened hash of the matched text.
    pub match_hash: String,
    /// Last four characters of the matched text.
    pub last4: String,
    /// Number of occurrences in the payload.
    pub count: usize,
    /// The producing pattern failed untrusted signature verification.
    #[serde(default)]
    pub unverified: bool,
}

// ============================================================================
// SECTION: Scan Record
// ============================================================================

/// Cached result of scanning one payload with one scanner type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Match summaries in pattern order.
    pub matches: Vec<PatternMatchSummary>,
    /// Shortened hash of the scanned payload.
    pub scan_hash: String,
}

impl ScanRecord {
    /// Returns the highest sensitivity among the matches, if any.
    #[must_use]
    pub fn max_sensitivity(&self) -> Option<Sensitivity> {
        self.matches.iter().map(|summary| summary.sensitivity).max()
    }
}

// ============================================================================
// SECTION: Scan Key
// ============================================================================

/// Computes the cache key for a scanner type and normalised payload.
#[must_use]
pub fn scan_key(scanner_type: &str, payload: &str) -> String {
    let mut input = String::with_capacity(scanner_type.len() + payload.len() + 1);
    input.push_str(scanner_type);
    input.push('\0');
    input.push_str(payload);
    ContentHash::of_str(&input).into_hex()
}

// ============================================================================
// SECTION: Cache Slot
// ============================================================================

/// One cached record with its insertion time.
#[derive(Debug)]
struct CacheSlot {
    /// Cached scan record.
    record: Arc<ScanRecord>,
    /// Logical insertion time.
    inserted_at: Timestamp,
}

// ============================================================================
// SECTION: Scan Cache
// ============================================================================

/// Run-scoped memoisation of expensive pattern scans.
#[derive(Debug)]
pub struct ScanCache {
    /// Bounded LRU of scan records keyed by [`scan_key`].
    slots: Mutex<LruCache<String, CacheSlot>>,
    /// Logical time-to-live in milliseconds.
    ttl_ms: i64,
}

impl ScanCache {
    /// Creates a cache with the default bound and TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_SCAN_CACHE_CAPACITY, DEFAULT_SCAN_CACHE_TTL_MS)
    }

    /// Creates a cache with an explicit bound and TTL.
    #[must_use]
    pub fn with_limits(capacity: usize, ttl_ms: i64) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            slots: Mutex::new(LruCache::new(capacity)),
            ttl_ms,
        }
    }

    /// Returns the cached record for the key or computes and stores it.
    ///
    /// The boolean is `true` on a cache hit. The computation runs under the
    /// cache lock, so each key is computed at most once per residency.
    pub fn get_or_scan(
        &self,
        key: &str,
        now: Timestamp,
        scan: impl FnOnce() -> ScanRecord,
    ) -> (Arc<ScanRecord>, bool) {
        let Ok(mut slots) = self.slots.lock() else {
            // Poisoned lock: fall back to an uncached scan.
            return (Arc::new(scan()), false);
        };
        if let Some(slot) = slots.get(key)
            && now.millis_since(slot.inserted_at) <= self.ttl_ms
        {
            return (Arc::clone(&slot.record), true);
        }
        let record = Arc::new(scan());
        slots.put(
            key.to_string(),
            CacheSlot {
                record: Arc::clone(&record),
                inserted_at: now,
            },
        );
        (record, false)
    }

    /// Returns the number of resident records.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned lock reports zero residents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().map_or(0, |slots| slots.len())
    }

    /// Returns `true` when no records are resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ScanCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::ScanCache;
    use super::ScanRecord;
    use super::scan_key;
    use crate::core::time::Timestamp;

    /// Tests identical payloads are scanned once.
    #[test]
    fn test_scan_runs_once_per_key() {
        let cache = ScanCache::new();
        let key = scan_key("dlp", "payload");
        let calls = AtomicUsize::new(0);
        let now = Timestamp::from_unix_millis(0);

        let (_, hit) = cache.get_or_scan(&key, now, || {
            calls.fetch_add(1, Ordering::SeqCst);
            ScanRecord::default()
        });
        assert!(!hit);
        let (_, hit) = cache.get_or_scan(&key, now, || {
            calls.fetch_add(1, Ordering::SeqCst);
            ScanRecord::default()
        });
        assert!(hit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Tests expiry forces a rescan after the TTL.
    #[test]
    fn test_ttl_expiry() {
        let cache = ScanCache::with_limits(8, 100);
        let key = scan_key("dlp", "payload");
        let (_, hit) = cache.get_or_scan(&key, Timestamp::from_unix_millis(0), ScanRecord::default);
        assert!(!hit);
        let (_, hit) =
            cache.get_or_scan(&key, Timestamp::from_unix_millis(50), ScanRecord::default);
        assert!(hit);
        let (_, hit) =
            cache.get_or_scan(&key, Timestamp::from_unix_millis(500), ScanRecord::default);
        assert!(!hit);
    }

    /// Tests the bound evicts the least recently used record.
    #[test]
    fn test_lru_eviction() {
        let cache = ScanCache::with_limits(2, 1_000_000);
        let now = Timestamp::from_unix_millis(0);
        let key_a = scan_key("dlp", "a");
        let key_b = scan_key("dlp", "b");
        let key_c = scan_key("dlp", "c");

        cache.get_or_scan(&key_a, now, ScanRecord::default);
        cache.get_or_scan(&key_b, now, ScanRecord::default);
        cache.get_or_scan(&key_c, now, ScanRecord::default);
        assert_eq!(cache.len(), 2);
        let (_, hit) = cache.get_or_scan(&key_a, now, ScanRecord::default);
        assert!(!hit, "oldest key must have been evicted");
    }

    /// Tests scanner types produce distinct keys for one payload.
    #[test]
    fn test_scanner_type_separates_keys() {
        assert_ne!(scan_key("dlp", "x"), scan_key("semantic", "x"));
    }
}
