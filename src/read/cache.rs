use std::sync::Arc;

use tracing::debug;

/// A small direct-mapped cache that de-duplicates identical field bytes to
/// shared owning strings. Purely an optimization: disabling it never changes
/// the output, only how many allocations back it.
///
/// Low-cardinality columns (enums, country codes, flags) hit constantly;
/// high-cardinality columns (ids, free text) would only pay the probe cost,
/// so the fill path checks the hit rate every [`CHECK_INTERVAL`] values and
/// switches the cache off for the rest of the column when hits stay under
/// 10 %. The shutoff is irrevocable per column.
pub(super) struct StrCache {
    slots: [Option<(u64, Arc<str>)>; StrCache::CAPACITY],
    hits: u64,
    misses: u64,
    enabled: bool,
}

/// Values between hit-rate checks.
const CHECK_INTERVAL: u64 = 4096;

impl StrCache {
    const CAPACITY: usize = 8;

    pub(super) fn new() -> Self {
        StrCache {
            slots: Default::default(),
            hits: 0,
            misses: 0,
            enabled: true,
        }
    }

    /// Returns a shared string equal to `s`, reusing a cached one when the
    /// same content was seen recently.
    pub(super) fn intern(&mut self, s: &str) -> Arc<str> {
        if !self.enabled {
            return Arc::from(s);
        }
        let total = self.hits + self.misses;
        if total != 0 && total % CHECK_INTERVAL == 0 && 10 * self.hits < total {
            debug!(hits = self.hits, misses = self.misses, "disabling string cache");
            self.enabled = false;
            return Arc::from(s);
        }
        let fingerprint = fingerprint(s.as_bytes());
        let slot = &mut self.slots[fingerprint as usize % Self::CAPACITY];
        if let Some((fp, cached)) = slot {
            if *fp == fingerprint && &**cached == s {
                self.hits += 1;
                return Arc::clone(cached);
            }
        }
        self.misses += 1;
        let fresh: Arc<str> = Arc::from(s);
        *slot = Some((fingerprint, Arc::clone(&fresh)));
        fresh
    }

    #[cfg(test)]
    fn counters(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

/// FNV-1a over the field bytes.
fn fingerprint(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x1000_0000_01b3);
    }
    hash
}
