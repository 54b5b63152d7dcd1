//! Fixed-capacity cuckoo filter over 16-bit fingerprints.
//!
//! Items are never stored, only a short fingerprint derived from
//! [`murmur3_32`]. Each item has two candidate buckets; the second is
//! derived from the first and the fingerprint alone, so a stored
//! fingerprint can be relocated without knowing the original item.
//!
//! # Removal caveat
//!
//! Two items that share a fingerprint and a candidate bucket are
//! indistinguishable. Removing one of them may clear the slot belonging to
//! the other, turning it into a false negative. This is inherent to a
//! fingerprint-only design; callers that need exact removal must track the
//! items themselves.

use crate::error::{GuardianError, Result};
use crate::hash::murmur3_32;
use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

const FINGERPRINT_SEED: u32 = 0;
const PRIMARY_INDEX_SEED: u32 = 0x9747_b28c;
const ALTERNATE_INDEX_SEED: u32 = 0x85eb_ca6b;

/// Slot value marking an empty slot. Fingerprints are never zero.
const EMPTY: u16 = 0;

/// Sizing parameters for a [`CuckooFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuckooConfig {
    /// Approximate number of items the filter should hold.
    pub capacity: usize,

    /// Fingerprint slots per bucket.
    #[serde(default = "default_bucket_size")]
    pub bucket_size: usize,

    /// Fingerprint width in bits (1..=16).
    #[serde(default = "default_fingerprint_bits")]
    pub fingerprint_bits: u8,

    /// Upper bound on relocations attempted by a single insert.
    #[serde(default = "default_max_kicks")]
    pub max_kicks: usize,
}

fn default_bucket_size() -> usize {
    4
}

fn default_fingerprint_bits() -> u8 {
    12
}

fn default_max_kicks() -> usize {
    500
}

impl CuckooConfig {
    /// Default parameters for the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            bucket_size: default_bucket_size(),
            fingerprint_bits: default_fingerprint_bits(),
            max_kicks: default_max_kicks(),
        }
    }

    /// Reject parameter combinations the filter cannot represent.
    pub fn validate(&self) -> Result<()> {
        if !(1..=16).contains(&self.fingerprint_bits) {
            return Err(GuardianError::InvalidFilterConfig(format!(
                "fingerprint bits must be between 1 and 16, got {}",
                self.fingerprint_bits
            )));
        }
        if self.bucket_size == 0 {
            return Err(GuardianError::InvalidFilterConfig(
                "bucket size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of buckets this configuration produces. Always a power of two.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        (self.capacity / self.bucket_size.max(1))
            .max(1)
            .next_power_of_two()
    }
}

/// Probabilistic set of byte strings.
///
/// False positives occur at a rate bounded by roughly
/// `2 * bucket_size / 2^fingerprint_bits`. An item for which [`add`](Self::add)
/// returned `true` is reported by [`contains`](Self::contains) until it (or a
/// colliding item, see the module docs) is removed or the filter is cleared.
///
/// The RNG drives eviction choices only. Inject a seeded RNG through
/// [`with_rng`](Self::with_rng) to make relocation sequences reproducible.
#[derive(Debug, Clone)]
pub struct CuckooFilter<R = SmallRng> {
    /// Flattened buckets: bucket `i` occupies `slots[i * bucket_size..][..bucket_size]`.
    slots: Vec<u16>,
    bucket_size: usize,
    bucket_mask: usize,
    fingerprint_mask: u16,
    max_kicks: usize,
    len: usize,
    config: CuckooConfig,
    rng: R,
}

impl CuckooFilter<SmallRng> {
    /// Create an empty filter seeded from OS entropy.
    pub fn new(config: CuckooConfig) -> Result<Self> {
        Self::with_rng(config, SmallRng::from_os_rng())
    }
}

impl<R: RngCore> CuckooFilter<R> {
    /// Create an empty filter that draws eviction choices from `rng`.
    pub fn with_rng(config: CuckooConfig, rng: R) -> Result<Self> {
        config.validate()?;

        let bucket_count = config.bucket_count();
        let fingerprint_mask = ((1u32 << config.fingerprint_bits) - 1) as u16;

        Ok(Self {
            slots: vec![EMPTY; bucket_count * config.bucket_size],
            bucket_size: config.bucket_size,
            bucket_mask: bucket_count - 1,
            fingerprint_mask,
            max_kicks: config.max_kicks,
            len: 0,
            config,
            rng,
        })
    }

    /// Insert an item.
    ///
    /// Returns `false` when no slot could be found within `max_kicks`
    /// relocations. The filter is left exactly as it was before the call in
    /// that case: every fingerprint displaced during the attempt is put back.
    pub fn add(&mut self, item: &[u8]) -> bool {
        let fingerprint = self.fingerprint(item);
        let index1 = self.primary_index(item);
        let index2 = self.alternate_index(index1, fingerprint);

        if self.try_insert(index1, fingerprint) || self.try_insert(index2, fingerprint) {
            self.len += 1;
            return true;
        }

        let mut index = if self.rng.random::<bool>() { index1 } else { index2 };
        let mut carried = fingerprint;
        let mut displaced: Vec<(usize, u16)> = Vec::with_capacity(self.max_kicks);

        for _ in 0..self.max_kicks {
            let position = index * self.bucket_size + self.rng.random_range(0..self.bucket_size);
            let evicted = std::mem::replace(&mut self.slots[position], carried);
            displaced.push((position, evicted));
            carried = evicted;

            index = self.alternate_index(index, carried);
            if self.try_insert(index, carried) {
                self.len += 1;
                return true;
            }
        }

        for (position, previous) in displaced.into_iter().rev() {
            self.slots[position] = previous;
        }
        false
    }
}

impl<R> CuckooFilter<R> {
    /// Whether the item's fingerprint is present in either candidate bucket.
    #[must_use]
    pub fn contains(&self, item: &[u8]) -> bool {
        let fingerprint = self.fingerprint(item);
        let index1 = self.primary_index(item);
        let index2 = self.alternate_index(index1, fingerprint);

        self.bucket(index1).contains(&fingerprint) || self.bucket(index2).contains(&fingerprint)
    }

    /// Remove one copy of the item's fingerprint.
    ///
    /// See the module docs for the collision caveat.
    pub fn remove(&mut self, item: &[u8]) -> bool {
        let fingerprint = self.fingerprint(item);
        let index1 = self.primary_index(item);
        let index2 = self.alternate_index(index1, fingerprint);

        if self.try_delete(index1, fingerprint) || self.try_delete(index2, fingerprint) {
            self.len -= 1;
            return true;
        }
        false
    }

    /// Empty every slot. Capacity is unchanged.
    pub fn clear(&mut self) {
        self.slots.fill(EMPTY);
        self.len = 0;
    }

    /// Number of fingerprints currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no fingerprints are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of buckets (a power of two).
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.bucket_mask + 1
    }

    /// The configuration this filter was built from.
    #[must_use]
    pub fn config(&self) -> CuckooConfig {
        self.config
    }

    fn bucket(&self, index: usize) -> &[u16] {
        let start = index * self.bucket_size;
        &self.slots[start..start + self.bucket_size]
    }

    fn try_insert(&mut self, index: usize, fingerprint: u16) -> bool {
        let start = index * self.bucket_size;
        match self.slots[start..start + self.bucket_size]
            .iter_mut()
            .find(|slot| **slot == EMPTY)
        {
            Some(slot) => {
                *slot = fingerprint;
                true
            }
            None => false,
        }
    }

    fn try_delete(&mut self, index: usize, fingerprint: u16) -> bool {
        let start = index * self.bucket_size;
        match self.slots[start..start + self.bucket_size]
            .iter_mut()
            .find(|slot| **slot == fingerprint)
        {
            Some(slot) => {
                *slot = EMPTY;
                true
            }
            None => false,
        }
    }

    fn fingerprint(&self, item: &[u8]) -> u16 {
        let fingerprint = (murmur3_32(item, FINGERPRINT_SEED) as u16) & self.fingerprint_mask;
        if fingerprint == EMPTY {
            1
        } else {
            fingerprint
        }
    }

    fn primary_index(&self, item: &[u8]) -> usize {
        murmur3_32(item, PRIMARY_INDEX_SEED) as usize & self.bucket_mask
    }

    /// Partner bucket of `index` for `fingerprint`. Applying it twice
    /// returns the original index.
    fn alternate_index(&self, index: usize, fingerprint: u16) -> usize {
        let hash = murmur3_32(&fingerprint.to_le_bytes(), ALTERNATE_INDEX_SEED) as usize;
        (index ^ hash) & self.bucket_mask
    }
}
