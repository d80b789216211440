use crate::hash::{KeyHasher, Xxh3, probe, reduce};
use crate::table::{Displacement, Table};
use hashbrown::{HashMap, HashSet};
use std::cmp::Reverse;
use std::marker::PhantomData;
use thiserror::Error;

/// Position of a key in the construction input.
type KeyIndex = u32;

/// Largest seed a bucket can store: seeds share the `i32` encoding with
/// direct slots.
const MAX_SEED: u32 = i32::MAX as u32;

/// Below this many keys hashing stays on the calling thread.
#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 1 << 14;

/// Buckets needing more seeds than this get a trace line.
const SLOW_BUCKET_SEEDS: u32 = 1_024;

/// Build parameters.
///
/// The default reproduces the plain algorithm: unbounded seed search and no
/// duplicate detection.
#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    /// Seeds to try per multi-key bucket before failing with
    /// [`MphError::Unresolvable`]. `None` searches the whole positive `i32`
    /// range.
    pub max_seed_attempts: Option<u32>,
    /// Fail on repeated keys (and on distinct keys with equal 64-bit
    /// hashes) instead of shadowing them.
    pub reject_duplicates: bool,
}

#[derive(Debug, Error)]
pub enum MphError {
    #[error("duplicate key at positions {first} and {second}")]
    DuplicateKey { first: usize, second: usize },
    #[error("keys at positions {first} and {second} have the same 64-bit hash")]
    HashCollision { first: usize, second: usize },
    #[error("bucket {bucket} could not be placed after {attempts} seeds")]
    Unresolvable { bucket: usize, attempts: u32 },
    #[error("too many keys: {0} (at most i32::MAX)")]
    TooManyKeys(usize),
    #[error("malformed table: {0}")]
    Corrupt(&'static str),
    #[cfg(feature = "serde")]
    #[error("serialization error: {0}")]
    Serde(#[from] Box<bincode::ErrorKind>),
}

pub struct Builder<H = Xxh3> {
    cfg: BuildConfig,
    hasher: PhantomData<fn() -> H>,
}

impl Builder<Xxh3> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<H> Default for Builder<H> {
    fn default() -> Self {
        Self {
            cfg: BuildConfig::default(),
            hasher: PhantomData,
        }
    }
}

impl<H: KeyHasher> Builder<H> {
    pub fn with_config(mut self, cfg: BuildConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Switches the key hasher. Tables built this way must be queried as
    /// `Table<H2>`.
    pub fn hasher<H2: KeyHasher>(self) -> Builder<H2> {
        Builder {
            cfg: self.cfg,
            hasher: PhantomData,
        }
    }

    /// Build the table. Key `i` of `keys` maps to index `i`.
    pub fn build<K, I>(self, keys: I) -> Result<Table<H>, MphError>
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = K>,
    {
        let keys: Vec<K> = keys.into_iter().collect();
        let keys: Vec<&[u8]> = keys.iter().map(|k| k.as_ref()).collect();
        if keys.len() > i32::MAX as usize {
            return Err(MphError::TooManyKeys(keys.len()));
        }

        if self.cfg.reject_duplicates {
            check_unique(&keys)?;
        }

        let hashes = hash_keys::<H>(&keys);
        let (values, seeds) = displace(&hashes, &self.cfg)?;
        Ok(Table::from_raw(values, seeds))
    }
}

/// Exact byte comparison, no probabilistic shortcuts.
fn check_unique(keys: &[&[u8]]) -> Result<(), MphError> {
    let mut seen = HashMap::<&[u8], usize>::with_capacity(keys.len());
    for (second, &key) in keys.iter().enumerate() {
        if let Some(&first) = seen.get(key) {
            return Err(MphError::DuplicateKey { first, second });
        }
        seen.insert(key, second);
    }
    Ok(())
}

fn hash_keys<H: KeyHasher>(keys: &[&[u8]]) -> Vec<u64> {
    #[cfg(feature = "parallel")]
    {
        if keys.len() >= PARALLEL_THRESHOLD {
            use rayon::prelude::*;
            return keys.par_iter().map(|k| H::hash64(k, 0)).collect();
        }
    }
    keys.iter().map(|k| H::hash64(k, 0)).collect()
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    idx: KeyIndex,
    hash: u64,
}

/// Tentative slots of one seed attempt. Cleared before every attempt so
/// nothing leaks between seeds or buckets.
struct Claims {
    taken: HashSet<usize>,
    placed: Vec<(usize, KeyIndex)>,
}

impl Claims {
    fn with_capacity(cap: usize) -> Self {
        Self {
            taken: HashSet::with_capacity(cap),
            placed: Vec::with_capacity(cap),
        }
    }

    fn clear(&mut self) {
        self.taken.clear();
        self.placed.clear();
    }

    /// Returns false if `slot` is already claimed in this attempt.
    fn claim(&mut self, slot: usize, idx: KeyIndex) -> bool {
        if !self.taken.insert(slot) {
            return false;
        }
        self.placed.push((slot, idx));
        true
    }
}

/// Hash-and-displace over precomputed key hashes. Returns `(values, seeds)`.
fn displace(hashes: &[u64], cfg: &BuildConfig) -> Result<(Vec<i32>, Vec<i32>), MphError> {
    let n = hashes.len();
    let n_u64 = n as u64;

    // 1) Bucket by initial reduced hash.
    let mut buckets: Vec<Vec<Entry>> = vec![Vec::new(); n];
    for (idx, &hash) in hashes.iter().enumerate() {
        buckets[reduce(hash, n_u64) as usize].push(Entry {
            idx: idx as KeyIndex,
            hash,
        });
    }

    // Entries with equal hashes can never be separated by a seed. The first
    // occurrence keeps the bucket; later ones are parked in a leftover slot
    // and are unreachable by query.
    let mut shadowed = Vec::new();
    for bucket in buckets.iter_mut().filter(|b| b.len() > 1) {
        bucket.sort_unstable_by_key(|e| (e.hash, e.idx));
        let mut collision = None;
        bucket.dedup_by(|later, kept| {
            if later.hash != kept.hash {
                return false;
            }
            collision.get_or_insert((kept.idx, later.idx));
            shadowed.push(later.idx);
            true
        });
        if let Some((first, second)) = collision {
            if cfg.reject_duplicates {
                return Err(MphError::HashCollision {
                    first: first as usize,
                    second: second as usize,
                });
            }
            log::warn!("keys {first} and {second} share a hash; key {second} is unreachable");
        }
    }

    // 2) Largest buckets first; stable, so ties keep bucket order.
    let mut order: Vec<usize> = (0..n).filter(|&b| !buckets[b].is_empty()).collect();
    order.sort_by_key(|&b| Reverse(buckets[b].len()));
    let (multi, single) = order.split_at(order.partition_point(|&b| buckets[b].len() > 1));

    let mut slots: Vec<Option<KeyIndex>> = vec![None; n];
    let mut seeds = vec![Displacement::Probe(0); n];

    // 3) Seed search for multi-key buckets.
    let limit = cfg.max_seed_attempts.map_or(MAX_SEED, |l| l.min(MAX_SEED));
    let mut claims = Claims::with_capacity(multi.first().map_or(0, |&b| buckets[b].len()));
    let mut total_seeds = 0u64;
    for &b in multi {
        let seed = find_seed(&buckets[b], &slots, &mut claims, n_u64, limit).ok_or(
            MphError::Unresolvable {
                bucket: b,
                attempts: limit,
            },
        )?;
        if seed > SLOW_BUCKET_SEEDS {
            log::trace!("bucket {b} ({} keys) took {seed} seeds", buckets[b].len());
        }
        total_seeds += u64::from(seed);

        for &(slot, idx) in &claims.placed {
            slots[slot] = Some(idx);
        }
        seeds[b] = Displacement::Probe(seed);
    }

    // 4) Free slots in ascending order.
    let free: Vec<usize> = (0..n).filter(|&s| slots[s].is_none()).collect();
    debug_assert_eq!(free.len(), single.len() + shadowed.len());
    let mut free = free.into_iter();

    // 5) Singletons take free slots directly.
    for &b in single {
        let entry = buckets[b][0];
        let Some(slot) = free.next() else { break };
        slots[slot] = Some(entry.idx);
        seeds[b] = Displacement::Direct(slot as u32);
    }
    for (idx, slot) in shadowed.into_iter().zip(free) {
        slots[slot] = Some(idx);
    }

    log::debug!(
        "built table: n={n}, multi-key buckets={}, largest bucket={}, seeds tried={total_seeds}",
        multi.len(),
        order.first().map_or(0, |&b| buckets[b].len()),
    );

    // 6) Collapse to the raw layout.
    let values = slots
        .into_iter()
        .map(|s| s.map_or(0, |idx| idx as i32))
        .collect();
    let seeds = seeds.into_iter().map(Displacement::encode).collect();
    Ok((values, seeds))
}

/// First seed in `1..=limit` that sends every entry to a distinct free slot.
/// On success the slots are left in `claims`.
fn find_seed(
    entries: &[Entry],
    slots: &[Option<KeyIndex>],
    claims: &mut Claims,
    n: u64,
    limit: u32,
) -> Option<u32> {
    'seed: for seed in 1..=limit {
        claims.clear();
        for e in entries {
            let slot = probe(e.hash, u64::from(seed), n) as usize;
            if slots[slot].is_some() || !claims.claim(slot, e.idx) {
                continue 'seed;
            }
        }
        return Some(seed);
    }
    None
}
