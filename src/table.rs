use crate::MphError;
use crate::hash::{KeyHasher, Xxh3, probe, reduce};
use crate::util::BitSet;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;

/// Decoded form of one `seeds` entry.
///
/// Raw encoding: `Direct(slot)` is stored as `-(slot + 1)` so slot 0 is
/// still negative; `Probe(seed)` is stored as `seed` itself. Buckets no key
/// hashes into keep `Probe(0)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Displacement {
    /// The bucket held a single key, placed directly at this slot.
    Direct(u32),
    /// Keys of the bucket live at `reduce(mix(hash + seed), n)`.
    Probe(u32),
}

impl Displacement {
    #[inline]
    pub fn encode(self) -> i32 {
        match self {
            Displacement::Direct(slot) => -(slot as i32) - 1,
            Displacement::Probe(seed) => seed as i32,
        }
    }

    #[inline]
    pub fn decode(raw: i32) -> Self {
        if raw < 0 {
            Displacement::Direct(-(raw + 1) as u32)
        } else {
            Displacement::Probe(raw as u32)
        }
    }
}

/// Immutable minimal perfect hash table: `len` keys map onto `[0, len)`.
///
/// Only the two arrays are state; the hasher is a type-level marker.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(bound = ""))]
pub struct Table<H = Xxh3> {
    values: Vec<i32>,
    seeds: Vec<i32>,
    #[cfg_attr(feature = "serde", serde(skip))]
    hasher: PhantomData<fn() -> H>,
}

impl Table<Xxh3> {
    /// Builds a table over `keys` with the default hasher.
    ///
    /// Key `i` of the input maps to index `i`. Keys must be distinct: a
    /// repeated key shadows its later occurrences, whose indices become
    /// unreachable.
    ///
    /// # Panics
    ///
    /// Panics if there are more than `i32::MAX` keys, or if some bucket
    /// exhausts every positive `i32` seed (pathological key sets).
    pub fn new<K, I>(keys: I) -> Self
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = K>,
    {
        Self::with_hasher(keys)
    }
}

impl<H: KeyHasher> Table<H> {
    /// Same as [`Table::new`] with an explicit hasher.
    pub fn with_hasher<K, I>(keys: I) -> Self
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = K>,
    {
        match crate::Builder::<H>::default().build(keys) {
            Ok(table) => table,
            Err(e) => panic!("minimal perfect hash construction failed: {e}"),
        }
    }

    pub(crate) fn from_raw(values: Vec<i32>, seeds: Vec<i32>) -> Self {
        debug_assert_eq!(values.len(), seeds.len());
        Self {
            values,
            seeds,
            hasher: PhantomData,
        }
    }

    /// Rebuilds a table from raw arrays, e.g. ones produced by another
    /// implementation using the same hasher.
    pub fn from_parts(values: Vec<i32>, seeds: Vec<i32>) -> Result<Self, MphError> {
        if values.len() != seeds.len() {
            return Err(MphError::Corrupt("values and seeds differ in length"));
        }
        if values.len() > i32::MAX as usize {
            return Err(MphError::TooManyKeys(values.len()));
        }
        let n = values.len();

        let mut seen = BitSet::new(n);
        for &v in &values {
            if v < 0 || v as usize >= n {
                return Err(MphError::Corrupt("value out of range"));
            }
            if seen.test_and_set(v as usize) {
                return Err(MphError::Corrupt("value repeated"));
            }
        }
        for &s in &seeds {
            if let Displacement::Direct(slot) = Displacement::decode(s) {
                if slot as usize >= n {
                    return Err(MphError::Corrupt("direct slot out of range"));
                }
            }
        }

        Ok(Self::from_raw(values, seeds))
    }

    /// Index of `key` in `[0, len)`.
    ///
    /// `key` must belong to the set the table was built from; any other key
    /// yields an arbitrary index. Panics on an empty table.
    #[inline]
    pub fn query<K: AsRef<[u8]> + ?Sized>(&self, key: &K) -> u32 {
        let n = self.values.len() as u64;
        let hash = H::hash64(key.as_ref(), 0);
        let seed = self.seeds[reduce(hash, n) as usize];

        let slot = if seed < 0 {
            -(seed + 1) as usize
        } else {
            probe(hash, seed as u64, n) as usize
        };
        self.values[slot] as u32
    }

    #[inline]
    pub fn index_str(&self, s: &str) -> u32 {
        self.query(s)
    }

    /// Decoded seed of the bucket at initial index `bucket`.
    pub fn displacement(&self, bucket: usize) -> Option<Displacement> {
        self.seeds.get(bucket).copied().map(Displacement::decode)
    }

    /// Checks that `keys` map onto `[0, len)` without collisions.
    pub fn verify<K, I>(&self, keys: I) -> bool
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = K>,
    {
        let mut hit = BitSet::new(self.len());
        if self.is_empty() {
            return keys.into_iter().next().is_none();
        }
        for key in keys {
            let idx = self.query(key.as_ref()) as usize;
            if idx >= hit.len() || hit.test_and_set(idx) {
                return false;
            }
        }
        hit.is_full()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }

    pub fn seeds(&self) -> &[i32] {
        &self.seeds
    }

    pub fn into_parts(self) -> (Vec<i32>, Vec<i32>) {
        (self.values, self.seeds)
    }

    pub fn memory_usage_bytes(&self) -> usize {
        size_of::<Self>() + (self.values.len() + self.seeds.len()) * size_of::<i32>()
    }

    #[cfg(feature = "serde")]
    pub fn to_bytes(&self) -> Result<Vec<u8>, MphError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decodes and validates a table written by [`Table::to_bytes`].
    #[cfg(feature = "serde")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MphError> {
        let raw: Self = bincode::deserialize(bytes)?;
        Self::from_parts(raw.values, raw.seeds)
    }
}

impl<H> Clone for Table<H> {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            seeds: self.seeds.clone(),
            hasher: PhantomData,
        }
    }
}

impl<H> PartialEq for Table<H> {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values && self.seeds == other.seeds
    }
}

impl<H> Eq for Table<H> {}

impl<H> fmt::Debug for Table<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("values", &self.values)
            .field("seeds", &self.seeds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn displacement_encoding() {
        assert_eq!(-1, Displacement::Direct(0).encode());
        assert_eq!(-8, Displacement::Direct(7).encode());
        assert_eq!(5, Displacement::Probe(5).encode());
        assert_eq!(Displacement::Direct(0), Displacement::decode(-1));
        assert_eq!(Displacement::Probe(0), Displacement::decode(0));
        assert_eq!(
            Displacement::Direct(i32::MAX as u32),
            Displacement::decode(i32::MIN)
        );
    }

    #[test]
    fn from_parts_accepts_single_direct() {
        let table = Table::<Xxh3>::from_parts(vec![0], vec![-1]).unwrap();
        assert_eq!(0, table.query("anything"));
        assert_eq!(Some(Displacement::Direct(0)), table.displacement(0));
        assert_eq!(None, table.displacement(1));
    }

    #[test]
    fn from_parts_rejects_malformed() {
        assert!(matches!(
            Table::<Xxh3>::from_parts(vec![0, 1], vec![0]),
            Err(MphError::Corrupt(_))
        ));
        assert!(matches!(
            Table::<Xxh3>::from_parts(vec![0, 2], vec![0, 0]),
            Err(MphError::Corrupt(_))
        ));
        assert!(matches!(
            Table::<Xxh3>::from_parts(vec![1, 1], vec![0, 0]),
            Err(MphError::Corrupt(_))
        ));
        assert!(matches!(
            Table::<Xxh3>::from_parts(vec![0, -1], vec![0, 0]),
            Err(MphError::Corrupt(_))
        ));
        assert!(matches!(
            Table::<Xxh3>::from_parts(vec![0, 1], vec![-3, 0]),
            Err(MphError::Corrupt(_))
        ));
    }

    #[test]
    fn empty_table() {
        let table = Table::<Xxh3>::from_parts(vec![], vec![]).unwrap();
        assert!(table.is_empty());
        assert!(table.verify(Vec::<&str>::new()));
        assert!(!table.verify(["a"]));
    }

    #[test]
    fn memory_usage_counts_arrays() {
        let table = Table::<Xxh3>::from_parts(vec![1, 0], vec![-2, -1]).unwrap();
        assert_eq!(
            size_of::<Table>() + 4 * size_of::<i32>(),
            table.memory_usage_bytes()
        );
    }
}
