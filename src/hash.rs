use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Seedable 64-bit key hash used for both bucketing and probing.
///
/// A table must be queried with the same hasher it was built with; the
/// hasher is part of `Table`'s type for that reason.
pub trait KeyHasher {
    fn hash64(key: &[u8], seed: u64) -> u64;
}

/// XXH3-64. Default hasher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Xxh3;

impl KeyHasher for Xxh3 {
    #[inline]
    fn hash64(key: &[u8], seed: u64) -> u64 {
        xxh3_64_with_seed(key, seed)
    }
}

/// wyhash (final version 3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WyHash;

impl KeyHasher for WyHash {
    #[inline]
    fn hash64(key: &[u8], seed: u64) -> u64 {
        wyhash::wyhash(key, seed)
    }
}

/// Hash `key` with the default hasher.
#[inline]
pub fn hash64(key: &[u8], seed: u64) -> u64 {
    Xxh3::hash64(key, seed)
}

/// Maps `h` into `[0, n)` without a division: the high word of `h * n`.
/// https://lemire.me/blog/2016/06/27/a-fast-alternative-to-the-modulo-reduction/
#[inline]
pub fn reduce(h: u64, n: u64) -> u64 {
    ((h as u128 * n as u128) >> 64) as u64
}

/// xorshift-multiply finalizer, applied to `hash + seed` before reduction
/// so every seed yields an independent candidate slot.
#[inline]
pub fn mix(mut x: u64) -> u64 {
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    x.wrapping_mul(2_685_821_657_736_338_717)
}

/// Secondary slot of a key hashed to `h` under bucket seed `seed`.
#[inline]
pub(crate) fn probe(h: u64, seed: u64, n: u64) -> u64 {
    reduce(mix(h.wrapping_add(seed)), n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn reduce_stays_in_range() {
        for n in [1u64, 2, 3, 7, 1_000, 1 << 40] {
            for h in [0u64, 1, u64::MAX / 3, u64::MAX - 1, u64::MAX] {
                assert!(reduce(h, n) < n, "reduce({h}, {n})");
            }
        }
    }

    #[test]
    fn reduce_edges() {
        assert_eq!(0, reduce(0, 10));
        assert_eq!(9, reduce(u64::MAX, 10));
        assert_eq!(5, reduce(1 << 63, 10));
        assert_eq!(0, reduce(u64::MAX, 1));
    }

    #[test]
    fn mix_known_values() {
        assert_eq!(0, mix(0));
        // 1 ^ (1 << 25) after the three shifts, times the multiplier
        let x = 1u64 ^ (1 << 25);
        let x = x ^ (x >> 27);
        assert_eq!(x.wrapping_mul(2_685_821_657_736_338_717), mix(1));
    }

    #[test]
    fn mix_separates_neighbouring_seeds() {
        let h = hash64(b"some key", 0);
        let a = mix(h.wrapping_add(1));
        let b = mix(h.wrapping_add(2));
        assert_ne!(a, b);
        assert!((a ^ b).count_ones() > 8);
    }

    #[test]
    fn hashers_are_deterministic() {
        assert_eq!(hash64(b"abc", 0), hash64(b"abc", 0));
        assert_ne!(hash64(b"abc", 0), hash64(b"abc", 1));
        assert_eq!(WyHash::hash64(b"abc", 7), WyHash::hash64(b"abc", 7));
        assert_eq!(Xxh3::hash64(b"abc", 0), hash64(b"abc", 0));
    }
}
