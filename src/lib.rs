//! displace_mph — hash-and-displace minimal perfect hashing.
//!
//! - Build once on a set of **unique** string keys.
//! - O(1) lookups: key -> its position in the input, in `[0..n)`.
//! - Multi-key buckets get a per-bucket seed; single-key buckets point at a
//!   free slot directly. Two `i32` arrays of length `n` are the whole table.
//!
//! ```
//! let keys = ["alpha", "beta", "gamma"];
//! let table = displace_mph::construct(keys);
//! for (i, k) in keys.iter().enumerate() {
//!     assert_eq!(i as u32, displace_mph::query(&table, k));
//! }
//! ```

mod builder;
mod hash;
mod table;
mod util;

pub use builder::{BuildConfig, Builder, MphError};
pub use hash::{KeyHasher, WyHash, Xxh3, hash64, mix, reduce};
pub use table::{Displacement, Table};

/// Builds a table over `keys` with the default hasher. See [`Table::new`].
pub fn construct<K, I>(keys: I) -> Table
where
    K: AsRef<[u8]>,
    I: IntoIterator<Item = K>,
{
    Table::new(keys)
}

/// Index of `key` in `table`. See [`Table::query`].
#[inline]
pub fn query<H: KeyHasher, K: AsRef<[u8]> + ?Sized>(table: &Table<H>, key: &K) -> u32 {
    table.query(key)
}
