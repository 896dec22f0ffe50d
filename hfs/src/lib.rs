//! The hash function set (HFS) collaborator: given an index `i in [0, K)`
//! and a key, returns a non-negative integer. The IBLT engine treats this as
//! opaque; this crate only supplies a concrete default so the engine is
//! usable without a caller-supplied hasher.

use std::hash::Hasher;

use bitstring::Bitstring;
use rand::Rng;
use serde::{Deserialize, Serialize};
use siphasher::sip128::SipHasher13;

/// A provider of `K` independent hash functions indexed `0..K`.
pub trait HashFunctionSet {
    /// The number of independent hash functions, `K`.
    fn size(&self) -> usize;

    /// Applies the `i`-th hash function to `key`. `i` must be `< self.size()`.
    fn apply_val(&self, i: usize, key: &Bitstring) -> u64;
}

#[derive(Serialize, Deserialize)]
#[serde(remote = "SipHasher13")]
struct SipHasher13Def {
    #[serde(getter = "SipHasher13::keys")]
    keys: (u64, u64),
}

impl From<SipHasher13Def> for SipHasher13 {
    fn from(def: SipHasher13Def) -> SipHasher13 {
        SipHasher13::new_with_keys(def.keys.0, def.keys.1)
    }
}

/// Default `HashFunctionSet` using the double-hashing (Kirsch-Mitzenmacher)
/// technique: two independently-seeded SipHash-1-3 instances `h1`, `h2` are
/// combined as `apply_val(i, key) = h1 + i*h2` for `i >= 2`, with `i in {0,
/// 1}` returning `h1`/`h2` directly. This is the same trick `HashIter` in the
/// sibling bloom filter implementation uses to stretch two hashes into many,
/// generalized here to an arbitrary `k` rather than a fixed two.
#[derive(Clone, Serialize, Deserialize)]
pub struct DefaultHfs {
    k: usize,
    #[serde(with = "SipHasher13Def")]
    hash_builder_one: SipHasher13,
    #[serde(with = "SipHasher13Def")]
    hash_builder_two: SipHasher13,
}

impl DefaultHfs {
    /// Builds `k` independent hash functions, seeded from the thread-local
    /// RNG. `k` may be zero; the engine rejects that at construction time.
    pub fn new(k: usize) -> Self {
        let mut rng = rand::thread_rng();
        DefaultHfs {
            k,
            hash_builder_one: SipHasher13::new_with_keys(rng.gen(), rng.gen()),
            hash_builder_two: SipHasher13::new_with_keys(rng.gen(), rng.gen()),
        }
    }

    fn hash_with(&self, key: &Bitstring, builder: &SipHasher13) -> u64 {
        let mut hasher = builder.clone();
        hasher.write(&key.to_bytes());
        hasher.write_u64(key.len() as u64);
        hasher.finish()
    }
}

impl HashFunctionSet for DefaultHfs {
    fn size(&self) -> usize {
        self.k
    }

    fn apply_val(&self, i: usize, key: &Bitstring) -> u64 {
        assert!(i < self.k, "hash function index out of range");
        let h1 = self.hash_with(key, &self.hash_builder_one);
        if i == 0 {
            return h1;
        }
        let h2 = self.hash_with(key, &self.hash_builder_two);
        if i == 1 {
            return h2;
        }
        h1.wrapping_add((i as u64).wrapping_mul(h2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_k_independent_values() {
        let hfs = DefaultHfs::new(5);
        let key = Bitstring::from_bytes(b"abc", 24);
        let values: Vec<u64> = (0..5).map(|i| hfs.apply_val(i, &key)).collect();
        let mut sorted = values.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), values.len(), "collision between hash functions for the same key");
    }

    #[test]
    fn same_key_is_deterministic_within_one_hfs() {
        let hfs = DefaultHfs::new(3);
        let key = Bitstring::from_bytes(b"abc", 24);
        assert_eq!(hfs.apply_val(2, &key), hfs.apply_val(2, &key));
    }

    #[test]
    fn serialization_round_trips() {
        let hfs = DefaultHfs::new(4);
        let key = Bitstring::from_bytes(b"abc", 24);
        let before: Vec<u64> = (0..4).map(|i| hfs.apply_val(i, &key)).collect();
        let bytes = bincode::serialize(&hfs).unwrap();
        let restored: DefaultHfs = bincode::deserialize(&bytes).unwrap();
        let after: Vec<u64> = (0..4).map(|i| restored.apply_val(i, &key)).collect();
        assert_eq!(before, after);
    }
}
