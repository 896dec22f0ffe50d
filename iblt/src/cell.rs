use bitstring::{bin_xor, Bitstring};
use serde::{Deserialize, Serialize};

use crate::checksum::{checksum_bitstring, checksum_value};

/// One bucket of the IBLT. Holds the XOR-accumulated key/value sums and
/// checksums of everything hashed into this cell, plus a signed count of net
/// insertions.
///
/// A cell is *pure* iff `count` is `+1` or `-1` and both stored checksums
/// match a recomputed checksum of the corresponding sum — see [`Cell::pure`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub count: i64,
    pub key_sum: Bitstring,
    pub key_hash_sum: u32,
    pub val_sum: u64,
    pub val_hash_sum: u32,
}

impl Cell {
    /// A fresh, empty cell: zero count, a single zero bit for `key_sum`, and
    /// zeroed checksums/value sum.
    pub fn empty() -> Self {
        Cell {
            count: 0,
            key_sum: Bitstring::zeros(1),
            key_hash_sum: 0,
            val_sum: 0,
            val_hash_sum: 0,
        }
    }

    /// Folds one contribution into this cell with the given signed
    /// direction (`+1` for insert, `-1` for delete). `encoded_key` is the
    /// self-describing encoding of the key (see `bitstring::encode`), not
    /// the raw key bits.
    pub fn apply(&mut self, encoded_key: &Bitstring, value: u64, direction: i64) {
        self.count += direction;
        self.key_sum = bin_xor(&self.key_sum, encoded_key);
        self.key_hash_sum ^= checksum_bitstring(encoded_key);
        self.val_sum ^= value;
        self.val_hash_sum ^= checksum_value(value);
    }

    /// True iff this cell carries the contribution of exactly one entry:
    /// `count` is `+1` or `-1`, and both stored checksums match a recomputed
    /// checksum of the stored sums.
    pub fn pure(&self) -> bool {
        if self.count != 1 && self.count != -1 {
            return false;
        }
        checksum_bitstring(&self.key_sum) == self.key_hash_sum
            && checksum_value(self.val_sum) == self.val_hash_sum
    }

    /// True iff this cell carries no net contribution: either it has never
    /// been touched, or every contribution folded into it has since been
    /// cancelled by an equal and opposite one. `key_sum` is checked by value
    /// ([`Bitstring::is_zero`]), not by length: XOR zero-extends rather than
    /// truncates, so a cancelled `key_sum` is typically longer than the
    /// single zero bit [`Cell::empty`] starts with.
    pub fn is_empty(&self) -> bool {
        self.count == 0
            && self.key_hash_sum == 0
            && self.val_sum == 0
            && self.val_hash_sum == 0
            && self.key_sum.is_zero()
    }
}
