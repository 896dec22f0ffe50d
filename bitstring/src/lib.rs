//! Arbitrary-length bit sequences and the chunked bitwise algebra (XOR/OR/AND)
//! an IBLT cell needs to XOR-accumulate encoded keys of unbounded width.
//!
//! A [`Bitstring`] is not byte-aligned in general: it is a bit length plus a
//! little-endian limb buffer, and the limb buffer may have live bits short of
//! a full limb in its most significant word.

use log::trace;
use serde::{Deserialize, Serialize};

/// Bits per limb, and the chunk width the bitwise operators below work in:
/// operating on the bitstring in `LIMB_BITS`-sized pieces (instead of
/// decoding the whole thing to one big integer) is what lets the operations
/// below scale to bitstrings of unbounded length.
const LIMB_BITS: usize = u64::BITS as usize;

/// An ordered sequence of bits of length `n >= 0`, stored as little-endian
/// 64-bit limbs. Bit `i` lives in limb `i / LIMB_BITS`, at bit position
/// `i % LIMB_BITS` of that limb (limb 0 is least significant).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitstring {
    limbs: Vec<u64>,
    len_bits: usize,
}

impl Bitstring {
    /// A bitstring of `len_bits` zero bits.
    pub fn zeros(len_bits: usize) -> Self {
        Bitstring {
            limbs: vec![0u64; limb_count(len_bits)],
            len_bits,
        }
    }

    /// Builds a bitstring from a little-endian byte buffer and an explicit
    /// bit length. `bytes` must hold at least `ceil(len_bits / 8)` bytes; any
    /// bits beyond `len_bits` in the last byte are ignored (masked off).
    pub fn from_bytes(bytes: &[u8], len_bits: usize) -> Self {
        let mut limbs = vec![0u64; limb_count(len_bits)];
        for (i, &byte) in bytes.iter().enumerate() {
            let limb_idx = i / 8;
            if limb_idx >= limbs.len() {
                break;
            }
            limbs[limb_idx] |= (byte as u64) << ((i % 8) * 8);
        }
        let mut bs = Bitstring { limbs, len_bits };
        bs.mask_tail();
        bs
    }

    /// The bit length of this bitstring.
    pub fn len(&self) -> usize {
        self.len_bits
    }

    pub fn is_empty(&self) -> bool {
        self.len_bits == 0
    }

    /// True iff every bit is zero, regardless of length. XOR zero-extends
    /// rather than truncates, so a value that has returned to zero through
    /// cancellation may still be longer than [`Bitstring::zeros`] of the
    /// same logical value.
    pub fn is_zero(&self) -> bool {
        self.limbs.iter().all(|&limb| limb == 0)
    }

    /// Returns the value of bit `i`. Panics if `i >= self.len()`.
    pub fn get(&self, i: usize) -> bool {
        assert!(i < self.len_bits, "bit index out of range");
        (self.limbs[i / LIMB_BITS] >> (i % LIMB_BITS)) & 1 == 1
    }

    /// Sets bit `i` to `val`. Panics if `i >= self.len()`.
    pub fn set(&mut self, i: usize, val: bool) {
        assert!(i < self.len_bits, "bit index out of range");
        let limb = &mut self.limbs[i / LIMB_BITS];
        let mask = 1u64 << (i % LIMB_BITS);
        if val {
            *limb |= mask;
        } else {
            *limb &= !mask;
        }
    }

    /// Concatenates two bitstrings: `prefix`'s bits occupy the low end,
    /// `suffix`'s bits follow immediately after.
    pub fn concat(prefix: &Bitstring, suffix: &Bitstring) -> Bitstring {
        let mut bs = Bitstring::zeros(prefix.len_bits + suffix.len_bits);
        for i in 0..prefix.len_bits {
            bs.set(i, prefix.get(i));
        }
        for i in 0..suffix.len_bits {
            bs.set(prefix.len_bits + i, suffix.get(i));
        }
        bs
    }

    /// Extracts the `len` bits starting at `start`. Panics if the requested
    /// range runs past the end of `self`.
    pub fn slice(&self, start: usize, len: usize) -> Bitstring {
        assert!(start + len <= self.len_bits, "slice out of range");
        let mut bs = Bitstring::zeros(len);
        for i in 0..len {
            bs.set(i, self.get(start + i));
        }
        bs
    }

    /// Builds a bitstring of `len_bits` (`<= 64`) from the low bits of `value`.
    pub fn from_u64(value: u64, len_bits: usize) -> Bitstring {
        assert!(len_bits <= LIMB_BITS, "from_u64 supports at most one limb");
        Bitstring {
            limbs: vec![value & mask_for(len_bits)],
            len_bits,
        }
    }

    /// Reads `self` (which must be `<= 64` bits) back out as a `u64`.
    pub fn to_u64(&self) -> u64 {
        assert!(self.len_bits <= LIMB_BITS, "to_u64 supports at most one limb");
        self.limbs.first().copied().unwrap_or(0)
    }

    /// Right-pads (appends zero bits on the most-significant end) to
    /// `new_len` bits. `new_len` must be `>= self.len()`.
    pub fn zero_extend(&self, new_len: usize) -> Self {
        assert!(new_len >= self.len_bits, "zero_extend must not truncate");
        let mut limbs = self.limbs.clone();
        limbs.resize(limb_count(new_len), 0);
        Bitstring {
            limbs,
            len_bits: new_len,
        }
    }

    /// Renders this bitstring as a little-endian byte buffer, padded with
    /// zero bits up to the next byte boundary. `decode(&encode(bs)).len() ==
    /// bs.len()` round-trips via [`encode`]/[`decode`]; this method alone
    /// drops the exact bit length (use [`encode`] when that matters).
    pub fn to_bytes(&self) -> Vec<u8> {
        let nbytes = (self.len_bits + 7) / 8;
        let mut out = Vec::with_capacity(nbytes);
        for byte_idx in 0..nbytes {
            let limb = self.limbs[byte_idx / 8];
            out.push((limb >> ((byte_idx % 8) * 8)) as u8);
        }
        out
    }

    fn mask_tail(&mut self) {
        let used_bits_in_last_limb = self.len_bits % LIMB_BITS;
        if used_bits_in_last_limb != 0 {
            if let Some(last) = self.limbs.last_mut() {
                *last &= (1u64 << used_bits_in_last_limb) - 1;
            }
        }
    }

    fn limbs(&self) -> &[u64] {
        &self.limbs
    }

    /// XORs every limb together into a single `u64`. Unlike [`Bitstring`]'s
    /// own byte representation, this is invariant under [`Bitstring::zero_extend`]:
    /// the extra limbs zero-extension appends are XOR-identities, so folding
    /// a value and a zero-extension of that value produces the same result.
    /// Used where a fixed-width, length-independent digest of a bitstring's
    /// value is needed (see `iblt::checksum`).
    pub fn fold_limbs(&self) -> u64 {
        self.limbs.iter().fold(0u64, |acc, &limb| acc ^ limb)
    }
}

fn limb_count(len_bits: usize) -> usize {
    (len_bits + LIMB_BITS - 1) / LIMB_BITS
}

fn mask_for(len_bits: usize) -> u64 {
    if len_bits >= LIMB_BITS {
        u64::MAX
    } else {
        (1u64 << len_bits) - 1
    }
}

/// Applies a carry-free bitwise limb operator to two bitstrings, zero-padding
/// the shorter operand to the length of the longer first. This is the shared
/// machinery behind [`bin_xor`], [`bin_or`], and [`bin_and`]: since none of
/// XOR/OR/AND carry between bits, chunking at the limb boundary and
/// recombining is exactly equivalent to operating on the full-width integer
/// each bitstring represents.
fn bin_op(a: &Bitstring, b: &Bitstring, op: impl Fn(u64, u64) -> u64) -> Bitstring {
    let len = a.len_bits.max(b.len_bits);
    if len > LIMB_BITS {
        trace!("bin_op: operating on {} chunks ({} bits)", limb_count(len), len);
    }
    let a = a.zero_extend(len);
    let b = b.zero_extend(len);
    let limbs = a
        .limbs()
        .iter()
        .zip(b.limbs())
        .map(|(&x, &y)| op(x, y))
        .collect();
    let mut result = Bitstring { limbs, len_bits: len };
    result.mask_tail();
    result
}

/// Bitwise XOR of two bitstrings, zero-extending the shorter to the length of
/// the longer. Result has length `max(|a|, |b|)`.
pub fn bin_xor(a: &Bitstring, b: &Bitstring) -> Bitstring {
    bin_op(a, b, |x, y| x ^ y)
}

/// Bitwise OR of two bitstrings, zero-extending the shorter to the length of
/// the longer. Result has length `max(|a|, |b|)`.
pub fn bin_or(a: &Bitstring, b: &Bitstring) -> Bitstring {
    bin_op(a, b, |x, y| x | y)
}

/// Bitwise AND of two bitstrings, zero-extending the shorter to the length of
/// the longer. Result has length `max(|a|, |b|)`.
pub fn bin_and(a: &Bitstring, b: &Bitstring) -> Bitstring {
    bin_op(a, b, |x, y| x & y)
}

/// Bit width of the length header prepended by [`encode`].
const LEN_HEADER_BITS: usize = LIMB_BITS;

/// Encodes a bitstring into a self-describing bitstring:
/// `len_bits (as a fixed LEN_HEADER_BITS-wide header) || raw bits`. Because
/// the header is itself bits rather than a byte-aligned varint, the result
/// composes directly with [`bin_xor`]: two encoded keys of different widths
/// still line up bit-for-bit once zero-extended, and `decode(&encode(bs)) ==
/// bs` for all `bs`.
pub fn encode(bs: &Bitstring) -> Bitstring {
    let header = Bitstring::from_u64(bs.len_bits as u64, LEN_HEADER_BITS);
    Bitstring::concat(&header, bs)
}

/// Inverse of [`encode`]. Panics if `encoded` is shorter than its declared
/// length requires.
pub fn decode(encoded: &Bitstring) -> Bitstring {
    assert!(
        encoded.len_bits >= LEN_HEADER_BITS,
        "truncated bitstring encoding: missing length header"
    );
    let len_bits = encoded.slice(0, LEN_HEADER_BITS).to_u64() as usize;
    assert!(
        encoded.len_bits >= LEN_HEADER_BITS + len_bits,
        "truncated bitstring encoding: payload shorter than declared length"
    );
    encoded.slice(LEN_HEADER_BITS, len_bits)
}
