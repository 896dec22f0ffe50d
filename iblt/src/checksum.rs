use bitstring::Bitstring;

/// CRC-32 checksum of a bitstring, taken over its length-invariant
/// [`Bitstring::fold_limbs`] digest rather than its raw byte form.
///
/// This has to be length-invariant because a cell's `key_sum` can end up
/// longer than any single key that contributed to it: XOR zero-extends the
/// shorter operand rather than truncating the longer one, so once a cell has
/// ever summed in a longer key, its `key_sum`'s bit length never shrinks
/// back down even after that longer key's contribution fully cancels out.
/// Hashing the raw bytes would then disagree with the checksum accumulated
/// at insert time over the original, shorter encoding of whatever key
/// actually remains.
pub fn checksum_bitstring(bs: &Bitstring) -> u32 {
    crc32fast::hash(&bs.fold_limbs().to_le_bytes())
}

/// CRC-32 checksum of a value, rendered as its decimal text representation
/// so that the checksum is stable across encodings of the same integer.
pub fn checksum_value(value: u64) -> u32 {
    crc32fast::hash(value.to_string().as_bytes())
}
