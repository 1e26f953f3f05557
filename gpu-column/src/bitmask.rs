//! Validity bitmask helpers.
//!
//! Masks are packed LSB-first: bit `i` of the column lives in bit `i % 8` of
//! byte `i / 8`. A set bit means the row is valid, a cleared bit means null.

/// Number of bytes needed to hold a mask for `len` rows.
pub fn bitmask_bytes(len: usize) -> usize {
    (len + 7) / 8
}

pub fn get_bit(mask: &[u8], index: usize) -> bool {
    (mask[index / 8] >> (index % 8)) & 1 == 1
}

pub fn set_bit(mask: &mut [u8], index: usize, valid: bool) {
    let bit = 1u8 << (index % 8);
    if valid {
        mask[index / 8] |= bit;
    } else {
        mask[index / 8] &= !bit;
    }
}

/// Count the null rows among the first `len` bits of `mask`.
pub fn count_unset_bits(mask: &[u8], len: usize) -> usize {
    let full_bytes = len / 8;
    let set: usize = mask[..full_bytes]
        .iter()
        .map(|b| b.count_ones() as usize)
        .sum();
    let rem = len % 8;
    let tail = if rem == 0 {
        0
    } else {
        (mask[full_bytes] & ((1u8 << rem) - 1)).count_ones() as usize
    };
    len - set - tail
}

/// Pack a validity iterator into a mask.
pub fn pack<I>(validity: I) -> Vec<u8>
where
    I: IntoIterator<Item = bool>,
{
    let mut mask = Vec::new();
    for (i, valid) in validity.into_iter().enumerate() {
        if i % 8 == 0 {
            mask.push(0);
        }
        set_bit(&mut mask, i, valid);
    }
    mask
}
