//! MSB-first bit fields over big-endian byte buffers.
//!
//! Bit 0 is the most significant bit of byte 0; a field `[lo, hi]` is
//! inclusive on both ends.

use bitvec::prelude::*;

pub fn mask(width: usize) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

pub fn read_bits(bytes: &[u8], lo: usize, hi: usize) -> u64 {
    bytes.view_bits::<Msb0>()[lo..=hi].load_be::<u64>()
}

/// Writes `value` into `[lo, hi]`; the caller has already fitted it to the
/// field width.
pub fn write_bits(bytes: &mut [u8], lo: usize, hi: usize, value: u64) {
    bytes.view_bits_mut::<Msb0>()[lo..=hi].store_be::<u64>(value & mask(hi - lo + 1));
}

/// Fits an unsigned value into `width` bits by saturating at the field
/// maximum.
pub fn clamp_unsigned(value: u64, width: usize) -> u64 {
    value.min(mask(width))
}

/// Fits a signed value into `width` bits: negative values are stored in two's
/// complement, positive values saturate.
pub fn clamp_signed(value: i64, width: usize) -> u64 {
    if value < 0 {
        (value as u64) & mask(width)
    } else {
        (value as u64).min(mask(width))
    }
}

pub fn sign_extend(raw: u64, width: usize) -> i64 {
    if width >= 64 {
        return raw as i64;
    }
    let shift = 64 - width;
    ((raw << shift) as i64) >> shift
}
