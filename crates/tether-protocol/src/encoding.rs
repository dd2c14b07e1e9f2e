//! Printable base-64 integer encodings used by the Shockwave dialect.
//!
//! Two schemes share the same 6-bit alphabet (every output byte has bit
//! `0x40` set, keeping the encoding printable):
//!
//! - **B64**: unsigned, fixed width chosen by the caller, most significant
//!   group first. Used for packet headers and outgoing length prefixes.
//! - **VL64**: signed, variable width of one to six bytes. The first byte
//!   carries the total length, the sign and the two lowest magnitude bits;
//!   each following byte carries six more magnitude bits.

/// Returns the number of bytes required to encode `value` as VL64.
pub fn vl64_len(value: i32) -> usize {
    let abs = (value as i64).unsigned_abs() as u32;
    ((32 - abs.leading_zeros()) as usize + 9) / 6
}

/// Returns the encoded length stored in the first byte of a VL64 value.
pub fn vl64_encoded_len(first: u8) -> usize {
    ((first >> 3) & 7) as usize
}

/// Encodes `value` as VL64 into `buf`.
///
/// `buf` must be exactly [`vl64_len`] bytes long.
pub fn vl64_encode(buf: &mut [u8], value: i32) {
    let abs = (value as i64).unsigned_abs();
    let n = vl64_len(value);

    buf[0] = 0x40 | ((n as u8 & 7) << 3) | (abs & 3) as u8;
    if value < 0 {
        buf[0] |= 4;
    }
    for i in 1..n {
        buf[i] = 0x40 | ((abs >> (2 + 6 * (i - 1))) & 0x3f) as u8;
    }
}

/// Decodes a VL64 value from `buf`.
///
/// `buf` must hold at least as many bytes as the first byte declares.
pub fn vl64_decode(buf: &[u8]) -> i32 {
    let mut value = (buf[0] & 3) as i64;

    let n = vl64_encoded_len(buf[0]);
    for i in 1..n {
        value |= ((buf[i] & 0x3f) as i64) << (2 + 6 * (i - 1));
    }

    if buf[0] & 4 != 0 {
        value = -value;
    }
    value as i32
}

/// Encodes `value` as B64 into `buf`, using the full width of `buf`.
pub fn b64_encode(buf: &mut [u8], value: i32) {
    let n = buf.len();
    for (i, b) in buf.iter_mut().enumerate() {
        *b = 0x40 | ((value >> ((n - i - 1) * 6)) & 0x3f) as u8;
    }
}

/// Decodes a B64 value from the full width of `buf`.
pub fn b64_decode(buf: &[u8]) -> i32 {
    let n = buf.len();
    let mut value = 0i32;
    for (i, b) in buf.iter().enumerate() {
        value |= ((b & 0x3f) as i32) << ((n - i - 1) * 6);
    }
    value
}
