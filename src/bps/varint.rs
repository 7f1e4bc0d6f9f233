// BPS variable-length integer encoding.
//
// Additive base-128, least-significant group first.  Each byte has bit 7
// clear except the final byte.  Every continuation adds the next scale step
// to the accumulator, so each byte-length class covers a disjoint value
// range and no value has more than one encoding.

use std::io::{self, Read, Write};

/// Maximum encoded length for a 32-bit value.
pub const MAX_VARINT_LEN: usize = 5;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a `u32` as a BPS variable-length integer into `buf`.
/// Returns the number of bytes written (1..=5).
///
/// Inverse of the additive decode rule: emits 7 bits per byte, subtracting
/// one from the remainder after each continuation, and sets bit 7 on the
/// final byte.
#[inline]
pub fn encode_u32(mut num: u32, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = 0;
    loop {
        let x = (num & 0x7F) as u8;
        num >>= 7;
        if num == 0 {
            buf[i] = x | 0x80;
            return i + 1;
        }
        buf[i] = x;
        i += 1;
        num -= 1;
    }
}

/// Encode a `u32` and write to a `Write` sink.
pub fn write_u32<W: Write>(w: &mut W, num: u32) -> io::Result<()> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_u32(num, &mut buf);
    w.write_all(&buf[..len])
}

// ---------------------------------------------------------------------------
// Decoding from byte slices
// ---------------------------------------------------------------------------

/// Decode a `u32` from a byte slice.
/// Returns `(value, bytes_consumed)` or an error.
///
/// Accumulation: `value += (byte & 0x7F) * scale`; a set high bit
/// terminates, otherwise `scale <<= 7; value += scale`.  Truncated input is
/// `Underflow`, never an out-of-bounds read; accumulation past `u32::MAX`
/// is `Overflow`.
pub fn decode_u32(data: &[u8]) -> Result<(u32, usize), VarIntError> {
    let mut value: u64 = 0;
    let mut scale: u64 = 1;
    for (i, &byte) in data.iter().enumerate() {
        value += u64::from(byte & 0x7F) * scale;
        if byte & 0x80 != 0 {
            let value = u32::try_from(value).map_err(|_| VarIntError::Overflow)?;
            return Ok((value, i + 1));
        }
        scale <<= 7;
        value += scale;
        if value > u64::from(u32::MAX) {
            return Err(VarIntError::Overflow);
        }
    }
    Err(VarIntError::Underflow)
}

// ---------------------------------------------------------------------------
// Decoding from `Read` (streaming)
// ---------------------------------------------------------------------------

/// Read a `u32` varint from a streaming source.
///
/// Stream exhaustion mid-value surfaces as `UnexpectedEof`.
pub fn stream_decode_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut value: u64 = 0;
    let mut scale: u64 = 1;
    let mut buf = [0u8; 1];
    loop {
        r.read_exact(&mut buf)?;
        let byte = buf[0];
        value += u64::from(byte & 0x7F) * scale;
        if byte & 0x80 != 0 {
            return u32::try_from(value).map_err(|_| VarIntError::Overflow.into());
        }
        scale <<= 7;
        value += scale;
        if value > u64::from(u32::MAX) {
            return Err(VarIntError::Overflow.into());
        }
    }
}

// ---------------------------------------------------------------------------
// Signed displacements
// ---------------------------------------------------------------------------

/// Unpack a relative-displacement varint: bit 0 is the sign (1 = negative),
/// the remaining bits the magnitude.
#[inline]
pub fn unpack_signed(value: u32) -> i64 {
    let magnitude = i64::from(value >> 1);
    if value & 1 != 0 { -magnitude } else { magnitude }
}

/// Pack a signed displacement into the varint payload form.
#[inline]
pub fn pack_signed(delta: i64) -> u32 {
    debug_assert!(delta.unsigned_abs() <= u64::from(u32::MAX >> 1));
    ((delta.unsigned_abs() as u32) << 1) | u32::from(delta < 0)
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntError {
    /// Not enough input bytes to complete the integer.
    Underflow,
    /// Value would overflow the target integer type.
    Overflow,
}

impl std::fmt::Display for VarIntError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarIntError::Underflow => write!(f, "varint underflow (truncated input)"),
            VarIntError::Overflow => write!(f, "varint overflow"),
        }
    }
}

impl std::error::Error for VarIntError {}

impl From<VarIntError> for io::Error {
    fn from(e: VarIntError) -> io::Error {
        match e {
            VarIntError::Underflow => io::Error::new(io::ErrorKind::UnexpectedEof, e),
            VarIntError::Overflow => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_u32() {
        let cases: &[u32] = &[
            0,
            1,
            127,
            128,
            255,
            256,
            16383,
            16384,
            (1 << 21) - 1,
            1 << 21,
            (1 << 28) - 1,
            1 << 28,
            u32::MAX,
        ];
        let mut buf = [0u8; MAX_VARINT_LEN];
        for &val in cases {
            let len = encode_u32(val, &mut buf);
            let (decoded, consumed) = decode_u32(&buf[..len]).unwrap();
            assert_eq!(decoded, val, "roundtrip failed for {val}");
            assert_eq!(consumed, len, "length mismatch for {val}");
        }
    }

    #[test]
    fn known_encodings() {
        let mut buf = [0u8; MAX_VARINT_LEN];

        // Single byte: value with high bit set.
        assert_eq!(encode_u32(0, &mut buf), 1);
        assert_eq!(buf[0], 0x80);
        assert_eq!(encode_u32(127, &mut buf), 1);
        assert_eq!(buf[0], 0xFF);

        // 128 is the first two-byte value: the additive term means
        // [0x00, 0x80] decodes to 0 + 128, not to a redundant zero.
        assert_eq!(encode_u32(128, &mut buf), 2);
        assert_eq!(&buf[..2], &[0x00, 0x80]);
        assert_eq!(decode_u32(&[0x00, 0x80]).unwrap(), (128, 2));
    }

    #[test]
    fn encodings_are_canonical() {
        // Each value has exactly one encoding: decode then re-encode must
        // reproduce the consumed input bytes.
        let inputs: &[&[u8]] = &[&[0x80], &[0xFF], &[0x00, 0x80], &[0x7F, 0xFF], &[0x12, 0x34, 0x81]];
        let mut buf = [0u8; MAX_VARINT_LEN];
        for &input in inputs {
            let (val, consumed) = decode_u32(input).unwrap();
            let len = encode_u32(val, &mut buf);
            assert_eq!(&buf[..len], &input[..consumed], "non-canonical for {val}");
        }
    }

    #[test]
    fn underflow_detection() {
        // Truncated: all continuation bytes, no terminator.
        assert_eq!(decode_u32(&[]), Err(VarIntError::Underflow));
        assert_eq!(decode_u32(&[0x00, 0x00]), Err(VarIntError::Underflow));
    }

    #[test]
    fn overflow_detection() {
        // Five maximal continuation bytes push the accumulator past u32.
        assert_eq!(decode_u32(&[0x7F; 5]), Err(VarIntError::Overflow));
        // u32::MAX itself still decodes.
        let mut buf = [0u8; MAX_VARINT_LEN];
        let len = encode_u32(u32::MAX, &mut buf);
        assert_eq!(decode_u32(&buf[..len]).unwrap().0, u32::MAX);
    }

    #[test]
    fn stream_agrees_with_slice() {
        let mut buf = [0u8; MAX_VARINT_LEN];
        for &val in &[0u32, 1, 127, 128, 999_999, u32::MAX] {
            let len = encode_u32(val, &mut buf);
            let mut cursor = std::io::Cursor::new(&buf[..len]);
            assert_eq!(stream_decode_u32(&mut cursor).unwrap(), val);
            assert_eq!(cursor.position() as usize, len);
        }
    }

    #[test]
    fn stream_eof_mid_value() {
        let mut cursor = std::io::Cursor::new(&[0x00u8, 0x00][..]);
        let err = stream_decode_u32(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn write_read_roundtrip() {
        let mut out = Vec::new();
        write_u32(&mut out, 999_999).unwrap();
        let (val, len) = decode_u32(&out).unwrap();
        assert_eq!(val, 999_999);
        assert_eq!(len, out.len());
    }

    #[test]
    fn signed_pack_unpack() {
        for &delta in &[0i64, 1, -1, 2, -2, 1000, -1000, i64::from(u32::MAX >> 1), -i64::from(u32::MAX >> 1)] {
            assert_eq!(unpack_signed(pack_signed(delta)), delta, "signed roundtrip for {delta}");
        }
        // Bit 0 is the sign.
        assert_eq!(pack_signed(-1), 0b11);
        assert_eq!(pack_signed(1), 0b10);
        assert_eq!(unpack_signed(0b11), -1);
    }
}
