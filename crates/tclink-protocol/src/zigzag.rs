//! ZigZag variable-length integers.
//!
//! Small magnitudes (positive or negative) should take few bytes on the
//! wire. Two steps get us there:
//!
//! 1. **ZigZag** maps signed to unsigned so that small negatives become
//!    small positives: `0 → 0, -1 → 1, 1 → 2, -2 → 3, ...`
//! 2. **Varint** writes the unsigned value 7 bits at a time, least
//!    significant group first, with the high bit of each byte set while
//!    more bytes follow.
//!
//! `Int` payloads go through the 64-bit path after sign extension, which
//! yields exactly the bytes a 32-bit ZigZag would.

use crate::ProtocolError;

/// Longest varint a `u64` can need (`ceil(64 / 7)`).
pub const MAX_VARINT_LEN: usize = 10;

/// Maps a signed value onto the unsigned ZigZag domain.
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
pub fn zigzag_decode(u: u64) -> i64 {
    ((u >> 1) as i64) ^ -((u & 1) as i64)
}

/// Appends `value` to `out` as a base-128 varint.
pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Reads a varint from the front of `data`.
///
/// Returns the value and the number of bytes consumed.
///
/// # Errors
/// - [`ProtocolError::Truncated`] if `data` ends mid-varint.
/// - [`ProtocolError::VarintOverflow`] if the varint runs past 10 bytes or
///   its last group carries bits beyond 64.
pub fn read_varint(data: &[u8]) -> Result<(u64, usize), ProtocolError> {
    let mut value = 0u64;
    for (i, &byte) in data.iter().take(MAX_VARINT_LEN).enumerate() {
        let group = u64::from(byte & 0x7F);
        let shift = 7 * i as u32;
        // The tenth byte only has room for the single top bit.
        if i == MAX_VARINT_LEN - 1 && group > 1 {
            return Err(ProtocolError::VarintOverflow);
        }
        value |= group << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    if data.len() >= MAX_VARINT_LEN {
        Err(ProtocolError::VarintOverflow)
    } else {
        Err(ProtocolError::Truncated {
            needed: data.len() + 1,
            available: data.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, value);
        out
    }

    #[test]
    fn test_zigzag_encode_small_magnitudes() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        assert_eq!(zigzag_encode(i64::MAX), u64::MAX - 1);
        assert_eq!(zigzag_encode(i64::MIN), u64::MAX);
    }

    #[test]
    fn test_zigzag_decode_inverts_encode() {
        for n in [0, 1, -1, 63, -64, 8331, i64::MAX, i64::MIN] {
            assert_eq!(zigzag_decode(zigzag_encode(n)), n);
        }
    }

    #[test]
    fn test_zigzag_matches_32_bit_form_for_ints() {
        for n in [0i32, -1, 1, i32::MAX, i32::MIN] {
            let narrow = ((n << 1) ^ (n >> 31)) as u32;
            assert_eq!(zigzag_encode(i64::from(n)), u64::from(narrow));
        }
    }

    #[test]
    fn test_write_varint_single_and_multi_byte() {
        assert_eq!(varint(0), vec![0x00]);
        assert_eq!(varint(127), vec![0x7F]);
        assert_eq!(varint(128), vec![0x80, 0x01]);
        assert_eq!(varint(300), vec![0xAC, 0x02]);
        assert_eq!(varint(u64::MAX).len(), MAX_VARINT_LEN);
    }

    #[test]
    fn test_read_varint_reports_consumed_length() {
        let mut bytes = varint(300);
        bytes.push(0x55);
        assert_eq!(read_varint(&bytes), Ok((300, 2)));
        assert_eq!(read_varint(&varint(u64::MAX)), Ok((u64::MAX, 10)));
    }

    #[test]
    fn test_read_varint_truncated_fails() {
        let err = read_varint(&[0x80, 0x80]).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { .. }));
        assert!(read_varint(&[]).is_err());
    }

    #[test]
    fn test_read_varint_overlong_fails() {
        let eleven = [0xFF; 11];
        assert_eq!(read_varint(&eleven), Err(ProtocolError::VarintOverflow));

        let mut too_big = vec![0xFF; 9];
        too_big.push(0x02);
        assert_eq!(read_varint(&too_big), Err(ProtocolError::VarintOverflow));
    }
}
