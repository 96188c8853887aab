//! Binary-coded decimal helpers.
//!
//! Every numeric field the IC-R8600 accepts or returns is BCD: one decimal
//! digit per nibble, tens in the high nibble, ones in the low nibble.

use crate::error::{Error, Result};

/// Largest frequency representable in five BCD digit pairs.
pub const MAX_BCD_FREQUENCY: u64 = 9_999_999_999;

/// Encode a value in `0..=99` as one BCD byte.
pub fn to_bcd(value: u8) -> Result<u8> {
    if value > 99 {
        return Err(Error::unsupported(format!(
            "{} does not fit in one BCD byte",
            value
        )));
    }
    Ok(((value / 10) << 4) | (value % 10))
}

/// Decode one BCD byte, rejecting nibbles above 9.
pub fn from_bcd(byte: u8) -> Result<u8> {
    let hi = byte >> 4;
    let lo = byte & 0x0F;
    if hi > 9 || lo > 9 {
        return Err(Error::unexpected(format!(
            "invalid BCD byte 0x{:02X}",
            byte
        )));
    }
    Ok(hi * 10 + lo)
}

/// Encode a frequency as five BCD digit pairs, least significant pair first.
///
/// Pair `i` holds `(hz / 100^i) % 100`, so the wire order is units of 1 Hz,
/// 100 Hz, 10 kHz, 1 MHz and 100 MHz. Frequencies that would need a sixth
/// pair are rejected instead of wrapping.
pub fn frequency_to_bcd(hz: u64) -> Result<[u8; 5]> {
    if hz > MAX_BCD_FREQUENCY {
        return Err(Error::unsupported(format!(
            "frequency {} Hz exceeds {} Hz",
            hz, MAX_BCD_FREQUENCY
        )));
    }

    let mut result = [0u8; 5];
    let mut rest = hz;
    for byte in &mut result {
        // rest % 100 < 100, always encodable
        *byte = to_bcd((rest % 100) as u8)?;
        rest /= 100;
    }
    Ok(result)
}

/// Decode five BCD digit pairs (least significant first) into hertz.
pub fn bcd_to_frequency(bcd: &[u8; 5]) -> Result<u64> {
    let mut hz: u64 = 0;
    let mut multiplier: u64 = 1;
    for &byte in bcd {
        hz += from_bcd(byte)? as u64 * multiplier;
        multiplier *= 100;
    }
    Ok(hz)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_bcd() {
        assert_eq!(to_bcd(0).unwrap(), 0x00);
        assert_eq!(to_bcd(7).unwrap(), 0x07);
        assert_eq!(to_bcd(20).unwrap(), 0x20);
        assert_eq!(to_bcd(55).unwrap(), 0x55);
        assert_eq!(to_bcd(99).unwrap(), 0x99);
        assert!(matches!(to_bcd(100), Err(Error::UnsupportedValue(_))));
    }

    #[test]
    fn test_from_bcd() {
        assert_eq!(from_bcd(0x00).unwrap(), 0);
        assert_eq!(from_bcd(0x30).unwrap(), 30);
        assert_eq!(from_bcd(0x99).unwrap(), 99);
        assert!(matches!(from_bcd(0x1A), Err(Error::UnexpectedResponse(_))));
        assert!(matches!(from_bcd(0xF0), Err(Error::UnexpectedResponse(_))));
    }

    #[test]
    fn test_frequency_wire_order() {
        // 145.500 MHz = 01 45 50 00 00 read right to left
        let bcd = frequency_to_bcd(145_500_000).unwrap();
        assert_eq!(bcd, [0x00, 0x00, 0x50, 0x45, 0x01]);

        let bcd = frequency_to_bcd(15_000_000).unwrap();
        assert_eq!(bcd, [0x00, 0x00, 0x00, 0x15, 0x00]);
    }

    #[test]
    fn test_frequency_with_1hz_resolution() {
        let bcd = frequency_to_bcd(10_000_123).unwrap();
        assert_eq!(bcd, [0x23, 0x01, 0x00, 0x10, 0x00]);
        assert_eq!(bcd_to_frequency(&bcd).unwrap(), 10_000_123);
    }

    #[test]
    fn test_frequency_limits() {
        assert_eq!(frequency_to_bcd(0).unwrap(), [0; 5]);
        let max = frequency_to_bcd(MAX_BCD_FREQUENCY).unwrap();
        assert_eq!(max, [0x99; 5]);
        assert_eq!(bcd_to_frequency(&max).unwrap(), MAX_BCD_FREQUENCY);
        assert!(matches!(
            frequency_to_bcd(MAX_BCD_FREQUENCY + 1),
            Err(Error::UnsupportedValue(_))
        ));
    }

    #[test]
    fn test_frequency_round_trip_across_range() {
        let mut f: u64 = 10;
        while f <= MAX_BCD_FREQUENCY {
            let bcd = frequency_to_bcd(f).unwrap();
            assert_eq!(bcd_to_frequency(&bcd).unwrap(), f);
            f = f * 7 + 3;
        }
    }

    #[test]
    fn test_bcd_to_frequency_rejects_bad_nibble() {
        assert!(bcd_to_frequency(&[0x00, 0x0B, 0x00, 0x00, 0x00]).is_err());
    }
}
