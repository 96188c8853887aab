//! Command frame encoder and response decoder.
//!
//! The IC-R8600 I/Q port speaks a CI-V style protocol over two USB bulk
//! pipes: commands go out on the control pipe, replies come back on the
//! response pipe, one reply per command, matched by program order only.
//!
//! # Frame format
//!
//! ```text
//! 0xFE 0xFE 0x96 0xE0 <opcode> [<payload>...] 0xFD [0xFF]
//! ```
//!
//! - Preamble: two `0xFE` bytes
//! - `0x96`: receiver address
//! - `0xE0`: controller address
//! - Payload: opcode-dependent, BCD where numeric
//! - Terminator: `0xFD`, padded with `0xFF` for most commands
//!
//! Replies carry no length field; a reply is whatever one read of the
//! response pipe returned. A 6-byte reply is a bare acknowledgment, longer
//! replies carry BCD data at fixed offsets.

use crate::bcd::{frequency_to_bcd, from_bcd, to_bcd};
use crate::error::{Error, Result};
use crate::gain::{Attenuator, RfGain};

/// Preamble byte repeated twice at the start of every frame.
pub const PREAMBLE: u8 = 0xFE;

/// Receiver CI-V address.
pub const RECEIVER_ADDR: u8 = 0x96;

/// Controller CI-V address.
pub const CONTROLLER_ADDR: u8 = 0xE0;

/// Frame terminator byte.
pub const TERMINATOR: u8 = 0xFD;

/// Padding byte following the terminator on most commands.
pub const TRAILER: u8 = 0xFF;

/// Positive acknowledgment status byte.
pub const ACK_OK: u8 = 0xFB;

/// Negative acknowledgment status byte.
pub const ACK_FAIL: u8 = 0xFA;

/// Length of a bare acknowledgment reply.
pub const ACK_LEN: usize = 6;

/// Read size used for every reply on the response pipe.
pub const MAX_RESPONSE_LEN: usize = 64;

/// Command families understood by the receiver.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Frequency = 0x05,
    Attenuator = 0x11,
    Antenna = 0x12,
    RfGain = 0x14,
    PreAmp = 0x16,
    /// Extended command set (remote I/Q mode, sample rate)
    Extended = 0x1A,
}

/// How a frame is closed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// `0xFD`
    Single,
    /// `0xFD 0xFF`
    Padded,
}

/// A complete, immutable command frame ready for the control pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    bytes: Vec<u8>,
}

impl CommandFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn opcode(&self) -> u8 {
        self.bytes[4]
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl AsRef<[u8]> for CommandFrame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Assemble a frame: preamble, address pair, opcode, payload, terminator.
///
/// Never fails; payload values are validated by the encoders that produce
/// them.
pub fn build_frame(opcode: Opcode, payload: &[u8], terminator: Terminator) -> CommandFrame {
    let mut bytes = Vec::with_capacity(5 + payload.len() + 2);
    bytes.extend_from_slice(&[PREAMBLE, PREAMBLE, RECEIVER_ADDR, CONTROLLER_ADDR]);
    bytes.push(opcode as u8);
    bytes.extend_from_slice(payload);
    bytes.push(TERMINATOR);
    if terminator == Terminator::Padded {
        bytes.push(TRAILER);
    }
    CommandFrame { bytes }
}

/// Validate a bare acknowledgment reply.
///
/// `(0x96, 0xFB)` at offsets 3-4 is success, `(0x96, 0xFA)` is an explicit
/// failure. An empty read is a transport failure; any other length or status
/// is an unexpected response.
pub fn parse_ack(bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Err(Error::transport("empty read while waiting for acknowledgment"));
    }
    if bytes.len() != ACK_LEN {
        return Err(Error::unexpected(format!(
            "expected {}-byte acknowledgment, got {} bytes: {:02X?}",
            ACK_LEN,
            bytes.len(),
            bytes
        )));
    }
    match (bytes[3], bytes[4]) {
        (RECEIVER_ADDR, ACK_OK) => Ok(()),
        (RECEIVER_ADDR, ACK_FAIL) => Err(Error::Rejected),
        _ => Err(Error::unexpected(format!(
            "unknown acknowledgment status: {:02X?}",
            bytes
        ))),
    }
}

/// Where the numeric payload of a query reply lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ResponseLayout {
    /// Exact reply length for this query
    pub len: usize,
    /// Offset of the first payload byte
    pub offset: usize,
    /// Number of BCD bytes (1 or 2)
    pub digits: usize,
}

/// RF gain read-back: 10 bytes, two BCD bytes at offsets 6-7.
pub const RF_GAIN_RESPONSE: ResponseLayout = ResponseLayout {
    len: 10,
    offset: 6,
    digits: 2,
};

/// Pre-amp read-back: 8 bytes, state byte at offset 6.
pub const PREAMP_RESPONSE: ResponseLayout = ResponseLayout {
    len: 8,
    offset: 6,
    digits: 1,
};

/// Attenuator read-back: 8 bytes, one BCD byte at offset 5.
pub const ATTENUATOR_RESPONSE: ResponseLayout = ResponseLayout {
    len: 8,
    offset: 5,
    digits: 1,
};

/// Antenna read-back: 8 bytes, antenna index at offset 5.
///
/// Assumed to mirror the attenuator read-back; not observed on hardware.
pub const ANTENNA_RESPONSE: ResponseLayout = ResponseLayout {
    len: 8,
    offset: 5,
    digits: 1,
};

/// Decode the BCD payload of a query reply.
///
/// Two-byte fields combine as `digit[0] * 100 + digit[1]`; one-byte fields
/// are returned as is.
pub fn parse_numeric_response(bytes: &[u8], layout: ResponseLayout) -> Result<u32> {
    if bytes.is_empty() {
        return Err(Error::transport("empty read while waiting for response"));
    }
    if bytes.len() != layout.len {
        // A bare failure ack instead of data means the query itself was refused.
        if parse_ack(bytes).is_err_and(|e| matches!(e, Error::Rejected)) {
            return Err(Error::Rejected);
        }
        return Err(Error::unexpected(format!(
            "expected {}-byte response, got {} bytes: {:02X?}",
            layout.len,
            bytes.len(),
            bytes
        )));
    }

    let Some(field) = bytes.get(layout.offset..layout.offset + layout.digits) else {
        return Err(Error::unexpected(format!(
            "field {}..{} outside {}-byte response",
            layout.offset,
            layout.offset + layout.digits,
            bytes.len()
        )));
    };
    let mut value: u32 = 0;
    for &byte in field {
        value = value * 100 + from_bcd(byte)? as u32;
    }
    Ok(value)
}

/// Enter remote (I/Q) mode, or leave it.
pub fn remote(on: bool) -> CommandFrame {
    build_frame(
        Opcode::Extended,
        &[0x13, 0x00, on as u8],
        Terminator::Padded,
    )
}

/// Supported I/Q sample rates and their 16-bit mode selector.
pub const SAMPLE_RATES: [(u32, u8); 6] = [
    (240_000, 0x06),
    (480_000, 0x05),
    (960_000, 0x04),
    (1_920_000, 0x03),
    (3_840_000, 0x02),
    (5_120_000, 0x01),
];

/// Select one of the fixed 16-bit I/Q sample rates.
pub fn sample_rate(rate: u32) -> Result<CommandFrame> {
    let selector = SAMPLE_RATES
        .iter()
        .find(|(r, _)| *r == rate)
        .map(|(_, s)| *s)
        .ok_or_else(|| {
            Error::unsupported(format!(
                "sample rate {} Hz (supported: {:?})",
                rate,
                SAMPLE_RATES.iter().map(|(r, _)| *r).collect::<Vec<_>>()
            ))
        })?;
    Ok(build_frame(
        Opcode::Extended,
        &[0x13, 0x01, 0x01, 0x00, selector],
        Terminator::Padded,
    ))
}

/// Tune to `hz`. Fails for frequencies that need more than 10 BCD digits.
pub fn set_frequency(hz: u64) -> Result<CommandFrame> {
    let bcd = frequency_to_bcd(hz)?;
    Ok(build_frame(Opcode::Frequency, &bcd, Terminator::Padded))
}

/// Decode the 5-byte payload of a frequency frame back into hertz.
pub fn decode_frequency_frame(frame: &[u8]) -> Result<u64> {
    if frame.len() < 10 || frame[4] != Opcode::Frequency as u8 {
        return Err(Error::unexpected(format!(
            "not a frequency frame: {:02X?}",
            frame
        )));
    }
    let mut bcd = [0u8; 5];
    bcd.copy_from_slice(&frame[5..10]);
    crate::bcd::bcd_to_frequency(&bcd)
}

/// Select antenna by 0-based index.
pub fn set_antenna(index: u8) -> CommandFrame {
    build_frame(Opcode::Antenna, &[index], Terminator::Padded)
}

pub fn read_antenna() -> CommandFrame {
    build_frame(Opcode::Antenna, &[], Terminator::Padded)
}

/// Set RF gain; device units are sent as hundreds and remainder BCD bytes.
pub fn set_rf_gain(gain: RfGain) -> Result<CommandFrame> {
    let units = gain.units();
    let hi = to_bcd((units / 100) as u8)?;
    let lo = to_bcd((units % 100) as u8)?;
    Ok(build_frame(
        Opcode::RfGain,
        &[0x02, hi, lo],
        Terminator::Padded,
    ))
}

pub fn read_rf_gain() -> CommandFrame {
    build_frame(Opcode::RfGain, &[0x02], Terminator::Padded)
}

/// One of the two fixed 8-byte pre-amp frames.
pub fn set_preamp(on: bool) -> CommandFrame {
    build_frame(Opcode::PreAmp, &[0x02, on as u8], Terminator::Single)
}

pub fn read_preamp() -> CommandFrame {
    build_frame(Opcode::PreAmp, &[0x02], Terminator::Padded)
}

pub fn set_attenuator(attenuator: Attenuator) -> Result<CommandFrame> {
    let bcd = to_bcd(attenuator.units())?;
    Ok(build_frame(Opcode::Attenuator, &[bcd], Terminator::Padded))
}

pub fn read_attenuator() -> CommandFrame {
    build_frame(Opcode::Attenuator, &[], Terminator::Single)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Frame encoding
    // ---------------------------------------------------------------

    #[test]
    fn test_build_frame_layout() {
        let frame = build_frame(Opcode::Antenna, &[0x02], Terminator::Padded);
        assert_eq!(
            frame.as_bytes(),
            &[0xFE, 0xFE, 0x96, 0xE0, 0x12, 0x02, 0xFD, 0xFF]
        );
        assert_eq!(frame.opcode(), 0x12);

        let frame = build_frame(Opcode::Attenuator, &[], Terminator::Single);
        assert_eq!(frame.as_bytes(), &[0xFE, 0xFE, 0x96, 0xE0, 0x11, 0xFD]);
    }

    #[test]
    fn test_remote_frames() {
        assert_eq!(
            remote(true).as_bytes(),
            &[0xFE, 0xFE, 0x96, 0xE0, 0x1A, 0x13, 0x00, 0x01, 0xFD, 0xFF]
        );
        assert_eq!(
            remote(false).as_bytes(),
            &[0xFE, 0xFE, 0x96, 0xE0, 0x1A, 0x13, 0x00, 0x00, 0xFD, 0xFF]
        );
    }

    #[test]
    fn test_sample_rate_frames() {
        let frame = sample_rate(5_120_000).unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[
                0xFE, 0xFE, 0x96, 0xE0, 0x1A, 0x13, 0x01, 0x01, 0x00, 0x01, 0xFD, 0xFF
            ]
        );
        assert_eq!(sample_rate(240_000).unwrap().as_bytes()[9], 0x06);
        assert_eq!(sample_rate(1_920_000).unwrap().as_bytes()[9], 0x03);
    }

    #[test]
    fn test_sample_rate_unsupported() {
        assert!(matches!(
            sample_rate(2_000_000),
            Err(Error::UnsupportedValue(_))
        ));
    }

    #[test]
    fn test_set_frequency_frame() {
        let frame = set_frequency(100_000_000).unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[
                0xFE, 0xFE, 0x96, 0xE0, 0x05, 0x00, 0x00, 0x00, 0x00, 0x01, 0xFD, 0xFF
            ]
        );
        assert_eq!(decode_frequency_frame(frame.as_bytes()).unwrap(), 100_000_000);
    }

    #[test]
    fn test_set_frequency_is_deterministic() {
        let a = set_frequency(7_074_000).unwrap();
        let b = set_frequency(7_074_000).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_decode_frequency_frame_rejects_other_opcodes() {
        let frame = set_antenna(0);
        assert!(decode_frequency_frame(frame.as_bytes()).is_err());
    }

    #[test]
    fn test_rf_gain_frames() {
        // 0 dB -> 255 units -> 02 55
        let frame = set_rf_gain(RfGain::from_db(0.0).unwrap()).unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[0xFE, 0xFE, 0x96, 0xE0, 0x14, 0x02, 0x02, 0x55, 0xFD, 0xFF]
        );
        // -32 dB -> 127 units -> 01 27
        let frame = set_rf_gain(RfGain::from_db(-32.0).unwrap()).unwrap();
        assert_eq!(&frame.as_bytes()[6..8], &[0x01, 0x27]);
        assert_eq!(
            read_rf_gain().as_bytes(),
            &[0xFE, 0xFE, 0x96, 0xE0, 0x14, 0x02, 0xFD, 0xFF]
        );
    }

    #[test]
    fn test_preamp_frames() {
        assert_eq!(
            set_preamp(true).as_bytes(),
            &[0xFE, 0xFE, 0x96, 0xE0, 0x16, 0x02, 0x01, 0xFD]
        );
        assert_eq!(
            set_preamp(false).as_bytes(),
            &[0xFE, 0xFE, 0x96, 0xE0, 0x16, 0x02, 0x00, 0xFD]
        );
        assert_eq!(
            read_preamp().as_bytes(),
            &[0xFE, 0xFE, 0x96, 0xE0, 0x16, 0x02, 0xFD, 0xFF]
        );
    }

    #[test]
    fn test_attenuator_frames() {
        let frame = set_attenuator(Attenuator::from_db(-20.0).unwrap()).unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[0xFE, 0xFE, 0x96, 0xE0, 0x11, 0x20, 0xFD, 0xFF]
        );
        assert_eq!(
            read_attenuator().as_bytes(),
            &[0xFE, 0xFE, 0x96, 0xE0, 0x11, 0xFD]
        );
    }

    // ---------------------------------------------------------------
    // Acknowledgments
    // ---------------------------------------------------------------

    #[test]
    fn test_parse_ack_ok() {
        assert!(parse_ack(&[0xFE, 0xFE, 0xE0, 0x96, 0xFB, 0xFD]).is_ok());
    }

    #[test]
    fn test_parse_ack_fail() {
        assert!(matches!(
            parse_ack(&[0xFE, 0xFE, 0xE0, 0x96, 0xFA, 0xFD]),
            Err(Error::Rejected)
        ));
    }

    #[test]
    fn test_parse_ack_wrong_length() {
        assert!(matches!(
            parse_ack(&[0xFE, 0xFE, 0xE0, 0x96, 0xFB, 0xFD, 0xFF]),
            Err(Error::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_parse_ack_empty_is_transport_error() {
        let err = parse_ack(&[]).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_parse_ack_unknown_status() {
        assert!(matches!(
            parse_ack(&[0xFE, 0xFE, 0xE0, 0x96, 0xFC, 0xFD]),
            Err(Error::UnexpectedResponse(_))
        ));
        assert!(matches!(
            parse_ack(&[0xFE, 0xFE, 0xE0, 0x98, 0xFB, 0xFD]),
            Err(Error::UnexpectedResponse(_))
        ));
    }

    // ---------------------------------------------------------------
    // Numeric responses
    // ---------------------------------------------------------------

    #[test]
    fn test_parse_rf_gain_response() {
        let reply = [0xFE, 0xFE, 0xE0, 0x96, 0x14, 0x02, 0x02, 0x55, 0xFD, 0xFF];
        assert_eq!(parse_numeric_response(&reply, RF_GAIN_RESPONSE).unwrap(), 255);
    }

    #[test]
    fn test_parse_attenuator_response() {
        let reply = [0xFE, 0xFE, 0xE0, 0x96, 0x11, 0x20, 0xFD, 0xFF];
        assert_eq!(
            parse_numeric_response(&reply, ATTENUATOR_RESPONSE).unwrap(),
            20
        );
    }

    #[test]
    fn test_parse_preamp_response() {
        let reply = [0xFE, 0xFE, 0xE0, 0x96, 0x16, 0x02, 0x01, 0xFD];
        assert_eq!(parse_numeric_response(&reply, PREAMP_RESPONSE).unwrap(), 1);
    }

    #[test]
    fn test_parse_numeric_wrong_length() {
        let reply = [0xFE, 0xFE, 0xE0, 0x96, 0x11, 0x20, 0xFD];
        assert!(matches!(
            parse_numeric_response(&reply, ATTENUATOR_RESPONSE),
            Err(Error::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_parse_numeric_refused_query() {
        let reply = [0xFE, 0xFE, 0xE0, 0x96, 0xFA, 0xFD];
        assert!(matches!(
            parse_numeric_response(&reply, RF_GAIN_RESPONSE),
            Err(Error::Rejected)
        ));
    }

    #[test]
    fn test_parse_numeric_invalid_bcd() {
        let reply = [0xFE, 0xFE, 0xE0, 0x96, 0x14, 0x02, 0x0A, 0x55, 0xFD, 0xFF];
        assert!(matches!(
            parse_numeric_response(&reply, RF_GAIN_RESPONSE),
            Err(Error::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_parse_numeric_layout_outside_reply() {
        let layout = ResponseLayout {
            len: 8,
            offset: 7,
            digits: 2,
        };
        let reply = [0xFE, 0xFE, 0xE0, 0x96, 0x11, 0x20, 0xFD, 0xFF];
        assert!(matches!(
            parse_numeric_response(&reply, layout),
            Err(Error::UnexpectedResponse(_))
        ));
    }
}
