//! I/Q stream demuxer.
//!
//! The bulk pipe delivers interleaved little-endian `i16` pairs (I then Q).
//! When the receiver has no sample for a slot it fills the pair with the
//! dropout marker `00 80 00 80`; those pairs are removed, so one buffer can
//! yield fewer samples than it holds.

use std::fmt;
use std::str::FromStr;

use num_complex::Complex;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Raw pattern the receiver writes in place of a missing I/Q pair.
pub const DROPOUT_MARKER: [u8; 4] = [0x00, 0x80, 0x00, 0x80];

/// Size of one raw I/Q pair on the bulk pipe.
pub const BYTES_PER_PAIR: usize = 4;

/// Bulk buffer length used when `bufflen` is not given.
pub const DEFAULT_BUFFER_LEN: usize = 4096;

/// Full-scale value of the native Cs16 format.
pub const NATIVE_FULL_SCALE: f64 = 32767.0;

/// Sample layout handed to the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StreamFormat {
    /// Complex signed 16-bit, copied verbatim
    Cs16,
    /// Complex 32-bit float, scaled by 1/32768
    Cf32,
}

impl StreamFormat {
    pub const ALL: [StreamFormat; 2] = [StreamFormat::Cs16, StreamFormat::Cf32];

    pub fn name(&self) -> &'static str {
        match self {
            StreamFormat::Cs16 => "CS16",
            StreamFormat::Cf32 => "CF32",
        }
    }

    /// Bytes per complex sample in this format.
    pub fn sample_size(&self) -> usize {
        match self {
            StreamFormat::Cs16 => 4,
            StreamFormat::Cf32 => 8,
        }
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StreamFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::unsupported(format!("stream format {:?}", s)))
    }
}

/// Sample types a stream can be read into.
pub trait IqSample: Copy + Send + 'static {
    /// Stream format this sample type belongs to.
    const FORMAT: StreamFormat;

    /// Build a sample from one raw I/Q pair.
    fn from_raw(i: i16, q: i16) -> Self;

    /// Serialize as interleaved little-endian I and Q.
    fn write_le(&self, out: &mut Vec<u8>);
}

impl IqSample for Complex<i16> {
    const FORMAT: StreamFormat = StreamFormat::Cs16;

    fn from_raw(i: i16, q: i16) -> Self {
        Complex::new(i, q)
    }

    fn write_le(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.re.to_le_bytes());
        out.extend_from_slice(&self.im.to_le_bytes());
    }
}

impl IqSample for Complex<f32> {
    const FORMAT: StreamFormat = StreamFormat::Cf32;

    fn from_raw(i: i16, q: i16) -> Self {
        Complex::new(i as f32 / 32768.0, q as f32 / 32768.0)
    }

    fn write_le(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.re.to_le_bytes());
        out.extend_from_slice(&self.im.to_le_bytes());
    }
}

/// Convert a raw bulk buffer into samples, skipping dropout markers.
///
/// Returns the number of samples written to `out`. Trailing bytes that do not
/// form a full pair are ignored. Conversion stops when `out` is full.
pub fn demux<S: IqSample>(raw: &[u8], out: &mut [S]) -> usize {
    let groups = raw.chunks_exact(BYTES_PER_PAIR);
    let trailing = groups.remainder().len();
    if trailing != 0 {
        warn!("Ignoring {} trailing bytes of a {}-byte bulk read", trailing, raw.len());
    }

    let mut written = 0;
    let mut dropped = 0;
    for group in groups {
        if group == DROPOUT_MARKER {
            dropped += 1;
            continue;
        }
        let Some(slot) = out.get_mut(written) else {
            debug!("Output buffer full after {} samples", written);
            break;
        };
        let i = i16::from_le_bytes([group[0], group[1]]);
        let q = i16::from_le_bytes([group[2], group[3]]);
        *slot = S::from_raw(i, q);
        written += 1;
    }

    if dropped > 0 {
        trace!("Dropped {} marker pairs", dropped);
    }
    written
}

/// Stream setup arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamArgs {
    /// Bulk read size in bytes, a positive multiple of 4.
    pub buffer_len: usize,
}

impl Default for StreamArgs {
    fn default() -> Self {
        Self {
            buffer_len: DEFAULT_BUFFER_LEN,
        }
    }
}

impl StreamArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer_len(buffer_len: usize) -> Self {
        Self {
            buffer_len: normalize_buffer_len(buffer_len),
        }
    }

    /// Parse `key=value[,key=value]` arguments.
    ///
    /// Only `bufflen` is recognized; anything else, and any invalid value, is
    /// logged and ignored.
    pub fn from_kwargs(kwargs: &str) -> Self {
        let mut args = Self::default();
        for pair in kwargs.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((key, value)) = pair.split_once('=') else {
                warn!("Ignoring stream argument without value: {:?}", pair);
                continue;
            };
            match key.trim() {
                "bufflen" => match value.trim().parse::<i64>() {
                    Ok(len) if len > 0 => {
                        args.buffer_len = normalize_buffer_len(len as usize);
                        debug!("Using {} byte stream buffer", args.buffer_len);
                    }
                    _ => warn!("Invalid bufflen {:?}, keeping {}", value, args.buffer_len),
                },
                other => warn!("Ignoring unknown stream argument {:?}", other),
            }
        }
        args
    }
}

fn normalize_buffer_len(len: usize) -> usize {
    (len / BYTES_PER_PAIR * BYTES_PER_PAIR).max(BYTES_PER_PAIR)
}

/// An RX stream set up on the receiver.
///
/// Owns its bulk buffer; the format is fixed for the stream's lifetime.
#[derive(Debug)]
pub struct RxStream {
    format: StreamFormat,
    buffer: Vec<u8>,
    active: bool,
    last_read: usize,
}

impl RxStream {
    pub(crate) fn new(format: StreamFormat, args: &StreamArgs) -> Self {
        Self {
            format,
            buffer: vec![0u8; normalize_buffer_len(args.buffer_len)],
            active: false,
            last_read: 0,
        }
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Maximum number of samples one read can return.
    pub fn mtu(&self) -> usize {
        self.buffer.len() / BYTES_PER_PAIR
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Raw bytes delivered by the last bulk read, markers included.
    pub fn last_read_len(&self) -> usize {
        self.last_read
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Fill the bulk buffer with `fill` and demux it into `out`.
    ///
    /// At most `out.len()` pairs are requested from `fill`.
    pub(crate) fn read_with<S, F>(&mut self, out: &mut [S], fill: F) -> Result<usize>
    where
        S: IqSample,
        F: FnOnce(&mut [u8]) -> Result<usize>,
    {
        if !self.active {
            return Err(Error::stream("stream is not active"));
        }
        if S::FORMAT != self.format {
            return Err(Error::stream(format!(
                "stream is set up for {}, read requested {}",
                self.format,
                S::FORMAT
            )));
        }
        if out.is_empty() {
            return Ok(0);
        }

        let request = self.buffer.len().min(out.len() * BYTES_PER_PAIR);
        let read = fill(&mut self.buffer[..request])?.min(request);
        self.last_read = read;
        trace!("Bulk read {} of {} bytes", read, request);

        Ok(demux(&self.buffer[..read], out))
    }
}
