//! Test helper utilities: a scripted transport and synthetic Cs16 signals
#![allow(dead_code)]

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use r8600::{Error, Receiver, ReceiverConfig, Result, Transport};

/// Positive acknowledgment as sent by the receiver
pub const ACK: [u8; 6] = [0xFE, 0xFE, 0xE0, 0x96, 0xFB, 0xFD];

/// Negative acknowledgment as sent by the receiver
pub const NAK: [u8; 6] = [0xFE, 0xFE, 0xE0, 0x96, 0xFA, 0xFD];

#[derive(Default)]
struct Script {
    sent: Vec<Vec<u8>>,
    responses: VecDeque<Vec<u8>>,
    bulk: VecDeque<std::result::Result<Vec<u8>, String>>,
    fail_sends: bool,
    reply_delay: Duration,
    awaiting_reply: Option<Instant>,
    overlapped: bool,
    reply_gaps: Vec<Duration>,
}

/// In-memory transport: records every command frame written and replays
/// queued replies and bulk chunks in order.
///
/// An empty reply queue answers with a zero-length read; an empty bulk queue
/// answers with zero bytes. Each reply read also records the time since its
/// command was written, and a command written while another still awaits its
/// reply is flagged as overlapping.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn push_response(&self, bytes: &[u8]) {
        self.script().responses.push_back(bytes.to_vec());
    }

    pub fn push_ack(&self) {
        self.push_response(&ACK);
    }

    pub fn push_acks(&self, count: usize) {
        for _ in 0..count {
            self.push_ack();
        }
    }

    pub fn push_nak(&self) {
        self.push_response(&NAK);
    }

    pub fn push_bulk(&self, bytes: Vec<u8>) {
        self.script().bulk.push_back(Ok(bytes));
    }

    pub fn push_bulk_error(&self, msg: &str) {
        self.script().bulk.push_back(Err(msg.to_string()));
    }

    pub fn fail_sends(&self, fail: bool) {
        self.script().fail_sends = fail;
    }

    /// Every frame written so far
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.script().sent.clone()
    }

    pub fn last_sent(&self) -> Option<Vec<u8>> {
        self.script().sent.last().cloned()
    }

    pub fn clear_sent(&self) {
        self.script().sent.clear();
    }

    pub fn pending_responses(&self) -> usize {
        self.script().responses.len()
    }

    /// Hold every reply read for `delay` before answering
    pub fn set_reply_delay(&self, delay: Duration) {
        self.script().reply_delay = delay;
    }

    /// Whether a command was ever written before the previous one got its reply
    pub fn overlapped(&self) -> bool {
        self.script().overlapped
    }

    /// Time between each command write and the read of its reply
    pub fn reply_gaps(&self) -> Vec<Duration> {
        self.script().reply_gaps.clone()
    }
}

impl Transport for ScriptedTransport {
    fn send_control(&self, frame: &[u8]) -> Result<usize> {
        let mut script = self.script();
        if script.fail_sends {
            return Err(Error::transport("control pipe write failed"));
        }
        if script.awaiting_reply.is_some() {
            script.overlapped = true;
        }
        script.awaiting_reply = Some(Instant::now());
        script.sent.push(frame.to_vec());
        Ok(frame.len())
    }

    fn receive_control(&self, max_len: usize) -> Result<Vec<u8>> {
        let delay = self.script().reply_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let mut script = self.script();
        if let Some(sent_at) = script.awaiting_reply.take() {
            let gap = sent_at.elapsed();
            script.reply_gaps.push(gap);
        }
        let mut reply = script.responses.pop_front().unwrap_or_default();
        reply.truncate(max_len);
        Ok(reply)
    }

    fn read_bulk(&self, buf: &mut [u8]) -> Result<usize> {
        let mut script = self.script();
        match script.bulk.pop_front() {
            None => Ok(0),
            Some(Err(msg)) => Err(Error::transport(msg)),
            Some(Ok(mut chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    // keep the rest for the next read
                    chunk.drain(..n);
                    script.bulk.push_front(Ok(chunk));
                }
                Ok(n)
            }
        }
    }
}

/// Configuration without the settle delay
pub fn test_config() -> ReceiverConfig {
    ReceiverConfig::default().settle_delay(Duration::ZERO)
}

/// Open a receiver on a fresh scripted transport, with remote mode
/// acknowledged and the opening frame cleared from the log
pub fn open_receiver() -> (Arc<ScriptedTransport>, Receiver<Arc<ScriptedTransport>>) {
    let transport = ScriptedTransport::new();
    transport.push_ack();
    let receiver = Receiver::new(Arc::clone(&transport), test_config()).unwrap();
    transport.clear_sent();
    (transport, receiver)
}

/// Command frame as the controller sends it: header, body, terminator(s)
pub fn command(body: &[u8], padded: bool) -> Vec<u8> {
    let mut frame = vec![0xFE, 0xFE, 0x96, 0xE0];
    frame.extend_from_slice(body);
    frame.push(0xFD);
    if padded {
        frame.push(0xFF);
    }
    frame
}

/// Reply frame as the receiver sends it
pub fn reply(body: &[u8], padded: bool) -> Vec<u8> {
    let mut frame = vec![0xFE, 0xFE, 0xE0, 0x96];
    frame.extend_from_slice(body);
    frame.push(0xFD);
    if padded {
        frame.push(0xFF);
    }
    frame
}

/// Interleave I/Q pairs as Cs16 little-endian bytes
pub fn cs16_pairs(pairs: &[(i16, i16)]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(pairs.len() * 4);
    for (i, q) in pairs {
        buffer.extend_from_slice(&i.to_le_bytes());
        buffer.extend_from_slice(&q.to_le_bytes());
    }
    buffer
}

/// Generate a complex sine wave at a specific frequency (Cs16 format)
///
/// # Arguments
/// * `frequency` - Frequency in Hz
/// * `sample_rate` - Sample rate in Hz
/// * `num_samples` - Number of samples to generate
///
/// # Returns
/// Vector of complex samples as interleaved I/Q bytes (format: Cs16, little-endian)
pub fn generate_sine_wave_cs16(frequency: f32, sample_rate: u32, num_samples: usize) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(num_samples * 4);
    let angular_freq = 2.0 * PI * frequency / sample_rate as f32;

    for n in 0..num_samples {
        let phase = angular_freq * n as f32;
        let i_sample = (phase.cos() * 30000.0) as i16;
        let q_sample = (phase.sin() * 30000.0) as i16;

        buffer.extend_from_slice(&i_sample.to_le_bytes());
        buffer.extend_from_slice(&q_sample.to_le_bytes());
    }

    buffer
}

/// Replace every `every`-th pair of a Cs16 buffer with the dropout marker
///
/// # Returns
/// The buffer and the number of pairs replaced
pub fn with_dropouts(mut buffer: Vec<u8>, every: usize) -> (Vec<u8>, usize) {
    let mut replaced = 0;
    for (k, pair) in buffer.chunks_exact_mut(4).enumerate() {
        if k % every == every - 1 {
            pair.copy_from_slice(&[0x00, 0x80, 0x00, 0x80]);
            replaced += 1;
        }
    }
    (buffer, replaced)
}
