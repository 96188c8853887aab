//! Receiver controller.
//!
//! [`Receiver`] owns the transport and the cached device state. Every command
//! runs inside a [`Session`] holding the state lock, so there is never more
//! than one command awaiting its reply: the protocol has no request ids and
//! replies are matched to commands by order alone.
//!
//! The I/Q pipe is independent of the command pipes; [`Receiver::read_stream`]
//! does not take the lock and may run concurrently with commands.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ReceiverConfig;
use crate::error::{Error, Result};
use crate::frame::{
    self, ANTENNA_RESPONSE, ATTENUATOR_RESPONSE, CommandFrame, MAX_RESPONSE_LEN, PREAMP_RESPONSE,
    RF_GAIN_RESPONSE, ResponseLayout, SAMPLE_RATES,
};
use crate::gain::{
    Attenuator, GainRange, GainStage, GainState, RfGain, TOTAL_GAIN_RANGE, distribute_gain,
    preamp_db, preamp_from_units,
};
use crate::stream::{IqSample, NATIVE_FULL_SCALE, RxStream, StreamArgs, StreamFormat};
use crate::transport::Transport;

/// Driver and hardware key.
pub const DRIVER_KEY: &str = "IC-R8600";

/// Product page reported as the hardware origin.
pub const ORIGIN: &str = "https://www.icom.co.jp/world/products/receiver/desktop/ic-r8600/";

/// Antenna switching only works below this frequency; above it the
/// receiver always uses ANT 1.
pub const HF_LIMIT: u64 = 30_000_000;

/// Lowest tunable frequency, in Hz.
pub const FREQUENCY_MIN: u64 = 10;

/// Highest tunable frequency, in Hz.
pub const FREQUENCY_MAX: u64 = 3_000_000_000;

pub const DEFAULT_SAMPLE_RATE: u32 = 1_920_000;
pub const DEFAULT_FREQUENCY: u64 = 15_000_000;

/// Antenna names, indexed by their wire value.
pub const ANTENNAS: [&str; 3] = ["ANT 1", "ANT 2", "ANT 3"];

/// Tunable frequency components.
pub const FREQUENCY_COMPONENTS: [&str; 1] = ["RF"];

/// Last known receiver settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub sample_rate: u32,
    pub frequency: u64,
    /// Index into [`ANTENNAS`]
    pub antenna: usize,
    pub gain: GainState,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frequency: DEFAULT_FREQUENCY,
            antenna: 0,
            gain: GainState::default(),
        }
    }
}

/// Send one frame and read its reply, optionally waiting in between.
fn exchange<T: Transport>(
    transport: &T,
    command: &CommandFrame,
    settle: Option<Duration>,
) -> Result<Vec<u8>> {
    debug!("TX {:02X?}", command.as_bytes());
    transport.send_control(command.as_bytes())?;
    if let Some(delay) = settle
        && !delay.is_zero()
    {
        thread::sleep(delay);
    }
    let reply = transport.receive_control(MAX_RESPONSE_LEN)?;
    debug!("RX {:02X?}", reply);
    Ok(reply)
}

fn expect_ack(command: &CommandFrame, reply: &[u8]) -> Result<()> {
    frame::parse_ack(reply).inspect_err(|e| {
        warn!("Command {:02X?} failed: {}", command.as_bytes(), e);
    })
}

/// Exclusive access to the command pipes for the duration of one operation.
pub struct Session<'a, T: Transport> {
    transport: &'a T,
    settle_delay: Duration,
    state: MutexGuard<'a, DeviceState>,
}

impl<T: Transport> Session<'_, T> {
    /// Send a command that answers with a bare acknowledgment.
    pub fn command(&mut self, command: &CommandFrame) -> Result<()> {
        let reply = exchange(self.transport, command, None)?;
        expect_ack(command, &reply)
    }

    /// Like [`command`](Self::command), waiting for the settle delay before
    /// reading the acknowledgment.
    pub fn settled_command(&mut self, command: &CommandFrame) -> Result<()> {
        let reply = exchange(self.transport, command, Some(self.settle_delay))?;
        expect_ack(command, &reply)
    }

    /// Send a query and decode its numeric reply.
    pub fn query(&mut self, command: &CommandFrame, layout: ResponseLayout) -> Result<u32> {
        let reply = exchange(self.transport, command, None)?;
        frame::parse_numeric_response(&reply, layout).inspect_err(|e| {
            warn!("Query {:02X?} failed: {}", command.as_bytes(), e);
        })
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    fn set_rf_gain(&mut self, gain: RfGain) -> Result<()> {
        info!("Setting RF gain: {:.2} dB ({})", gain.db(), gain.units());
        self.command(&frame::set_rf_gain(gain)?)?;
        self.state.gain.rf = gain;
        Ok(())
    }

    fn set_preamp(&mut self, on: bool) -> Result<()> {
        info!("Setting pre-amp: {}", if on { "ON" } else { "OFF" });
        self.command(&frame::set_preamp(on))?;
        self.state.gain.preamp = on;
        Ok(())
    }

    fn set_attenuator(&mut self, attenuator: Attenuator) -> Result<()> {
        info!("Setting attenuator: {:.0} dB", attenuator.db());
        self.command(&frame::set_attenuator(attenuator)?)?;
        self.state.gain.attenuator = attenuator;
        Ok(())
    }

    fn read_stage(&mut self, stage: GainStage) -> Result<f64> {
        let db = match stage {
            GainStage::Rf => {
                let units = self.query(&frame::read_rf_gain(), RF_GAIN_RESPONSE)?;
                let gain = RfGain::from_units(units)?;
                self.state.gain.rf = gain;
                gain.db()
            }
            GainStage::PreAmp => {
                let units = self.query(&frame::read_preamp(), PREAMP_RESPONSE)?;
                let on = preamp_from_units(units)?;
                self.state.gain.preamp = on;
                preamp_db(on)
            }
            GainStage::Attenuator => {
                let units = self.query(&frame::read_attenuator(), ATTENUATOR_RESPONSE)?;
                let attenuator = Attenuator::from_units(units)?;
                self.state.gain.attenuator = attenuator;
                attenuator.db()
            }
        };
        debug!("Read {} gain: {} dB", stage, db);
        Ok(db)
    }
}

/**
 * IC-R8600 Receiver
 */
pub struct Receiver<T: Transport> {
    transport: T,
    config: ReceiverConfig,
    state: Mutex<DeviceState>,
}

#[cfg(feature = "usb")]
pub type UsbReceiver = Receiver<crate::transport::UsbTransport>;

#[cfg(feature = "usb")]
impl Receiver<crate::transport::UsbTransport> {
    /// Open the first connected IC-R8600 and put it in remote I/Q mode.
    pub fn open(config: ReceiverConfig) -> Result<Self> {
        let transport = crate::transport::UsbTransport::open(&config)?;
        Self::new(transport, config)
    }
}

impl<T: Transport> Receiver<T> {
    /// Take over `transport` and switch the receiver to remote I/Q mode.
    ///
    /// Fails if the receiver does not acknowledge remote mode.
    pub fn new(transport: T, config: ReceiverConfig) -> Result<Self> {
        let remote_on = frame::remote(true);
        let reply = exchange(&transport, &remote_on, Some(config.settle_delay))?;
        expect_ack(&remote_on, &reply)?;
        info!("IC-R8600 in remote I/Q mode");

        Ok(Self {
            transport,
            config,
            state: Mutex::new(DeviceState::default()),
        })
    }

    /// Start a command session, waiting for any command in flight.
    pub fn session(&self) -> Session<'_, T> {
        Session {
            transport: &self.transport,
            settle_delay: self.config.settle_delay,
            state: self.lock_state(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Snapshot of the cached settings.
    pub fn state(&self) -> DeviceState {
        self.lock_state().clone()
    }

    // Identification

    pub fn driver_key(&self) -> &'static str {
        DRIVER_KEY
    }

    pub fn hardware_key(&self) -> &'static str {
        DRIVER_KEY
    }

    pub fn hardware_info(&self) -> Vec<(String, String)> {
        vec![
            ("origin".to_string(), ORIGIN.to_string()),
            (
                "vendor_id".to_string(),
                format!("0x{:04X}", self.config.vendor_id),
            ),
            (
                "product_id".to_string(),
                format!("0x{:04X}", self.config.product_id),
            ),
        ]
    }

    /// RX only, single channel.
    pub fn num_channels(&self) -> usize {
        1
    }

    // Antenna

    pub fn list_antennas(&self) -> &'static [&'static str] {
        &ANTENNAS
    }

    pub fn set_antenna(&self, name: &str) -> Result<()> {
        let index = ANTENNAS
            .iter()
            .position(|a| *a == name)
            .ok_or_else(|| Error::unsupported(format!("antenna {:?}", name)))?;

        let mut session = self.session();
        let frequency = session.state.frequency;
        if frequency >= HF_LIMIT {
            if index != 0 {
                return Err(Error::unsupported(format!(
                    "antenna {} at {} Hz (only {} above {} Hz)",
                    name, frequency, ANTENNAS[0], HF_LIMIT
                )));
            }
            session.state.antenna = 0;
            return Ok(());
        }

        info!("Setting antenna: {}", name);
        session.command(&frame::set_antenna(index as u8))?;
        session.state.antenna = index;
        Ok(())
    }

    /// Query the selected antenna.
    pub fn antenna(&self) -> Result<&'static str> {
        let mut session = self.session();
        if session.state.frequency >= HF_LIMIT {
            return Ok(ANTENNAS[0]);
        }

        let index = session.query(&frame::read_antenna(), ANTENNA_RESPONSE)? as usize;
        let name = ANTENNAS
            .get(index)
            .copied()
            .ok_or_else(|| Error::unexpected(format!("antenna index {}", index)))?;
        session.state.antenna = index;
        Ok(name)
    }

    pub fn cached_antenna(&self) -> &'static str {
        ANTENNAS[self.lock_state().antenna]
    }

    // Gain

    pub fn list_gains(&self) -> Vec<&'static str> {
        GainStage::ALL.iter().map(GainStage::name).collect()
    }

    /// AGC is not available in I/Q mode.
    pub fn has_gain_mode(&self) -> bool {
        false
    }

    pub fn gain_range(&self) -> GainRange {
        TOTAL_GAIN_RANGE
    }

    pub fn gain_element_range(&self, stage: GainStage) -> GainRange {
        stage.range()
    }

    /// Spread `db` over pre-amp, attenuator and RF gain.
    pub fn set_gain(&self, db: f64) -> Result<()> {
        let plan = distribute_gain(db)?;
        debug!("Distributing {} dB gain: {:?}", db, plan);

        let mut session = self.session();
        session.set_preamp(plan.preamp)?;
        session.set_attenuator(plan.attenuator)?;
        session.set_rf_gain(plan.rf)
    }

    pub fn set_gain_element(&self, stage: GainStage, db: f64) -> Result<()> {
        match stage {
            GainStage::Rf => {
                let gain = RfGain::from_db(db)?;
                self.session().set_rf_gain(gain)
            }
            GainStage::PreAmp => {
                if !stage.range().contains(db) {
                    return Err(Error::unsupported(format!("pre-amp gain {} dB", db)));
                }
                self.session().set_preamp(db > 0.0)
            }
            GainStage::Attenuator => {
                let attenuator = Attenuator::from_db(db)?;
                self.session().set_attenuator(attenuator)
            }
        }
    }

    /// Read back one stage from the receiver.
    pub fn gain_element(&self, stage: GainStage) -> Result<f64> {
        self.session().read_stage(stage)
    }

    /// Sum of the three read-back stages.
    pub fn gain(&self) -> Result<f64> {
        let mut session = self.session();
        let mut total = 0.0;
        for stage in [GainStage::PreAmp, GainStage::Attenuator, GainStage::Rf] {
            total += session.read_stage(stage)?;
        }
        Ok(total)
    }

    pub fn cached_gain(&self) -> GainState {
        self.lock_state().gain
    }

    // Frequency

    pub fn list_frequencies(&self) -> &'static [&'static str] {
        &FREQUENCY_COMPONENTS
    }

    pub fn frequency_range(&self) -> (u64, u64) {
        (FREQUENCY_MIN, FREQUENCY_MAX)
    }

    pub fn set_frequency(&self, hz: u64) -> Result<()> {
        if !(FREQUENCY_MIN..=FREQUENCY_MAX).contains(&hz) {
            return Err(Error::unsupported(format!(
                "frequency {} Hz outside [{}, {}]",
                hz, FREQUENCY_MIN, FREQUENCY_MAX
            )));
        }
        let command = frame::set_frequency(hz)?;

        let mut session = self.session();
        info!("Setting center frequency: {} Hz", hz);
        session.command(&command)?;
        session.state.frequency = hz;
        if hz >= HF_LIMIT && session.state.antenna != 0 {
            debug!("Above {} Hz the receiver uses {}", HF_LIMIT, ANTENNAS[0]);
            session.state.antenna = 0;
        }
        Ok(())
    }

    /// Cached center frequency.
    pub fn frequency(&self) -> u64 {
        self.lock_state().frequency
    }

    // Sample rate

    pub fn list_sample_rates(&self) -> Vec<u32> {
        SAMPLE_RATES.iter().map(|(rate, _)| *rate).collect()
    }

    pub fn set_sample_rate(&self, rate: u32) -> Result<()> {
        let command = frame::sample_rate(rate)?;

        let mut session = self.session();
        info!("Setting sample rate: {} S/s", rate);
        session.settled_command(&command)?;
        session.state.sample_rate = rate;
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock_state().sample_rate
    }

    // Streaming

    pub fn stream_formats(&self) -> &'static [StreamFormat] {
        &StreamFormat::ALL
    }

    /// Native format and its full-scale value.
    pub fn native_stream_format(&self) -> (StreamFormat, f64) {
        (StreamFormat::Cs16, NATIVE_FULL_SCALE)
    }

    pub fn setup_stream(&self, format: StreamFormat, args: &StreamArgs) -> RxStream {
        let stream = RxStream::new(format, args);
        info!(
            "Stream set up: {}, {} byte buffer",
            format,
            stream.buffer_len()
        );
        stream
    }

    pub fn activate_stream(&self, stream: &mut RxStream) {
        stream.set_active(true);
    }

    pub fn deactivate_stream(&self, stream: &mut RxStream) {
        stream.set_active(false);
    }

    pub fn close_stream(&self, mut stream: RxStream) {
        self.deactivate_stream(&mut stream);
        debug!("Stream closed");
    }

    /// Read one bulk buffer into `out`, returning the number of samples.
    ///
    /// Dropout pairs are removed, so the count may be lower than the number
    /// of pairs the receiver delivered.
    pub fn read_stream<S: IqSample>(&self, stream: &mut RxStream, out: &mut [S]) -> Result<usize> {
        stream.read_with(out, |buf| self.transport.read_bulk(buf))
    }
}

impl<T: Transport> Drop for Receiver<T> {
    fn drop(&mut self) {
        let remote_off = frame::remote(false);
        match exchange(&self.transport, &remote_off, Some(self.config.settle_delay))
            .and_then(|reply| expect_ack(&remote_off, &reply))
        {
            Ok(()) => info!("IC-R8600 left remote I/Q mode"),
            Err(e) => warn!("Failed to leave remote mode: {}", e),
        }
    }
}
