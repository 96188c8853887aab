//! Probe, tune and capture I/Q samples from an Icom IC-R8600
//!
//! # Usage Examples
//!
//! ## List connected receivers
//! ```bash
//! r8600-rx --list
//! ```
//!
//! ## Print identification, ranges and current settings
//! ```bash
//! r8600-rx --probe --json
//! ```
//!
//! ## Tune and capture one million CF32 samples
//! ```bash
//! r8600-rx --freq 7.074M --rate 960000 --gain -10 --format cf32 -n 1000000 -o ft8.cf32
//! ```
//!
//! ## Stream CS16 to stdout
//! ```bash
//! r8600-rx --freq 1090M --rate 5120000 -o - | some-decoder
//! ```

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use clap::{ArgAction, Parser, ValueEnum};
use futures::StreamExt;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use r8600::{
    AsyncIqReader, Complex, GainStage, IqSample, Receiver, ReceiverConfig, StreamArgs,
    StreamFormat, UsbReceiver,
};

#[derive(Debug, Clone, Copy)]
struct Frequency(u64);

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, scale) = if let Some(stripped) = s.strip_suffix('G') {
            (stripped, 1e9)
        } else if let Some(stripped) = s.strip_suffix('M') {
            (stripped, 1e6)
        } else if let Some(stripped) = s.strip_suffix('k') {
            (stripped, 1e3)
        } else {
            (s, 1.0)
        };
        let val: f64 = digits
            .trim()
            .parse()
            .map_err(|_| format!("Invalid frequency: {}", s))?;
        if !val.is_finite() || val < 0.0 {
            return Err(format!("Invalid frequency: {}", s));
        }
        Ok(Frequency((val * scale).round() as u64))
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PreAmp {
    On,
    Off,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Probe, tune and capture I/Q samples from an Icom IC-R8600", long_about = None)]
struct Args {
    /// List connected receivers and exit
    #[arg(long, default_value_t = false)]
    list: bool,

    /// Print identification, ranges and current settings
    #[arg(long, default_value_t = false)]
    probe: bool,

    /// Print probe output as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Center frequency in Hz (accepts k/M/G suffix, e.g. 7.074M)
    #[arg(short, long, value_parser = Frequency::from_str)]
    freq: Option<Frequency>,

    /// Sample rate in Hz (240000, 480000, 960000, 1920000, 3840000, 5120000)
    #[arg(short, long)]
    rate: Option<u32>,

    /// Overall gain in dB, spread over pre-amp, attenuator and RF gain
    #[arg(short, long, allow_hyphen_values = true, conflicts_with_all = ["rf", "preamp", "attenuator"])]
    gain: Option<f64>,

    /// RF gain in dB (-63.75 to 0, step 0.25)
    #[arg(long, allow_hyphen_values = true)]
    rf: Option<f64>,

    /// Pre-amp on or off
    #[arg(long)]
    preamp: Option<PreAmp>,

    /// Attenuator in dB (0, -10, -20, -30)
    #[arg(long, allow_hyphen_values = true)]
    attenuator: Option<f64>,

    /// Antenna (ANT 1, ANT 2, ANT 3; HF only)
    #[arg(short, long)]
    antenna: Option<String>,

    /// Sample format written to the output (cs16, cf32)
    #[arg(long, default_value = "cs16", value_parser = StreamFormat::from_str)]
    format: StreamFormat,

    /// Stream arguments (e.g. "bufflen=16384")
    #[arg(long, default_value = "")]
    stream_args: String,

    /// Number of samples to capture (0 for no limit)
    #[arg(short, long, default_value_t = 0)]
    num_samples: u64,

    /// Output file for captured samples ("-" for stdout)
    #[arg(short, long)]
    output: Option<String>,

    /// Verbosity level (-v=info, -vv=debug, -vvv=trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Serialize)]
struct GainReport {
    name: &'static str,
    min: f64,
    max: f64,
    step: f64,
    value: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ProbeReport {
    driver: &'static str,
    hardware: &'static str,
    hardware_info: BTreeMap<String, String>,
    channels: usize,
    antennas: Vec<&'static str>,
    antenna: Option<&'static str>,
    frequency_range: (u64, u64),
    frequency: u64,
    sample_rates: Vec<u32>,
    sample_rate: u32,
    gain_range: (f64, f64),
    gain: Option<f64>,
    gains: Vec<GainReport>,
    stream_formats: Vec<String>,
    native_format: String,
    full_scale: f64,
}

fn probe(receiver: &UsbReceiver) -> ProbeReport {
    let gains = GainStage::ALL
        .iter()
        .map(|&stage| {
            let range = receiver.gain_element_range(stage);
            GainReport {
                name: stage.name(),
                min: range.min,
                max: range.max,
                step: range.step,
                value: receiver
                    .gain_element(stage)
                    .inspect_err(|e| warn!("Failed to read {} gain: {}", stage, e))
                    .ok(),
            }
        })
        .collect();
    let total = receiver.gain_range();
    let (native, full_scale) = receiver.native_stream_format();

    ProbeReport {
        driver: receiver.driver_key(),
        hardware: receiver.hardware_key(),
        hardware_info: receiver.hardware_info().into_iter().collect(),
        channels: receiver.num_channels(),
        antennas: receiver.list_antennas().to_vec(),
        antenna: receiver
            .antenna()
            .inspect_err(|e| warn!("Failed to read antenna: {}", e))
            .ok(),
        frequency_range: receiver.frequency_range(),
        frequency: receiver.frequency(),
        sample_rates: receiver.list_sample_rates(),
        sample_rate: receiver.sample_rate(),
        gain_range: (total.min, total.max),
        gain: receiver
            .gain()
            .inspect_err(|e| warn!("Failed to read gain: {}", e))
            .ok(),
        gains,
        stream_formats: receiver
            .stream_formats()
            .iter()
            .map(ToString::to_string)
            .collect(),
        native_format: native.to_string(),
        full_scale,
    }
}

fn print_probe(report: &ProbeReport) {
    println!("Driver:       {}", report.driver);
    for (key, value) in &report.hardware_info {
        println!("  {:<11} {}", format!("{}:", key), value);
    }
    println!("Channels:     {}", report.channels);
    println!(
        "Antennas:     {} (selected: {})",
        report.antennas.join(", "),
        report.antenna.unwrap_or("unknown")
    );
    println!(
        "Frequency:    {} Hz (range {} - {} Hz)",
        report.frequency, report.frequency_range.0, report.frequency_range.1
    );
    println!(
        "Sample rate:  {} S/s (supported: {:?})",
        report.sample_rate, report.sample_rates
    );
    match report.gain {
        Some(gain) => println!(
            "Gain:         {:.2} dB (range {} to {} dB)",
            gain, report.gain_range.0, report.gain_range.1
        ),
        None => println!("Gain:         unknown"),
    }
    for gain in &report.gains {
        let value = gain
            .value
            .map(|v| format!("{:.2} dB", v))
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "  {:<11} {} (range {} to {}, step {})",
            format!("{}:", gain.name),
            value,
            gain.min,
            gain.max,
            gain.step
        );
    }
    println!(
        "Formats:      {} (native {}, full scale {})",
        report.stream_formats.join(", "),
        report.native_format,
        report.full_scale
    );
}

fn apply_settings(receiver: &UsbReceiver, args: &Args) -> r8600::Result<()> {
    if let Some(rate) = args.rate {
        receiver.set_sample_rate(rate)?;
    }
    if let Some(Frequency(hz)) = args.freq {
        receiver.set_frequency(hz)?;
    }
    if let Some(antenna) = &args.antenna {
        receiver.set_antenna(antenna)?;
    }
    if let Some(gain) = args.gain {
        receiver.set_gain(gain)?;
    }
    if let Some(preamp) = args.preamp {
        let db = match preamp {
            PreAmp::On => 14.0,
            PreAmp::Off => 0.0,
        };
        receiver.set_gain_element(GainStage::PreAmp, db)?;
    }
    if let Some(attenuator) = args.attenuator {
        receiver.set_gain_element(GainStage::Attenuator, attenuator)?;
    }
    if let Some(rf) = args.rf {
        receiver.set_gain_element(GainStage::Rf, rf)?;
    }
    Ok(())
}

async fn capture<S: IqSample>(
    receiver: Arc<UsbReceiver>,
    stream_args: &StreamArgs,
    num_samples: u64,
    output: &str,
) -> r8600::Result<u64> {
    let mut writer: Box<dyn AsyncWrite + Unpin + Send> = if output == "-" {
        Box::new(tokio::io::stdout())
    } else {
        Box::new(tokio::fs::File::create(output).await?)
    };

    let mut reader = AsyncIqReader::<S>::new(receiver, stream_args);
    let mut written: u64 = 0;
    let mut bytes = Vec::new();

    while let Some(chunk) = reader.next().await {
        let chunk = chunk?;
        let take = if num_samples == 0 {
            chunk.len()
        } else {
            (num_samples - written).min(chunk.len() as u64) as usize
        };

        bytes.clear();
        for sample in &chunk[..take] {
            sample.write_le(&mut bytes);
        }
        writer.write_all(&bytes).await?;
        written += take as u64;

        if num_samples != 0 && written >= num_samples {
            break;
        }
    }

    writer.flush().await?;
    Ok(written)
}

#[tokio::main]
async fn main() -> r8600::Result<()> {
    let args = Args::parse();

    // Initialize tracing with verbosity level
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let _ = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .try_init();

    let config = ReceiverConfig::default();

    if args.list {
        let devices = r8600::list_devices(&config)?;
        if devices.is_empty() {
            println!("No IC-R8600 found");
        }
        for device in devices {
            println!(
                "Bus {:03} Device {:03}: ID {:04x}:{:04x} (USB {})",
                device.bus, device.address, device.vendor_id, device.product_id, device.usb_version
            );
        }
        return Ok(());
    }

    let receiver = Arc::new(Receiver::open(config)?);
    apply_settings(&receiver, &args)?;

    if args.probe {
        let report = probe(&receiver);
        if args.json {
            let json = serde_json::to_string_pretty(&report).map_err(std::io::Error::from)?;
            println!("{}", json);
        } else {
            print_probe(&report);
        }
    }

    if let Some(output) = &args.output {
        let stream_args = StreamArgs::from_kwargs(&args.stream_args);
        info!(
            "Capturing {} samples at {} Hz to {}",
            args.format,
            receiver.frequency(),
            output
        );
        let written = match args.format {
            StreamFormat::Cs16 => {
                capture::<Complex<i16>>(Arc::clone(&receiver), &stream_args, args.num_samples, output)
                    .await?
            }
            StreamFormat::Cf32 => {
                capture::<Complex<f32>>(Arc::clone(&receiver), &stream_args, args.num_samples, output)
                    .await?
            }
        };
        info!("Wrote {} samples", written);
    }

    // leaves remote mode once the last handle is gone
    match Arc::try_unwrap(receiver) {
        Ok(receiver) => drop(receiver),
        Err(_) => warn!("Receiver still in use at exit, remote mode left on"),
    }
    Ok(())
}
