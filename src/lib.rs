#![doc = include_str!("../readme.md")]

pub mod bcd;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod gain;
pub mod reader;
pub mod stream;
pub mod transport;

pub use num_complex::Complex;

pub use config::{ICOM_VID, IC_R8600_PID, ReceiverConfig};
#[cfg(feature = "usb")]
pub use device::UsbReceiver;
pub use device::{DRIVER_KEY, DeviceState, Receiver, Session};
pub use error::{Error, Result};
pub use frame::CommandFrame;
pub use gain::{Attenuator, GainRange, GainStage, GainState, RfGain};
pub use reader::{AsyncIqReader, IqReader};
pub use stream::{IqSample, RxStream, StreamArgs, StreamFormat};
#[cfg(feature = "usb")]
pub use transport::{DeviceInfo, UsbTransport, list_devices};
pub use transport::Transport;
