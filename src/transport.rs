//! Transport contract and the USB implementation.
//!
//! The receiver's I/Q port exposes three bulk pipes on one interface:
//! commands out on `0x02`, command replies in on `0x88`, and the I/Q sample
//! stream in on `0x86`. The driver core only talks to them through
//! [`Transport`], so it can be driven by an in-memory implementation in tests.

use std::sync::Arc;

use crate::error::Result;

/// Command pipe (host to receiver).
pub const CONTROL_OUT_EP: u8 = 0x02;

/// Command reply pipe (receiver to host).
pub const RESPONSE_IN_EP: u8 = 0x88;

/// I/Q sample pipe (receiver to host).
pub const IQ_IN_EP: u8 = 0x86;

/// Pipe-level access to the receiver.
///
/// Implementations own their timeouts and never retry; every failure is
/// reported to the caller as is.
pub trait Transport: Send + Sync {
    /// Write one command frame, returning the number of bytes written.
    fn send_control(&self, frame: &[u8]) -> Result<usize>;

    /// One read on the reply pipe, returning whatever it delivered.
    fn receive_control(&self, max_len: usize) -> Result<Vec<u8>>;

    /// One read on the I/Q pipe into `buf`, returning the bytes read.
    fn read_bulk(&self, buf: &mut [u8]) -> Result<usize>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send_control(&self, frame: &[u8]) -> Result<usize> {
        (**self).send_control(frame)
    }

    fn receive_control(&self, max_len: usize) -> Result<Vec<u8>> {
        (**self).receive_control(max_len)
    }

    fn read_bulk(&self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_bulk(buf)
    }
}

#[cfg(feature = "usb")]
pub use usb::{DeviceInfo, UsbTransport, list_devices};

#[cfg(feature = "usb")]
mod usb {
    use std::time::Duration;

    use rusb::{Context, Device, DeviceHandle, UsbContext};
    use tracing::{debug, warn};

    use super::{CONTROL_OUT_EP, IQ_IN_EP, RESPONSE_IN_EP, Transport};
    use crate::config::ReceiverConfig;
    use crate::error::{Error, Result};

    /// A matching device seen on the bus.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct DeviceInfo {
        pub bus: u8,
        pub address: u8,
        pub vendor_id: u16,
        pub product_id: u16,
        pub usb_version: String,
    }

    /// List every connected device matching the configured ids.
    pub fn list_devices(config: &ReceiverConfig) -> Result<Vec<DeviceInfo>> {
        let context = Context::new()?;
        let mut result = Vec::new();

        for device in context.devices()?.iter() {
            let desc = device.device_descriptor()?;
            if desc.vendor_id() == config.vendor_id && desc.product_id() == config.product_id {
                let version = desc.usb_version();
                result.push(DeviceInfo {
                    bus: device.bus_number(),
                    address: device.address(),
                    vendor_id: desc.vendor_id(),
                    product_id: desc.product_id(),
                    usb_version: format!(
                        "{}.{}.{}",
                        version.major(),
                        version.minor(),
                        version.sub_minor()
                    ),
                });
            }
        }

        Ok(result)
    }

    /// Claimed USB interface of an IC-R8600.
    pub struct UsbTransport {
        handle: DeviceHandle<Context>,
        interface: u8,
        control_timeout: Duration,
        bulk_timeout: Duration,
    }

    impl UsbTransport {
        /// Open the first device matching `config`.
        pub fn open(config: &ReceiverConfig) -> Result<Self> {
            let context = Context::new()?;

            for device in context.devices()?.iter() {
                let desc = device.device_descriptor()?;
                if desc.vendor_id() == config.vendor_id && desc.product_id() == config.product_id
                {
                    return Self::open_device(&device, config);
                }
            }

            Err(Error::DeviceNotFound)
        }

        fn open_device(device: &Device<Context>, config: &ReceiverConfig) -> Result<Self> {
            let handle = device.open()?;
            let interface = config.interface;

            #[cfg(target_os = "linux")]
            {
                if handle.kernel_driver_active(interface).unwrap_or(false) {
                    debug!("Detaching kernel driver from interface {}", interface);
                    if let Err(e) = handle.detach_kernel_driver(interface) {
                        warn!("Failed to detach kernel driver: {}", e);
                    }
                }
            }

            if let Err(e) = handle.set_active_configuration(1) {
                debug!("Failed to set configuration (may already be set): {}", e);
            }

            handle.claim_interface(interface)?;
            debug!(
                "Opened IC-R8600 on bus {:03} device {:03}",
                device.bus_number(),
                device.address()
            );

            Ok(UsbTransport {
                handle,
                interface,
                control_timeout: config.control_timeout,
                bulk_timeout: config.bulk_timeout,
            })
        }
    }

    impl Transport for UsbTransport {
        fn send_control(&self, frame: &[u8]) -> Result<usize> {
            let n = self
                .handle
                .write_bulk(CONTROL_OUT_EP, frame, self.control_timeout)?;
            if n != frame.len() {
                return Err(Error::transport(format!(
                    "short control write: {} of {} bytes",
                    n,
                    frame.len()
                )));
            }
            Ok(n)
        }

        fn receive_control(&self, max_len: usize) -> Result<Vec<u8>> {
            let mut buf = vec![0u8; max_len];
            let n = self
                .handle
                .read_bulk(RESPONSE_IN_EP, &mut buf, self.control_timeout)?;
            buf.truncate(n);
            Ok(buf)
        }

        fn read_bulk(&self, buf: &mut [u8]) -> Result<usize> {
            Ok(self.handle.read_bulk(IQ_IN_EP, buf, self.bulk_timeout)?)
        }
    }

    impl Drop for UsbTransport {
        fn drop(&mut self) {
            if let Err(e) = self.handle.release_interface(self.interface) {
                debug!("Failed to release USB interface: {}", e);
            }
            debug!("IC-R8600 USB interface released");
        }
    }
}
