//! Receiver connection settings.

use std::time::Duration;

/// Icom USB vendor id.
pub const ICOM_VID: u16 = 0x0C26;

/// IC-R8600 I/Q port product id.
pub const IC_R8600_PID: u16 = 0x0022;

/**
 * IC-R8600 Connection Configuration
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverConfig {
    /// USB vendor id to match
    pub vendor_id: u16,
    /// USB product id to match
    pub product_id: u16,
    /// Timeout for command writes and reply reads
    pub control_timeout: Duration,
    /// Timeout for one bulk I/Q read
    pub bulk_timeout: Duration,
    /// Processing time the receiver needs after mode and rate changes
    pub settle_delay: Duration,
    /// USB interface carrying the three pipes
    pub interface: u8,
}

impl ReceiverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            ..Self::default()
        }
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            vendor_id: ICOM_VID,
            product_id: IC_R8600_PID,
            control_timeout: Duration::from_millis(500),
            bulk_timeout: Duration::from_millis(1000),
            settle_delay: Duration::from_millis(100),
            interface: 0,
        }
    }
}
