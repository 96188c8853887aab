//! Error handling for the r8600 library
//!
//! A single error type covers the whole driver: USB transport failures,
//! protocol-level surprises coming back from the receiver, and requests that
//! cannot be encoded into a command frame.

use thiserror::Error;

/// A specialized Result type for r8600 operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for r8600 operations
#[derive(Debug, Error)]
pub enum Error {
    /// No IC-R8600 is connected (or the I/Q port driver is missing).
    #[error("IC-R8600 not found")]
    DeviceNotFound,

    /// Underlying USB operation failed.
    #[cfg(feature = "usb")]
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// Pipe open/read/write failure reported by a transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The receiver answered with the explicit failure acknowledgment.
    #[error("Command rejected by receiver")]
    Rejected,

    /// A reply was read but its length or content matches no known pattern.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Requested value cannot be encoded; nothing was sent.
    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),

    /// Stream used in a way its setup does not allow.
    #[error("Stream error: {0}")]
    Stream(String),

    /// I/O error (sample output files, stdout)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a transport error with a custom message
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Error::Transport(msg.into())
    }

    /// Create an unexpected-response error with a custom message
    pub fn unexpected<S: Into<String>>(msg: S) -> Self {
        Error::UnexpectedResponse(msg.into())
    }

    /// Create an unsupported-value error with a custom message
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::UnsupportedValue(msg.into())
    }

    /// Create a stream error with a custom message
    pub fn stream<S: Into<String>>(msg: S) -> Self {
        Error::Stream(msg.into())
    }

    /// True for pipe-level failures; the command may be retried as a whole.
    pub fn is_transport(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            #[cfg(feature = "usb")]
            Error::Usb(_) => true,
            _ => false,
        }
    }
}
