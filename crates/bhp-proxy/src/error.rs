use std::time::Duration;

use bhp_transport::{Destination, TransportError};
use bhp_wire::{code, WireError};

/// Errors returned by host proxy operations.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// A caller-supplied argument was rejected before any exchange.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No live session exists for the handle on any destination.
    #[error("no active session for handle {0}")]
    NoSession(u64),

    /// The applet produced more output than the caller declared it can take.
    #[error("applet output of {len} bytes exceeds declared capacity {capacity}")]
    OutputOverflow { len: usize, capacity: usize },

    /// A response was missing its body or the body did not match its layout.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Every sequence number for the destination is in use.
    #[error("response table for {destination} exhausted ({capacity} records)")]
    TableExhausted {
        destination: Destination,
        capacity: usize,
    },

    /// No response arrived within the configured timeout.
    #[error("no response after {0:?}")]
    Timeout(Duration),

    /// Submitting the command failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or parsed.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// The secure side answered with a non-success result code.
    #[error("applet status {} (0x{:x})", status_name(.0), .0)]
    Status(i32),

    /// The applet was terminated by an uncaught fault.
    #[error("applet raised an uncaught exception; session terminated")]
    UncaughtException,
}

impl ProxyError {
    /// Protocol result code behind this error, if there is one.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Status(code) => Some(*code),
            Self::UncaughtException => Some(code::UNCAUGHT_EXCEPTION),
            _ => None,
        }
    }

    /// True when the VM reported that the applet package is missing.
    pub fn is_package_not_found(&self) -> bool {
        matches!(self, Self::Status(code::PACKAGE_NOT_FOUND))
    }

    pub(crate) fn malformed(err: WireError) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

fn status_name(code: &i32) -> &'static str {
    code::describe(*code)
}

/// Map a response code to `Ok(())` or [`ProxyError::Status`].
pub(crate) fn check_status(code: i32) -> Result<()> {
    if code == code::SUCCESS {
        Ok(())
    } else {
        Err(ProxyError::Status(code))
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
