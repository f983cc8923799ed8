use std::path::PathBuf;

use crate::destination::Destination;

/// Errors raised while submitting commands to the secure world.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the endpoint serving a destination.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No link is configured for the destination.
    #[error("destination {0} is not connected")]
    NotConnected(Destination),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing failed while writing or reading.
    #[error("transport framing error: {0}")]
    Wire(#[from] bhp_wire::WireError),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
