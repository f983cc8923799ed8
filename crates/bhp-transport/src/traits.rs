use bhp_wire::Command;
use bytes::Bytes;

use crate::destination::Destination;
use crate::error::Result;

/// Moves command frames to the secure world.
///
/// `submit` only hands the command off; the matching response arrives
/// separately through the [`ResponseSink`] the transport was started with.
pub trait Transport: Send + Sync {
    fn submit(
        &self,
        destination: Destination,
        command: &Command,
        payload: &[u8],
        seq: u64,
    ) -> Result<()>;
}

/// Receive path: accepts every inbound response frame for a destination.
pub trait ResponseSink: Send + Sync {
    fn deliver(&self, destination: Destination, frame: Bytes);

    /// The link to `destination` is gone; no further responses will be
    /// delivered for it.
    fn link_closed(&self, destination: Destination) {
        let _ = destination;
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn submit(
        &self,
        destination: Destination,
        command: &Command,
        payload: &[u8],
        seq: u64,
    ) -> Result<()> {
        (**self).submit(destination, command, payload, seq)
    }
}
