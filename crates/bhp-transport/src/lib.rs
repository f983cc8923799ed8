//! Transport seam for the BHP host proxy.
//!
//! The proxy never touches sockets or device files itself. It hands
//! framed commands to a [`Transport`] and receives responses through a
//! [`ResponseSink`]. [`StreamTransport`] is the stock implementation over
//! Unix domain sockets, one link per [`Destination`].

pub mod destination;
pub mod error;
#[cfg(unix)]
pub mod stream;
pub mod traits;

pub use destination::Destination;
pub use error::{Result, TransportError};
#[cfg(unix)]
pub use stream::StreamTransport;
pub use traits::{ResponseSink, Transport};
