//! Host proxy for trusted applets running in a secure VM.
//!
//! Callers open a session with an applet (its package is downloaded into
//! the VM when missing), exchange commands with it, and close the session.
//!
//! # Crate Structure
//!
//! - [`wire`]: command/response framing, result codes, frame reader/writer
//! - [`transport`]: the transport seam and a Unix stream transport
//! - [`proxy`]: response correlation, sessions, provisioning, inbound
//!   filtering and the [`proxy::HostProxy`] client (behind `proxy`)

/// Re-export wire types.
pub mod wire {
    pub use bhp_wire::*;
}

/// Re-export transport types.
pub mod transport {
    pub use bhp_transport::*;
}

/// Re-export proxy types (requires `proxy` feature).
#[cfg(feature = "proxy")]
pub mod proxy {
    pub use bhp_proxy::*;
}
