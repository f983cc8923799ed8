//! Host proxy for trusted applets running in a secure VM.
//!
//! [`HostProxy`] exposes three operations: open a session with an applet
//! (provisioning its package when the VM lacks it), send a command to the
//! applet and collect its output, and close the session. Underneath:
//!
//! - [`record`]: the per-destination table correlating responses to the
//!   commands that produced them;
//! - [`session`]: session lookup across destinations and per-session
//!   locking;
//! - [`dispatcher`]: command construction and result-code mapping;
//! - [`provision`]: download-then-retry when a package is missing;
//! - [`filter`]: screening of inbound commands from untrusted callers.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod provision;
pub mod record;
pub mod resolver;
pub mod session;

pub use client::HostProxy;
pub use config::{ProxyConfig, DEFAULT_MAX_RECORDS};
pub use dispatcher::{CloseOutcome, Dispatcher, SendReply};
pub use error::{ProxyError, Result};
pub use filter::{
    deny, AppletDenyList, CommandAllowList, FilterChain, HeaderFilter, MaxFrameLength, Screening,
    Verdict, REJECT_INVALID, REJECT_NOT_PERMITTED,
};
pub use provision::{ensure_resident, retry_after_provisioning};
pub use record::{Completion, RecordGuard, RecordKind, Registry, ResponseRecord};
pub use resolver::{AppletIdResolver, UuidResolver};
pub use session::{SessionGuard, SessionHandle, SessionManager};
