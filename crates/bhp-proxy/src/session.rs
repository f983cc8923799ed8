//! Session handles and their lifecycle.
//!
//! A session owns one persistent response record for its whole life.
//! [`SessionManager`] maps opaque handles to those records. A
//! [`SessionGuard`] holds the session lock for one call, so a close and a
//! send on the same handle never overlap.

use std::fmt;
use std::sync::Arc;

use bhp_transport::Destination;
use tracing::{debug, info};

use crate::error::{ProxyError, Result};
use crate::record::{Registry, ResponseRecord};

/// Caller-visible session handle: the sequence number of the command that
/// opened the session. Zero is never a valid handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle(u64);

impl SessionHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Finds live sessions across destinations and arbitrates their use.
#[derive(Debug)]
pub struct SessionManager {
    registry: Arc<Registry>,
    search_order: Vec<Destination>,
}

impl SessionManager {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_search_order(registry, Destination::SEARCH_ORDER.to_vec())
    }

    pub fn with_search_order(registry: Arc<Registry>, search_order: Vec<Destination>) -> Self {
        Self {
            registry,
            search_order,
        }
    }

    /// Enter the session, trying each destination in order.
    ///
    /// With `lock`, waits until no other caller is inside the session. Fails
    /// with [`ProxyError::NoSession`] when no destination holds the handle or
    /// the session was closed while waiting.
    pub fn enter(&self, handle: SessionHandle, lock: bool) -> Result<SessionGuard<'_>> {
        if handle.0 == 0 {
            return Err(ProxyError::NoSession(0));
        }

        for destination in &self.search_order {
            let Some(record) = self.registry.lookup(*destination, handle.0) else {
                continue;
            };
            if !record.is_session() {
                continue;
            }
            if lock && !record.acquire() {
                break;
            }
            debug!(%destination, handle = handle.0, lock, "entered session");
            return Ok(SessionGuard {
                registry: &self.registry,
                record,
                locked: lock,
                finished: false,
            });
        }
        Err(ProxyError::NoSession(handle.0))
    }

    /// Wrap a freshly opened session record without taking its lock.
    pub(crate) fn adopt(&self, record: Arc<ResponseRecord>) -> SessionGuard<'_> {
        SessionGuard {
            registry: &self.registry,
            record,
            locked: false,
            finished: false,
        }
    }

    /// Flag a session as terminated by a fault reported outside a response.
    /// Returns false when the handle is unknown on that destination.
    pub fn mark_killed(&self, destination: Destination, handle: SessionHandle) -> bool {
        match self.registry.lookup(destination, handle.0) {
            Some(record) if record.is_session() => {
                record.mark_killed();
                true
            }
            _ => false,
        }
    }

    /// Number of sessions currently registered across all destinations.
    pub fn live_sessions(&self) -> usize {
        self.search_order
            .iter()
            .map(|destination| self.registry.sessions(*destination))
            .sum()
    }
}

/// An entered session. Consume it with [`exit`](Self::exit) or
/// [`close`](Self::close); dropping it exits.
#[derive(Debug)]
pub struct SessionGuard<'a> {
    registry: &'a Registry,
    record: Arc<ResponseRecord>,
    locked: bool,
    finished: bool,
}

impl SessionGuard<'_> {
    pub fn handle(&self) -> SessionHandle {
        SessionHandle(self.record.seq())
    }

    pub fn destination(&self) -> Destination {
        self.record.destination()
    }

    pub fn record(&self) -> &ResponseRecord {
        &self.record
    }

    /// Release the lock; the session stays alive.
    pub fn exit(mut self) {
        self.release();
    }

    /// Release the lock and tear the session down.
    pub fn close(mut self) {
        self.finished = true;
        let destination = self.record.destination();
        let seq = self.record.seq();
        self.record.mark_closed();
        self.registry.take(destination, seq);
        info!(%destination, handle = seq, "session closed");
    }

    fn release(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if self.locked {
            self.record.release();
        }
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
