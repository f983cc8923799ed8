//! Public entry point tying a transport to the dispatcher.

use std::sync::Arc;

use bhp_transport::{Destination, ResponseSink, Transport};
use bhp_wire::AppletId;
use bytes::Bytes;

use crate::config::ProxyConfig;
use crate::dispatcher::{CloseOutcome, Dispatcher, SendReply};
use crate::error::Result;
use crate::record::Registry;
use crate::resolver::{AppletIdResolver, UuidResolver};
use crate::session::{SessionHandle, SessionManager};

/// Host-side client for trusted applets.
///
/// Owns the response record tables and session state for one transport.
/// Everything is released when the proxy is dropped.
///
/// ```no_run
/// use std::sync::Arc;
///
/// use bhp_proxy::{HostProxy, SendReply};
/// use bhp_transport::{Destination, StreamTransport};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let endpoints = [(Destination::Ivm, "/run/bhp/ivm.sock")];
/// let transport = Arc::new(StreamTransport::connect(&endpoints)?);
/// let proxy = HostProxy::new(transport.clone());
/// transport.start_receivers(proxy.inbound())?;
///
/// let package = std::fs::read("applet.pack")?;
/// let applet = "3c4724a3-b9b6-4a4b-a3f8-95cd8a2a0a86";
/// let session = proxy.open_session(applet, &[], &package)?;
/// let reply = proxy.send_and_receive(session, 1, b"ping", 64)?;
/// if let SendReply::Complete { output, .. } = reply {
///     println!("{} bytes back", output.len());
/// }
/// proxy.close_session(session)?;
/// # Ok(())
/// # }
/// ```
pub struct HostProxy {
    dispatcher: Dispatcher,
    resolver: Box<dyn AppletIdResolver>,
}

impl HostProxy {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, ProxyConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: ProxyConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(transport, config),
            resolver: Box::new(UuidResolver),
        }
    }

    /// Replace the applet id resolver.
    pub fn with_resolver(mut self, resolver: impl AppletIdResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Sink the transport's receive path must deliver response frames to.
    pub fn inbound(&self) -> Arc<dyn ResponseSink> {
        Arc::new(Inbound {
            registry: Arc::clone(self.dispatcher.registry()),
        })
    }

    pub fn resolve(&self, applet_id: &str) -> Result<AppletId> {
        self.resolver.resolve(applet_id)
    }

    /// Open a session with the applet named by `applet_id`.
    pub fn open_session(
        &self,
        applet_id: &str,
        init: &[u8],
        package: &[u8],
    ) -> Result<SessionHandle> {
        let applet = self.resolve(applet_id)?;
        self.dispatcher.open_session(applet, init, package)
    }

    pub fn send_and_receive(
        &self,
        handle: SessionHandle,
        command_id: i32,
        input: &[u8],
        capacity: usize,
    ) -> Result<SendReply> {
        self.dispatcher.send_and_receive(handle, command_id, input, capacity)
    }

    pub fn close_session(&self, handle: SessionHandle) -> Result<CloseOutcome> {
        self.dispatcher.close_session(handle)
    }

    pub fn list_packages(&self, destination: Destination) -> Result<Vec<AppletId>> {
        self.dispatcher.list_packages(destination)
    }

    pub fn is_blocked(&self, applet_id: &str) -> Result<bool> {
        let applet = self.resolve(applet_id)?;
        self.dispatcher.is_blocked(applet)
    }

    pub fn sessions(&self) -> &SessionManager {
        self.dispatcher.sessions()
    }

    pub fn registry(&self) -> &Registry {
        self.dispatcher.registry()
    }

    pub fn config(&self) -> &ProxyConfig {
        self.dispatcher.config()
    }
}

struct Inbound {
    registry: Arc<Registry>,
}

impl ResponseSink for Inbound {
    fn deliver(&self, destination: Destination, frame: Bytes) {
        self.registry.complete(destination, frame);
    }

    fn link_closed(&self, destination: Destination) {
        self.registry.link_closed(destination);
    }
}
