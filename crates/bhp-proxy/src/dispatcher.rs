//! Command sequencing for the three applet operations.
//!
//! Each operation is a short series of exchanges: register a record,
//! submit the command, wait for the matching response, then interpret
//! the result code. Open adds the block-state check and provisioning
//! around the open-session exchange.

use std::sync::Arc;

use bhp_transport::{Destination, Transport};
use bhp_wire::{
    code, parse_package_list, AppletId, BufferTooSmall, Command, SendRecvBody, SendRecvRequest,
};
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::config::ProxyConfig;
use crate::error::{check_status, ProxyError, Result};
use crate::provision::{ensure_resident, retry_after_provisioning};
use crate::record::{Completion, RecordKind, Registry, ResponseRecord};
use crate::session::{SessionGuard, SessionHandle, SessionManager};

/// Successful outcome of [`Dispatcher::send_and_receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendReply {
    /// The applet's output fit the declared capacity.
    Complete { output: Bytes, response_code: i32 },
    /// The applet needs `required` bytes of output capacity; nothing was
    /// returned.
    BufferTooSmall { required: usize, response_code: i32 },
}

impl SendReply {
    pub fn response_code(&self) -> i32 {
        match self {
            Self::Complete { response_code, .. } | Self::BufferTooSmall { response_code, .. } => {
                *response_code
            }
        }
    }
}

/// Successful outcome of [`Dispatcher::close_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The session is gone; its handle is no longer valid.
    Closed,
    /// The applet still holds an internal session. The handle stays valid
    /// and must be closed again later.
    InternalSessionPending,
}

/// Builds commands, submits them, and turns correlated responses into
/// typed outcomes.
pub struct Dispatcher {
    registry: Arc<Registry>,
    sessions: SessionManager,
    transport: Arc<dyn Transport>,
    config: ProxyConfig,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, config: ProxyConfig) -> Self {
        let registry = Arc::new(Registry::new(config.max_records));
        Self {
            sessions: SessionManager::new(Arc::clone(&registry)),
            registry,
            transport,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Open a session with `applet`, provisioning `package` if the VM does
    /// not have it.
    pub fn open_session(
        &self,
        applet: AppletId,
        init: &[u8],
        package: &[u8],
    ) -> Result<SessionHandle> {
        if package.is_empty() {
            return Err(ProxyError::InvalidArgument("applet package must not be empty".into()));
        }

        if self.config.check_blocked_state {
            self.check_blocked_state(applet)?;
        }

        let destination = Destination::Ivm;
        let resident = match self.list_packages(destination) {
            Ok(ids) => ids.contains(&applet),
            Err(err) => {
                debug!(%destination, error = %err, "package listing failed, provisioning anyway");
                false
            }
        };
        let provisioned =
            ensure_resident(resident, || self.provision(destination, applet, package))?;
        debug!(%applet, resident, provisioned, "applet package checked");

        self.open_applet_session(destination, applet, init, package)
    }

    fn open_applet_session(
        &self,
        destination: Destination,
        applet: AppletId,
        init: &[u8],
        package: &[u8],
    ) -> Result<SessionHandle> {
        let guard = self.registry.register(destination, RecordKind::Session)?;
        let command = Command::open_session(applet);

        let completion = retry_after_provisioning(
            || {
                let completion = self.exchange(guard.record(), &command, init)?;
                check_status(completion.code)?;
                Ok(completion)
            },
            || self.download(destination, applet, package),
        );
        let completion = match completion {
            Ok(completion) => completion,
            Err(err) => {
                let seq = guard.seq();
                warn!(%destination, %applet, seq, error = %err, "open session failed");
                return Err(err);
            }
        };

        guard.record().set_addr(completion.addr);
        let record = guard.persist();
        let handle = SessionHandle::from_raw(record.seq());
        self.sessions.adopt(record).exit();
        info!(%destination, %applet, %handle, "session opened");
        Ok(handle)
    }

    /// Send one command to the applet behind `handle`.
    ///
    /// `capacity` is the most output the caller accepts. When the applet
    /// needs more, [`SendReply::BufferTooSmall`] reports how much; when it
    /// nonetheless returns more, the output is discarded and
    /// [`ProxyError::OutputOverflow`] is returned.
    pub fn send_and_receive(
        &self,
        handle: SessionHandle,
        command_id: i32,
        input: &[u8],
        capacity: usize,
    ) -> Result<SendReply> {
        let declared = u32::try_from(capacity).map_err(|_| {
            ProxyError::InvalidArgument(format!("output capacity {capacity} exceeds u32"))
        })?;

        let session = self.sessions.enter(handle, true)?;
        let reply = self.send_in_session(&session, command_id, input, declared);
        session.exit();
        reply
    }

    fn send_in_session(
        &self,
        session: &SessionGuard<'_>,
        command_id: i32,
        input: &[u8],
        capacity: u32,
    ) -> Result<SendReply> {
        let record = session.record();
        let command = Command::send_and_recv(SendRecvRequest {
            session_addr: record.addr(),
            command: command_id,
            capacity,
        });
        let exchanged = self.exchange(record, &command, input);
        if record.killed() {
            warn!(handle = %session.handle(), "applet terminated during send");
            return Err(ProxyError::UncaughtException);
        }
        let completion = exchanged?;
        let body = completion.body.unwrap_or_default();

        match completion.code {
            code::APPLET_SMALL_BUFFER if body.len() == BufferTooSmall::SIZE => {
                let sentinel = BufferTooSmall::parse(&body).map_err(ProxyError::malformed)?;
                Ok(SendReply::BufferTooSmall {
                    required: sentinel.required as usize,
                    response_code: sentinel.response_code,
                })
            }
            code::APPLET_SMALL_BUFFER => Err(ProxyError::MalformedResponse(format!(
                "buffer-too-small body of {} bytes",
                body.len()
            ))),
            code::SUCCESS => {
                let parsed = SendRecvBody::parse(&body).map_err(ProxyError::malformed)?;
                let len = parsed.output.len();
                if len > capacity as usize {
                    return Err(ProxyError::OutputOverflow {
                        len,
                        capacity: capacity as usize,
                    });
                }
                Ok(SendReply::Complete {
                    response_code: parsed.response_code,
                    output: body.slice(SendRecvBody::PREFIX_SIZE..),
                })
            }
            other => Err(ProxyError::Status(other)),
        }
    }

    /// Close the session behind `handle`.
    pub fn close_session(&self, handle: SessionHandle) -> Result<CloseOutcome> {
        let session = self.sessions.enter(handle, true)?;
        let record = session.record();

        let exchanged = self.exchange(record, &Command::close_session(record.addr()), &[]);
        let outcome = if record.killed() {
            Err(ProxyError::UncaughtException)
        } else {
            exchanged.and_then(|completion| check_status(completion.code))
        };

        match outcome {
            Err(ProxyError::Status(code::IAC_EXIST_INTERNAL_SESSION)) => {
                info!(%handle, "applet keeps an internal session, handle stays open");
                session.exit();
                Ok(CloseOutcome::InternalSessionPending)
            }
            outcome => {
                session.close();
                outcome.map(|()| CloseOutcome::Closed)
            }
        }
    }

    /// Applet ids resident on `destination`.
    pub fn list_packages(&self, destination: Destination) -> Result<Vec<AppletId>> {
        let completion = self.request(destination, &Command::list_packages(), &[])?;
        check_status(completion.code)?;
        let body = completion
            .body
            .ok_or_else(|| ProxyError::MalformedResponse("package list missing".into()))?;
        parse_package_list(&body).map_err(ProxyError::malformed)
    }

    /// Ask the security domain whether `applet` may run.
    pub fn is_blocked(&self, applet: AppletId) -> Result<bool> {
        match self.check_blocked_state(applet) {
            Ok(()) => Ok(false),
            Err(ProxyError::Status(code::APPLET_BLOCKED)) => Ok(true),
            Err(err) => Err(err),
        }
    }

    fn check_blocked_state(&self, applet: AppletId) -> Result<()> {
        let command = Command::check_blocked_state(applet);
        let completion = self.request(Destination::Svm, &command, &[])?;
        check_status(completion.code)
    }

    /// Download `package`. An already present package counts as success.
    /// Download that tolerates an already-resident package.
    fn provision(&self, destination: Destination, applet: AppletId, package: &[u8]) -> Result<()> {
        match self.download(destination, applet, package) {
            Err(ProxyError::Status(code::PACKAGE_EXIST)) => Ok(()),
            other => other,
        }
    }

    fn download(&self, destination: Destination, applet: AppletId, package: &[u8]) -> Result<()> {
        info!(%destination, %applet, size = package.len(), "downloading applet package");
        let completion = self.request(destination, &Command::download_package(applet), package)?;
        check_status(completion.code)
    }

    /// One exchange on a record registered just for it.
    fn request(
        &self,
        destination: Destination,
        command: &Command,
        payload: &[u8],
    ) -> Result<Completion> {
        let guard = self.registry.register(destination, RecordKind::Transient)?;
        self.exchange(guard.record(), command, payload)
    }

    fn exchange(
        &self,
        record: &ResponseRecord,
        command: &Command,
        payload: &[u8],
    ) -> Result<Completion> {
        let destination = record.destination();
        let seq = record.seq();
        record.arm();
        if let Err(err) = self.transport.submit(destination, command, payload, seq) {
            record.disarm();
            return Err(err.into());
        }
        debug!(%destination, seq, command = command.id.name(), "awaiting response");

        record.wait(self.config.response_timeout).inspect_err(|err| {
            warn!(%destination, seq, error = %err, "no response");
        })
    }
}
