//! Command ids and typed command bodies.
//!
//! A command frame is `[CommandHeader][body][payload]`: the body is a small
//! fixed-size structure determined by the command id, the payload is the
//! caller's variable-length data (package bytes, init buffer, applet input).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::applet::AppletId;
use crate::error::{Result, WireError};

/// Operation requested by a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    /// Transfer an applet package into the VM.
    DownloadPackage,
    /// Open a session with a resident applet.
    OpenSession,
    /// Close a session.
    CloseSession,
    /// Invoke an applet command within a session.
    SendAndRecv,
    /// List applet packages resident in the VM.
    ListPackages,
    /// Ask the security domain whether an applet is blocked.
    CheckBlockedState,
    /// Any id this host does not issue itself.
    Other(u32),
}

const ID_DOWNLOAD_PACKAGE: u32 = 3;
const ID_OPEN_SESSION: u32 = 4;
const ID_CLOSE_SESSION: u32 = 5;
const ID_SEND_AND_RECV: u32 = 7;
const ID_LIST_PACKAGES: u32 = 25;
const ID_CHECK_BLOCKED_STATE: u32 = 34;

impl From<u32> for CommandId {
    fn from(raw: u32) -> Self {
        match raw {
            ID_DOWNLOAD_PACKAGE => Self::DownloadPackage,
            ID_OPEN_SESSION => Self::OpenSession,
            ID_CLOSE_SESSION => Self::CloseSession,
            ID_SEND_AND_RECV => Self::SendAndRecv,
            ID_LIST_PACKAGES => Self::ListPackages,
            ID_CHECK_BLOCKED_STATE => Self::CheckBlockedState,
            other => Self::Other(other),
        }
    }
}

impl From<CommandId> for u32 {
    fn from(id: CommandId) -> Self {
        match id {
            CommandId::DownloadPackage => ID_DOWNLOAD_PACKAGE,
            CommandId::OpenSession => ID_OPEN_SESSION,
            CommandId::CloseSession => ID_CLOSE_SESSION,
            CommandId::SendAndRecv => ID_SEND_AND_RECV,
            CommandId::ListPackages => ID_LIST_PACKAGES,
            CommandId::CheckBlockedState => ID_CHECK_BLOCKED_STATE,
            CommandId::Other(raw) => raw,
        }
    }
}

impl CommandId {
    /// Human-readable name for logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            Self::DownloadPackage => "download-package",
            Self::OpenSession => "open-session",
            Self::CloseSession => "close-session",
            Self::SendAndRecv => "send-and-recv",
            Self::ListPackages => "list-packages",
            Self::CheckBlockedState => "check-blocked-state",
            Self::Other(_) => "other",
        }
    }
}

/// A command ready to be framed: id plus its fixed-size body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub id: CommandId,
    pub body: Bytes,
}

impl Command {
    pub fn new(id: CommandId, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            body: body.into(),
        }
    }

    pub fn list_packages() -> Self {
        Self::new(CommandId::ListPackages, Bytes::new())
    }

    pub fn download_package(applet: AppletId) -> Self {
        Self::with_applet(CommandId::DownloadPackage, applet)
    }

    pub fn open_session(applet: AppletId) -> Self {
        Self::with_applet(CommandId::OpenSession, applet)
    }

    pub fn check_blocked_state(applet: AppletId) -> Self {
        Self::with_applet(CommandId::CheckBlockedState, applet)
    }

    pub fn close_session(session_addr: u64) -> Self {
        let mut body = BytesMut::with_capacity(8);
        body.put_u64_le(session_addr);
        Self::new(CommandId::CloseSession, body.freeze())
    }

    pub fn send_and_recv(request: SendRecvRequest) -> Self {
        let mut body = BytesMut::with_capacity(SendRecvRequest::SIZE);
        request.write(&mut body);
        Self::new(CommandId::SendAndRecv, body.freeze())
    }

    fn with_applet(id: CommandId, applet: AppletId) -> Self {
        Self::new(id, Bytes::copy_from_slice(applet.as_bytes()))
    }
}

/// Body of a send-and-receive command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendRecvRequest {
    /// Secure-side address of the target session.
    pub session_addr: u64,
    /// Applet-defined sub-command.
    pub command: i32,
    /// Output capacity the caller is prepared to accept.
    pub capacity: u32,
}

impl SendRecvRequest {
    pub const SIZE: usize = 16;

    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < Self::SIZE {
            return Err(WireError::Truncated {
                needed: Self::SIZE,
                available: body.len(),
            });
        }
        let mut buf = &body[..Self::SIZE];
        Ok(Self {
            session_addr: buf.get_u64_le(),
            command: buf.get_i32_le(),
            capacity: buf.get_u32_le(),
        })
    }

    pub fn write(&self, dst: &mut BytesMut) {
        dst.put_u64_le(self.session_addr);
        dst.put_i32_le(self.command);
        dst.put_u32_le(self.capacity);
    }
}

/// Applet id carried by download, open-session and blocked-state bodies.
pub fn parse_applet_body(body: &[u8]) -> Result<AppletId> {
    let raw = body.get(..AppletId::SIZE).ok_or(WireError::Truncated {
        needed: AppletId::SIZE,
        available: body.len(),
    })?;
    AppletId::from_slice(raw)
}

/// Session address carried by a close-session body.
pub fn parse_session_addr(body: &[u8]) -> Result<u64> {
    if body.len() < 8 {
        return Err(WireError::Truncated {
            needed: 8,
            available: body.len(),
        });
    }
    let mut buf = body;
    Ok(buf.get_u64_le())
}
