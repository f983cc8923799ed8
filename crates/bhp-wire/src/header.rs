use bytes::{Buf, BufMut, BytesMut};

use crate::applet::AppletId;
use crate::command::CommandId;
use crate::error::{Result, WireError};

/// Magic number carried by every command frame.
pub const COMMAND_MAGIC: u32 = 0x55AA_A3FF;

/// Magic number carried by every response frame.
pub const RESPONSE_MAGIC: u32 = 0x55AA_A5FF;

/// Command header: magic (4) + length (4) + seq (8) + id (4) + pad (4).
pub const COMMAND_HEADER_SIZE: usize = 24;

/// Response header: magic (4) + length (4) + seq (8) + addr (8) + code (4) + pad (4).
pub const RESPONSE_HEADER_SIZE: usize = 32;

/// Smallest prefix that identifies a frame: magic + length.
pub(crate) const PREFIX_SIZE: usize = 8;

/// Header of a command frame (host to secure world).
///
/// ```text
/// ┌────────────┬────────────┬─────────────┬───────────┬─────────┐
/// │ Magic (4B) │ Length     │ Seq         │ Id        │ Pad     │
/// │ 0x55AAA3FF │ (4B LE)    │ (8B LE)     │ (4B LE)   │ (4B)    │
/// └────────────┴────────────┴─────────────┴───────────┴─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    /// Total frame length including this header.
    pub length: u32,
    /// Correlation id echoed back by the matching response.
    pub seq: u64,
    /// Requested operation.
    pub id: CommandId,
}

/// Header of a response frame (secure world to host).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Total frame length including this header.
    pub length: u32,
    /// Sequence number of the command this answers.
    pub seq: u64,
    /// Secure-side address of the session, for session responses.
    pub addr: u64,
    /// Signed result code.
    pub code: i32,
}

impl CommandHeader {
    /// Parse a command header, validating length before the magic.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < COMMAND_HEADER_SIZE {
            return Err(WireError::Truncated {
                needed: COMMAND_HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let mut buf = &bytes[..COMMAND_HEADER_SIZE];
        let magic = buf.get_u32_le();
        if magic != COMMAND_MAGIC {
            return Err(WireError::InvalidMagic { found: magic });
        }
        let length = buf.get_u32_le();
        if (length as usize) < COMMAND_HEADER_SIZE {
            return Err(WireError::InvalidLength {
                length: length as usize,
                min: COMMAND_HEADER_SIZE,
            });
        }
        let seq = buf.get_u64_le();
        let id = CommandId::from(buf.get_u32_le());

        Ok(Self { length, seq, id })
    }

    /// Append this header to `dst`.
    pub fn write(&self, dst: &mut BytesMut) {
        dst.put_u32_le(COMMAND_MAGIC);
        dst.put_u32_le(self.length);
        dst.put_u64_le(self.seq);
        dst.put_u32_le(u32::from(self.id));
        dst.put_bytes(0, 4);
    }

    /// True for open-session commands.
    pub fn is_open_session(&self) -> bool {
        self.id == CommandId::OpenSession
    }
}

impl ResponseHeader {
    /// Parse a response header, validating length before the magic.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RESPONSE_HEADER_SIZE {
            return Err(WireError::Truncated {
                needed: RESPONSE_HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let mut buf = &bytes[..RESPONSE_HEADER_SIZE];
        let magic = buf.get_u32_le();
        if magic != RESPONSE_MAGIC {
            return Err(WireError::InvalidMagic { found: magic });
        }
        let length = buf.get_u32_le();
        if (length as usize) < RESPONSE_HEADER_SIZE {
            return Err(WireError::InvalidLength {
                length: length as usize,
                min: RESPONSE_HEADER_SIZE,
            });
        }
        let seq = buf.get_u64_le();
        let addr = buf.get_u64_le();
        let code = buf.get_i32_le();

        Ok(Self {
            length,
            seq,
            addr,
            code,
        })
    }

    /// Append this header to `dst`.
    pub fn write(&self, dst: &mut BytesMut) {
        dst.put_u32_le(RESPONSE_MAGIC);
        dst.put_u32_le(self.length);
        dst.put_u64_le(self.seq);
        dst.put_u64_le(self.addr);
        dst.put_i32_le(self.code);
        dst.put_bytes(0, 4);
    }
}

/// True if `bytes` is long enough for a command header and carries the command magic.
pub fn is_command(bytes: &[u8]) -> bool {
    bytes.len() >= COMMAND_HEADER_SIZE && read_magic(bytes) == Some(COMMAND_MAGIC)
}

/// True if `bytes` is long enough for a response header and carries the response magic.
pub fn is_response(bytes: &[u8]) -> bool {
    bytes.len() >= RESPONSE_HEADER_SIZE && read_magic(bytes) == Some(RESPONSE_MAGIC)
}

/// Typed view of a command frame's header.
pub fn command_header(bytes: &[u8]) -> Result<CommandHeader> {
    CommandHeader::parse(bytes)
}

/// Typed view of a response frame's header.
pub fn response_header(bytes: &[u8]) -> Result<ResponseHeader> {
    ResponseHeader::parse(bytes)
}

/// Applet id embedded in an open-session command.
///
/// `frame` is the whole command frame. Only the first `header.length`
/// bytes belong to the command; bytes past the declared length are never
/// read. Any other command id is a `MalformedBody` error.
pub fn open_session_applet_id(header: &CommandHeader, frame: &[u8]) -> Result<AppletId> {
    if !header.is_open_session() {
        return Err(WireError::MalformedBody(format!(
            "command {} carries no applet id",
            u32::from(header.id)
        )));
    }
    let needed = COMMAND_HEADER_SIZE + AppletId::SIZE;
    let available = frame.len().min(header.length as usize);
    if available < needed {
        return Err(WireError::Truncated { needed, available });
    }
    AppletId::from_slice(&frame[COMMAND_HEADER_SIZE..needed])
}

pub(crate) fn read_magic(bytes: &[u8]) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

pub(crate) fn read_length(bytes: &[u8]) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(4..8)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}
