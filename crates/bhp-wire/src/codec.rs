use bytes::{Bytes, BytesMut};

use crate::command::Command;
use crate::error::{Result, WireError};
use crate::header::{
    read_length, read_magic, CommandHeader, ResponseHeader, COMMAND_HEADER_SIZE, COMMAND_MAGIC,
    PREFIX_SIZE, RESPONSE_HEADER_SIZE, RESPONSE_MAGIC,
};

/// Default maximum frame size: 16 MiB.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// A decoded frame of either direction, holding its complete wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Command { header: CommandHeader, frame: Bytes },
    Response { header: ResponseHeader, frame: Bytes },
}

impl Message {
    /// Sequence number of the frame.
    pub fn seq(&self) -> u64 {
        match self {
            Self::Command { header, .. } => header.seq,
            Self::Response { header, .. } => header.seq,
        }
    }

    /// Complete wire bytes, header included.
    pub fn frame(&self) -> &Bytes {
        match self {
            Self::Command { frame, .. } | Self::Response { frame, .. } => frame,
        }
    }

    /// Bytes following the header.
    pub fn body(&self) -> Bytes {
        match self {
            Self::Command { frame, .. } => frame.slice(COMMAND_HEADER_SIZE..),
            Self::Response { frame, .. } => frame.slice(RESPONSE_HEADER_SIZE..),
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Self::Response { .. })
    }
}

/// Encode a command frame into `dst`.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬──────────────────┬────────────────────┐
/// │ CommandHeader    │ Body             │ Payload            │
/// │ (24B)            │ (per command id) │ (caller data)      │
/// └──────────────────┴──────────────────┴────────────────────┘
/// ```
pub fn encode_command(
    seq: u64,
    command: &Command,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    let total = COMMAND_HEADER_SIZE + command.body.len() + payload.len();
    let length = frame_length(total)?;

    dst.reserve(total);
    CommandHeader {
        length,
        seq,
        id: command.id,
    }
    .write(dst);
    dst.extend_from_slice(&command.body);
    dst.extend_from_slice(payload);
    Ok(())
}

/// Encode a response frame into `dst`.
pub fn encode_response(
    seq: u64,
    addr: u64,
    code: i32,
    body: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    let total = RESPONSE_HEADER_SIZE + body.len();
    let length = frame_length(total)?;

    dst.reserve(total);
    ResponseHeader {
        length,
        seq,
        addr,
        code,
    }
    .write(dst);
    dst.extend_from_slice(body);
    Ok(())
}

/// Decode one frame of either direction from a stream buffer.
///
/// Returns `Ok(None)` until the buffer holds a complete frame. On success,
/// the frame bytes are consumed from `src`.
pub fn decode_message(src: &mut BytesMut, max_frame: usize) -> Result<Option<Message>> {
    let (Some(magic), Some(length)) = (read_magic(src), read_length(src)) else {
        return Ok(None); // Need more data
    };
    debug_assert!(src.len() >= PREFIX_SIZE);

    let header_size = match magic {
        COMMAND_MAGIC => COMMAND_HEADER_SIZE,
        RESPONSE_MAGIC => RESPONSE_HEADER_SIZE,
        found => return Err(WireError::InvalidMagic { found }),
    };

    let length = length as usize;
    if length < header_size {
        return Err(WireError::InvalidLength {
            length,
            min: header_size,
        });
    }
    if length > max_frame {
        return Err(WireError::PayloadTooLarge {
            size: length,
            max: max_frame,
        });
    }
    if src.len() < length {
        return Ok(None); // Need more data
    }

    let frame = src.split_to(length).freeze();
    let message = if magic == COMMAND_MAGIC {
        Message::Command {
            header: CommandHeader::parse(&frame)?,
            frame,
        }
    } else {
        Message::Response {
            header: ResponseHeader::parse(&frame)?,
            frame,
        }
    };
    Ok(Some(message))
}

fn frame_length(total: usize) -> Result<u32> {
    u32::try_from(total).map_err(|_| WireError::PayloadTooLarge {
        size: total,
        max: u32::MAX as usize,
    })
}

/// Configuration for framed stream I/O.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum frame size in bytes, header included. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
