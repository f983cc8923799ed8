//! Command/response framing for the BHP host proxy protocol.
//!
//! Every frame starts with a fixed header that identifies its direction:
//! - command frames carry the magic `0x55AAA3FF`, a total length, a
//!   sequence number and a command id, followed by a command body and an
//!   optional caller payload;
//! - response frames carry the magic `0x55AAA5FF`, a total length, the
//!   sequence number of the command they answer, the session address and a
//!   signed result code, followed by a response body.
//!
//! Length is always validated before any field beyond it is read.

pub mod applet;
#[cfg(feature = "async")]
pub mod async_codec;
pub mod code;
pub mod codec;
pub mod command;
pub mod error;
pub mod header;
pub mod reader;
pub mod response;
pub mod writer;

pub use applet::AppletId;
#[cfg(feature = "async")]
pub use async_codec::BhpCodec;
pub use codec::{
    decode_message, encode_command, encode_response, FrameConfig, Message, DEFAULT_MAX_FRAME,
};
pub use command::{Command, CommandId, SendRecvRequest};
pub use error::{Result, WireError};
pub use header::{
    command_header, is_command, is_response, open_session_applet_id, response_header,
    CommandHeader, ResponseHeader, COMMAND_HEADER_SIZE, COMMAND_MAGIC, RESPONSE_HEADER_SIZE,
    RESPONSE_MAGIC,
};
pub use reader::MessageReader;
pub use response::{parse_package_list, BufferTooSmall, SendRecvBody};
pub use writer::MessageWriter;
