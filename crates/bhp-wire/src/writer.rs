use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_command, encode_response, FrameConfig, Message};
use crate::command::Command;
use crate::error::{Result, WireError};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> MessageWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Frame and send a command with its trailing payload.
    pub fn send_command(&mut self, seq: u64, command: &Command, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_command(seq, command, payload, &mut self.buf)?;
        self.flush_buffer()
    }

    /// Frame and send a response.
    pub fn send_response(&mut self, seq: u64, addr: u64, code: i32, body: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_response(seq, addr, code, body, &mut self.buf)?;
        self.flush_buffer()
    }

    /// Re-send an already encoded frame.
    pub fn write_message(&mut self, message: &Message) -> Result<()> {
        self.buf.clear();
        self.buf.extend_from_slice(message.frame());
        self.flush_buffer()
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn flush_buffer(&mut self) -> Result<()> {
        if self.buf.len() > self.config.max_frame_size {
            return Err(WireError::PayloadTooLarge {
                size: self.buf.len(),
                max: self.config.max_frame_size,
            });
        }

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(WireError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
        }

        self.flush()
    }
}
