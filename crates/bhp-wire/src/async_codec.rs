use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_message, Message, DEFAULT_MAX_FRAME};
use crate::error::WireError;

/// `tokio_util` codec over the same frame format as [`crate::MessageReader`].
#[derive(Debug, Clone)]
pub struct BhpCodec {
    max_frame_size: usize,
}

impl BhpCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for BhpCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME)
    }
}

impl Decoder for BhpCodec {
    type Item = Message;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_message(src, self.max_frame_size)
    }
}

impl Encoder<Message> for BhpCodec {
    type Error = WireError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = item.frame();
        if frame.len() > self.max_frame_size {
            return Err(WireError::PayloadTooLarge {
                size: frame.len(),
                max: self.max_frame_size,
            });
        }
        dst.extend_from_slice(frame);
        Ok(())
    }
}
