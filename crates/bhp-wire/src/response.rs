//! Response body layouts.
//!
//! Send-and-receive bodies use big-endian fields, unlike the frame headers.

use bytes::{Buf, BufMut, BytesMut};

use crate::applet::AppletId;
use crate::error::{Result, WireError};

/// Parse a list-packages body: `count: u32 LE` followed by `count` applet ids.
///
/// An empty list or a length that disagrees with `count` is malformed.
pub fn parse_package_list(body: &[u8]) -> Result<Vec<AppletId>> {
    if body.len() < 4 {
        return Err(WireError::Truncated {
            needed: 4,
            available: body.len(),
        });
    }
    let mut buf = body;
    let count = buf.get_u32_le() as usize;
    if count == 0 {
        return Err(WireError::MalformedBody("package list is empty".to_string()));
    }

    let expected = count
        .checked_mul(AppletId::SIZE)
        .and_then(|ids| ids.checked_add(4))
        .ok_or_else(|| WireError::MalformedBody(format!("package count {count} overflows")))?;
    if body.len() != expected {
        return Err(WireError::MalformedBody(format!(
            "package list of {count} entries must be {expected} bytes, got {}",
            body.len()
        )));
    }

    buf.chunks_exact(AppletId::SIZE)
        .map(AppletId::from_slice)
        .collect()
}

/// Encode a list-packages body.
pub fn encode_package_list(ids: &[AppletId], dst: &mut BytesMut) {
    dst.reserve(4 + ids.len() * AppletId::SIZE);
    dst.put_u32_le(ids.len() as u32);
    for id in ids {
        dst.put_slice(id.as_bytes());
    }
}

/// Successful send-and-receive body: applet response code plus output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendRecvBody<'a> {
    pub response_code: i32,
    pub output: &'a [u8],
}

impl<'a> SendRecvBody<'a> {
    /// Size of the fixed prefix preceding the output bytes.
    pub const PREFIX_SIZE: usize = 4;

    pub fn parse(body: &'a [u8]) -> Result<Self> {
        if body.len() < Self::PREFIX_SIZE {
            return Err(WireError::Truncated {
                needed: Self::PREFIX_SIZE,
                available: body.len(),
            });
        }
        let mut prefix = &body[..Self::PREFIX_SIZE];
        Ok(Self {
            response_code: prefix.get_i32(),
            output: &body[Self::PREFIX_SIZE..],
        })
    }

    pub fn write(&self, dst: &mut BytesMut) {
        dst.put_i32(self.response_code);
        dst.put_slice(self.output);
    }
}

/// "Output buffer too small" body: the capacity the applet actually needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTooSmall {
    pub response_code: i32,
    pub required: u32,
}

impl BufferTooSmall {
    pub const SIZE: usize = 8;

    /// Parse the sentinel body; it must be exactly [`Self::SIZE`] bytes.
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() != Self::SIZE {
            return Err(WireError::MalformedBody(format!(
                "buffer-too-small body must be {} bytes, got {}",
                Self::SIZE,
                body.len()
            )));
        }
        let mut buf = body;
        Ok(Self {
            response_code: buf.get_i32(),
            required: buf.get_u32(),
        })
    }

    pub fn write(&self, dst: &mut BytesMut) {
        dst.put_i32(self.response_code);
        dst.put_u32(self.required);
    }
}
