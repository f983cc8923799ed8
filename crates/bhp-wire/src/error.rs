/// Errors that can occur while encoding, decoding, or inspecting frames.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The frame does not start with a command or response magic number.
    #[error("invalid frame magic 0x{found:08x}")]
    InvalidMagic { found: u32 },

    /// The buffer ends before the structure being read.
    #[error("frame truncated ({available} bytes, need {needed})")]
    Truncated { needed: usize, available: usize },

    /// The header declares a length shorter than the header itself.
    #[error("invalid frame length {length} (min {min})")]
    InvalidLength { length: usize, min: usize },

    /// The frame exceeds the configured or representable maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A command or response body does not match its expected layout.
    #[error("malformed body: {0}")]
    MalformedBody(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, WireError>;
