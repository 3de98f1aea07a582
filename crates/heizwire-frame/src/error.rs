/// Errors that can occur while cutting messages out of the byte stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A terminator must contain at least one byte.
    #[error("terminator sequence must not be empty")]
    EmptyTerminator,

    /// A message, or unterminated data, grew past the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading the stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
