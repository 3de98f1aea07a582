use bytes::{Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::terminator::Terminator;

/// Default cap on unterminated data: 16 KiB.
///
/// Controller records are a few hundred bytes; anything this long without a
/// terminator means the stream is garbage.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024;

/// One complete record, terminator included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    bytes: Bytes,
    terminator_len: usize,
}

impl Message {
    /// Wrap raw message bytes that end with a terminator of `terminator_len` bytes.
    pub fn new(bytes: impl Into<Bytes>, terminator_len: usize) -> Self {
        let bytes = bytes.into();
        debug_assert!(terminator_len <= bytes.len());
        Self {
            bytes,
            terminator_len,
        }
    }

    /// The full message, terminator included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The message without its trailing terminator.
    pub fn body(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - self.terminator_len]
    }

    /// Total size on the wire.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consume the message and return its bytes.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// Configuration for message extraction.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Sequence that ends every message. Default: `;22;1;%;`.
    pub terminator: Terminator,
    /// Maximum message size in bytes, terminator included. Default: 16 KiB.
    pub max_message_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            terminator: Terminator::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Fail once `size` bytes are pending without fitting in one message.
pub fn check_message_size(size: usize, config: &FrameConfig) -> Result<()> {
    if size > config.max_message_size {
        return Err(FrameError::MessageTooLarge {
            size,
            max: config.max_message_size,
        });
    }
    Ok(())
}

/// Decode one message from the front of `src`.
///
/// Returns `Ok(None)` if `src` holds no terminator yet. On success the message
/// bytes are split off `src`. This scans from the start of `src` every call;
/// use a [`MessageScanner`] when feeding a growing buffer.
pub fn decode_message(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Message>> {
    MessageScanner::new().decode(src, config)
}

/// Incremental decoder that remembers how far a buffer was already searched.
///
/// Bytes that were scanned without producing a match are not scanned again,
/// apart from the last `terminator.len() - 1` which may start a match that
/// completes in later data.
#[derive(Debug, Clone, Default)]
pub struct MessageScanner {
    scanned: usize,
}

impl MessageScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next message from `src`, or `Ok(None)` if more data is needed.
    pub fn decode(&mut self, src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Message>> {
        let terminator = &config.terminator;
        let from = terminator.resume_offset(self.scanned.min(src.len()));

        match terminator.find(&src[..], from) {
            Some(start) => {
                let end = start + terminator.len();
                self.scanned = 0;
                check_message_size(end, config)?;
                let bytes = src.split_to(end).freeze();
                Ok(Some(Message::new(bytes, terminator.len())))
            }
            None => {
                self.scanned = src.len();
                check_message_size(src.len(), config)?;
                Ok(None)
            }
        }
    }

    /// Forget scan progress, e.g. after the caller cleared the buffer.
    pub fn reset(&mut self) {
        self.scanned = 0;
    }
}

/// `tokio_util` codec yielding [`Message`]s from any `AsyncRead`.
///
/// At end-of-stream, trailing bytes without a terminator are dropped rather
/// than reported as an error.
#[cfg(feature = "async")]
#[derive(Debug, Clone, Default)]
pub struct TerminatorCodec {
    config: FrameConfig,
    scanner: MessageScanner,
}

#[cfg(feature = "async")]
impl TerminatorCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            scanner: MessageScanner::new(),
        }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Decoder for TerminatorCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        self.scanner.decode(src, &self.config)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Message>> {
        if let Some(message) = self.decode(buf)? {
            return Ok(Some(message));
        }
        if !buf.is_empty() {
            tracing::debug!(discarded = buf.len(), "dropping unterminated trailing bytes");
            buf.clear();
            self.scanner.reset();
        }
        Ok(None)
    }
}
