//! Terminator-delimited message framing for the heating controller protocol.
//!
//! The controller emits an endless stream of records, each ending with the
//! fixed sequence `;22;1;%;`. This crate finds those boundaries:
//! - [`Terminator`] searches for the sequence across chunk seams
//! - [`decode_message`] / [`MessageScanner`] cut messages off a `BytesMut`
//! - [`TerminatorCodec`] plugs the same rules into `tokio_util::codec`
//!   (behind the `async` feature)
//!
//! Messages keep their terminator. What the payload means is up to the caller.

pub mod codec;
pub mod error;
pub mod terminator;

pub use codec::{
    check_message_size, decode_message, FrameConfig, Message, MessageScanner,
    DEFAULT_MAX_MESSAGE_SIZE,
};
#[cfg(feature = "async")]
pub use codec::TerminatorCodec;
pub use error::{FrameError, Result};
pub use terminator::{Terminator, DEFAULT_TERMINATOR};
