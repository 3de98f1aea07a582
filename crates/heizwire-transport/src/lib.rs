//! Byte source abstraction for heizwire.
//!
//! Provides the lowest layer of the ingestion pipeline:
//! - [`ByteSource`], the pull-based read contract the byte pump drives
//! - [`AsyncReadSource`], an adapter for any `tokio::io::AsyncRead`
//! - [`SerialDevice`], a raw-mode tty opened at a fixed baud rate (Unix)
//!
//! Opening and closing a device is the caller's business. The pipeline only
//! borrows a source for reads and hands it back when a session ends.

pub mod error;
pub mod source;

#[cfg(unix)]
pub mod serial;

pub use error::{Result, TransportError};

/// Baud rate the heating controller talks at out of the box.
pub const DEFAULT_BAUD_RATE: u32 = 57_600;
pub use source::{AsyncReadSource, ByteSource};

#[cfg(unix)]
pub use serial::{SerialConfig, SerialDevice};
