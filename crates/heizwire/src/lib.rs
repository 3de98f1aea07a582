//! Ingest terminator-delimited telemetry from a heating controller's serial port.
//!
//! heizwire reads raw bytes from a serial device, buffers them with
//! backpressure and splits them into `;22;1;%;`-terminated messages.
//!
//! # Crate Structure
//!
//! - [`transport`]: Byte sources: the `ByteSource` trait, `AsyncRead` adapter, raw serial tty
//! - [`frame`]: Terminator search, message type and size limits (codec behind `async`)
//! - [`pipeline`]: Shared pipe, byte pump, frame extractor and session coordinator

/// Re-export transport types.
pub mod transport {
    pub use heizwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use heizwire_frame::*;
}

/// Re-export pipeline types.
pub mod pipeline {
    pub use heizwire_pipeline::*;
}
