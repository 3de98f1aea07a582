//! Streaming ingestion pipeline for the heating controller's serial feed.
//!
//! A session runs two tasks joined by a bounded [`pipe`]:
//! - the byte pump ([`fill_pipe`]) copies whatever the device delivers into the
//!   pipe, pausing when the reader falls behind;
//! - the frame extractor ([`drain_pipe`]) searches the buffered bytes for the
//!   terminator and hands each complete message to a [`MessageSink`].
//!
//! [`start`] wires both together under one shutdown token and returns a
//! [`SessionHandle`] the host can wait on (or stop waiting on).

pub mod error;
pub mod extract;
pub mod pipe;
pub mod pump;
pub mod session;
pub mod sink;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{PipeError, PipelineError, Result, SinkError};
pub use extract::{drain_pipe, ExtractReport};
pub use pipe::{
    pipe, FlushResult, PipeOptions, PipeReader, PipeWriter, ReadResult, ReadableRegion, RegionCursor,
};
pub use pump::{fill_pipe, PumpOutcome, PumpReport};
pub use session::{start, SessionConfig, SessionHandle, SessionReport, DEFAULT_MINIMUM_READ_SIZE};
pub use sink::{channel_sink, MessageSink};
pub use state::PipelineState;
