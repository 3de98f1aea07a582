/// Misuse of the pipe's reserve/commit/advance contract.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    /// More bytes were committed than the writer filled into its reservation.
    #[error("commit of {requested} bytes exceeds the {available} bytes filled")]
    CommitOverrun { requested: usize, available: usize },

    /// `advance_to` positions outside the region returned by the last read.
    #[error("advance out of range (consumed {consumed}, examined {examined}, region {len})")]
    AdvanceOutOfRange {
        consumed: usize,
        examined: usize,
        len: usize,
    },
}

/// The downstream consumer refused a message.
#[derive(Debug, thiserror::Error)]
#[error("message sink failed: {0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors that end a pipeline session.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The byte source failed.
    #[error("source error: {0}")]
    Source(#[from] heizwire_transport::TransportError),

    /// Framing failed (message cap exceeded).
    #[error("frame error: {0}")]
    Frame(#[from] heizwire_frame::FrameError),

    /// The message sink gave up.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Pipe contract violation.
    #[error("pipe error: {0}")]
    Pipe(#[from] PipeError),

    /// Session configuration rejected before start.
    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    /// The host stopped waiting for the session.
    #[error("session abandoned before it finished")]
    Abandoned,

    /// A session task panicked or was aborted.
    #[error("session task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
