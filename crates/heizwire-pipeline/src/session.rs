//! Pipeline coordinator: one pump task, one extractor task, one supervisor.

use std::fmt;

use heizwire_frame::FrameConfig;
use heizwire_transport::ByteSource;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::error::{PipelineError, Result};
use crate::extract::{drain_pipe, ExtractReport};
use crate::pipe::{pipe, PipeOptions};
use crate::pump::{fill_pipe, PumpOutcome, PumpReport};
use crate::sink::MessageSink;
use crate::state::{PipelineState, StateCell};

/// Spare capacity requested from the pipe before every device read.
pub const DEFAULT_MINIMUM_READ_SIZE: usize = 750;

/// Everything a session needs besides its source and sink.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub pipe: PipeOptions,
    pub frame: FrameConfig,
    /// Minimum spare bytes reserved per read. Default: 750.
    pub minimum_read_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pipe: PipeOptions::default(),
            frame: FrameConfig::default(),
            minimum_read_size: DEFAULT_MINIMUM_READ_SIZE,
        }
    }
}

impl SessionConfig {
    /// Reject combinations that could stall the pipe.
    ///
    /// The extractor keeps at most `max_message_size` unconsumed bytes, so that
    /// cap has to sit below the resume threshold or a paused writer would
    /// never be woken.
    pub fn validate(&self) -> Result<()> {
        let pipe = &self.pipe;
        let frame = &self.frame;

        if self.minimum_read_size == 0 {
            return Err(invalid("minimum_read_size must be positive"));
        }
        if pipe.resume_writer_threshold == 0
            || pipe.resume_writer_threshold > pipe.pause_writer_threshold
        {
            return Err(invalid(format!(
                "resume threshold {} must be in 1..={}",
                pipe.resume_writer_threshold, pipe.pause_writer_threshold
            )));
        }
        if frame.max_message_size < frame.terminator.len() {
            return Err(invalid(format!(
                "max_message_size {} is shorter than the {}-byte terminator",
                frame.max_message_size,
                frame.terminator.len()
            )));
        }
        if frame.max_message_size >= pipe.resume_writer_threshold {
            return Err(invalid(format!(
                "max_message_size {} must be below the resume threshold {}",
                frame.max_message_size, pipe.resume_writer_threshold
            )));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> PipelineError {
    PipelineError::InvalidConfig(message.into())
}

/// Final accounting of a finished session.
#[derive(Debug)]
pub struct SessionReport<S> {
    pub state: PipelineState,
    /// Why the pump stopped.
    pub stop: PumpOutcome,
    pub bytes_read: u64,
    pub messages: u64,
    /// Unterminated bytes dropped at end of stream.
    pub discarded_bytes: usize,
    /// First error that ended the session, if any.
    pub error: Option<PipelineError>,
    /// The byte source, handed back to the caller. `None` only if the pump
    /// task panicked.
    pub source: Option<S>,
}

/// Start a session over `source` on the current tokio runtime.
///
/// Returns as soon as the tasks are spawned. Cancelling `shutdown` stops the
/// pump (interrupting a pending read); the extractor then drains whatever was
/// committed and the session completes. An extractor failure interrupts the
/// pump the same way, so a quiet device never keeps a failed session alive.
pub fn start<S, K>(
    source: S,
    sink: K,
    config: SessionConfig,
    shutdown: CancellationToken,
) -> Result<SessionHandle<S>>
where
    S: ByteSource + 'static,
    K: MessageSink + 'static,
{
    config.validate()?;

    let span = info_span!("session", source = %source.id());
    let state = StateCell::new();
    let (writer, reader) = pipe(config.pipe);
    let SessionConfig {
        frame,
        minimum_read_size,
        ..
    } = config;

    span.in_scope(|| {
        info!(
            minimum_read_size,
            max_message_size = frame.max_message_size,
            "session started"
        )
    });

    // Stops the pump on host shutdown or when the extractor gives up.
    let pump_stop = shutdown.child_token();

    let pump = {
        let state = state.clone();
        let shutdown = shutdown.clone();
        let pump_stop = pump_stop.clone();
        let mut source = source;
        tokio::spawn(
            async move {
                let mut report = fill_pipe(&mut source, writer, &pump_stop, minimum_read_size).await;
                if report.outcome == PumpOutcome::Cancelled && !shutdown.is_cancelled() {
                    report.outcome = PumpOutcome::ReaderCompleted;
                }
                if report.outcome == PumpOutcome::Failed {
                    state.transition(PipelineState::Failed);
                } else {
                    state.transition(PipelineState::Draining);
                }
                (source, report)
            }
            .instrument(span.clone()),
        )
    };

    let extract = {
        let state = state.clone();
        let mut sink = sink;
        tokio::spawn(
            async move {
                let report = drain_pipe(reader, &mut sink, &frame).await;
                if report.error.is_some() {
                    state.transition(PipelineState::Failed);
                    pump_stop.cancel();
                }
                report
            }
            .instrument(span.clone()),
        )
    };

    let supervisor = {
        let state = state.clone();
        tokio::spawn(async move { supervise(pump, extract, state).await }.instrument(span))
    };

    Ok(SessionHandle {
        state,
        supervisor,
        shutdown,
    })
}

async fn supervise<S>(
    pump: JoinHandle<(S, PumpReport)>,
    extract: JoinHandle<ExtractReport>,
    state: StateCell,
) -> SessionReport<S> {
    let (pump, extract) = tokio::join!(pump, extract);

    let (source, pump) = match pump {
        Ok((source, report)) => (Some(source), report),
        Err(err) => (
            None,
            PumpReport {
                outcome: PumpOutcome::Failed,
                bytes_read: 0,
                error: Some(PipelineError::Join(err.to_string())),
            },
        ),
    };
    let extract = extract.unwrap_or_else(|err| ExtractReport {
        error: Some(PipelineError::Join(err.to_string())),
        ..ExtractReport::default()
    });

    let error = pump.error.or(extract.error);
    state.transition(if error.is_some() {
        PipelineState::Failed
    } else {
        PipelineState::Completed
    });

    let report = SessionReport {
        state: state.get(),
        stop: pump.outcome,
        bytes_read: pump.bytes_read,
        messages: extract.messages,
        discarded_bytes: extract.discarded,
        error,
        source,
    };
    info!(
        state = ?report.state,
        stop = ?report.stop,
        bytes = report.bytes_read,
        messages = report.messages,
        "session stopped"
    );
    report
}

/// Host-side handle to a running session.
pub struct SessionHandle<S> {
    state: StateCell,
    supervisor: JoinHandle<SessionReport<S>>,
    shutdown: CancellationToken,
}

impl<S> SessionHandle<S> {
    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    /// Subscribe to state changes.
    pub fn watch_state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Request a graceful stop; same as cancelling the session's shutdown token.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for both tasks to finish.
    pub async fn wait(self) -> Result<SessionReport<S>> {
        self.supervisor
            .await
            .map_err(|err| PipelineError::Join(err.to_string()))
    }

    /// Wait for the session, but give up as soon as `kill` fires.
    ///
    /// Giving up detaches the tasks; they keep running until their pending
    /// read returns. The source is not handed back in that case.
    pub async fn wait_or_kill(self, kill: &CancellationToken) -> Result<SessionReport<S>> {
        let mut supervisor = self.supervisor;
        tokio::select! {
            biased;
            joined = &mut supervisor => joined.map_err(|err| PipelineError::Join(err.to_string())),
            _ = kill.cancelled() => {
                warn!(state = ?self.state.get(), "kill requested, abandoning session");
                Err(PipelineError::Abandoned)
            }
        }
    }
}

impl<S> fmt::Debug for SessionHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("state", &self.state.get())
            .field("shutdown_requested", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}
