use std::io::ErrorKind;

use heizwire_transport::{ByteSource, TransportError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::error::PipelineError;
use crate::pipe::PipeWriter;

/// Why the byte pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The source returned a zero-byte read.
    EndOfStream,
    /// The shutdown token fired.
    Cancelled,
    /// The extractor stopped consuming.
    ReaderCompleted,
    /// The source (or the pipe) reported an error.
    Failed,
}

/// Summary of one pump run.
#[derive(Debug)]
pub struct PumpReport {
    pub outcome: PumpOutcome,
    pub bytes_read: u64,
    /// Set when `outcome` is [`PumpOutcome::Failed`].
    pub error: Option<PipelineError>,
}

/// Copy bytes from `source` into `writer` until told to stop.
///
/// Every iteration reserves at least `minimum_read_size` bytes, issues exactly
/// one read and publishes what arrived. Both the reservation wait and the
/// read race against `shutdown`, so cancelling never waits for more than the
/// read already in flight. The writer is completed on every exit path.
pub async fn fill_pipe<S>(
    source: &mut S,
    mut writer: PipeWriter,
    shutdown: &CancellationToken,
    minimum_read_size: usize,
) -> PumpReport
where
    S: ByteSource,
{
    let mut bytes_read = 0u64;
    let mut failure = None;

    let outcome = loop {
        if shutdown.is_cancelled() {
            break PumpOutcome::Cancelled;
        }

        let reserved = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            buf = writer.reserve(minimum_read_size) => Some(buf),
        };
        let Some(buf) = reserved else {
            break PumpOutcome::Cancelled;
        };

        let read = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            read = source.read_into(buf) => Some(read),
        };

        let n = match read {
            None => break PumpOutcome::Cancelled,
            Some(Ok(0)) => break PumpOutcome::EndOfStream,
            Some(Ok(n)) => n,
            Some(Err(err)) if err.kind() == ErrorKind::Interrupted => continue,
            Some(Err(err)) => {
                error!(source = source.id(), error = %err, "reading from byte source failed");
                failure = Some(PipelineError::Source(TransportError::Io(err)));
                break PumpOutcome::Failed;
            }
        };

        if let Err(err) = writer.commit(n) {
            error!(source = source.id(), error = %err, "byte source over-reported a read");
            failure = Some(PipelineError::Pipe(err));
            break PumpOutcome::Failed;
        }
        bytes_read += n as u64;
        trace!(bytes = n, "chunk committed");

        if writer.flush().is_completed {
            break PumpOutcome::ReaderCompleted;
        }
    };

    writer.complete();
    debug!(?outcome, bytes_read, "byte pump stopped");

    PumpReport {
        outcome,
        bytes_read,
        error: failure,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::pipe::{pipe, PipeOptions};
    use crate::test_support::{AfterChunks, ScriptedSource};

    #[tokio::test]
    async fn zero_byte_read_ends_stream() {
        let (writer, mut reader) = pipe(PipeOptions::default());
        let mut source = ScriptedSource::new([b"A;22;1;%;"], AfterChunks::Eof);

        let report = fill_pipe(&mut source, writer, &CancellationToken::new(), 750).await;

        assert_eq!(report.outcome, PumpOutcome::EndOfStream);
        assert_eq!(report.bytes_read, 9);
        assert!(report.error.is_none());

        let result = reader.read().await;
        assert!(result.is_completed);
        assert_eq!(result.buffer.to_bytes().as_ref(), b"A;22;1;%;");
    }

    #[tokio::test]
    async fn io_error_completes_writer_and_reports_failure() {
        let (writer, mut reader) = pipe(PipeOptions::default());
        let mut source = ScriptedSource::new([b"B;22"], AfterChunks::Fail(ErrorKind::BrokenPipe));

        let report = fill_pipe(&mut source, writer, &CancellationToken::new(), 750).await;

        assert_eq!(report.outcome, PumpOutcome::Failed);
        assert!(matches!(
            report.error,
            Some(PipelineError::Source(TransportError::Io(ref e))) if e.kind() == ErrorKind::BrokenPipe
        ));

        let result = reader.read().await;
        assert!(result.is_completed);
        assert_eq!(result.buffer.len(), 4);
    }

    #[tokio::test]
    async fn interrupted_read_is_retried() {
        let (writer, mut reader) = pipe(PipeOptions::default());
        let mut source = ScriptedSource::new([b"A;22;1;%;"], AfterChunks::Eof)
            .with_leading_error(ErrorKind::Interrupted);

        let report = fill_pipe(&mut source, writer, &CancellationToken::new(), 16).await;

        assert_eq!(report.outcome, PumpOutcome::EndOfStream);
        assert_eq!(report.bytes_read, 9);
        assert_eq!(source.reads, 3);
        assert_eq!(reader.read().await.buffer.len(), 9);
    }

    #[tokio::test]
    async fn shutdown_interrupts_pending_read() {
        let (writer, mut reader) = pipe(PipeOptions::default());
        let mut source = ScriptedSource::new([b"x"], AfterChunks::Hang);
        let shutdown = CancellationToken::new();

        let cancel = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let report = tokio::time::timeout(
            Duration::from_secs(1),
            fill_pipe(&mut source, writer, &shutdown, 750),
        )
        .await
        .expect("pump must stop within one read");

        assert_eq!(report.outcome, PumpOutcome::Cancelled);
        assert!(reader.read().await.is_completed);
    }

    #[tokio::test]
    async fn already_cancelled_never_reads() {
        let (writer, _reader) = pipe(PipeOptions::default());
        let mut source = ScriptedSource::new([b"never"], AfterChunks::Eof);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let report = fill_pipe(&mut source, writer, &shutdown, 750).await;
        assert_eq!(report.outcome, PumpOutcome::Cancelled);
        assert_eq!(source.reads, 0);
    }

    #[tokio::test]
    async fn completed_reader_stops_pump() {
        let (writer, mut reader) = pipe(PipeOptions::default());
        reader.complete();
        let mut source = ScriptedSource::new([b"one", b"two"], AfterChunks::Hang);

        let report = fill_pipe(&mut source, writer, &CancellationToken::new(), 750).await;
        assert_eq!(report.outcome, PumpOutcome::ReaderCompleted);
        assert_eq!(source.reads, 1);
    }

    #[tokio::test]
    async fn shutdown_releases_pump_paused_on_full_pipe() {
        let options = PipeOptions {
            pause_writer_threshold: 4,
            resume_writer_threshold: 2,
        };
        let (writer, _reader) = pipe(options);
        let mut source = ScriptedSource::new([b"full", b"more"], AfterChunks::Eof);
        let shutdown = CancellationToken::new();

        let cancel = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let report = tokio::time::timeout(
            Duration::from_secs(1),
            fill_pipe(&mut source, writer, &shutdown, 750),
        )
        .await
        .expect("paused pump must observe shutdown");
        assert_eq!(report.outcome, PumpOutcome::Cancelled);
        assert_eq!(report.bytes_read, 4);
    }
}
