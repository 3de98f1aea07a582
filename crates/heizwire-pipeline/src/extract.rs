use heizwire_frame::{check_message_size, FrameConfig, Message};
use tracing::{debug, error, trace, warn};

use crate::error::PipelineError;
use crate::pipe::{PipeReader, RegionCursor};
use crate::sink::MessageSink;

/// Summary of one extractor run.
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Messages accepted by the sink.
    pub messages: u64,
    /// Bytes released from the pipe, terminators included.
    pub bytes_consumed: u64,
    /// Unterminated bytes dropped when the writer completed.
    pub discarded: usize,
    pub error: Option<PipelineError>,
}

/// Pull bytes from `reader`, split them into messages and hand each to `sink`.
///
/// Runs until the writer completes and everything it wrote has been searched,
/// or until a framing or sink error. The search resumes where the previous
/// read left off, keeping only the last `terminator.len() - 1` searched bytes
/// in play for a match that straddles the old and new data. The reader is
/// completed on every exit path so a waiting writer is released.
pub async fn drain_pipe<K>(mut reader: PipeReader, sink: &mut K, config: &FrameConfig) -> ExtractReport
where
    K: MessageSink + ?Sized,
{
    let terminator = &config.terminator;
    let mut report = ExtractReport::default();
    // Leading unconsumed bytes already searched without finding a match.
    let mut scanned = 0usize;

    loop {
        let result = reader.read().await;
        let region = &result.buffer;
        let mut consumed = 0usize;
        let mut failure: Option<PipelineError> = None;
        // Both only move forward within one region.
        let mut head = RegionCursor::default();
        let mut search = RegionCursor::default();

        loop {
            let from = consumed + terminator.resume_offset(scanned);
            region.seek(&mut search, from);
            let found = terminator.find_in_at(region.chunks_from(search), search.chunk_start(), from);
            let Some(start) = found else {
                scanned = region.len() - consumed;
                break;
            };

            let end = start + terminator.len();
            if let Err(err) = check_message_size(end - consumed, config) {
                failure = Some(err.into());
                break;
            }
            region.seek(&mut head, consumed);
            let message = Message::new(region.slice_from(head, consumed..end), terminator.len());
            consumed = end;
            scanned = 0;

            trace!(bytes = message.len(), "message extracted");
            if let Err(err) = sink.deliver(message) {
                failure = Some(err.into());
                break;
            }
            report.messages += 1;
        }

        if failure.is_none() {
            if let Err(err) = check_message_size(region.len() - consumed, config) {
                failure = Some(err.into());
            }
        }

        report.bytes_consumed += consumed as u64;
        if let Err(err) = reader.advance(consumed) {
            if failure.is_none() {
                failure = Some(err.into());
            }
        }

        if let Some(err) = failure {
            error!(error = %err, "frame extractor stopped consuming");
            report.error = Some(err);
            break;
        }

        if result.is_completed {
            let leftover = region.len() - consumed;
            if leftover > 0 {
                warn!(bytes = leftover, "discarding unterminated trailing bytes");
                report.discarded = leftover;
            }
            break;
        }
    }

    reader.complete();
    debug!(
        messages = report.messages,
        bytes = report.bytes_consumed,
        "frame extractor stopped"
    );
    report
}
