//! Single-writer/single-reader byte pipe with backpressure.
//!
//! The writer fills a private scratch buffer (`reserve`), publishes what it
//! filled as an immutable chunk (`commit`) and wakes the reader (`flush`).
//! The reader sees every unconsumed chunk as one [`ReadableRegion`], consumes
//! from the head (`advance`) and may leave a partial tail for the next read.
//!
//! ```text
//!   writer ──reserve/commit──▶ [chunk][chunk][chunk] ──read/advance──▶ reader
//!            (pauses when unread ≥ pause threshold, resumes below resume threshold)
//! ```

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::PipeError;

/// Unread bytes at which the writer is paused: 64 KiB.
pub const DEFAULT_PAUSE_WRITER_THRESHOLD: usize = 64 * 1024;

/// Unread bytes below which a paused writer resumes: 32 KiB.
pub const DEFAULT_RESUME_WRITER_THRESHOLD: usize = 32 * 1024;

/// Flow control limits for a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeOptions {
    pub pause_writer_threshold: usize,
    pub resume_writer_threshold: usize,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self {
            pause_writer_threshold: DEFAULT_PAUSE_WRITER_THRESHOLD,
            resume_writer_threshold: DEFAULT_RESUME_WRITER_THRESHOLD,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    chunks: VecDeque<Bytes>,
    /// Bytes held in `chunks`.
    unread: usize,
    /// Leading bytes of `unread` the reader has already looked at.
    examined: usize,
    paused: bool,
    writer_done: bool,
    reader_done: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    reader_wake: Notify,
    writer_wake: Notify,
    options: PipeOptions,
}

/// Create a connected writer/reader pair.
pub fn pipe(options: PipeOptions) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::default()),
        reader_wake: Notify::new(),
        writer_wake: Notify::new(),
        options,
    });

    let writer = PipeWriter {
        shared: shared.clone(),
        scratch: BytesMut::new(),
        completed: false,
    };
    let reader = PipeReader {
        shared,
        region_len: 0,
        completed: false,
    };
    (writer, reader)
}

/// Result of [`PipeWriter::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushResult {
    /// The reader has completed; nothing written from now on will be read.
    pub is_completed: bool,
}

/// The producing end of a pipe.
#[derive(Debug)]
pub struct PipeWriter {
    shared: Arc<Shared>,
    scratch: BytesMut,
    completed: bool,
}

impl PipeWriter {
    /// Get a scratch buffer with at least `min_size` bytes of spare capacity.
    ///
    /// Waits while the pipe is paused. Once the reader has completed this
    /// returns immediately; the bytes will simply be dropped on commit.
    pub async fn reserve(&mut self, min_size: usize) -> &mut BytesMut {
        self.wait_for_space().await;

        let want = min_size.max(1);
        if self.scratch.capacity() - self.scratch.len() < want {
            self.scratch.reserve(want);
        }
        &mut self.scratch
    }

    async fn wait_for_space(&self) {
        loop {
            {
                let state = self.shared.state.lock();
                if !state.paused || state.reader_done {
                    return;
                }
            }
            self.shared.writer_wake.notified().await;
        }
    }

    /// Publish the first `n` filled bytes of the reservation as one chunk.
    ///
    /// Whatever else was filled is released with the reservation.
    pub fn commit(&mut self, n: usize) -> Result<(), PipeError> {
        let filled = self.scratch.len();
        if n > filled {
            return Err(PipeError::CommitOverrun {
                requested: n,
                available: filled,
            });
        }

        let chunk = self.scratch.split_to(n).freeze();
        self.scratch.clear();
        if chunk.is_empty() {
            return Ok(());
        }

        let mut state = self.shared.state.lock();
        if state.reader_done {
            return Ok(());
        }
        state.unread += chunk.len();
        state.chunks.push_back(chunk);
        if state.unread >= self.shared.options.pause_writer_threshold {
            state.paused = true;
        }
        Ok(())
    }

    /// Wake the reader for the bytes committed so far.
    pub fn flush(&mut self) -> FlushResult {
        let is_completed = self.shared.state.lock().reader_done;
        self.shared.reader_wake.notify_one();
        FlushResult { is_completed }
    }

    /// Signal that no more bytes will be written. Idempotent.
    pub fn complete(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        self.scratch = BytesMut::new();
        self.shared.state.lock().writer_done = true;
        self.shared.reader_wake.notify_one();
    }

    /// Whether the reading side has completed.
    pub fn is_reader_completed(&self) -> bool {
        self.shared.state.lock().reader_done
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.complete();
    }
}

/// Forward-only position inside a [`ReadableRegion`].
///
/// Remembers which chunk the last lookup landed in, so walking a region of
/// many small chunks front to back touches each chunk once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionCursor {
    index: usize,
    chunk_start: usize,
}

impl RegionCursor {
    /// Region offset of the first byte of the chunk under the cursor.
    pub fn chunk_start(&self) -> usize {
        self.chunk_start
    }
}

/// Bytes visible to the reader: every unconsumed chunk, in write order.
#[derive(Debug, Clone, Default)]
pub struct ReadableRegion {
    chunks: Vec<Bytes>,
    len: usize,
}

impl ReadableRegion {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The backing chunks as slices.
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.chunks.iter().map(|chunk| chunk.as_ref())
    }

    /// Move `cursor` forward to the chunk holding `offset`, or past the last
    /// chunk if `offset` is at or beyond the end. Never moves backwards.
    pub fn seek(&self, cursor: &mut RegionCursor, offset: usize) {
        while let Some(chunk) = self.chunks.get(cursor.index) {
            if cursor.chunk_start + chunk.len() > offset {
                break;
            }
            cursor.chunk_start += chunk.len();
            cursor.index += 1;
        }
    }

    /// The chunks from `cursor` on; the first starts at `cursor.chunk_start()`.
    pub fn chunks_from(&self, cursor: RegionCursor) -> impl Iterator<Item = &[u8]> + '_ {
        self.chunks
            .get(cursor.index..)
            .unwrap_or_default()
            .iter()
            .map(|chunk| chunk.as_ref())
    }

    /// Copy out `range` as one buffer; zero-copy if it lies in a single chunk.
    ///
    /// # Panics
    ///
    /// Panics if `range` is out of bounds.
    pub fn slice(&self, range: Range<usize>) -> Bytes {
        self.slice_from(RegionCursor::default(), range)
    }

    /// [`slice`](Self::slice), starting the chunk walk at `cursor`.
    ///
    /// A cursor already past `range.start` is ignored.
    pub fn slice_from(&self, cursor: RegionCursor, range: Range<usize>) -> Bytes {
        assert!(
            range.start <= range.end && range.end <= self.len,
            "range {range:?} out of bounds for region of {} bytes",
            self.len
        );
        if range.is_empty() {
            return Bytes::new();
        }

        let cursor = if cursor.chunk_start <= range.start {
            cursor
        } else {
            RegionCursor::default()
        };
        let mut out = BytesMut::with_capacity(range.len());
        let mut chunk_start = cursor.chunk_start;
        for chunk in self.chunks.iter().skip(cursor.index) {
            let chunk_end = chunk_start + chunk.len();
            if chunk_end <= range.start {
                chunk_start = chunk_end;
                continue;
            }
            if chunk_start >= range.end {
                break;
            }

            let lo = range.start.saturating_sub(chunk_start);
            let hi = range.end.min(chunk_end) - chunk_start;
            if range.start >= chunk_start && range.end <= chunk_end {
                return chunk.slice(lo..hi);
            }
            out.extend_from_slice(&chunk[lo..hi]);
            chunk_start = chunk_end;
        }
        out.freeze()
    }

    /// The whole region as one buffer.
    pub fn to_bytes(&self) -> Bytes {
        self.slice(0..self.len)
    }
}

/// Result of [`PipeReader::read`].
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub buffer: ReadableRegion,
    /// The writer completed; `buffer` holds everything that will ever arrive.
    pub is_completed: bool,
}

/// The consuming end of a pipe.
#[derive(Debug)]
pub struct PipeReader {
    shared: Arc<Shared>,
    region_len: usize,
    completed: bool,
}

impl PipeReader {
    /// Wait until unexamined bytes exist or the writer has completed.
    pub async fn read(&mut self) -> ReadResult {
        loop {
            {
                let state = self.shared.state.lock();
                if state.unread > state.examined || state.writer_done {
                    self.region_len = state.unread;
                    return ReadResult {
                        buffer: ReadableRegion {
                            chunks: state.chunks.iter().cloned().collect(),
                            len: state.unread,
                        },
                        is_completed: state.writer_done,
                    };
                }
            }
            self.shared.reader_wake.notified().await;
        }
    }

    /// Release `consumed` bytes and mark the rest of the last region as examined.
    pub fn advance(&mut self, consumed: usize) -> Result<(), PipeError> {
        self.advance_to(consumed, self.region_len)
    }

    /// Release `consumed` bytes; the next read waits for data past `examined`.
    pub fn advance_to(&mut self, consumed: usize, examined: usize) -> Result<(), PipeError> {
        if consumed > examined || examined > self.region_len {
            return Err(PipeError::AdvanceOutOfRange {
                consumed,
                examined,
                len: self.region_len,
            });
        }

        let mut state = self.shared.state.lock();
        if state.reader_done {
            return Ok(());
        }

        let mut remaining = consumed;
        while remaining > 0 {
            let Some(front) = state.chunks.front_mut() else {
                break;
            };
            if front.len() <= remaining {
                remaining -= front.len();
                state.chunks.pop_front();
            } else {
                front.advance(remaining);
                remaining = 0;
            }
        }

        state.unread -= consumed;
        state.examined = examined - consumed;
        self.region_len -= consumed;

        let resume = state.paused && state.unread < self.shared.options.resume_writer_threshold;
        if resume {
            state.paused = false;
        }
        drop(state);

        if resume {
            self.shared.writer_wake.notify_one();
        }
        Ok(())
    }

    /// Bytes committed but not yet consumed.
    pub fn unread_len(&self) -> usize {
        self.shared.state.lock().unread
    }

    /// Signal that no more bytes will be read. Idempotent.
    ///
    /// Buffered bytes are dropped and a paused writer is released.
    pub fn complete(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        {
            let mut state = self.shared.state.lock();
            state.reader_done = true;
            state.paused = false;
            state.chunks.clear();
            state.unread = 0;
            state.examined = 0;
        }
        self.region_len = 0;
        self.shared.writer_wake.notify_one();
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.complete();
    }
}
