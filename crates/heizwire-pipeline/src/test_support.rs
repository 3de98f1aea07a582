use std::collections::VecDeque;
use std::future::Future;

use bytes::BytesMut;
use heizwire_transport::ByteSource;

/// What a [`ScriptedSource`] does once its chunks run out.
#[derive(Debug, Clone, Copy)]
pub(crate) enum AfterChunks {
    Eof,
    Hang,
    Fail(std::io::ErrorKind),
    /// Keep yielding, then returning the same bytes, forever.
    Trickle(&'static [u8]),
}

/// Byte source replaying fixed chunks, one per read.
#[derive(Debug)]
pub(crate) struct ScriptedSource {
    chunks: VecDeque<Vec<u8>>,
    after: AfterChunks,
    leading_error: Option<std::io::ErrorKind>,
    pub(crate) reads: usize,
}

impl ScriptedSource {
    pub(crate) fn new<I, C>(chunks: I, after: AfterChunks) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self {
            chunks: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
            after,
            leading_error: None,
            reads: 0,
        }
    }

    /// Fail the very first read with `kind` before replaying chunks.
    pub(crate) fn with_leading_error(mut self, kind: std::io::ErrorKind) -> Self {
        self.leading_error = Some(kind);
        self
    }
}

impl ByteSource for ScriptedSource {
    fn id(&self) -> &str {
        "scripted"
    }

    fn read_into<'a>(
        &'a mut self,
        buf: &'a mut BytesMut,
    ) -> impl Future<Output = std::io::Result<usize>> + Send + 'a {
        async move {
            self.reads += 1;
            if let Some(kind) = self.leading_error.take() {
                return Err(std::io::Error::new(kind, "transient"));
            }
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf.extend_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => match self.after {
                    AfterChunks::Eof => Ok(0),
                    AfterChunks::Hang => std::future::pending().await,
                    AfterChunks::Trickle(bytes) => {
                        tokio::task::yield_now().await;
                        buf.extend_from_slice(bytes);
                        Ok(bytes.len())
                    }
                    AfterChunks::Fail(kind) => {
                        Err(std::io::Error::new(kind, "device went away"))
                    }
                },
            }
        }
    }
}
