use std::future::Future;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

/// An already-open stream of raw bytes, read in pull fashion.
///
/// `read_into` appends at most the spare capacity of `buf` and returns the
/// number of bytes appended. `Ok(0)` means end-of-stream. Callers cancel an
/// in-flight read by dropping the returned future, so implementations must not
/// lose bytes they have not yet appended.
pub trait ByteSource: Send {
    /// Identifier used in log events (device path, file name, ...).
    fn id(&self) -> &str;

    /// Issue a single read into the spare capacity of `buf`.
    fn read_into<'a>(
        &'a mut self,
        buf: &'a mut BytesMut,
    ) -> impl Future<Output = std::io::Result<usize>> + Send + 'a;
}

/// Adapts any `AsyncRead` into a [`ByteSource`].
#[derive(Debug)]
pub struct AsyncReadSource<R> {
    id: String,
    inner: R,
}

impl<R> AsyncReadSource<R> {
    /// Wrap a reader, labelling it with `id` for diagnostics.
    pub fn new(id: impl Into<String>, inner: R) -> Self {
        Self {
            id: id.into(),
            inner,
        }
    }

    /// Borrow the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Consume the adapter and return the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R> ByteSource for AsyncReadSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn read_into<'a>(
        &'a mut self,
        buf: &'a mut BytesMut,
    ) -> impl Future<Output = std::io::Result<usize>> + Send + 'a {
        async move { self.inner.read_buf(buf).await }
    }
}
