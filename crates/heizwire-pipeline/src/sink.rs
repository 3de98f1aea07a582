use heizwire_frame::Message;
use tokio::sync::mpsc;

use crate::error::SinkError;

/// Receives every extracted message, in stream order.
///
/// Returning an error tells the extractor to stop consuming; the pump notices
/// on its next flush and stops producing.
pub trait MessageSink: Send {
    fn deliver(&mut self, message: Message) -> Result<(), SinkError>;
}

impl<F> MessageSink for F
where
    F: FnMut(Message) -> Result<(), SinkError> + Send,
{
    fn deliver(&mut self, message: Message) -> Result<(), SinkError> {
        self(message)
    }
}

/// Forward messages into an unbounded tokio channel.
///
/// Fails once the receiving half is dropped.
pub fn channel_sink(tx: mpsc::UnboundedSender<Message>) -> impl MessageSink {
    move |message: Message| {
        tx.send(message)
            .map_err(|_| SinkError::new("message receiver dropped"))
    }
}
