//! Capabilities for the two halves of a streaming call.
//!
//! Components are written against [`MessageSource`] and [`MessageSink`]
//! rather than tonic types. `tonic::Streaming<T>` is a source (as is any
//! `Stream` of `Result<T, Status>`), and the bounded `mpsc::Sender` feeding a
//! response stream is a sink. Sending suspends while the channel is full, so a
//! slow peer shows up as a longer send, never as an error.

use futures::{Stream, StreamExt};
use starfriends_core::{Error, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Status};

/// Inbound half of a call.
pub trait MessageSource<T>: Send {
    /// Waits for the next message.
    ///
    /// Returns `Ok(None)` once the peer has closed its send direction.
    fn recv(&mut self) -> impl Future<Output = Result<Option<T>>> + Send;
}

/// Outbound half of a call.
pub trait MessageSink<T>: Send + Sync {
    /// Sends one message, waiting for capacity.
    ///
    /// Fails with [`Error::RequestCancelled`] once the peer has gone.
    fn send(&self, message: T) -> impl Future<Output = Result<()>> + Send;

    /// Resolves once nobody is listening for responses any more.
    fn closed(&self) -> impl Future<Output = ()> + Send;
}

impl<T, S> MessageSource<T> for S
where
    S: Stream<Item = core::result::Result<T, Status>> + Unpin + Send,
    T: Send,
{
    async fn recv(&mut self) -> Result<Option<T>> {
        match self.next().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(status)) => Err(inbound_error(&status)),
            None => Ok(None),
        }
    }
}

impl<T> MessageSink<T> for mpsc::Sender<core::result::Result<T, Status>>
where
    T: Send,
{
    async fn send(&self, message: T) -> Result<()> {
        mpsc::Sender::send(self, Ok(message))
            .await
            .map_err(|_| Error::RequestCancelled)
    }

    async fn closed(&self) {
        mpsc::Sender::closed(self).await;
    }
}

/// Receives the next message unless the service shuts down first.
///
/// # Errors
///
/// Returns [`Error::ServiceShutdown`] on shutdown, otherwise whatever the
/// source reports.
pub async fn next_message<T, S>(source: &mut S, shutdown: &CancellationToken) -> Result<Option<T>>
where
    S: MessageSource<T>,
{
    tokio::select! {
        biased;
        () = shutdown.cancelled() => Err(Error::ServiceShutdown),
        next = source.recv() => next,
    }
}

/// A peer abort is a cancellation; anything else is a transport fault.
fn inbound_error(status: &Status) -> Error {
    match status.code() {
        Code::Cancelled => Error::RequestCancelled,
        _ => Error::Transport {
            context: status.message().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn end_of_input_is_none() {
        let mut source = stream::iter(vec![Ok::<_, Status>(1_u32), Ok(2)]);
        let shutdown = CancellationToken::new();

        assert_eq!(next_message(&mut source, &shutdown).await, Ok(Some(1)));
        assert_eq!(next_message(&mut source, &shutdown).await, Ok(Some(2)));
        assert_eq!(next_message(&mut source, &shutdown).await, Ok(None));
    }

    #[tokio::test]
    async fn inbound_statuses_become_typed_errors() {
        let mut source = stream::iter(vec![
            Err::<u32, _>(Status::cancelled("peer went away")),
            Err(Status::data_loss("bad frame")),
        ]);

        assert_eq!(source.recv().await, Err(Error::RequestCancelled));
        assert_eq!(
            source.recv().await,
            Err(Error::Transport {
                context: "bad frame".to_string()
            })
        );
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_pending_receive() {
        let mut source = stream::pending::<core::result::Result<u32, Status>>();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        assert_eq!(
            next_message(&mut source, &shutdown).await,
            Err(Error::ServiceShutdown)
        );
    }

    #[tokio::test]
    async fn send_after_the_peer_left_is_a_cancellation() {
        let (tx, rx) = mpsc::channel::<core::result::Result<u32, Status>>(1);
        drop(rx);

        let result = MessageSink::send(&tx, 7).await;
        assert_eq!(result, Err(Error::RequestCancelled));
        assert!(result.unwrap_err().is_cancellation());
        MessageSink::<u32>::closed(&tx).await;
    }
}
