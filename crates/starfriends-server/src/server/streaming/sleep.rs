use super::MessageSink;
use core::{pin::Pin, time::Duration};
use starfriends_core::{Error, Result};
use tokio_util::sync::CancellationToken;

/// A trait that abstracts over how to sleep for a given [`Duration`] in async
/// contexts.
///
/// Pacing in the streaming components is simulated latency, so it goes
/// through this trait and tests can swap the timer for a yield or drive it
/// with paused time.
pub trait SleepProvider {
    /// We require `Send` so that the future can be safely moved across threads
    type Sleep: Future<Output = ()> + Send;

    fn sleep_for(dur: Duration) -> Self::Sleep;
}

/// An implementation of [`SleepProvider`] using Tokio's timer.
pub struct TokioSleep;
impl SleepProvider for TokioSleep {
    type Sleep = tokio::time::Sleep;

    fn sleep_for(dur: Duration) -> Self::Sleep {
        tokio::time::sleep(dur)
    }
}

/// An implementation of [`SleepProvider`] using Tokio's yield.
///
/// Ignores the requested duration entirely, which turns every paced component
/// into a zero-latency one while keeping its suspension points.
#[cfg_attr(not(test), allow(dead_code))]
pub struct TokioYield;
impl SleepProvider for TokioYield {
    /// Tokio's `yield_now()` returns a private future type, so we must use a
    /// boxed `dyn Future` to abstract over it.
    type Sleep = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn sleep_for(_dur: Duration) -> Self::Sleep {
        Box::pin(tokio::task::yield_now())
    }
}

/// Waits out one pacing delay.
///
/// The wait ends early with an error if the service shuts down or the peer
/// stops listening, so a paced component never outlives its call.
///
/// # Errors
///
/// - [`Error::ServiceShutdown`] if `shutdown` fires.
/// - [`Error::RequestCancelled`] if the response stream was dropped.
pub async fn pace<S, T, K>(dur: Duration, sink: &K, shutdown: &CancellationToken) -> Result<()>
where
    S: SleepProvider,
    K: MessageSink<T>,
{
    if shutdown.is_cancelled() {
        return Err(Error::ServiceShutdown);
    }
    if dur.is_zero() {
        return Ok(());
    }

    tokio::select! {
        biased;
        () = shutdown.cancelled() => Err(Error::ServiceShutdown),
        () = sink.closed() => Err(Error::RequestCancelled),
        () = S::sleep_for(dur) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::Instant;
    use tonic::Status;

    #[tokio::test(start_paused = true)]
    async fn sleeps_for_the_requested_delay() {
        let (tx, _rx) = mpsc::channel::<core::result::Result<(), Status>>(1);
        let shutdown = CancellationToken::new();
        let start = Instant::now();

        pace::<TokioSleep, _, _>(Duration::from_millis(250), &tx, &shutdown)
            .await
            .unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(250), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(260), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_receiver_cuts_the_wait_short() {
        let (tx, rx) = mpsc::channel::<core::result::Result<(), Status>>(1);
        let shutdown = CancellationToken::new();
        drop(rx);

        let result = pace::<TokioSleep, _, _>(Duration::from_secs(60), &tx, &shutdown).await;

        assert_eq!(result, Err(Error::RequestCancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cuts_the_wait_short() {
        let (tx, _rx) = mpsc::channel::<core::result::Result<(), Status>>(1);
        let shutdown = CancellationToken::new();
        let start = Instant::now();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let result = pace::<TokioSleep, _, _>(Duration::from_secs(60), &tx, &shutdown).await;

        assert_eq!(result, Err(Error::ServiceShutdown));
        assert!(start.elapsed() < Duration::from_secs(60));
    }
}
