//! Bidirectional per-message word counts.
//!
//! Every round receives one message, counts its whitespace-delimited words
//! into a fresh map and sends that map back before the next message is read.
//! Rounds share nothing, so counts never leak from one message into another.

use super::{MessageSink, MessageSource, SleepProvider, io::next_message, sleep::pace};
use crate::server::telemetry::{increment_messages_received, increment_messages_sent};
use core::time::Duration;
use starfriends_core::{
    Result,
    proto::{TokenizeRequest, TokenizeResponse},
};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Whitespace-delimited words of `text`, in order.
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

/// Adds one occurrence of `word` to `counts`.
pub fn tally(counts: &mut HashMap<String, i64>, word: &str) {
    *counts.entry(word.to_owned()).or_default() += 1;
}

/// Adds one occurrence per whitespace-delimited word of `text` to `counts`.
pub fn count_words(text: &str, counts: &mut HashMap<String, i64>) {
    for word in words(text) {
        tally(counts, word);
    }
}

/// Answers every inbound message with its word counts until the peer closes
/// its send direction. Returns the number of rounds completed.
///
/// Each token of a round waits out `token_delay` before the round's single
/// response is sent.
///
/// # Errors
///
/// A receive, pacing or send failure aborts the call. The round in progress
/// sends nothing.
pub async fn tokenize<S, Src, K>(
    source: &mut Src,
    sink: &K,
    token_delay: Duration,
    shutdown: &CancellationToken,
) -> Result<usize>
where
    S: SleepProvider,
    Src: MessageSource<TokenizeRequest>,
    K: MessageSink<TokenizeResponse>,
{
    let mut rounds = 0;

    while let Some(request) = next_message(source, shutdown).await? {
        increment_messages_received(1);

        let text = String::from_utf8_lossy(&request.file_contents);
        let mut counts = HashMap::new();
        for word in words(&text) {
            pace::<S, _, _>(token_delay, sink, shutdown).await?;
            tally(&mut counts, word);
        }

        let distinct = counts.len();
        sink.send(TokenizeResponse { words: counts }).await?;
        increment_messages_sent(1);

        rounds += 1;
        tracing::trace!(round = rounds, distinct, "sent word counts");
    }

    tracing::debug!(rounds, "peer closed its send direction");
    Ok(rounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::streaming::{TokioSleep, sleep::TokioYield};
    use bytes::Bytes;
    use futures::stream;
    use starfriends_core::Error;
    use tokio::sync::mpsc;
    use tokio::time::Instant;
    use tonic::Status;

    fn text(s: &str) -> core::result::Result<TokenizeRequest, Status> {
        Ok(TokenizeRequest {
            file_contents: Bytes::copy_from_slice(s.as_bytes()),
        })
    }

    fn counts(pairs: &[(&str, i64)]) -> HashMap<String, i64> {
        pairs.iter().map(|(w, n)| ((*w).to_string(), *n)).collect()
    }

    #[test]
    fn counts_whitespace_delimited_words() {
        let mut words = HashMap::new();
        count_words("  a\tb\n a  ", &mut words);
        assert_eq!(words, counts(&[("a", 2), ("b", 1)]));
    }

    #[tokio::test]
    async fn round_counts_match_count_words() {
        let sample = " la\u{a0}la\tland\u{3000}la \n";
        let mut source = stream::iter(vec![text(sample)]);
        let (tx, mut rx) = mpsc::channel(1);

        tokenize::<TokioYield, _, _>(&mut source, &tx, Duration::ZERO, &CancellationToken::new())
            .await
            .unwrap();

        let mut want = HashMap::new();
        count_words(sample, &mut want);
        assert_eq!(want, counts(&[("la", 3), ("land", 1)]));
        assert_eq!(rx.recv().await.unwrap().unwrap().words, want);
    }

    #[tokio::test]
    async fn answers_each_message_with_its_own_counts() {
        let mut source = stream::iter(vec![text("a a b"), text("b b b")]);
        let (tx, mut rx) = mpsc::channel(4);

        let rounds = tokenize::<TokioYield, _, _>(
            &mut source,
            &tx,
            Duration::ZERO,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        drop(tx);

        assert_eq!(rounds, 2);
        assert_eq!(
            rx.recv().await.unwrap().unwrap().words,
            counts(&[("a", 2), ("b", 1)])
        );
        assert_eq!(rx.recv().await.unwrap().unwrap().words, counts(&[("b", 3)]));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn responds_before_reading_the_next_message() {
        let (in_tx, in_rx) = mpsc::channel(1);
        let mut source = tokio_stream::wrappers::ReceiverStream::new(in_rx);
        let (tx, mut rx) = mpsc::channel(1);

        let processor = tokio::spawn(async move {
            tokenize::<TokioYield, _, _>(&mut source, &tx, Duration::ZERO, &CancellationToken::new())
                .await
        });

        in_tx.send(text("a a b")).await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap().unwrap().words,
            counts(&[("a", 2), ("b", 1)])
        );
        in_tx.send(text("b b b")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap().words, counts(&[("b", 3)]));

        drop(in_tx);
        assert_eq!(processor.await.unwrap(), Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn paces_every_token() {
        let mut source = stream::iter(vec![text("one two three")]);
        let (tx, _rx) = mpsc::channel(4);
        let start = Instant::now();

        tokenize::<TokioSleep, _, _>(
            &mut source,
            &tx,
            Duration::from_millis(100),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(310), "{elapsed:?}");
    }

    #[tokio::test]
    async fn decode_failure_aborts_without_a_partial_response() {
        let mut source = stream::iter(vec![
            text("a"),
            Err(Status::internal("failed to decode")),
            text("never read"),
        ]);
        let (tx, mut rx) = mpsc::channel(4);

        let result = tokenize::<TokioYield, _, _>(
            &mut source,
            &tx,
            Duration::ZERO,
            &CancellationToken::new(),
        )
        .await;
        drop(tx);

        assert!(matches!(result, Err(Error::Transport { .. })));
        assert!(rx.recv().await.unwrap().is_ok());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_unwinds_a_waiting_processor() {
        let mut source = stream::pending::<core::result::Result<TokenizeRequest, Status>>();
        let (tx, _rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result =
            tokenize::<TokioYield, _, _>(&mut source, &tx, Duration::ZERO, &shutdown).await;

        assert_eq!(result, Err(Error::ServiceShutdown));
    }
}
