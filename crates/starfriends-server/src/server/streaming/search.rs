//! Server-streaming ranked search.
//!
//! One request produces the ranked corpus as a stream, best match first,
//! ranks counting up from 1. The first result waits out
//! [`Pacing::initial`], every later one [`Pacing::between`].

use super::{MessageSink, SleepProvider, sleep::pace};
use crate::server::telemetry::increment_messages_sent;
use core::time::Duration;
use starfriends_core::{
    Error, Result,
    proto::{SearchRequest, SearchResponse},
};
use tokio_util::sync::CancellationToken;

/// Ranked contents returned for every search, best first.
pub const DEFAULT_CORPUS: [&str; 4] = [
    "Highest ranked content",
    "Some ranked content",
    "Some ranked content",
    "Lowest ranked content",
];

/// Simulated latency of a search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pacing {
    /// Delay before the first result.
    pub initial: Duration,
    /// Delay before every result after the first.
    pub between: Duration,
}

/// A validated search request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchQuery {
    pub term: String,
    /// Maximum number of results; `None` streams the whole corpus.
    pub limit: Option<usize>,
}

impl TryFrom<SearchRequest> for SearchQuery {
    type Error = Error;

    fn try_from(request: SearchRequest) -> Result<Self> {
        if request.term.is_empty() {
            return Err(Error::invalid("term must not be empty"));
        }
        let limit = match usize::try_from(request.max_results) {
            Ok(0) => None,
            Ok(n) => Some(n),
            Err(_) => {
                return Err(Error::invalid(format!(
                    "max_results must not be negative, got {}",
                    request.max_results
                )));
            }
        };

        Ok(Self {
            term: request.term,
            limit,
        })
    }
}

/// Streams the ranked `corpus` for `query` into `sink`, returning how many
/// results were sent.
///
/// # Errors
///
/// A failed send or an interrupted pacing wait aborts the remaining
/// sequence. Results already sent stay sent.
pub async fn search<S, K>(
    query: &SearchQuery,
    corpus: &[&str],
    pacing: Pacing,
    sink: &K,
    shutdown: &CancellationToken,
) -> Result<usize>
where
    S: SleepProvider,
    K: MessageSink<SearchResponse>,
{
    let take = query.limit.unwrap_or(corpus.len());
    let mut sent = 0;

    for (rank, content) in (1_i32..).zip(corpus.iter().take(take)) {
        let delay = if rank == 1 {
            pacing.initial
        } else {
            pacing.between
        };
        pace::<S, _, _>(delay, sink, shutdown).await?;

        sink.send(SearchResponse {
            matched_term: query.term.clone(),
            rank,
            content: (*content).to_string(),
        })
        .await?;

        sent += 1;
        increment_messages_sent(1);
        tracing::trace!(rank, "sent search result");
    }

    Ok(sent)
}
