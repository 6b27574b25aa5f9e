use super::ResponseStream;
use crate::server::{
    config::ServerConfig,
    lifecycle::Lifecycle,
    metadata::CallContext,
    streaming::{
        TokioSleep,
        search::{DEFAULT_CORPUS, Pacing, SearchQuery, search},
    },
};
use starfriends_core::proto::{SearchRequest, SearchResponse, database_server::Database};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::Instrument;

/// Streams ranked search results, one at a time.
#[derive(Clone)]
pub struct DatabaseService {
    corpus: &'static [&'static str],
    pacing: Pacing,
    stream_buffer_size: usize,
    lifecycle: Arc<Lifecycle>,
}

impl DatabaseService {
    pub fn new(config: &ServerConfig, lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            corpus: &DEFAULT_CORPUS,
            pacing: config.search_pacing,
            stream_buffer_size: config.stream_buffer_size,
            lifecycle,
        }
    }
}

#[tonic::async_trait]
impl Database for DatabaseService {
    type SearchStream = ResponseStream<SearchResponse>;

    /// Validates the query, then streams results from a spawned task.
    ///
    /// Headers go out with the returned response, before the first result.
    /// The task ends with the last result, the first failed send, or service
    /// shutdown, whichever comes first.
    #[tracing::instrument(skip_all, fields(term = %request.get_ref().term))]
    async fn search(
        &self,
        request: Request<SearchRequest>,
    ) -> Result<Response<Self::SearchStream>, Status> {
        let ctx = CallContext::new("Search", &request);
        let query = ctx.check(SearchQuery::try_from(request.into_inner()))?;
        let inflight = ctx.check(self.lifecycle.begin())?;

        let (tx, rx) = mpsc::channel(self.stream_buffer_size);
        let stream: Self::SearchStream = Box::pin(ReceiverStream::new(rx));
        let response = ctx.respond(stream);

        let this = self.clone();
        tokio::spawn(
            async move {
                let _inflight = inflight;
                let result = search::<TokioSleep, _>(
                    &query,
                    this.corpus,
                    this.pacing,
                    &tx,
                    this.lifecycle.token(),
                )
                .await;
                ctx.close_stream(result, &tx).await;
            }
            .in_current_span(),
        );

        Ok(response)
    }
}
