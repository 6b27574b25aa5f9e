use super::ResponseStream;
use crate::server::{
    config::ServerConfig,
    lifecycle::Lifecycle,
    metadata::CallContext,
    streaming::{
        TokioSleep,
        aggregate::{WordCountSession, aggregate},
        tokenize::tokenize,
    },
};
use core::time::Duration;
use starfriends_core::proto::{TokenizeRequest, TokenizeResponse, tokenizer_server::Tokenizer};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::Instrument;

/// Word counting, per message or over a whole stream.
#[derive(Clone)]
pub struct TokenizerService {
    token_delay: Duration,
    stream_buffer_size: usize,
    lifecycle: Arc<Lifecycle>,
}

impl TokenizerService {
    pub fn new(config: &ServerConfig, lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            token_delay: config.token_delay,
            stream_buffer_size: config.stream_buffer_size,
            lifecycle,
        }
    }
}

#[tonic::async_trait]
impl Tokenizer for TokenizerService {
    type TokenizeStream = ResponseStream<TokenizeResponse>;

    #[tracing::instrument(skip_all)]
    async fn tokenize(
        &self,
        request: Request<Streaming<TokenizeRequest>>,
    ) -> Result<Response<Self::TokenizeStream>, Status> {
        let ctx = CallContext::new("Tokenize", &request);
        let inflight = ctx.check(self.lifecycle.begin())?;

        let mut source = request.into_inner();
        let (tx, rx) = mpsc::channel(self.stream_buffer_size);
        let stream: Self::TokenizeStream = Box::pin(ReceiverStream::new(rx));
        let response = ctx.respond(stream);

        let this = self.clone();
        tokio::spawn(
            async move {
                let _inflight = inflight;
                let result = tokenize::<TokioSleep, _, _>(
                    &mut source,
                    &tx,
                    this.token_delay,
                    this.lifecycle.token(),
                )
                .await;
                ctx.close_stream(result, &tx).await;
            }
            .in_current_span(),
        );

        Ok(response)
    }

    #[tracing::instrument(skip_all)]
    async fn count_words(
        &self,
        request: Request<Streaming<TokenizeRequest>>,
    ) -> Result<Response<TokenizeResponse>, Status> {
        let ctx = CallContext::new("CountWords", &request);
        let _inflight = ctx.check(self.lifecycle.begin())?;

        let mut source = request.into_inner();
        let result = aggregate(&mut source, WordCountSession::default(), self.lifecycle.token())
            .await
            .map(|words| TokenizeResponse { words });
        ctx.complete(result)
    }
}
