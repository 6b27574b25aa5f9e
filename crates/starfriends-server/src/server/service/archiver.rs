use crate::server::{
    lifecycle::Lifecycle,
    metadata::CallContext,
    streaming::aggregate::{ZipSession, aggregate},
};
use starfriends_core::proto::{ZipRequest, ZipResponse, archiver_server::Archiver};
use std::sync::Arc;
use tonic::{Request, Response, Status, Streaming};

/// Zips every file of a client stream into one archive.
#[derive(Clone)]
pub struct ArchiverService {
    lifecycle: Arc<Lifecycle>,
}

impl ArchiverService {
    pub fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self { lifecycle }
    }
}

#[tonic::async_trait]
impl Archiver for ArchiverService {
    #[tracing::instrument(skip_all)]
    async fn zip(
        &self,
        request: Request<Streaming<ZipRequest>>,
    ) -> Result<Response<ZipResponse>, Status> {
        let ctx = CallContext::new("Zip", &request);
        let _inflight = ctx.check(self.lifecycle.begin())?;

        let mut files = request.into_inner();
        let result = aggregate(&mut files, ZipSession::new(), self.lifecycle.token())
            .await
            .map(|zipped_contents| ZipResponse { zipped_contents });
        ctx.complete(result)
    }
}
