//! Tower layer that flushes a call's [`TrailerSlot`] into its gRPC trailers.
//!
//! tonic writes `grpc-status` trailers itself once a response body ends but
//! offers no hook for extra entries on a successful call. Handlers attach a
//! [`TrailerSlot`] to the response extensions; this layer moves it into the
//! body and merges it into the trailers frame as the frame goes out.

use crate::server::metadata::TrailerSlot;
use bytes::Bytes;
use core::{
    pin::Pin,
    task::{Context, Poll, ready},
};
use http_body::{Body as HttpBody, Frame, SizeHint};
use pin_project_lite::pin_project;
use tonic::{Status, body::Body};
use tower::{Layer, Service};

/// Applies [`Trailers`] to the wrapped service.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrailersLayer;

impl<S> Layer<S> for TrailersLayer {
    type Service = Trailers<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Trailers { inner }
    }
}

#[derive(Clone, Debug)]
pub struct Trailers<S> {
    inner: S,
}

impl<S, ReqBody> Service<http::Request<ReqBody>> for Trailers<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<Body>>,
{
    type Response = http::Response<Body>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: http::Request<ReqBody>) -> Self::Future {
        ResponseFuture {
            inner: self.inner.call(request),
        }
    }
}

pin_project! {
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
    }
}

impl<F, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<http::Response<Body>, E>>,
{
    type Output = Result<http::Response<Body>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let response = ready!(self.project().inner.poll(cx))?;
        let (mut parts, body) = response.into_parts();

        let body = match parts.extensions.remove::<TrailerSlot>() {
            Some(slot) => Body::new(TrailersBody {
                inner: body,
                slot: Some(slot),
            }),
            None => body,
        };
        Poll::Ready(Ok(http::Response::from_parts(parts, body)))
    }
}

pin_project! {
    /// Response body that extends the trailers frame with the slot's entries.
    pub struct TrailersBody {
        #[pin]
        inner: Body,
        slot: Option<TrailerSlot>,
    }
}

impl HttpBody for TrailersBody {
    type Data = Bytes;
    type Error = Status;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let frame = match ready!(this.inner.poll_frame(cx)) {
            Some(Ok(frame)) => frame,
            other => return Poll::Ready(other),
        };

        let frame = match frame.into_trailers() {
            Ok(mut trailers) => {
                if let Some(slot) = this.slot.take() {
                    trailers.extend(slot.seal());
                }
                Frame::trailers(trailers)
            }
            Err(data) => data,
        };
        Poll::Ready(Some(Ok(frame)))
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
