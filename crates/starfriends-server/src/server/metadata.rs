//! Per-call metadata exchange.
//!
//! A [`CallContext`] is opened when a handler starts. It reads the caller's
//! identity from the incoming metadata, stamps the service headers onto the
//! response before anything is sent, and arranges for the `duration` trailer
//! to be written once the call terminates.
//!
//! Trailers of a successful call are written by
//! [`TrailersLayer`](super::trailers::TrailersLayer) from the [`TrailerSlot`]
//! carried in the response extensions. A call that fails before responding
//! has no body, so its duration travels in the status metadata instead.

use crate::server::telemetry::{increment_call_errors, increment_requests, record_call_duration};
use core::time::Duration;
use parking_lot::Mutex;
use starfriends_core::{
    Error, Result,
    metadata::{
        CALL_DURATION, CALLER_IDENTITY, MESSAGES_SENT, SERVICE_IDENTITY, SERVICE_NAME,
        SERVICE_VERSION, SERVICE_VERSION_VALUE,
    },
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tonic::{
    Request, Response, Status,
    metadata::{Ascii, MetadataMap, MetadataValue},
};

/// Caller identity logged when the `who` header is absent.
const ANONYMOUS: &str = "anonymous";

/// Renders an elapsed time as an ASCII metadata value, e.g. `12.345ms`.
pub fn format_duration(elapsed: Duration) -> String {
    format!("{:.3}ms", elapsed.as_secs_f64() * 1_000.0)
}

/// Outgoing trailers of one call.
///
/// Entries may be added at any time while the call runs. They are flushed
/// exactly once, together with the `duration` entry, after the last message.
#[derive(Clone, Debug)]
pub struct TrailerSlot {
    started: Instant,
    entries: Arc<Mutex<MetadataMap>>,
}

impl TrailerSlot {
    pub fn new(started: Instant) -> Self {
        Self {
            started,
            entries: Arc::new(Mutex::new(MetadataMap::new())),
        }
    }

    /// Queues `value` under `key`, replacing an earlier entry.
    pub fn insert(&self, key: &'static str, value: MetadataValue<Ascii>) {
        self.entries.lock().insert(key, value);
    }

    /// Takes every pending entry plus the call duration.
    pub fn seal(&self) -> http::HeaderMap {
        let mut entries = core::mem::replace(&mut *self.entries.lock(), MetadataMap::new());
        insert_duration(&mut entries, self.started.elapsed());
        entries.into_headers()
    }
}

fn insert_duration(metadata: &mut MetadataMap, elapsed: Duration) {
    if let Ok(value) = format_duration(elapsed).parse() {
        metadata.insert(CALL_DURATION, value);
    }
}

fn insert_service_headers(metadata: &mut MetadataMap) {
    metadata.insert(SERVICE_IDENTITY, MetadataValue::from_static(SERVICE_NAME));
    metadata.insert(
        SERVICE_VERSION,
        MetadataValue::from_static(SERVICE_VERSION_VALUE),
    );
}

/// Identity the caller announced in the `who` header.
pub fn caller_identity<T>(request: &Request<T>) -> &str {
    request
        .metadata()
        .get(CALLER_IDENTITY)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(ANONYMOUS)
}

/// Bookkeeping for one RPC from first byte to final status.
#[derive(Debug)]
pub struct CallContext {
    method: &'static str,
    trailers: TrailerSlot,
}

impl CallContext {
    /// Opens the call, logging who made it.
    pub fn new<T>(method: &'static str, request: &Request<T>) -> Self {
        let caller = caller_identity(request);
        tracing::info!(method, caller, "call started");
        increment_requests(method);

        Self {
            method,
            trailers: TrailerSlot::new(Instant::now()),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.trailers.started.elapsed()
    }

    /// Wraps `message` with the service headers and this call's trailers.
    pub fn respond<T>(&self, message: T) -> Response<T> {
        let mut response = Response::new(message);
        insert_service_headers(response.metadata_mut());
        response.extensions_mut().insert(self.trailers.clone());
        response
    }

    /// Converts a terminal error into the status sent to the caller.
    pub fn fail(&self, err: Error) -> Status {
        let mut status = Status::from(err);
        insert_service_headers(status.metadata_mut());
        insert_duration(status.metadata_mut(), self.elapsed());
        status
    }

    /// Passes `result` through, failing the call if it is an error.
    pub fn check<T>(&self, result: Result<T>) -> core::result::Result<T, Status> {
        result.map_err(|e| {
            self.observe(&Err::<(), _>(e.clone()));
            self.fail(e)
        })
    }

    /// Records how the call ended. Cancellations are not counted as errors.
    pub fn observe<T>(&self, result: &Result<T>) {
        let elapsed = self.elapsed();
        record_call_duration(self.method, elapsed.as_secs_f64() * 1_000.0);

        match result {
            Ok(_) => tracing::debug!(method = self.method, ?elapsed, "call finished"),
            Err(e) if e.is_cancellation() => {
                tracing::info!(method = self.method, ?elapsed, "call cancelled: {e}");
            }
            Err(e) => {
                increment_call_errors(self.method);
                tracing::warn!(method = self.method, ?elapsed, "call failed: {e}");
            }
        }
    }

    /// Finishes a unary or client-streaming call.
    pub fn complete<T>(self, result: Result<T>) -> core::result::Result<Response<T>, Status> {
        self.observe(&result);
        match result {
            Ok(message) => Ok(self.respond(message)),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Ends a server- or bidi-streaming call whose response stream is fed
    /// by `tx`.
    ///
    /// `result` carries the number of messages sent, which becomes the
    /// `messages-sent` trailer. A failure is reported in-band as the final
    /// status. If the peer has already gone there is nobody to tell, and
    /// nothing else is sent.
    pub async fn close_stream<T>(
        self,
        result: Result<usize>,
        tx: &mpsc::Sender<core::result::Result<T, Status>>,
    ) {
        self.observe(&result);
        match result {
            Ok(sent) => self
                .trailers
                .insert(MESSAGES_SENT, MetadataValue::from(sent)),
            Err(e) => {
                if !tx.is_closed() {
                    let _ = tx.send(Err(self.fail(e))).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    fn request_from(who: Option<&'static str>) -> Request<()> {
        let mut request = Request::new(());
        if let Some(who) = who {
            request
                .metadata_mut()
                .insert(CALLER_IDENTITY, MetadataValue::from_static(who));
        }
        request
    }

    #[test]
    fn durations_render_as_ascii_milliseconds() {
        assert_eq!(format_duration(Duration::from_micros(1_500)), "1.500ms");
        assert_eq!(format_duration(Duration::from_secs(2)), "2000.000ms");
        assert!(format_duration(Duration::from_nanos(7)).is_ascii());
    }

    #[test]
    fn reads_caller_identity() {
        assert_eq!(caller_identity(&request_from(Some("yoda"))), "yoda");
        assert_eq!(caller_identity(&request_from(None)), ANONYMOUS);
    }

    #[test]
    fn responses_carry_service_headers_and_a_trailer_slot() {
        let ctx = CallContext::new("ListFilms", &request_from(None));
        let response = ctx.respond(());

        assert_eq!(
            response.metadata().get(SERVICE_IDENTITY).unwrap(),
            SERVICE_NAME
        );
        assert_eq!(
            response.metadata().get(SERVICE_VERSION).unwrap(),
            SERVICE_VERSION_VALUE
        );
        let slot = response.extensions().get::<TrailerSlot>().unwrap();
        assert!(slot.seal().contains_key(CALL_DURATION));
    }

    #[test]
    fn failures_carry_duration_in_status_metadata() {
        let ctx = CallContext::new("GetFilm", &request_from(None));
        let status = ctx.fail(Error::NotFound { id: "x".into() });

        assert_eq!(status.code(), Code::NotFound);
        assert!(status.metadata().get(CALL_DURATION).is_some());
        assert_eq!(
            status.metadata().get(SERVICE_IDENTITY).unwrap(),
            SERVICE_NAME
        );
    }

    #[test]
    fn seal_flushes_pending_entries_once() {
        let slot = TrailerSlot::new(Instant::now());
        slot.insert(MESSAGES_SENT, MetadataValue::from(4_u64));

        let first = slot.seal();
        let second = slot.seal();

        assert_eq!(first.get(MESSAGES_SENT).unwrap(), "4");
        assert!(second.get(MESSAGES_SENT).is_none());
        assert!(second.contains_key(CALL_DURATION));
    }

    #[tokio::test]
    async fn stream_failure_is_sent_in_band() {
        let (tx, mut rx) = mpsc::channel::<core::result::Result<(), Status>>(1);
        let ctx = CallContext::new("Search", &request_from(None));

        ctx.close_stream(Err(Error::ServiceShutdown), &tx).await;

        let status = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(status.code(), Code::Cancelled);
    }

    #[tokio::test]
    async fn finished_stream_records_messages_sent() {
        let (tx, _rx) = mpsc::channel::<core::result::Result<(), Status>>(1);
        let ctx = CallContext::new("Tokenize", &request_from(None));
        let slot = ctx.trailers.clone();

        ctx.close_stream(Ok(3), &tx).await;

        assert_eq!(slot.seal().get(MESSAGES_SENT).unwrap(), "3");
    }
}
