//! Server-side components of the Starfriends service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration.
//! - [`store`] - The shared, mutex-guarded film catalogue.
//! - [`streaming`] - Transport-agnostic client-, server- and bidi-streaming
//!   components.
//! - [`service`] - tonic handlers adapting requests to the components above.
//! - [`metadata`] - Per-call headers, trailers and bookkeeping.
//! - [`trailers`] - Tower layer flushing call trailers.
//! - [`lifecycle`] - Streaming call admission and graceful shutdown.
//! - [`telemetry`] - Logging and optional OpenTelemetry export.
//!
//! These components are wired together in the server's `main.rs`.

pub mod config;
pub mod lifecycle;
pub mod metadata;
pub mod service;
pub mod store;
pub mod streaming;
pub mod telemetry;
pub mod trailers;
