//! gRPC service implementations.
//!
//! Handlers here only adapt tonic requests and responses: they open a
//! [`CallContext`](crate::server::metadata::CallContext), hand the work to the
//! store or to a streaming component, and map the outcome back to a status.
//!
//! ## Structure
//!
//! - [`handler`] - Unary film catalogue (`Starfriends`).
//! - [`archiver`] - Client-streaming archive builder (`Archiver`).
//! - [`database`] - Server-streaming ranked search (`Database`).
//! - [`tokenizer`] - Bidirectional and client-streaming word counts
//!   (`Tokenizer`).

pub mod archiver;
pub mod database;
pub mod handler;
pub mod tokenizer;

use crate::server::{config::ServerConfig, lifecycle::Lifecycle, store::FilmStore};
use archiver::ArchiverService;
use core::pin::Pin;
use database::DatabaseService;
use handler::FilmService;
use std::sync::Arc;
use tokio_stream::Stream;
use tokenizer::TokenizerService;
use tonic::Status;

/// Response stream returned by the server- and bidi-streaming handlers.
pub type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// Every service served by the binary, sharing one store and one lifecycle.
#[derive(Clone)]
pub struct Services {
    pub films: FilmService,
    pub archiver: ArchiverService,
    pub database: DatabaseService,
    pub tokenizer: TokenizerService,
    lifecycle: Arc<Lifecycle>,
}

impl Services {
    pub fn new(config: &ServerConfig) -> Self {
        let store = if config.seed_store {
            FilmStore::with_default_films()
        } else {
            FilmStore::new()
        };
        Self::with_store(config, store)
    }

    pub fn with_store(config: &ServerConfig, store: FilmStore) -> Self {
        let lifecycle = Lifecycle::new(config.shutdown_timeout);

        Self {
            films: FilmService::new(Arc::new(store)),
            archiver: ArchiverService::new(Arc::clone(&lifecycle)),
            database: DatabaseService::new(config, Arc::clone(&lifecycle)),
            tokenizer: TokenizerService::new(config, Arc::clone(&lifecycle)),
            lifecycle,
        }
    }

    /// Drains in-flight streaming calls, then cancels the rest.
    pub async fn shutdown(&self) {
        self.lifecycle.shutdown().await;
    }
}
