//! In-memory film catalogue shared by every call.
//!
//! - [`memstore`] - the mutex-guarded [`FilmStore`] and its seed data.
//! - [`ids`] - pluggable ID generation ([`IdSource`]), ULID by default.

pub mod ids;
pub mod memstore;

pub use ids::{IdSource, UlidSource};
pub use memstore::FilmStore;
