//! The three streaming interaction patterns.
//!
//! Every component here is transport-agnostic: it reads from a
//! [`MessageSource`], writes to a [`MessageSink`], paces itself through a
//! [`SleepProvider`], and watches the service shutdown token. The tonic
//! handlers in [`crate::server::service`] only adapt requests and responses.
//!
//! ## Submodules
//!
//! - [`io`] - Capability traits for the inbound and outbound halves of a call.
//! - [`sleep`] - Injectable pacing (`TokioSleep`, `TokioYield`).
//! - [`aggregate`] - Client-streaming fold into a single response (archive and
//!   word count sessions).
//! - [`search`] - Server-streaming ranked results.
//! - [`tokenize`] - Bidirectional per-message word counts.
//!
//! Any error is terminal for the call: the session is dropped, messages that
//! were already sent stay sent, and nothing else is sent or received.

pub mod aggregate;
pub mod io;
pub mod search;
pub mod sleep;
pub mod tokenize;

pub use io::{MessageSink, MessageSource};
pub use sleep::{SleepProvider, TokioSleep};
