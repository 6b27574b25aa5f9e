//! Shared protocol surface for the Starfriends services.
//!
//! - [`proto`] - generated messages, clients and server traits.
//! - [`error`] - the typed [`Error`] and its mapping onto `tonic::Status`.
//! - [`types`] - domain records stored by the film catalogue.
//! - [`metadata`] - header and trailer keys exchanged on every call.

pub mod error;
pub mod metadata;
pub mod types;

pub use error::{Error, Result};

/// Code generated from `proto/starfriends.proto`.
#[allow(clippy::all, clippy::pedantic)]
pub mod proto {
    tonic::include_proto!("starfriends");

    /// Encoded descriptor set, registered with the reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("starfriends_descriptor");
}
