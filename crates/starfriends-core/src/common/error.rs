//! Error types for the Starfriends services.
//!
//! This module defines the central `Error` enum, which captures every
//! reportable failure of the film store and of the streaming components. It
//! implements `From<Error>` for `tonic::Status` so handlers can surface each
//! condition to clients as exactly one protocol status code.
//!
//! ## Error Cases
//! - `NotFound`: A lookup, update or delete named an absent film.
//! - `InvalidArgument`: The request was missing a required field or was
//!   otherwise malformed.
//! - `AlreadyExists`: A generated ID collided and could not be resolved.
//! - `RequestCancelled`: The client aborted the call mid-flight.
//! - `ServiceShutdown`: The call was cut short by a server shutdown.
//! - `ChannelError`: An internal communication failure between tasks.
//! - `Transport`: The inbound stream failed to deliver or decode a message.
//! - `Archive`: The archive writer failed while adding or sealing entries.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the Starfriends services.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// No film is stored under the requested ID.
    #[error("No film with id {id:?}")]
    NotFound { id: String },

    /// The request was invalid.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The generated ID is already taken.
    #[error("Film id {id:?} already exists")]
    AlreadyExists { id: String },

    /// The client aborted the request.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// Internal channel send/receive failure (e.g., closed or full channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// Receiving or decoding an inbound message failed.
    #[error("Transport error: {context}")]
    Transport { context: String },

    /// Building the archive failed.
    #[error("Archive error: {context}")]
    Archive { context: String },
}

impl Error {
    /// Shorthand for [`Error::InvalidArgument`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Whether the peer or the server ended the call rather than a fault.
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::RequestCancelled | Self::ServiceShutdown)
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound { id } => Status::not_found(format!("no film with id {id:?}")),
            Error::InvalidArgument { reason } => Status::invalid_argument(reason),
            Error::AlreadyExists { id } => {
                Status::already_exists(format!("film id {id:?} already exists"))
            }
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::ServiceShutdown => Status::cancelled("Service is shutting down"),
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {context}"))
            }
            Error::Transport { context } => Status::internal(format!("Transport error: {context}")),
            Error::Archive { context } => Status::internal(format!("Archive error: {context}")),
        }
    }
}
