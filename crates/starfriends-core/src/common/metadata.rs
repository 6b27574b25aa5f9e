//! Metadata keys shared by the server and its clients.
//!
//! gRPC metadata keys are case-insensitive and normalized to lower case on the
//! wire, so every key here is lower case.

/// Request header naming the calling client, read for observability only.
pub const CALLER_IDENTITY: &str = "who";

/// Response header naming the service. Sent before the first message.
pub const SERVICE_IDENTITY: &str = "who";

/// Value of [`SERVICE_IDENTITY`].
pub const SERVICE_NAME: &str = "starfriends-server";

/// Response header carrying the API revision. Sent before the first message.
pub const SERVICE_VERSION: &str = "version";

/// Value of [`SERVICE_VERSION`].
pub const SERVICE_VERSION_VALUE: &str = "v2";

/// Trailer recording how long the server spent on the call.
pub const CALL_DURATION: &str = "duration";

/// Trailer of a server- or bidi-streaming call counting the messages it sent.
pub const MESSAGES_SENT: &str = "messages-sent";
