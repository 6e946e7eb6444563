//! # Domain Errors

use thiserror::Error;

/// Close status used when the local side shuts the connection down.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close status used when the remote side went away.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Client-request errors. Every pending request ends in a response or one
/// of these; none is left unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollatorError {
    /// No response within the request deadline.
    #[error("Request {message_id} timed out after {timeout_ms} ms")]
    Timeout { message_id: u64, timeout_ms: u64 },

    /// The connection closed while the request was pending.
    #[error("Connection closed ({status}): {description}")]
    ConnectionClosed { status: u16, description: String },

    /// A request with the same identifier is still pending.
    #[error("Request {message_id} is already pending")]
    DuplicateRequest { message_id: u64 },

    /// Identifier `0` is reserved for notifications.
    #[error("Message id 0 is reserved for notifications")]
    InvalidMessageId,

    /// The transport failed to deliver the request.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server refused the request.
    #[error("Request {request_id} rejected: {reason}")]
    Rejected { request_id: u64, reason: String },

    /// The response carried an unexpected payload.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(&'static str),

    /// The envelope could not be signed.
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl CollatorError {
    pub fn closed(status: u16, description: impl Into<String>) -> Self {
        CollatorError::ConnectionClosed {
            status,
            description: description.into(),
        }
    }
}
