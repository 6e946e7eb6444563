//! # Pending Requests
//!
//! A request registered with the collator owns the sending half of a
//! oneshot channel; the caller awaits the receiving half through a
//! `ResponseHandle`. Each registration carries a token unique within its
//! collator, so a timer armed for one registration never expires a later
//! request that reuses the same message id.

use crate::domain::errors::{CollatorError, CLOSE_GOING_AWAY};
use shared_types::{MessageEnvelope, NodeMessage};
use std::time::Instant;
use tokio::sync::oneshot;

/// Response envelope delivered to a waiting caller.
pub type Response = MessageEnvelope<NodeMessage>;

/// Outcome sent to the waiting caller.
pub type Completion = Result<Response, CollatorError>;

/// A request awaiting its response.
#[derive(Debug)]
pub struct PendingRequest {
    message_id: u64,
    registration: u64,
    kind: &'static str,
    created_at: Instant,
    sender: oneshot::Sender<Completion>,
}

impl PendingRequest {
    /// Create a request and the handle its caller awaits.
    pub fn new(message_id: u64, registration: u64, kind: &'static str) -> (Self, ResponseHandle) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                message_id,
                registration,
                kind,
                created_at: Instant::now(),
                sender,
            },
            ResponseHandle {
                message_id,
                receiver,
            },
        )
    }

    pub fn message_id(&self) -> u64 {
        self.message_id
    }

    pub fn registration(&self) -> u64 {
        self.registration
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Deliver the outcome. Returns `false` if the caller stopped waiting.
    pub fn complete(self, completion: Completion) -> bool {
        self.sender.send(completion).is_ok()
    }
}

/// Awaitable side of a pending request.
#[derive(Debug)]
pub struct ResponseHandle {
    message_id: u64,
    receiver: oneshot::Receiver<Completion>,
}

impl ResponseHandle {
    pub fn message_id(&self) -> u64 {
        self.message_id
    }

    /// Wait for the response, a timeout or the connection closing.
    pub async fn wait(self) -> Completion {
        match self.receiver.await {
            Ok(completion) => completion,
            Err(_) => Err(CollatorError::closed(
                CLOSE_GOING_AWAY,
                "collator dropped the request",
            )),
        }
    }
}
