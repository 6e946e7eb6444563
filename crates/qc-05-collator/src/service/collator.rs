//! # Message Collator
//!
//! Matches responses to pending requests by message id.
//!
//! Flow:
//! 1. The caller picks a non-zero id and calls `add()`, receiving a handle
//! 2. `schedule_expiration()` arms the deadline
//! 3. The reader calls `resolve()` for every incoming envelope
//! 4. The caller awaits the handle: response, `Timeout` or `ConnectionClosed`
//!
//! A response arriving after its deadline is discarded and logged. A
//! deadline applies only to the registration it was armed for; reusing an
//! id after it resolved starts a fresh request.

use crate::domain::errors::CollatorError;
use crate::domain::pending::{PendingRequest, Response, ResponseHandle};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Expired ids remembered to tell late responses from notifications.
const EXPIRED_MEMORY: usize = 1024;

/// What `resolve` did with an envelope.
#[derive(Debug)]
pub enum Resolution {
    /// Delivered to the waiting request.
    Resolved { message_id: u64 },
    /// Late or abandoned response, dropped.
    Discarded { message_id: u64 },
    /// Not a response to any request.
    Unsolicited(Response),
}

/// Collator statistics.
#[derive(Debug, Default)]
pub struct CollatorStats {
    pub registered: AtomicU64,
    pub resolved: AtomicU64,
    pub timed_out: AtomicU64,
    pub closed: AtomicU64,
}

/// Pending request registry for one connection.
#[derive(Debug, Default)]
pub struct MessageCollator {
    pending: Mutex<HashMap<u64, PendingRequest>>,
    expired: Mutex<VecDeque<u64>>,
    next_registration: AtomicU64,
    stats: CollatorStats,
}

impl MessageCollator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request under its message id.
    ///
    /// # Errors
    ///
    /// `InvalidMessageId` for id `0`; `DuplicateRequest` if the id is still
    /// pending. The existing request is left untouched.
    pub fn add(&self, message_id: u64, kind: &'static str) -> Result<ResponseHandle, CollatorError> {
        if message_id == 0 {
            return Err(CollatorError::InvalidMessageId);
        }
        let mut pending = self.pending.lock();
        if pending.contains_key(&message_id) {
            return Err(CollatorError::DuplicateRequest { message_id });
        }
        let registration = self.next_registration.fetch_add(1, Ordering::Relaxed);
        let (request, handle) = PendingRequest::new(message_id, registration, kind);
        pending.insert(message_id, request);
        self.stats.registered.fetch_add(1, Ordering::Relaxed);
        debug!(message_id, kind, "[qc-05] Registered pending request");
        Ok(handle)
    }

    /// Route an incoming envelope.
    pub fn resolve(&self, envelope: Response) -> Resolution {
        if envelope.is_notification() {
            return Resolution::Unsolicited(envelope);
        }
        let message_id = envelope.message_id;

        let request = self.pending.lock().remove(&message_id);
        match request {
            Some(request) => {
                let elapsed_ms = request.created_at().elapsed().as_millis() as u64;
                let kind = request.kind();
                if request.complete(Ok(envelope)) {
                    self.stats.resolved.fetch_add(1, Ordering::Relaxed);
                    debug!(message_id, kind, elapsed_ms, "[qc-05] Resolved request");
                    Resolution::Resolved { message_id }
                } else {
                    debug!(message_id, kind, "[qc-05] Caller stopped waiting");
                    Resolution::Discarded { message_id }
                }
            }
            None if self.forget_expired(message_id) => {
                warn!(message_id, "[qc-05] Discarding response that arrived after its deadline");
                Resolution::Discarded { message_id }
            }
            None => Resolution::Unsolicited(envelope),
        }
    }

    /// Complete the request currently pending under `message_id` with
    /// `Timeout` after `timeout`, unless it was resolved first.
    pub fn schedule_expiration(self: &Arc<Self>, message_id: u64, timeout: Duration) {
        let Some(registration) = self
            .pending
            .lock()
            .get(&message_id)
            .map(PendingRequest::registration)
        else {
            return;
        };
        let collator = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            collator.expire(message_id, registration, timeout);
        });
    }

    fn expire(&self, message_id: u64, registration: u64, timeout: Duration) -> bool {
        let request = {
            let mut pending = self.pending.lock();
            match pending.get(&message_id) {
                Some(request) if request.registration() == registration => {
                    pending.remove(&message_id)
                }
                _ => None,
            }
        };
        let Some(request) = request else {
            return false;
        };
        {
            let mut expired = self.expired.lock();
            if expired.len() == EXPIRED_MEMORY {
                expired.pop_front();
            }
            expired.push_back(message_id);
        }
        self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
        warn!(
            message_id,
            kind = request.kind(),
            timeout_ms = timeout.as_millis() as u64,
            "[qc-05] Request timed out"
        );
        request.complete(Err(CollatorError::Timeout {
            message_id,
            timeout_ms: timeout.as_millis() as u64,
        }));
        true
    }

    fn forget_expired(&self, message_id: u64) -> bool {
        let mut expired = self.expired.lock();
        match expired.iter().position(|id| *id == message_id) {
            Some(pos) => {
                expired.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Drop a request without completing it. The caller's handle reports
    /// the connection as gone.
    pub fn cancel(&self, message_id: u64) -> bool {
        self.pending.lock().remove(&message_id).is_some()
    }

    /// Complete every pending request with `ConnectionClosed`.
    pub fn close_all(&self, status: u16, description: &str) -> usize {
        let drained: Vec<PendingRequest> = self.pending.lock().drain().map(|(_, r)| r).collect();
        let count = drained.len();
        for request in drained {
            request.complete(Err(CollatorError::closed(status, description)));
        }
        if count > 0 {
            self.stats.closed.fetch_add(count as u64, Ordering::Relaxed);
            debug!(count, status, "[qc-05] Closed pending requests");
        }
        count
    }

    pub fn is_pending(&self, message_id: u64) -> bool {
        self.pending.lock().contains_key(&message_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn stats(&self) -> &CollatorStats {
        &self.stats
    }
}
