//! Outbound write serialization
//!
//! Writes are queued in submission order and handed to the driver one at a
//! time; the next request is dispatched only after the previous completion
//! arrives. Requests submitted while the connection is down stay queued and
//! drain on the next successful connect.

use crate::error::Result;
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::oneshot;
use uuid::Uuid;

/// A queued variable write
pub(crate) struct WriteRequest {
    pub id: Uuid,
    pub name: String,
    pub value: Value,
    /// Resolved with the driver outcome once the write completes
    pub ack: Option<oneshot::Sender<Result<()>>>,
}

impl WriteRequest {
    pub fn new(name: String, value: Value, ack: oneshot::Sender<Result<()>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            value,
            ack: Some(ack),
        }
    }
}

#[derive(Default)]
pub(crate) struct WriteQueue {
    queue: VecDeque<WriteRequest>,
    in_progress: bool,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: WriteRequest) {
        self.queue.push_back(request);
    }

    /// Pop the next request for dispatch, marking the queue busy.
    pub fn pop_next(&mut self) -> Option<WriteRequest> {
        let next = self.queue.pop_front();
        if next.is_some() {
            self.in_progress = true;
        }
        next
    }

    /// Account for a completed write.
    pub fn complete(&mut self) {
        self.in_progress = false;
    }

    /// Clear the busy flag after a connection rebuild. A completion from the
    /// previous connection may never arrive; queued requests are kept.
    pub fn reset(&mut self) {
        self.in_progress = false;
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
