//! Presentation status derivation
//!
//! Consumers render a coarse status (think node badge), not the internal
//! connection state. The broadcaster maps state transitions onto that status
//! set and publishes over a watch channel only when the derived status
//! actually differs from the last published one.

use crate::endpoint::ConnectionState;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Presentation status of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    Unknown,
    Connecting,
    Online,
    BadValues,
    Offline,
}

impl EndpointStatus {
    /// Display label for the status
    pub fn label(&self) -> &'static str {
        match self {
            EndpointStatus::Unknown => "unknown",
            EndpointStatus::Connecting => "connecting",
            EndpointStatus::Online => "online",
            EndpointStatus::BadValues => "bad values",
            EndpointStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<ConnectionState> for EndpointStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connecting => EndpointStatus::Connecting,
            ConnectionState::Online => EndpointStatus::Online,
            ConnectionState::BadValues => EndpointStatus::BadValues,
            ConnectionState::Offline | ConnectionState::Closed => EndpointStatus::Offline,
        }
    }
}

/// Publishes status changes, suppressing duplicates
pub(crate) struct StatusBroadcaster {
    tx: watch::Sender<EndpointStatus>,
}

impl StatusBroadcaster {
    pub fn new() -> (Self, watch::Receiver<EndpointStatus>) {
        let (tx, rx) = watch::channel(EndpointStatus::Unknown);
        (Self { tx }, rx)
    }

    /// Publish a status. Returns true when the status differed from the
    /// previous one and a notification went out.
    pub fn publish(&self, status: EndpointStatus) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        })
    }

}
