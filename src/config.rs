//! Endpoint configuration
//!
//! An [`EndpointConfig`] describes one PLC endpoint: where the device lives,
//! how the transport link is addressed (rack/slot or TSAP pair), how often to
//! poll, and which variables to keep synchronized. The configuration is
//! validated once when the endpoint starts and is immutable afterwards.

use crate::driver::{ConnectOptions, LinkParams};
use crate::error::{EndpointError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default ISO-on-TCP port used by S7 PLCs
pub const DEFAULT_PORT: u16 = 102;

/// Default per-request timeout handed to the protocol driver
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(1500);

/// Default poll interval, in milliseconds
pub const DEFAULT_CYCLE_TIME_MS: u64 = 1000;

/// Endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Hostname or IP address of the PLC
    pub host: String,

    /// TCP port of the PLC
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport link addressing
    #[serde(default)]
    pub link: ConnectionLink,

    /// Per-request timeout handed to the protocol driver
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Poll interval in milliseconds; 0 disables cyclic reading
    #[serde(default = "default_cycle_time")]
    pub cycle_time_ms: u64,

    /// Variables to keep synchronized
    #[serde(default)]
    pub variables: Vec<VariableDef>,

    /// Log connection lifecycle chatter at info level
    #[serde(default)]
    pub verbose: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_cycle_time() -> u64 {
    DEFAULT_CYCLE_TIME_MS
}

/// Transport link addressing for the PLC connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ConnectionLink {
    /// Address a controller by rack and slot number
    RackSlot {
        #[serde(default)]
        rack: u16,
        #[serde(default = "default_slot")]
        slot: u16,
    },

    /// Address the transport endpoints directly with a TSAP pair.
    /// Each component must be exactly two hexadecimal digits.
    Tsap {
        local_hi: String,
        local_lo: String,
        remote_hi: String,
        remote_lo: String,
    },
}

fn default_slot() -> u16 {
    2
}

impl Default for ConnectionLink {
    fn default() -> Self {
        // rack 0 / slot 2 covers the common S7-300 arrangement
        Self::RackSlot { rack: 0, slot: 2 }
    }
}

/// A named variable and its device address (e.g. `"DB10,INT2"`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    pub addr: String,
}

impl EndpointConfig {
    /// Create a configuration with defaults for everything but the host
    pub fn new<S: Into<String>>(host: S) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            link: ConnectionLink::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cycle_time_ms: DEFAULT_CYCLE_TIME_MS,
            variables: Vec::new(),
            verbose: false,
        }
    }

    /// Resolve the driver connection options, validating the link parameters.
    ///
    /// Fails with [`EndpointError::Config`] when a TSAP component is not
    /// exactly two hexadecimal digits.
    pub fn connect_options(&self) -> Result<ConnectOptions> {
        let link = match &self.link {
            ConnectionLink::RackSlot { rack, slot } => LinkParams::RackSlot {
                rack: *rack,
                slot: *slot,
            },
            ConnectionLink::Tsap {
                local_hi,
                local_lo,
                remote_hi,
                remote_lo,
            } => LinkParams::Tsap {
                local: combine_tsap(local_hi, local_lo)?,
                remote: combine_tsap(remote_hi, remote_lo)?,
            },
        };

        Ok(ConnectOptions {
            host: self.host.clone(),
            port: self.port,
            link,
            request_timeout: self.request_timeout,
        })
    }

    /// Build the name → address translation table from the variable list,
    /// skipping incomplete entries. Insertion order is preserved so cyclic
    /// reads and events iterate variables deterministically.
    pub fn translation_table(&self) -> IndexMap<String, String> {
        self.variables
            .iter()
            .filter(|var| !var.name.is_empty() && !var.addr.is_empty())
            .map(|var| (var.name.clone(), var.addr.clone()))
            .collect()
    }
}

/// Combine two TSAP components into one 16-bit identifier
fn combine_tsap(hi: &str, lo: &str) -> Result<u16> {
    Ok(((tsap_component(hi)? as u16) << 8) | tsap_component(lo)? as u16)
}

fn tsap_component(raw: &str) -> Result<u8> {
    if raw.len() != 2 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(EndpointError::config(format!(
            "invalid TSAP component '{raw}': expected exactly two hex digits"
        )));
    }
    u8::from_str_radix(raw, 16)
        .map_err(|_| EndpointError::config(format!("invalid TSAP component '{raw}'")))
}
