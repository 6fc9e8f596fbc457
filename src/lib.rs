//! Endpoint driver for Siemens S7 PLCs
//!
//! This crate keeps a logical endpoint to an S7 PLC continuously
//! synchronized. An [`S7Endpoint`] owns the connection lifecycle, polls a
//! fixed set of variables on a timer, serializes outbound writes, and raises
//! value-change events to any number of subscribers.
//!
//! # Features
//!
//! - Connection state machine with automatic retry and graceful shutdown
//! - Cyclic bulk reads with stall detection and forced reconnection
//! - Strictly-ordered write queue (one request in flight at a time)
//! - Per-variable and aggregate change events over typed channels
//! - Presentation status stream that only reports actual changes
//!
//! The wire protocol itself lives behind the [`ProtocolDriver`] trait; this
//! crate contains no framing or transport code.
//!
//! # Example
//!
//! ```rust,ignore
//! use s7_endpoint::{EndpointConfig, S7Endpoint, VariableDef};
//! use std::sync::Arc;
//!
//! let mut config = EndpointConfig::new("192.168.0.10");
//! config.cycle_time_ms = 500;
//! config.variables = vec![VariableDef {
//!     name: "motor_on".into(),
//!     addr: "DB1,X0.0".into(),
//! }];
//!
//! let endpoint = S7Endpoint::start(config, Arc::new(driver))?;
//! let mut changes = endpoint.subscribe_changes();
//! while let Ok(change) = changes.recv().await {
//!     println!("{} = {}", change.key, change.value);
//! }
//! # Ok::<(), s7_endpoint::EndpointError>(())
//! ```

pub mod config;
pub mod driver;
pub mod endpoint;
pub mod error;

// Re-export main types for convenience
pub use config::{ConnectionLink, EndpointConfig, VariableDef};
pub use driver::{AddressTranslator, ConnectOptions, LinkParams, ProtocolDriver, ValueMap};
pub use endpoint::change::values_equal;
pub use endpoint::events::VariableChange;
pub use endpoint::status::EndpointStatus;
pub use endpoint::{ConnectionState, S7Endpoint, WriteAck, MIN_CYCLE_TIME_MS, RECONNECT_DELAY};
pub use error::{EndpointError, Result};
