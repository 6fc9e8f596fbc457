//! Protocol driver interface
//!
//! The endpoint core does not speak the wire protocol itself; it drives an
//! implementation of [`ProtocolDriver`] that owns framing, addressing and
//! transport. Implementations hold their own connection state internally so
//! that the endpoint can dispatch operations from spawned tasks; the core
//! guarantees that at most one operation of each kind (connect, read, write)
//! is outstanding per endpoint at any time.

use crate::error::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// A bulk read result: variable name → value, in registration order
pub type ValueMap = IndexMap<String, Value>;

/// Callback used by the driver to resolve a variable name to its device
/// address (e.g. `"motor_on"` → `"DB1,X0.0"`)
pub type AddressTranslator = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolved connection parameters handed to [`ProtocolDriver::connect`]
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    /// Hostname or IP address of the PLC
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Transport link addressing
    pub link: LinkParams,
    /// Timeout applied by the driver to every request on this connection
    pub request_timeout: Duration,
}

/// Validated transport link parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkParams {
    /// Rack and slot of the controller module
    RackSlot { rack: u16, slot: u16 },
    /// Local and remote TSAP identifiers
    Tsap { local: u16, remote: u16 },
}

/// Trait for protocol driver implementations
#[async_trait]
pub trait ProtocolDriver: Send + Sync {
    /// Open a connection to the PLC
    async fn connect(&self, options: &ConnectOptions) -> Result<()>;

    /// Drop the connection
    async fn disconnect(&self) -> Result<()>;

    /// Read all registered variables in one bulk request
    async fn read_all(&self, keys: &[String]) -> Result<ValueMap>;

    /// Write one variable
    async fn write(&self, name: &str, value: &Value) -> Result<()>;

    /// Register the variable names that subsequent bulk reads will cover
    fn register_keys(&self, keys: &[String]);

    /// Install the name → address translation callback
    fn set_address_translator(&self, translator: AddressTranslator);
}
