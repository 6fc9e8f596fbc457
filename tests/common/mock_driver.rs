//! Scripted protocol driver for integration tests
//!
//! Connect and write calls succeed unless a failure is scripted. Read calls
//! pop scripted results; with nothing scripted and no default result they
//! hang forever, which is how the stall tests starve the poller.

use async_trait::async_trait;
use s7_endpoint::{
    AddressTranslator, ConnectOptions, EndpointError, ProtocolDriver, Result, ValueMap,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    connect_results: VecDeque<Result<()>>,
    read_results: VecDeque<Result<ValueMap>>,
    write_results: VecDeque<Result<()>>,
    default_read: Option<ValueMap>,
    connect_calls: u32,
    disconnect_calls: u32,
    reads_issued: u32,
    writes: Vec<(String, Value)>,
    registered_keys: Vec<String>,
    translator: Option<AddressTranslator>,
    last_options: Option<ConnectOptions>,
}

#[derive(Default)]
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // --- scripting ---

    pub fn script_connect_error(&self, msg: &str) {
        self.state
            .lock()
            .unwrap()
            .connect_results
            .push_back(Err(EndpointError::connection(msg)));
    }

    pub fn script_read(&self, values: ValueMap) {
        self.state
            .lock()
            .unwrap()
            .read_results
            .push_back(Ok(values));
    }

    pub fn script_read_error(&self, msg: &str) {
        self.state
            .lock()
            .unwrap()
            .read_results
            .push_back(Err(EndpointError::read(msg)));
    }

    /// Serve this result for every read with nothing else scripted.
    pub fn set_default_read(&self, values: ValueMap) {
        self.state.lock().unwrap().default_read = Some(values);
    }

    pub fn script_write_error(&self, msg: &str) {
        self.state
            .lock()
            .unwrap()
            .write_results
            .push_back(Err(EndpointError::write(msg)));
    }

    // --- observations ---

    pub fn connect_calls(&self) -> u32 {
        self.state.lock().unwrap().connect_calls
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.state.lock().unwrap().disconnect_calls
    }

    pub fn reads_issued(&self) -> u32 {
        self.state.lock().unwrap().reads_issued
    }

    pub fn writes(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn registered_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().registered_keys.clone()
    }

    pub fn translate(&self, tag: &str) -> Option<String> {
        let translator = self.state.lock().unwrap().translator.clone();
        translator.and_then(|t| t(tag))
    }

    pub fn last_options(&self) -> Option<ConnectOptions> {
        self.state.lock().unwrap().last_options.clone()
    }
}

#[async_trait]
impl ProtocolDriver for MockDriver {
    async fn connect(&self, options: &ConnectOptions) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;
        state.last_options = Some(options.clone());
        state.connect_results.pop_front().unwrap_or(Ok(()))
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.lock().unwrap().disconnect_calls += 1;
        Ok(())
    }

    async fn read_all(&self, _keys: &[String]) -> Result<ValueMap> {
        let next = {
            let mut state = self.state.lock().unwrap();
            state.reads_issued += 1;
            state
                .read_results
                .pop_front()
                .or_else(|| state.default_read.clone().map(Ok))
        };
        match next {
            Some(result) => result,
            // nothing scripted: behave like a device that stopped answering
            None => std::future::pending().await,
        }
    }

    async fn write(&self, name: &str, value: &Value) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.writes.push((name.to_string(), value.clone()));
        state.write_results.pop_front().unwrap_or(Ok(()))
    }

    fn register_keys(&self, keys: &[String]) {
        self.state.lock().unwrap().registered_keys = keys.to_vec();
    }

    fn set_address_translator(&self, translator: AddressTranslator) {
        self.state.lock().unwrap().translator = Some(translator);
    }
}
