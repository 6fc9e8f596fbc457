//! Endpoint lifecycle and scheduling engine
//!
//! An [`S7Endpoint`] keeps one PLC synchronized: it owns the connection
//! lifecycle (connect, retry on failure, graceful shutdown), polls the
//! configured variables on a timer, serializes outbound writes, and fans out
//! value-change events.
//!
//! Internally each endpoint is a single task driven by a command channel.
//! Timer ticks, the reconnect delay and driver completions all arrive as
//! messages, and driver calls are spawned rather than awaited in the task
//! loop, so the endpoint keeps processing triggers while a read is
//! outstanding. Every dispatched driver call carries a generation stamp;
//! completions from a connection that has since been torn down are ignored.

pub mod change;
pub mod events;
mod poller;
pub mod status;
mod write_queue;

use crate::config::EndpointConfig;
use crate::driver::{ConnectOptions, ProtocolDriver, ValueMap};
use crate::error::{EndpointError, Result};
use events::{EventBus, VariableChange};
use poller::{CycleAction, CyclicPoller};
use serde_json::Value;
use status::{EndpointStatus, StatusBroadcaster};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use write_queue::{WriteQueue, WriteRequest};

/// Floor for the poll interval; shorter values are raised to this
pub const MIN_CYCLE_TIME_MS: u64 = 50;

/// Delay before retrying a failed connection attempt
pub const RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Internal connection state of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; a retry may be pending
    Offline,
    /// A connection attempt is under way
    Connecting,
    /// Connected, last read/write succeeded
    Online,
    /// Connected, but the last read or write failed
    BadValues,
    /// Shut down explicitly; nothing happens until `connect()` is called again
    Closed,
}

/// Commands processed by the endpoint task
enum Command {
    Connect,
    Shutdown(oneshot::Sender<()>),
    SetCycleTime(u64),
    TriggerCycle,
    Write(WriteRequest),
    RetryConnect,
    ConnectDone {
        generation: u64,
        result: Result<()>,
    },
    ReadDone {
        generation: u64,
        result: Result<ValueMap>,
    },
    WriteDone {
        generation: u64,
        id: Uuid,
        error: Option<String>,
    },
}

/// Completion handle for a submitted write
#[derive(Debug)]
pub struct WriteAck {
    rx: oneshot::Receiver<Result<()>>,
}

impl WriteAck {
    /// Wait for the write to reach the device.
    pub async fn wait(self) -> Result<()> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(EndpointError::closed("write request was dropped")))
    }
}

/// Handle to a running endpoint. Cheap to clone; the endpoint task keeps
/// running until every handle is dropped or `shutdown()` is awaited.
#[derive(Clone, Debug)]
pub struct S7Endpoint {
    tx: mpsc::UnboundedSender<Command>,
    events: Arc<EventBus>,
    status_rx: watch::Receiver<EndpointStatus>,
}

impl S7Endpoint {
    /// Validate the configuration, spawn the endpoint task and initiate the
    /// first connection attempt.
    ///
    /// Fails with [`EndpointError::Config`] when the link parameters are
    /// invalid; nothing is spawned in that case.
    pub fn start(config: EndpointConfig, driver: Arc<dyn ProtocolDriver>) -> Result<Self> {
        let options = config.connect_options()?;
        let vars = config.translation_table();
        let var_keys = Arc::new(vars.keys().cloned().collect::<Vec<_>>());

        let (tx, rx) = mpsc::unbounded_channel();
        let events = Arc::new(EventBus::new());
        let (status, status_rx) = StatusBroadcaster::new();

        let actor = EndpointActor {
            cycle_time_ms: config.cycle_time_ms,
            verbose: config.verbose,
            options,
            vars,
            var_keys,
            driver,
            rx,
            tx: tx.downgrade(),
            state: ConnectionState::Offline,
            generation: 0,
            session_active: false,
            connect_in_flight: false,
            poll_task: None,
            retry_task: None,
            poller: CyclicPoller::new(),
            writes: WriteQueue::new(),
            detector: change::ChangeDetector::new(),
            events: events.clone(),
            status,
        };
        tokio::spawn(actor.run());

        let endpoint = Self {
            tx,
            events,
            status_rx,
        };
        endpoint.send(Command::Connect)?;
        Ok(endpoint)
    }

    /// Ask the endpoint to (re)connect. Any open connection is dropped first;
    /// a closed endpoint comes back to life.
    pub fn connect(&self) -> Result<()> {
        self.send(Command::Connect)
    }

    /// Queue a variable write. Writes reach the device strictly in
    /// submission order; the returned ack resolves with the driver outcome.
    pub fn submit_write<S: Into<String>>(&self, name: S, value: Value) -> Result<WriteAck> {
        let name = name.into();
        if name.is_empty() {
            return Err(EndpointError::invalid_input("write needs a variable name"));
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Write(WriteRequest::new(name, value, ack_tx)))?;
        Ok(WriteAck { rx: ack_rx })
    }

    /// Update the poll interval on the fly. A value of 0 disables cyclic
    /// reading; positive values below [`MIN_CYCLE_TIME_MS`] are raised to the
    /// floor with a logged warning. Accepts a JSON number or numeric string.
    pub fn set_cycle_time(&self, interval: &Value) -> Result<()> {
        let ms = cycle_time_from_value(interval)?;
        self.send(Command::SetCycleTime(ms))
    }

    /// Request one poll cycle right now, independent of the timer.
    pub fn trigger_cycle_now(&self) -> Result<()> {
        self.send(Command::TriggerCycle)
    }

    /// Current presentation status.
    pub fn status(&self) -> EndpointStatus {
        *self.status_rx.borrow()
    }

    /// Watch status changes; duplicates are never published.
    pub fn subscribe_status(&self) -> watch::Receiver<EndpointStatus> {
        self.status_rx.clone()
    }

    /// Full result set of every completed cycle.
    pub fn subscribe_all_values(&self) -> broadcast::Receiver<ValueMap> {
        self.events.subscribe_all_values()
    }

    /// Full result set of cycles where at least one variable changed.
    pub fn subscribe_all_changed(&self) -> broadcast::Receiver<ValueMap> {
        self.events.subscribe_all_changed()
    }

    /// One event per changed variable.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<VariableChange> {
        self.events.subscribe_changes()
    }

    /// New values of a single variable, emitted when it changes.
    pub fn subscribe_value(&self, name: &str) -> broadcast::Receiver<Value> {
        self.events.subscribe_value(name)
    }

    /// Shut the endpoint down: cancel timers, drop the connection, stop
    /// reacting to anything until `connect()` is called again. Resolves once
    /// the driver connection is down.
    pub async fn shutdown(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(done_tx)).is_err() {
            // endpoint task already gone, nothing left to tear down
            return Ok(());
        }
        let _ = done_rx.await;
        Ok(())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| EndpointError::closed("endpoint task is gone"))
    }
}

/// Parse a cycle time command argument: a non-negative integer number of
/// milliseconds, as a JSON number or numeric string.
fn cycle_time_from_value(raw: &Value) -> Result<u64> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed.map(f64::trunc) {
        Some(ms) if ms.is_finite() && ms >= 0.0 => Ok(ms as u64),
        _ => Err(EndpointError::invalid_input(format!(
            "invalid cycle time interval: {raw}"
        ))),
    }
}

struct EndpointActor {
    options: ConnectOptions,
    vars: indexmap::IndexMap<String, String>,
    var_keys: Arc<Vec<String>>,
    driver: Arc<dyn ProtocolDriver>,
    rx: mpsc::UnboundedReceiver<Command>,
    tx: mpsc::WeakUnboundedSender<Command>,
    state: ConnectionState,
    /// Bumped on every connect attempt and on shutdown; stale completions
    /// are dropped by comparing against it
    generation: u64,
    /// True from the first connect attempt until shutdown drops the driver
    /// session, mirroring whether the driver holds connection state for us
    session_active: bool,
    connect_in_flight: bool,
    cycle_time_ms: u64,
    verbose: bool,
    poll_task: Option<JoinHandle<()>>,
    retry_task: Option<JoinHandle<()>>,
    poller: CyclicPoller,
    writes: WriteQueue,
    detector: change::ChangeDetector,
    events: Arc<EventBus>,
    status: StatusBroadcaster,
}

impl EndpointActor {
    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Connect => self.start_connect(),
                Command::Shutdown(done) => self.handle_shutdown(done),
                Command::SetCycleTime(ms) => self.apply_cycle_time(ms),
                Command::TriggerCycle => self.handle_trigger(),
                Command::Write(request) => self.handle_write_request(request),
                Command::RetryConnect => self.handle_retry(),
                Command::ConnectDone { generation, result } => {
                    self.handle_connect_done(generation, result)
                }
                Command::ReadDone { generation, result } => {
                    self.handle_read_done(generation, result)
                }
                Command::WriteDone {
                    generation,
                    id,
                    error,
                } => self.handle_write_done(generation, id, error),
            }
        }

        // every handle is gone; stop the timers so their tasks exit
        self.stop_poll_timer();
        self.cancel_retry();
    }

    fn connected(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Online | ConnectionState::BadValues
        )
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.status.publish(state.into());
    }

    // --- connection lifecycle ---

    fn start_connect(&mut self) {
        if self.connect_in_flight {
            debug!("connect already in progress");
            return;
        }

        self.cancel_retry();
        self.stop_poll_timer();
        self.generation = self.generation.wrapping_add(1);

        let drop_first = self.session_active;
        if drop_first {
            self.set_state(ConnectionState::Offline);
        }
        if self.verbose {
            info!(host = %self.options.host, "connecting to the PLC");
        }
        self.set_state(ConnectionState::Connecting);
        self.session_active = true;
        self.connect_in_flight = true;

        let Some(tx) = self.tx.upgrade() else { return };
        let driver = self.driver.clone();
        let options = self.options.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            if drop_first {
                if let Err(err) = driver.disconnect().await {
                    debug!(error = %err, "error dropping the previous connection");
                }
            }
            let result = driver.connect(&options).await;
            let _ = tx.send(Command::ConnectDone { generation, result });
        });
    }

    fn handle_connect_done(&mut self, generation: u64, result: Result<()>) {
        if generation != self.generation {
            debug!("stale connect completion ignored");
            return;
        }
        self.connect_in_flight = false;

        if let Err(err) = result {
            self.set_state(ConnectionState::Offline);
            error!(host = %self.options.host, error = %err, "failed to connect to the PLC");
            self.schedule_retry();
            return;
        }

        self.cancel_retry();
        self.poller.reset();
        self.writes.reset();
        self.set_state(ConnectionState::Online);

        if self.vars.is_empty() {
            warn!("no variables configured, cyclic reads disabled");
        } else {
            let table = self.vars.clone();
            self.driver
                .set_address_translator(Arc::new(move |tag: &str| table.get(tag).cloned()));
            self.driver.register_keys(self.var_keys.as_slice());
            self.apply_cycle_time(self.cycle_time_ms);
        }

        self.write_next();
    }

    fn handle_retry(&mut self) {
        self.retry_task = None;
        if self.state == ConnectionState::Closed {
            return;
        }
        self.start_connect();
    }

    fn schedule_retry(&mut self) {
        self.cancel_retry();
        let weak = self.tx.clone();
        self.retry_task = Some(tokio::spawn(async move {
            time::sleep(RECONNECT_DELAY).await;
            if let Some(tx) = weak.upgrade() {
                let _ = tx.send(Command::RetryConnect);
            }
        }));
    }

    fn cancel_retry(&mut self) {
        if let Some(task) = self.retry_task.take() {
            task.abort();
        }
    }

    fn handle_shutdown(&mut self, done: oneshot::Sender<()>) {
        self.cancel_retry();
        self.stop_poll_timer();
        if self.verbose {
            info!(host = %self.options.host, "disconnecting from the PLC");
        }
        self.set_state(ConnectionState::Offline);
        self.set_state(ConnectionState::Closed);
        self.generation = self.generation.wrapping_add(1);
        self.connect_in_flight = false;
        self.poller.reset();
        self.writes.reset();

        if std::mem::replace(&mut self.session_active, false) {
            let driver = self.driver.clone();
            tokio::spawn(async move {
                if let Err(err) = driver.disconnect().await {
                    debug!(error = %err, "error dropping the connection on shutdown");
                }
                let _ = done.send(());
            });
        } else {
            let _ = done.send(());
        }
    }

    // --- cyclic reads ---

    fn apply_cycle_time(&mut self, interval_ms: u64) {
        self.stop_poll_timer();

        if interval_ms == 0 {
            self.cycle_time_ms = 0;
            return;
        }

        let interval_ms = if interval_ms < MIN_CYCLE_TIME_MS {
            warn!(
                requested = interval_ms,
                min = MIN_CYCLE_TIME_MS,
                "cycle time below the minimum, clamping"
            );
            MIN_CYCLE_TIME_MS
        } else {
            interval_ms
        };
        self.cycle_time_ms = interval_ms;

        if self.state == ConnectionState::Closed {
            return;
        }
        self.start_poll_timer(interval_ms);
    }

    fn start_poll_timer(&mut self, interval_ms: u64) {
        let weak = self.tx.clone();
        self.poll_task = Some(tokio::spawn(async move {
            let mut ticker = time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick of an interval completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(tx) = weak.upgrade() else { break };
                if tx.send(Command::TriggerCycle).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_poll_timer(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }

    fn handle_trigger(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        match self.poller.trigger(self.connected()) {
            CycleAction::Read => self.start_read(),
            CycleAction::Deferred => {
                debug!(
                    deferred = self.poller.deferred(),
                    "previous read still pending, cycle deferred"
                );
            }
            CycleAction::Reconnect => {
                warn!(host = %self.options.host, "no response from the PLC, dropping and rebuilding the connection");
                self.start_connect();
            }
        }
    }

    fn start_read(&mut self) {
        let Some(tx) = self.tx.upgrade() else { return };
        let driver = self.driver.clone();
        let keys = self.var_keys.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = driver.read_all(&keys).await;
            let _ = tx.send(Command::ReadDone { generation, result });
        });
    }

    fn handle_read_done(&mut self, generation: u64, result: Result<ValueMap>) {
        if generation != self.generation {
            debug!("stale read completion ignored");
            return;
        }

        // catch up immediately when triggers were deferred behind this read
        if self.poller.complete(self.connected()) {
            self.handle_trigger();
        }

        match result {
            Err(err) => {
                self.set_state(ConnectionState::BadValues);
                error!(error = %err, "cyclic read failed");
            }
            Ok(values) => {
                self.set_state(ConnectionState::Online);
                let changes = self.detector.process(&values);
                self.events.publish_cycle(&values, &changes);
            }
        }
    }

    // --- writes ---

    fn handle_write_request(&mut self, request: WriteRequest) {
        debug!(id = %request.id, name = %request.name, depth = self.writes.len(), "write queued");
        let idle = !self.writes.in_progress();
        self.writes.push(request);
        if idle {
            self.write_next();
        }
    }

    fn write_next(&mut self) {
        if !self.connected() || self.writes.in_progress() {
            return;
        }
        let Some(request) = self.writes.pop_next() else {
            return;
        };

        let Some(tx) = self.tx.upgrade() else { return };
        let driver = self.driver.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = driver.write(&request.name, &request.value).await;
            let error = result.as_ref().err().map(ToString::to_string);
            if let Some(ack) = request.ack {
                let _ = ack.send(result);
            }
            let _ = tx.send(Command::WriteDone {
                generation,
                id: request.id,
                error,
            });
        });
    }

    fn handle_write_done(&mut self, generation: u64, id: Uuid, error: Option<String>) {
        if generation != self.generation {
            debug!(id = %id, "stale write completion ignored");
            return;
        }

        self.writes.complete();
        self.write_next();

        match error {
            Some(err) => {
                self.set_state(ConnectionState::BadValues);
                error!(id = %id, error = %err, "write to the PLC failed");
            }
            None => self.set_state(ConnectionState::Online),
        }
    }
}
