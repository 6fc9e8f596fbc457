//! Typed event fan-out
//!
//! One broadcast channel per event kind instead of a stringly-keyed emitter:
//! subscribers register explicitly for exactly the stream they consume, and
//! every channel closes when the endpoint task goes away, so nothing is
//! delivered past shutdown.

use crate::driver::ValueMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Capacity of each event channel; slow subscribers see a lag error rather
/// than stalling the endpoint
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A changed variable and its new value
#[derive(Debug, Clone, PartialEq)]
pub struct VariableChange {
    pub key: String,
    pub value: Value,
}

/// Per-endpoint event channels
#[derive(Debug)]
pub(crate) struct EventBus {
    all_values: broadcast::Sender<ValueMap>,
    all_changed: broadcast::Sender<ValueMap>,
    changes: broadcast::Sender<VariableChange>,
    values: RwLock<HashMap<String, broadcast::Sender<Value>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            all_values: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
            all_changed: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
            changes: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Full result set of every completed cycle
    pub fn subscribe_all_values(&self) -> broadcast::Receiver<ValueMap> {
        self.all_values.subscribe()
    }

    /// Full result set, emitted only for cycles where something changed
    pub fn subscribe_all_changed(&self) -> broadcast::Receiver<ValueMap> {
        self.all_changed.subscribe()
    }

    /// One event per changed key
    pub fn subscribe_changes(&self) -> broadcast::Receiver<VariableChange> {
        self.changes.subscribe()
    }

    /// New values of a single variable, emitted when it changes
    pub fn subscribe_value(&self, name: &str) -> broadcast::Receiver<Value> {
        self.values
            .write()
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(EVENT_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Fan out one completed cycle: the full result set first, then the
    /// per-key streams, then the aggregate change event.
    pub fn publish_cycle(&self, values: &ValueMap, changes: &[VariableChange]) {
        let _ = self.all_values.send(values.clone());

        if changes.is_empty() {
            return;
        }

        {
            let per_value = self.values.read();
            for change in changes {
                if let Some(tx) = per_value.get(&change.key) {
                    let _ = tx.send(change.value.clone());
                }
                let _ = self.changes.send(change.clone());
            }
        }

        let _ = self.all_changed.send(values.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(entries: &[(&str, Value)]) -> ValueMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn cycle_without_changes_only_reports_values() {
        let bus = EventBus::new();
        let mut all_values = bus.subscribe_all_values();
        let mut all_changed = bus.subscribe_all_changed();

        bus.publish_cycle(&map(&[("a", json!(1))]), &[]);

        assert_eq!(all_values.try_recv().unwrap(), map(&[("a", json!(1))]));
        assert!(all_changed.try_recv().is_err());
    }

    #[tokio::test]
    async fn changed_keys_fan_out_to_every_stream() {
        let bus = EventBus::new();
        let mut all_changed = bus.subscribe_all_changed();
        let mut changes = bus.subscribe_changes();
        let mut b_values = bus.subscribe_value("b");
        let mut a_values = bus.subscribe_value("a");

        let values = map(&[("a", json!(1)), ("b", json!(2))]);
        let change = VariableChange {
            key: "b".into(),
            value: json!(2),
        };
        bus.publish_cycle(&values, &[change.clone()]);

        assert_eq!(changes.try_recv().unwrap(), change);
        assert_eq!(b_values.try_recv().unwrap(), json!(2));
        assert!(a_values.try_recv().is_err());
        assert_eq!(all_changed.try_recv().unwrap(), values);
    }
}
