//! Value change detection
//!
//! Each completed cycle is diffed against the last observed snapshot and only
//! the keys whose value actually changed are reported. Comparison is shallow
//! on purpose: PLC reads produce scalars and flat arrays of scalars, and a
//! one-level comparison keeps a cycle O(number of variables).

use crate::driver::ValueMap;
use crate::endpoint::events::VariableChange;
use serde_json::Value;

/// Shallow value equality.
///
/// Null only equals null. Scalars compare by value, with numbers compared as
/// f64. Arrays compare element-wise, one level deep; nested arrays or objects
/// never compare equal.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .zip(right.iter())
                    .all(|(x, y)| scalar_identical(x, y))
        }
        _ => scalar_identical(a, b),
    }
}

fn scalar_identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(x), Value::String(y)) => x == y,
        _ => false,
    }
}

/// Diffs cycle results against the last observed values
#[derive(Default)]
pub(crate) struct ChangeDetector {
    snapshot: ValueMap,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare a cycle result against the snapshot, updating the snapshot
    /// in place for every changed key. A key seen for the first time always
    /// counts as changed.
    pub fn process(&mut self, values: &ValueMap) -> Vec<VariableChange> {
        let mut changes = Vec::new();

        for (key, value) in values {
            let unchanged = self
                .snapshot
                .get(key)
                .map(|old| values_equal(old, value))
                .unwrap_or(false);

            if !unchanged {
                self.snapshot.insert(key.clone(), value.clone());
                changes.push(VariableChange {
                    key: key.clone(),
                    value: value.clone(),
                });
            }
        }

        changes
    }
}
