//! Index-addressed metric key package.
//!
//! Mirrors the timeseries "key package" interface the engine publishes
//! through: keys are registered once and addressed by index afterwards, and
//! an interval snapshot pairs every key with its current value.

use std::collections::HashMap;

/// A set of named monotonic gauges addressed by index.
#[derive(Debug, Default)]
pub struct KeyPackage {
    keys: Vec<String>,
    values: Vec<u64>,
    index: HashMap<String, usize>,
}

/// All metric values of one interval.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub time: u32,
    pub metrics: Vec<(String, u64)>,
}

impl KeyPackage {
    pub fn new() -> Self {
        KeyPackage::default()
    }

    /// Registers a key and returns its index. Re-registering an existing
    /// key returns the previously assigned index.
    pub fn add_key(&mut self, key: &str) -> usize {
        if let Some(idx) = self.index.get(key) {
            return *idx;
        }
        let idx = self.keys.len();
        self.keys.push(key.to_string());
        self.values.push(0);
        self.index.insert(key.to_string(), idx);
        idx
    }

    pub fn set(&mut self, idx: usize, value: u64) {
        if let Some(v) = self.values.get_mut(idx) {
            *v = value;
        }
    }

    pub fn get(&self, idx: usize) -> u64 {
        self.values.get(idx).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Pairs every key with its current value.
    pub fn snapshot(&self, time: u32) -> MetricSnapshot {
        MetricSnapshot {
            time,
            metrics: self
                .keys
                .iter()
                .cloned()
                .zip(self.values.iter().copied())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_key_idempotent() {
        let mut kp = KeyPackage::new();
        let a = kp.add_key("bgp.rrc00.valid_record_cnt");
        let b = kp.add_key("bgp.rrc00.valid_record_cnt");
        assert_eq!(a, b);
        assert_eq!(kp.len(), 1);
        let c = kp.add_key("bgp.rrc00.corrupted_record_cnt");
        assert_ne!(a, c);
    }

    #[test]
    fn test_set_get_snapshot() {
        let mut kp = KeyPackage::new();
        let a = kp.add_key("x");
        let b = kp.add_key("y");
        kp.set(a, 7);
        kp.set(b, 9);
        assert_eq!(kp.get(a), 7);

        let snap = kp.snapshot(1000);
        assert_eq!(snap.time, 1000);
        assert_eq!(snap.metrics, vec![("x".to_string(), 7), ("y".to_string(), 9)]);

        // out-of-range indices are ignored
        kp.set(99, 1);
        assert_eq!(kp.get(99), 0);
    }
}
