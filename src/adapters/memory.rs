//! In-Memory Sink Adapter
//!
//! Records published readings for inspection in tests.

use parking_lot::RwLock;

use crate::domain::ports::{MetricSink, Reading};
use crate::error::Result;

/// In-memory metric sink for testing.
///
/// Keeps every write in publication order.
#[derive(Debug, Default)]
pub struct InMemorySink {
    writes: RwLock<Vec<(String, Reading)>>,
}

impl InMemorySink {
    /// Create a new, empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All writes as `(city, reading)` pairs.
    pub fn writes(&self) -> Vec<(String, Reading)> {
        self.writes.read().clone()
    }

    /// Cities written, in order.
    pub fn cities(&self) -> Vec<String> {
        self.writes.read().iter().map(|(c, _)| c.clone()).collect()
    }

    /// Most recent reading for `city`.
    pub fn latest(&self, city: &str) -> Option<Reading> {
        self.writes
            .read()
            .iter()
            .rev()
            .find(|(c, _)| c == city)
            .map(|(_, r)| r.clone())
    }

    pub fn len(&self) -> usize {
        self.writes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.read().is_empty()
    }

    pub fn clear(&self) {
        self.writes.write().clear();
    }
}

impl MetricSink for InMemorySink {
    fn publish(&self, city: &str, reading: &Reading) -> Result<()> {
        self.writes.write().push((city.to_string(), reading.clone()));
        Ok(())
    }
}
