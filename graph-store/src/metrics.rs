//! Store operation metrics
//!
//! Counters and timers keyed by metric name and tag, updated lock-free from
//! any number of concurrent operations:
//! - `graph.store.transactions{cardinality=single|multiple}`
//! - `graph.store.operations{state=complete|failure}`
//! - `graph.store.timer{cardinality=single|multiple}`

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const TRANSACTIONS: &str = "graph.store.transactions";
pub const OPERATIONS: &str = "graph.store.operations";
pub const TIMER: &str = "graph.store.timer";

/// Whether an operation covered one transaction or a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Multiple,
}

impl Cardinality {
    pub fn of(count: usize) -> Self {
        if count > 1 {
            Cardinality::Multiple
        } else {
            Cardinality::Single
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Cardinality::Single => "cardinality=single",
            Cardinality::Multiple => "cardinality=multiple",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Complete,
    Failure,
}

impl OperationState {
    fn tag(&self) -> &'static str {
        match self {
            OperationState::Complete => "state=complete",
            OperationState::Failure => "state=failure",
        }
    }
}

#[derive(Default)]
struct Timer {
    count: AtomicU64,
    total_us: AtomicU64,
    max_us: AtomicU64,
}

impl Timer {
    fn record(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_us.fetch_add(us, Ordering::Relaxed);
        self.max_us.fetch_max(us, Ordering::Relaxed);
    }
}

/// Timer summary as reported by [`StoreMetrics::snapshot`]
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub count: u64,
    pub total_us: u64,
    pub max_us: u64,
}

/// Point-in-time copy of all metrics, keyed `name{tag}`
#[derive(Debug, Clone, Serialize, Default)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub timers: BTreeMap<String, TimerSnapshot>,
}

#[derive(Default)]
pub struct StoreMetrics {
    counters: DashMap<(&'static str, &'static str), AtomicU64>,
    timers: DashMap<(&'static str, &'static str), Timer>,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn increment(&self, name: &'static str, tag: &'static str) {
        self.counters
            .entry((name, tag))
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record one access-layer operation
    pub fn record(&self, cardinality: Cardinality, state: OperationState, elapsed: Duration) {
        self.increment(TRANSACTIONS, cardinality.tag());
        self.increment(OPERATIONS, state.tag());
        self.timers
            .entry((TIMER, cardinality.tag()))
            .or_default()
            .record(elapsed);
    }

    pub fn transactions(&self, cardinality: Cardinality) -> u64 {
        self.counter(TRANSACTIONS, cardinality.tag())
    }

    pub fn operations(&self, state: OperationState) -> u64 {
        self.counter(OPERATIONS, state.tag())
    }

    fn counter(&self, name: &'static str, tag: &'static str) -> u64 {
        self.counters
            .get(&(name, tag))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self
            .counters
            .iter()
            .map(|entry| {
                let (name, tag) = entry.key();
                (format!("{}{{{}}}", name, tag), entry.value().load(Ordering::Relaxed))
            })
            .collect();
        let timers = self
            .timers
            .iter()
            .map(|entry| {
                let (name, tag) = entry.key();
                let timer = entry.value();
                (
                    format!("{}{{{}}}", name, tag),
                    TimerSnapshot {
                        count: timer.count.load(Ordering::Relaxed),
                        total_us: timer.total_us.load(Ordering::Relaxed),
                        max_us: timer.max_us.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();
        MetricsSnapshot { counters, timers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_updates_counters_and_timer() {
        let metrics = StoreMetrics::new();
        metrics.record(Cardinality::Single, OperationState::Complete, Duration::from_millis(3));
        metrics.record(Cardinality::of(4), OperationState::Failure, Duration::from_millis(7));
        metrics.record(Cardinality::of(1), OperationState::Complete, Duration::from_millis(1));

        assert_eq!(metrics.transactions(Cardinality::Single), 2);
        assert_eq!(metrics.transactions(Cardinality::Multiple), 1);
        assert_eq!(metrics.operations(OperationState::Complete), 2);
        assert_eq!(metrics.operations(OperationState::Failure), 1);

        let snapshot = metrics.snapshot();
        let single = &snapshot.timers["graph.store.timer{cardinality=single}"];
        assert_eq!(single.count, 2);
        assert_eq!(single.max_us, 3000);
        assert_eq!(snapshot.counters["graph.store.operations{state=failure}"], 1);
    }
}
