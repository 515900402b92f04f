//! Per-backend request statistics.
//!
//! # Invariants
//! - `total_requests == successes + failures`
//! - `consecutive_failures` resets on success, grows by one per failure
//!
//! # Design Decisions
//! - Records live for the process lifetime; the id space is bounded by config
//! - Each update happens under the DashMap shard lock, so concurrent requests
//!   against one backend never lose counts

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;

use crate::registry::BackendId;

/// Stats facet of a backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRecord {
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    /// Accumulated over successful requests only.
    pub total_latency_ms: u64,
    pub consecutive_failures: u32,
    /// Unix seconds of the last recorded request.
    pub last_used_at: Option<u64>,
    /// Selection score. Not adjusted yet.
    pub score: f64,
}

impl Default for StatsRecord {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successes: 0,
            failures: 0,
            total_latency_ms: 0,
            consecutive_failures: 0,
            last_used_at: None,
            score: 100.0,
        }
    }
}

/// Owner of all stats records.
#[derive(Debug, Default)]
pub struct StatsTracker {
    records: DashMap<BackendId, StatsRecord>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one upstream call.
    pub fn record_request(&self, id: BackendId, latency_ms: u64, success: bool) {
        let mut record = self.records.entry(id).or_default();
        record.total_requests += 1;
        record.last_used_at = Some(unix_now());

        if success {
            record.successes += 1;
            record.total_latency_ms += latency_ms;
            record.consecutive_failures = 0;
        } else {
            record.failures += 1;
            record.consecutive_failures += 1;
        }
    }

    /// True if the failure streak reached `threshold`.
    pub fn has_consecutive_failures(&self, id: BackendId, threshold: u32) -> bool {
        self.records
            .get(&id)
            .map_or(false, |r| r.consecutive_failures >= threshold)
    }

    pub fn get(&self, id: BackendId) -> Option<StatsRecord> {
        self.records.get(&id).map(|r| r.clone())
    }

    /// Copy of every record.
    pub fn snapshot(&self) -> HashMap<BackendId, StatsRecord> {
        self.records
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
