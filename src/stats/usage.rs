//! Per-(backend, model) usage counters for the status endpoint.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Default, Clone)]
struct UsageCounters {
    requests: u64,
    successes: u64,
    failures: u64,
    total_latency_ms: u64,
}

/// Reportable usage summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub requests: u64,
    /// Percentage of requests answered with a status below 400.
    pub success_rate: f64,
    pub avg_latency_ms: f64,
}

/// Usage keyed `"<backend name>:<model>"`.
#[derive(Debug, Default)]
pub struct UsageTracker {
    counters: DashMap<String, UsageCounters>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed upstream exchange.
    pub fn record(&self, backend: &str, model: &str, status: u16, latency_ms: u64) {
        let mut c = self.counters.entry(format!("{}:{}", backend, model)).or_default();
        c.requests += 1;
        c.total_latency_ms += latency_ms;
        if status < 400 {
            c.successes += 1;
        } else {
            c.failures += 1;
        }
    }

    /// Summaries in key order.
    pub fn summary(&self) -> BTreeMap<String, UsageSummary> {
        self.counters
            .iter()
            .map(|entry| {
                let c = entry.value();
                let (success_rate, avg_latency_ms) = if c.requests > 0 {
                    let n = c.requests as f64;
                    (
                        c.successes as f64 / n * 100.0,
                        (c.total_latency_ms as f64 / n * 100.0).round() / 100.0,
                    )
                } else {
                    (0.0, 0.0)
                };
                (
                    entry.key().clone(),
                    UsageSummary {
                        requests: c.requests,
                        success_rate,
                        avg_latency_ms,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_rates() {
        let usage = UsageTracker::new();
        usage.record("primary", "gpt-4", 200, 100);
        usage.record("primary", "gpt-4", 200, 200);
        usage.record("primary", "gpt-4", 429, 0);
        usage.record("primary", "gpt-4", 201, 100);
        usage.record("backup", "gpt-3.5-turbo", 200, 50);

        let summary = usage.summary();
        let s = &summary["primary:gpt-4"];
        assert_eq!(s.requests, 4);
        assert_eq!(s.success_rate, 75.0);
        assert_eq!(s.avg_latency_ms, 100.0);
        assert_eq!(summary["backup:gpt-3.5-turbo"].requests, 1);
    }
}
