//! Latency of storage operations, rendered in the Prometheus text format.

use std::future::Future;
use std::time::{Duration, Instant};

use dashmap::DashMap;

const METRIC: &str = "broker_store_operation_duration_seconds";

/// Upper bounds, in seconds, of the histogram buckets.
const BUCKETS: [f64; 9] = [0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0];

#[derive(Clone, Debug, Default)]
struct Histogram {
    buckets: [u64; BUCKETS.len()],
    count: u64,
    sum: f64,
}

impl Histogram {
    fn observe(&mut self, seconds: f64) {
        for (slot, bound) in self.buckets.iter_mut().zip(BUCKETS) {
            if seconds <= bound {
                *slot += 1;
            }
        }
        self.count += 1;
        self.sum += seconds;
    }
}

/// Per-operation latency histograms, shared by the flow and the `/metrics` endpoint.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    operations: DashMap<&'static str, Histogram>,
}

impl StoreMetrics {
    pub fn record(&self, operation: &'static str, elapsed: Duration) {
        self.operations
            .entry(operation)
            .or_default()
            .observe(elapsed.as_secs_f64());
    }

    /// Await `fut` and record how long it took under `operation`, success or not.
    pub async fn track<F: Future>(&self, operation: &'static str, fut: F) -> F::Output {
        let started = Instant::now();
        let output = fut.await;
        self.record(operation, started.elapsed());
        output
    }

    /// Number of recorded calls of `operation`.
    pub fn observations(&self, operation: &str) -> u64 {
        self.operations.get(operation).map_or(0, |h| h.count)
    }

    pub fn render(&self) -> String {
        let mut snapshot: Vec<(&'static str, Histogram)> = self
            .operations
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        snapshot.sort_by_key(|(operation, _)| *operation);

        let mut buf = String::new();
        if snapshot.is_empty() {
            return buf;
        }
        buf.push_str(&format!(
            "# HELP {METRIC} Latency of storage operations by operation.\n"
        ));
        buf.push_str(&format!("# TYPE {METRIC} histogram\n"));
        for (operation, histogram) in snapshot {
            for (bound, hits) in BUCKETS.iter().zip(histogram.buckets) {
                buf.push_str(&format!(
                    "{METRIC}_bucket{{operation=\"{operation}\",le=\"{bound}\"}} {hits}\n"
                ));
            }
            buf.push_str(&format!(
                "{METRIC}_bucket{{operation=\"{operation}\",le=\"+Inf\"}} {}\n",
                histogram.count
            ));
            buf.push_str(&format!(
                "{METRIC}_sum{{operation=\"{operation}\"}} {}\n",
                histogram.sum
            ));
            buf.push_str(&format!(
                "{METRIC}_count{{operation=\"{operation}\"}} {}\n",
                histogram.count
            ));
        }
        buf
    }
}
