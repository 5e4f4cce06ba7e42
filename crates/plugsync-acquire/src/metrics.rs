//! Download counters and duration histograms.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

/// Upper bounds of the duration buckets, in milliseconds. One extra bucket
/// counts everything slower than the last bound.
pub const DURATION_BUCKETS_MS: [u64; 7] = [100, 500, 1_000, 5_000, 15_000, 60_000, 300_000];

/// Duration distribution for one `(plugin_id, version)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Histogram {
    /// Per-bucket counts; the last slot is the overflow bucket.
    pub buckets: [u64; 8],
    /// Number of observations.
    pub count: u64,
    /// Sum of all observations, in milliseconds.
    pub sum_ms: u64,
}

impl Histogram {
    fn observe(&mut self, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let slot = DURATION_BUCKETS_MS
            .iter()
            .position(|bound| ms <= *bound)
            .unwrap_or(DURATION_BUCKETS_MS.len());
        if let Some(bucket) = self.buckets.get_mut(slot) {
            *bucket = bucket.saturating_add(1);
        }
        self.count = self.count.saturating_add(1);
        self.sum_ms = self.sum_ms.saturating_add(ms);
    }
}

/// How a single download attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The archive was fetched and extracted.
    Success,
    /// Another caller was already downloading it.
    Duplicate,
    /// The attempt failed.
    Failure,
}

/// Process-wide download metrics.
#[derive(Debug, Default)]
pub struct DownloadMetrics {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    duplicates: AtomicU64,
    durations: DashMap<(String, String), Histogram>,
}

/// Point-in-time copy of [`DownloadMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Downloads started.
    pub attempts: u64,
    /// Downloads that completed.
    pub successes: u64,
    /// Downloads that failed.
    pub failures: u64,
    /// Downloads skipped because one was already in flight.
    pub duplicates: u64,
    /// Durations keyed by `{plugin_id}:{version}`.
    pub durations: BTreeMap<String, Histogram>,
}

impl DownloadMetrics {
    /// Create empty metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a download attempt.
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how an attempt ended. `version` is the resolved version when
    /// known, otherwise the requested one.
    pub fn record_outcome(&self, plugin_id: &str, version: &str, outcome: Outcome, elapsed: Duration) {
        let counter = match outcome {
            Outcome::Success => &self.successes,
            Outcome::Duplicate => &self.duplicates,
            Outcome::Failure => &self.failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if outcome != Outcome::Duplicate {
            self.durations
                .entry((plugin_id.to_string(), version.to_string()))
                .or_default()
                .observe(elapsed);
        }
        debug!(
            plugin_id,
            version,
            outcome = ?outcome,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "download finished"
        );
    }

    /// Copy the current values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            durations: self
                .durations
                .iter()
                .map(|e| {
                    let (id, version) = e.key();
                    (plugsync_core::cache_key(id, version), e.value().clone())
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_and_histograms() {
        let m = DownloadMetrics::new();
        for _ in 0..3 {
            m.record_attempt();
        }
        m.record_outcome("p", "1.0.0", Outcome::Success, Duration::from_millis(50));
        m.record_outcome("p", "1.0.0", Outcome::Failure, Duration::from_secs(400));
        m.record_outcome("p", "1.0.0", Outcome::Duplicate, Duration::ZERO);

        let snap = m.snapshot();
        assert_eq!(snap.attempts, 3);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.duplicates, 1);

        let h = &snap.durations["p:1.0.0"];
        assert_eq!(h.count, 2);
        assert_eq!(h.buckets[0], 1);
        assert_eq!(h.buckets[7], 1);
        assert_eq!(h.sum_ms, 400_050);
    }

    #[test]
    fn bucket_bounds_are_inclusive() {
        let mut h = Histogram::default();
        h.observe(Duration::from_millis(500));
        h.observe(Duration::from_millis(501));
        assert_eq!(h.buckets[1], 1);
        assert_eq!(h.buckets[2], 1);
    }

    #[test]
    fn snapshot_serializes() {
        let m = DownloadMetrics::new();
        m.record_attempt();
        let json = serde_json::to_value(m.snapshot()).unwrap();
        assert_eq!(json["attempts"], 1);
        assert!(json["durations"].as_object().unwrap().is_empty());
    }
}
