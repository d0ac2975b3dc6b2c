//! Lightweight telemetry facade for the moneronet operator. Counters and
//! latencies live on a [`TelemetryHandle`] owned by the process context and
//! handed to every control loop, so tests can assert instrumentation without
//! any exporter or global registry.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc, time::SystemTime};
use thiserror::Error;

#[cfg(any(
    all(feature = "dev", feature = "test"),
    all(feature = "dev", feature = "prod"),
    all(feature = "test", feature = "prod")
))]
compile_error!(
    "Only one of the `dev`, `test`, or `prod` features may be enabled for moneronet-telemetry."
);

#[cfg(feature = "dev")]
const DEFAULT_FLUSH_MS: u64 = 1_000;
#[cfg(feature = "test")]
const DEFAULT_FLUSH_MS: u64 = 500;
#[cfg(feature = "prod")]
const DEFAULT_FLUSH_MS: u64 = 5_000;
#[cfg(not(any(feature = "dev", feature = "test", feature = "prod")))]
const DEFAULT_FLUSH_MS: u64 = 5_000;

fn default_flush_interval_ms() -> u64 {
    DEFAULT_FLUSH_MS
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct TelemetryConfig {
    /// Cadence at which the operator logs a telemetry summary.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Global labels attached to every snapshot.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            labels: BTreeMap::from([("component".into(), "moneronet-operator".into())]),
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("counter overflow for metric {0}")]
    CounterOverflow(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub timestamp: SystemTime,
    pub labels: BTreeMap<String, String>,
    pub counters: BTreeMap<String, u64>,
    pub latencies_ms: BTreeMap<String, Vec<u64>>,
}

impl TelemetrySnapshot {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Per-kind reconcile outcome totals.
    pub fn pass_stats(&self, kind: &str) -> PassStats {
        PassStats {
            success: self.counter(&format!("reconcile.{kind}.success")),
            failure: self.counter(&format!("reconcile.{kind}.failure")),
            pending: self.counter(&format!("reconcile.{kind}.pending")),
            not_found: self.counter(&format!("reconcile.{kind}.not_found")),
        }
    }
}

/// Outcome totals of the passes run for one resource kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    pub success: u64,
    pub failure: u64,
    pub pending: u64,
    pub not_found: u64,
}

type StatAccessor = fn(&PassStats) -> u64;

/// Field name to value table used when flattening stats for logs.
pub const PASS_STAT_FIELDS: &[(&str, StatAccessor)] = &[
    ("success", stat_success),
    ("failure", stat_failure),
    ("pending", stat_pending),
    ("not_found", stat_not_found),
];

fn stat_success(stats: &PassStats) -> u64 {
    stats.success
}

fn stat_failure(stats: &PassStats) -> u64 {
    stats.failure
}

fn stat_pending(stats: &PassStats) -> u64 {
    stats.pending
}

fn stat_not_found(stats: &PassStats) -> u64 {
    stats.not_found
}

impl PassStats {
    pub fn observations(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        PASS_STAT_FIELDS
            .iter()
            .map(move |(name, accessor)| (*name, accessor(self)))
    }

    pub fn total(&self) -> u64 {
        self.observations().map(|(_, value)| value).sum()
    }
}

#[derive(Default)]
struct TelemetryState {
    counters: BTreeMap<String, u64>,
    latencies_ms: BTreeMap<String, Vec<u64>>,
}

#[derive(Clone)]
pub struct TelemetryHandle {
    config: TelemetryConfig,
    state: Arc<Mutex<TelemetryState>>,
}

impl Default for TelemetryHandle {
    fn default() -> Self {
        Self::from_config(TelemetryConfig::default())
    }
}

impl TelemetryHandle {
    pub fn from_config(config: TelemetryConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(TelemetryState::default())),
        }
    }

    pub fn record_counter(&self, name: &str, delta: u64) -> Result<(), TelemetryError> {
        let mut guard = self.state.lock();
        let entry = guard.counters.entry(name.to_owned()).or_default();
        *entry = entry
            .checked_add(delta)
            .ok_or_else(|| TelemetryError::CounterOverflow(name.to_owned()))?;
        Ok(())
    }

    pub fn record_latency_ms(&self, name: &str, value: u64) {
        let mut guard = self.state.lock();
        guard
            .latencies_ms
            .entry(name.to_owned())
            .or_default()
            .push(value);
    }

    /// Copy of the current state; unlike [`flush`](Self::flush) nothing is reset.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let guard = self.state.lock();
        TelemetrySnapshot {
            timestamp: SystemTime::now(),
            labels: self.config.labels.clone(),
            counters: guard.counters.clone(),
            latencies_ms: guard.latencies_ms.clone(),
        }
    }

    pub fn flush(&self) -> TelemetrySnapshot {
        let mut guard = self.state.lock();
        TelemetrySnapshot {
            timestamp: SystemTime::now(),
            labels: self.config.labels.clone(),
            counters: std::mem::take(&mut guard.counters),
            latencies_ms: std::mem::take(&mut guard.latencies_ms),
        }
    }

    pub fn flush_interval(&self) -> u64 {
        self.config.flush_interval_ms
    }
}
