use std::sync::Arc;
use std::time::Duration;

use moneronet_telemetry::TelemetryHandle;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::converge::Converger;
use crate::store::ClusterApi;

const fn default_workers() -> usize {
    4
}

fn default_field_manager() -> String {
    "controller".to_owned()
}

const fn default_pass_timeout_ms() -> u64 {
    30_000
}

const fn default_base_delay_ms() -> u64 {
    500
}

const fn default_max_delay_ms() -> u64 {
    60_000
}

/// Settings shared by every control loop.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ReconcilerConfig {
    /// Concurrent passes per controller; distinct keys only.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Field manager identity used for server-side apply.
    #[serde(default = "default_field_manager")]
    pub field_manager: String,
    #[serde(default = "default_pass_timeout_ms")]
    pub pass_timeout_ms: u64,
    /// Restrict every loop to one namespace.
    #[serde(default)]
    pub namespace: Option<String>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            field_manager: default_field_manager(),
            pass_timeout_ms: default_pass_timeout_ms(),
            namespace: None,
        }
    }
}

impl ReconcilerConfig {
    pub fn pass_timeout(&self) -> Duration {
        Duration::from_millis(self.pass_timeout_ms)
    }
}

/// Exponential retry delay for failed passes: `base * 2^(failures - 1)`,
/// capped at `max`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct BackoffConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffConfig {
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(32);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms.max(self.base_delay_ms));
        Duration::from_millis(delay)
    }
}

/// Process-scoped state handed to every controller: the store, the
/// telemetry handle and the settings. There is no global state.
#[derive(Clone)]
pub struct OperatorContext {
    pub store: Arc<dyn ClusterApi>,
    pub telemetry: TelemetryHandle,
    pub config: ReconcilerConfig,
    pub backoff: BackoffConfig,
}

impl OperatorContext {
    pub fn new(store: Arc<dyn ClusterApi>, telemetry: TelemetryHandle) -> Self {
        Self {
            store,
            telemetry,
            config: ReconcilerConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReconcilerConfig, backoff: BackoffConfig) -> Self {
        self.config = config;
        self.backoff = backoff;
        self
    }

    pub fn converger(&self) -> Converger {
        Converger::new(
            Arc::clone(&self.store),
            self.config.field_manager.clone(),
            self.telemetry.clone(),
        )
    }

    pub(crate) fn count(&self, name: &str) {
        count(&self.telemetry, name);
    }
}

pub(crate) fn count(telemetry: &TelemetryHandle, name: &str) {
    if let Err(err) = telemetry.record_counter(name, 1) {
        warn!(%err, "dropping counter update");
    }
}
