use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use moneronet_reconciler::{ClusterApi, Manager, MemoryStore, OperatorContext};
use moneronet_telemetry::{TelemetryHandle, TelemetrySnapshot};
use serde_json::Value;
use tokio::sync::watch;
use tracing::info;

use crate::config::OperatorConfig;
use crate::manifest::{Manifest, ManifestError};

/// Field manager recorded on objects loaded from manifest files.
pub const SEED_FIELD_MANAGER: &str = "moneronet-operator-seed";

const REPORTED_KINDS: &[&str] = &["network", "nodeset", "mining", "tor_secret"];

/// When [`run`] stops converging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopWhen {
    /// Every queue stayed idle for the given settle period.
    Idle(Duration),
    /// Ctrl-C.
    Interrupted,
}

/// Writes `manifests` into `store` as their authors would.
pub async fn seed(store: &dyn ClusterApi, manifests: &[Manifest]) -> anyhow::Result<usize> {
    for (index, manifest) in manifests.iter().enumerate() {
        let key = manifest.key();
        let object = manifest
            .to_value()
            .map_err(|source| ManifestError::Encode { index, source })?;
        store
            .create(&key, object, SEED_FIELD_MANAGER)
            .await
            .with_context(|| format!("seeding {key}"))?;
    }
    Ok(manifests.len())
}

/// Seeds an in-memory cluster, runs every control loop until `stop`, and
/// returns the converged object graph.
pub async fn run(
    config: &OperatorConfig,
    manifests: &[Manifest],
    stop: StopWhen,
) -> anyhow::Result<Vec<Value>> {
    let store = Arc::new(MemoryStore::new());
    let seeded = seed(store.as_ref(), manifests).await?;
    info!(seeded, "store seeded");

    let telemetry = TelemetryHandle::from_config(config.telemetry.clone());
    let ctx = OperatorContext::new(store.clone(), telemetry.clone())
        .with_config(config.operator.clone(), config.backoff.clone());
    let manager = Manager::start(ctx);

    let (report_stop, report_rx) = watch::channel(false);
    let reporter = tokio::spawn(report_loop(telemetry.clone(), report_rx));

    match stop {
        StopWhen::Idle(settle) => manager.wait_idle(settle).await,
        StopWhen::Interrupted => {
            tokio::signal::ctrl_c()
                .await
                .context("waiting for ctrl-c")?;
            info!("interrupt received");
        }
    }

    manager.shutdown().await;
    report_stop.send_replace(true);
    reporter.await.context("telemetry reporter")?;
    log_snapshot(&telemetry.flush());
    Ok(store.snapshot())
}

async fn report_loop(telemetry: TelemetryHandle, mut stop: watch::Receiver<bool>) {
    let period = Duration::from_millis(telemetry.flush_interval().max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => log_snapshot(&telemetry.snapshot()),
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    return;
                }
            }
        }
    }
}

fn log_snapshot(snapshot: &TelemetrySnapshot) {
    for kind in REPORTED_KINDS {
        let stats = snapshot.pass_stats(kind);
        if stats.total() == 0 {
            continue;
        }
        info!(
            controller = *kind,
            success = stats.success,
            failure = stats.failure,
            pending = stats.pending,
            not_found = stats.not_found,
            "reconcile totals"
        );
    }
    info!(
        created = snapshot.counter("converge.created"),
        patched = snapshot.counter("converge.patched"),
        unchanged = snapshot.counter("converge.unchanged"),
        issued = snapshot.counter("tor.credentials.issued"),
        "convergence totals"
    );
}
