//! Per-kind control loops.
//!
//! A [`Controller`] owns one [`WorkQueue`], feeds it from the store's watch
//! stream and an initial list, and runs a bounded pool of workers that call
//! the kind's [`Reconciler`] for one key at a time.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moneronet_apis::ObjectKey;
use serde_json::Value;
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::context::OperatorContext;
use crate::error::ReconcileError;
use crate::queue::WorkQueue;
use crate::store::{controller_of, labels_of, WatchEvent};

mod manager;
mod mining;
mod network;
mod nodeset;
mod secret;
mod status;

pub use manager::Manager;
pub use mining::MiningReconciler;
pub use network::NetworkReconciler;
pub use nodeset::NodeSetReconciler;
pub use secret::TorSecretReconciler;

/// What to do with a key after a successful pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Done,
    RequeueAfter(Duration),
}

#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Kind whose keys this loop processes.
    fn kind(&self) -> &'static str;

    /// Short name used in metric names and log fields.
    fn name(&self) -> &'static str;

    /// Only objects carrying all of these labels are watched.
    fn selector(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Child kinds whose changes enqueue their controlling owner.
    fn owns(&self) -> &'static [&'static str] {
        &[]
    }

    /// One level-triggered pass for `key`.
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError>;
}

pub struct Controller<R: Reconciler> {
    reconciler: Arc<R>,
    ctx: OperatorContext,
    queue: Arc<WorkQueue>,
}

impl<R: Reconciler> Controller<R> {
    pub fn new(reconciler: R, ctx: OperatorContext) -> Self {
        let queue = Arc::new(WorkQueue::new(ctx.backoff.clone()));
        Self {
            reconciler: Arc::new(reconciler),
            ctx,
            queue,
        }
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    fn in_scope(&self, key: &ObjectKey) -> bool {
        self.ctx
            .config
            .namespace
            .as_deref()
            .map_or(true, |ns| key.namespace == ns)
    }

    /// Key to enqueue for a watch event, if this loop cares about it.
    fn route(&self, event: &WatchEvent) -> Option<ObjectKey> {
        if !self.in_scope(&event.key) {
            return None;
        }
        if event.key.kind == self.reconciler.kind() {
            let labels = labels_of(&event.object);
            let selected = self
                .reconciler
                .selector()
                .iter()
                .all(|(k, v)| labels.get(k) == Some(v));
            return selected.then(|| event.key.clone());
        }
        if self.reconciler.owns().contains(&event.key.kind.as_str()) {
            return controller_of(&event.key, &event.object)
                .filter(|owner| owner.kind == self.reconciler.kind());
        }
        None
    }

    async fn enqueue_all(&self) -> Result<usize, ReconcileError> {
        let objects = self
            .ctx
            .store
            .list(
                self.reconciler.kind(),
                self.ctx.config.namespace.as_deref(),
                &self.reconciler.selector(),
            )
            .await?;
        let count = objects.len();
        for object in objects {
            if let Some(key) = key_of(self.reconciler.kind(), &object) {
                self.queue.add(key);
            }
        }
        Ok(count)
    }

    /// Runs until `shutdown` flips to true. Workers finish their current
    /// pass before exiting.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let name = self.reconciler.name();
        let mut events = self.ctx.store.watch();
        match self.enqueue_all().await {
            Ok(count) => info!(controller = name, count, "initial list queued"),
            Err(err) => error!(controller = name, %err, "initial list failed"),
        }

        let this = Arc::new(self);
        let mut tasks = JoinSet::new();

        for worker in 0..this.ctx.config.workers.max(1) {
            let this = Arc::clone(&this);
            let mut shutdown = shutdown.clone();
            tasks.spawn(async move {
                while let Some(key) = this.queue.next(&mut shutdown).await {
                    this.process(&key).await;
                    this.queue.done(&key);
                }
                debug!(controller = name, worker, "worker stopped");
            });
        }

        let feeder = Arc::clone(&this);
        let mut stop = shutdown.clone();
        tasks.spawn(async move {
            loop {
                tokio::select! {
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                    event = events.recv() => match event {
                        Ok(event) => {
                            if let Some(key) = feeder.route(&event) {
                                feeder.queue.add(key);
                            }
                        }
                        Err(RecvError::Lagged(missed)) => {
                            warn!(controller = name, missed, "watch lagged; relisting");
                            if let Err(err) = feeder.enqueue_all().await {
                                error!(controller = name, %err, "relist failed");
                            }
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            feeder.queue.wake_all();
        });

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                error!(controller = name, %err, "controller task panicked");
            }
        }
        info!(controller = name, "stopped");
    }

    async fn process(self: &Arc<Self>, key: &ObjectKey) {
        let name = self.reconciler.name();
        let span = info_span!(
            "reconcile",
            controller = name,
            namespace = %key.namespace,
            name = %key.name
        );
        let timeout = self.ctx.config.pass_timeout();
        let started = Instant::now();

        let result = match tokio::time::timeout(timeout, self.reconciler.reconcile(key))
            .instrument(span.clone())
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::Timeout {
                key: key.clone(),
                after_ms: self.ctx.config.pass_timeout_ms,
            }),
        };
        self.ctx.telemetry.record_latency_ms(
            &format!("reconcile.{name}.latency_ms"),
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        );

        let _entered = span.enter();
        match result {
            Ok(action) => {
                self.queue.forget(key);
                self.ctx.count(&format!("reconcile.{name}.success"));
                if let Action::RequeueAfter(delay) = action {
                    self.queue.add_after(key.clone(), delay);
                }
            }
            Err(err) if err.is_not_found() => {
                self.queue.forget(key);
                self.ctx.count(&format!("reconcile.{name}.not_found"));
                debug!(%err, "object gone; nothing to do");
            }
            Err(err) => {
                let delay = self.queue.backoff(key);
                let retry_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                if err.is_pending() {
                    self.ctx.count(&format!("reconcile.{name}.pending"));
                    info!(%err, retry_ms, "waiting on dependency");
                } else if err.is_conflict() {
                    self.ctx.count(&format!("reconcile.{name}.failure"));
                    warn!(%err, retry_ms, "conflict; retrying");
                } else {
                    self.ctx.count(&format!("reconcile.{name}.failure"));
                    error!(%err, retry_ms, "pass failed");
                }
                self.queue.add_after(key.clone(), delay);
            }
        }
    }
}

fn key_of(kind: &str, object: &Value) -> Option<ObjectKey> {
    let metadata = object.get("metadata")?;
    let name = metadata.get("name")?.as_str()?;
    let namespace = metadata
        .get("namespace")
        .and_then(Value::as_str)
        .unwrap_or("default");
    Some(ObjectKey::new(kind, namespace, name))
}
