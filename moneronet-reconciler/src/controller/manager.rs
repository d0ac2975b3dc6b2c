use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::{
    Controller, MiningReconciler, NetworkReconciler, NodeSetReconciler, Reconciler,
    TorSecretReconciler,
};
use crate::context::OperatorContext;
use crate::queue::WorkQueue;

const IDLE_POLL: Duration = Duration::from_millis(10);

/// Runs every control loop against one shared context until shutdown.
pub struct Manager {
    shutdown: watch::Sender<bool>,
    queues: Vec<(&'static str, Arc<WorkQueue>)>,
    handles: Vec<JoinHandle<()>>,
}

impl Manager {
    /// Spawns the network, node set, mining and tor secret loops.
    pub fn start(ctx: OperatorContext) -> Self {
        let (shutdown, _) = watch::channel(false);
        let mut manager = Self {
            shutdown,
            queues: Vec::new(),
            handles: Vec::new(),
        };
        manager.spawn(NetworkReconciler::new(ctx.clone()), &ctx);
        manager.spawn(NodeSetReconciler::new(ctx.clone()), &ctx);
        manager.spawn(MiningReconciler::new(ctx.clone()), &ctx);
        manager.spawn(TorSecretReconciler::new(ctx.clone()), &ctx);
        info!(controllers = manager.handles.len(), "manager started");
        manager
    }

    fn spawn<R: Reconciler>(&mut self, reconciler: R, ctx: &OperatorContext) {
        let name = reconciler.name();
        let controller = Controller::new(reconciler, ctx.clone());
        self.queues.push((name, controller.queue()));
        let shutdown = self.shutdown.subscribe();
        self.handles.push(tokio::spawn(controller.run(shutdown)));
    }

    /// True when no loop has work queued, running or scheduled.
    pub fn is_idle(&self) -> bool {
        self.queues.iter().all(|(_, queue)| queue.is_idle())
    }

    /// Waits until every loop has stayed idle for `settle`.
    pub async fn wait_idle(&self, settle: Duration) {
        let mut idle_since = None;
        loop {
            if self.is_idle() {
                let since = *idle_since.get_or_insert_with(tokio::time::Instant::now);
                if since.elapsed() >= settle {
                    return;
                }
            } else {
                idle_since = None;
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    /// Signals shutdown without waiting.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Signals shutdown and waits for every loop to finish its current pass.
    pub async fn shutdown(self) {
        self.stop();
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(%err, "controller task failed");
            }
        }
        info!("manager stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use moneronet_telemetry::TelemetryHandle;

    #[tokio::test]
    async fn empty_cluster_settles_and_stops() {
        let ctx = OperatorContext::new(Arc::new(MemoryStore::new()), TelemetryHandle::default());
        let manager = Manager::start(ctx);
        tokio::time::timeout(Duration::from_secs(5), manager.wait_idle(Duration::from_millis(50)))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), manager.shutdown())
            .await
            .unwrap();
    }
}
