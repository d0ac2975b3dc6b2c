use async_trait::async_trait;
use moneronet_apis::{set_condition, Condition, MoneroNetwork, MoneroNodeSet, ObjectKey, Resource};
use tracing::debug;

use super::status::{failure_condition, fetch, report_failure, write_status};
use super::{Action, Reconciler};
use crate::assemble::assemble_network;
use crate::context::OperatorContext;
use crate::error::ReconcileError;

/// Fans a `MoneroNetwork` out into peered `MoneroNodeSet` members.
pub struct NetworkReconciler {
    ctx: OperatorContext,
}

impl NetworkReconciler {
    pub fn new(ctx: OperatorContext) -> Self {
        Self { ctx }
    }

    async fn converge_members(&self, network: &MoneroNetwork) -> Result<(), ReconcileError> {
        let desired = assemble_network(network)?;
        let summary = self
            .ctx
            .converger()
            .converge_owned(network, &[MoneroNodeSet::KIND], desired)
            .await?;
        debug!(
            members = network.spec.replicas,
            removed = summary.deleted,
            writes = summary.writes(),
            "members converged"
        );
        Ok(())
    }
}

#[async_trait]
impl Reconciler for NetworkReconciler {
    fn kind(&self) -> &'static str {
        MoneroNetwork::KIND
    }

    fn name(&self) -> &'static str {
        "network"
    }

    fn owns(&self) -> &'static [&'static str] {
        &[MoneroNodeSet::KIND]
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let mut network: MoneroNetwork = fetch(&self.ctx, key).await?;
        network.apply_defaults();

        let result = self.converge_members(&network).await;
        let mut status = network.status.clone();
        match result {
            Ok(()) => {
                set_condition(&mut status.conditions, Condition::ready());
                write_status(&self.ctx, key, &status).await?;
                Ok(Action::Done)
            }
            Err(err) => {
                if let Some(condition) = failure_condition(&err) {
                    set_condition(&mut status.conditions, condition);
                    report_failure(&self.ctx, key, &status).await;
                }
                Err(err)
            }
        }
    }
}
