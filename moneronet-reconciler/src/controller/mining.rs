use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::Resource as _;
use moneronet_apis::{set_condition, Condition, MoneroMiningNodeSet, ObjectKey, Resource};

use super::status::{failure_condition, fetch, report_failure, write_status};
use super::{Action, Reconciler};
use crate::assemble::assemble_mining;
use crate::context::OperatorContext;
use crate::error::ReconcileError;

pub struct MiningReconciler {
    ctx: OperatorContext,
}

impl MiningReconciler {
    pub fn new(ctx: OperatorContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for MiningReconciler {
    fn kind(&self) -> &'static str {
        MoneroMiningNodeSet::KIND
    }

    fn name(&self) -> &'static str {
        "mining"
    }

    fn owns(&self) -> &'static [&'static str] {
        &[Deployment::KIND]
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let mut set: MoneroMiningNodeSet = fetch(&self.ctx, key).await?;
        set.apply_defaults();

        let result = match assemble_mining(&set) {
            Ok(desired) => self
                .ctx
                .converger()
                .converge_owned(&set, &[Deployment::KIND], desired)
                .await
                .map(drop)
                .map_err(ReconcileError::from),
            Err(err) => Err(err.into()),
        };

        let mut status = set.status.clone();
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
