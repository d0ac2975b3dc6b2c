use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::Resource as _;
use moneronet_apis::{set_condition, Condition, MoneroNodeSet, ObjectKey, Resource};
use moneronet_tor::Credentials;
use serde_json::Value;
use tracing::{debug, info};

use super::status::{failure_condition, fetch, report_failure, write_status};
use super::{Action, Reconciler};
use crate::assemble::{assemble_nodeset, tor_secret_object};
use crate::context::OperatorContext;
use crate::error::{AssembleError, ReconcileError};

const OWNED_KINDS: &[&str] = &[
    Service::KIND,
    StatefulSet::KIND,
    ConfigMap::KIND,
    Secret::KIND,
    Deployment::KIND,
];

/// Children removed once no longer assembled. The identity secret is kept so
/// re-enabling anonymity restores the same onion address.
const PRUNED_KINDS: &[&str] = &[
    Service::KIND,
    StatefulSet::KIND,
    ConfigMap::KIND,
    Deployment::KIND,
];

pub struct NodeSetReconciler {
    ctx: OperatorContext,
}

impl NodeSetReconciler {
    pub fn new(ctx: OperatorContext) -> Self {
        Self { ctx }
    }

    /// Converges every child and returns the onion hostname, if any.
    async fn converge_children(
        &self,
        set: &MoneroNodeSet,
    ) -> Result<Option<String>, ReconcileError> {
        set.validate().map_err(AssembleError::from)?;
        let converger = self.ctx.converger();

        let identity = if set.spec.anonymized.enabled {
            let secret = tor_secret_object(set)?;
            let secret_key = secret.key.clone();
            converger.converge(secret).await?;
            let live = self.ctx.store.get(&secret_key).await?;
            Some(credentials_from_secret(&secret_key, live)?)
        } else {
            None
        };

        let desired = assemble_nodeset(set, identity.as_ref())?;
        let summary = converger.converge_owned(set, PRUNED_KINDS, desired).await?;
        debug!(
            created = summary.created,
            patched = summary.patched,
            unchanged = summary.unchanged,
            deleted = summary.deleted,
            "children converged"
        );
        Ok(identity.and_then(|creds| creds.hostname().map(str::to_owned)))
    }
}

/// Reads whatever identity a hidden-service secret currently holds.
pub(crate) fn credentials_from_secret(
    key: &ObjectKey,
    live: Value,
) -> Result<Credentials, ReconcileError> {
    let secret: Secret = serde_json::from_value(live).map_err(|source| ReconcileError::Decode {
        key: key.clone(),
        source,
    })?;
    let files = secret
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|(name, bytes)| (name, bytes.0))
        .collect();
    Ok(Credentials::from_data(files))
}

#[async_trait]
impl Reconciler for NodeSetReconciler {
    fn kind(&self) -> &'static str {
        MoneroNodeSet::KIND
    }

    fn name(&self) -> &'static str {
        "nodeset"
    }

    fn owns(&self) -> &'static [&'static str] {
        OWNED_KINDS
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let mut set: MoneroNodeSet = fetch(&self.ctx, key).await?;
        set.apply_defaults();

        match self.converge_children(&set).await {
            Ok(address) => {
                let mut status = set.status.clone();
                set_condition(&mut status.conditions, Condition::ready());
                if address.is_some() && status.anonymized_address != address {
                    info!(address = address.as_deref(), "anonymized address resolved");
                }
                status.anonymized_address = address;
                write_status(&self.ctx, key, &status).await?;
                Ok(Action::Done)
            }
            Err(err) => {
                if let Some(condition) = failure_condition(&err) {
                    let mut status = set.status.clone();
                    set_condition(&mut status.conditions, condition);
                    report_failure(&self.ctx, key, &status).await;
                }
                Err(err)
            }
        }
    }
}
