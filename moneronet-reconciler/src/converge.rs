use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use moneronet_apis::{ObjectKey, Resource};
use moneronet_telemetry::TelemetryHandle;
use serde_json::Value;
use tracing::{debug, info};

use crate::context::count;
use crate::desired::DesiredObject;
use crate::error::{ConvergeError, StoreError};
use crate::store::{controller_of, controller_uid, resource_version, ApplyParams, ClusterApi};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvergeOutcome {
    Created,
    Patched,
    Unchanged,
}

impl ConvergeOutcome {
    fn metric(self) -> &'static str {
        match self {
            Self::Created => "converge.created",
            Self::Patched => "converge.patched",
            Self::Unchanged => "converge.unchanged",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConvergeSummary {
    pub created: usize,
    pub patched: usize,
    pub unchanged: usize,
    pub deleted: usize,
}

impl ConvergeSummary {
    fn record(&mut self, outcome: ConvergeOutcome) {
        match outcome {
            ConvergeOutcome::Created => self.created += 1,
            ConvergeOutcome::Patched => self.patched += 1,
            ConvergeOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn writes(&self) -> usize {
        self.created + self.patched + self.deleted
    }
}

/// Create-or-apply of desired objects against the store.
#[derive(Clone)]
pub struct Converger {
    store: Arc<dyn ClusterApi>,
    field_manager: String,
    telemetry: TelemetryHandle,
}

impl Converger {
    pub fn new(
        store: Arc<dyn ClusterApi>,
        field_manager: impl Into<String>,
        telemetry: TelemetryHandle,
    ) -> Self {
        Self {
            store,
            field_manager: field_manager.into(),
            telemetry,
        }
    }

    /// Makes the live object match `desired`.
    ///
    /// A missing object is created. An existing one gets a forced
    /// server-side apply carrying its resource version, unless `desired` is
    /// create-only, in which case it is left alone.
    pub async fn converge(&self, mut desired: DesiredObject) -> Result<ConvergeOutcome, ConvergeError> {
        let key = desired.key.clone();
        let wrap = |source: StoreError| ConvergeError::Store {
            key: key.clone(),
            source,
        };
        desired
            .stamp_owner()
            .map_err(|err| wrap(StoreError::from(err)))?;

        let outcome = match self.store.get(&key).await {
            Err(err) if err.is_not_found() => {
                self.store
                    .create(&key, desired.content, &self.field_manager)
                    .await
                    .map_err(wrap)?;
                info!(%key, owner = %desired.owner_key, "created");
                ConvergeOutcome::Created
            }
            Err(err) => return Err(wrap(err)),
            Ok(_) if !desired.must_match_spec_on_update => {
                debug!(%key, "exists; create-only object left untouched");
                ConvergeOutcome::Unchanged
            }
            Ok(live) => {
                let before = resource_version(&live);
                let params =
                    ApplyParams::forced(self.field_manager.as_str()).with_resource_version(before.clone());
                let applied = self
                    .store
                    .apply(&key, desired.content, &params)
                    .await
                    .map_err(wrap)?;
                if resource_version(&applied) == before {
                    debug!(%key, "up to date");
                    ConvergeOutcome::Unchanged
                } else {
                    info!(%key, owner = %desired.owner_key, "patched");
                    ConvergeOutcome::Patched
                }
            }
        };

        count(&self.telemetry, outcome.metric());
        Ok(outcome)
    }

    /// Converges `desired` in order, stopping at the first failure. Objects
    /// converged before the failure stay as they are.
    pub async fn converge_all(
        &self,
        desired: Vec<DesiredObject>,
    ) -> Result<ConvergeSummary, ConvergeError> {
        let mut summary = ConvergeSummary::default();
        for object in desired {
            summary.record(self.converge(object).await?);
        }
        Ok(summary)
    }

    /// Converges the children of `parent`, then deletes any child of the
    /// `prunable` kinds that `desired` no longer names.
    pub async fn converge_owned<P: Resource>(
        &self,
        parent: &P,
        prunable: &[&str],
        desired: Vec<DesiredObject>,
    ) -> Result<ConvergeSummary, ConvergeError> {
        let keep: BTreeSet<ObjectKey> = desired.iter().map(|object| object.key.clone()).collect();
        let mut summary = self.converge_all(desired).await?;
        summary.deleted = self
            .prune(&parent.key(), &parent.controller_ref().uid, prunable, &keep)
            .await?;
        Ok(summary)
    }

    /// Deletes objects of `kinds` controlled by `owner` whose keys are not in
    /// `keep`. Only objects whose controller reference carries `owner_uid`
    /// are touched.
    pub async fn prune(
        &self,
        owner: &ObjectKey,
        owner_uid: &str,
        kinds: &[&str],
        keep: &BTreeSet<ObjectKey>,
    ) -> Result<usize, ConvergeError> {
        if owner_uid.is_empty() {
            return Ok(0);
        }
        let mut deleted = 0;
        for kind in kinds {
            let live = self
                .store
                .list(kind, Some(owner.namespace.as_str()), &BTreeMap::new())
                .await
                .map_err(|source| ConvergeError::Store {
                    key: owner.clone(),
                    source,
                })?;
            for object in live {
                let Some(name) = object.pointer("/metadata/name").and_then(Value::as_str) else {
                    continue;
                };
                let key = ObjectKey::new(*kind, owner.namespace.clone(), name);
                if keep.contains(&key)
                    || controller_of(&key, &object).as_ref() != Some(owner)
                    || controller_uid(&object) != Some(owner_uid)
                {
                    continue;
                }
                match self.store.delete(&key).await {
                    Ok(()) => {
                        info!(%key, %owner, "deleted");
                        count(&self.telemetry, "converge.deleted");
                        deleted += 1;
                    }
                    Err(err) if err.is_not_found() => {}
                    Err(source) => return Err(ConvergeError::Store { key, source }),
                }
            }
        }
        Ok(deleted)
    }
}
