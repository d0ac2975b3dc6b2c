use moneronet_apis::{Condition, ObjectKey, Resource};
use serde::Serialize;
use tracing::warn;

use crate::context::OperatorContext;
use crate::error::{ReconcileError, StoreError};

pub(crate) async fn fetch<T: Resource>(
    ctx: &OperatorContext,
    key: &ObjectKey,
) -> Result<T, ReconcileError> {
    let live = ctx.store.get(key).await?;
    serde_json::from_value(live).map_err(|source| ReconcileError::Decode {
        key: key.clone(),
        source,
    })
}

pub(crate) async fn write_status<S: Serialize>(
    ctx: &OperatorContext,
    key: &ObjectKey,
    status: &S,
) -> Result<(), ReconcileError> {
    let status = serde_json::to_value(status).map_err(StoreError::from)?;
    ctx.store.update_status(key, status).await?;
    Ok(())
}

/// Condition describing a failed pass, or `None` when the failure must not
/// touch status (the object is gone, or a concurrent write won).
pub(crate) fn failure_condition(err: &ReconcileError) -> Option<Condition> {
    if err.is_not_found() || err.is_conflict() {
        return None;
    }
    Some(if err.is_pending() {
        Condition::pending(err.to_string())
    } else {
        Condition::failed(err.to_string())
    })
}

/// Writes `status` after a failed pass, logging rather than masking the
/// original error if the write fails too.
pub(crate) async fn report_failure<S: Serialize>(
    ctx: &OperatorContext,
    key: &ObjectKey,
    status: &S,
) {
    if let Err(err) = write_status(ctx, key, status).await {
        warn!(%key, %err, "failed to record failure in status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssembleError;
    use moneronet_apis::{REASON_FAILED, REASON_PENDING};

    fn key() -> ObjectKey {
        ObjectKey::new("MoneroNodeSet", "default", "node")
    }

    #[test]
    fn maps_errors_to_conditions() {
        let pending = ReconcileError::from(AssembleError::PendingIdentity(key()));
        assert_eq!(failure_condition(&pending).unwrap().reason, REASON_PENDING);

        let timeout = ReconcileError::Timeout {
            key: key(),
            after_ms: 10,
        };
        let condition = failure_condition(&timeout).unwrap();
        assert_eq!(condition.reason, REASON_FAILED);
        assert!(condition.message.contains("timed out"));

        let conflict = ReconcileError::from(StoreError::Conflict {
            key: key(),
            reason: "stale".into(),
        });
        assert!(failure_condition(&conflict).is_none());
        assert!(failure_condition(&ReconcileError::from(StoreError::NotFound(key()))).is_none());
    }
}
