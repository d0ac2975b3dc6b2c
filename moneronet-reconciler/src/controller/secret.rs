use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::{ByteString, Resource as _};
use moneronet_apis::ObjectKey;
use moneronet_tor::{already_issued, issue};
use tracing::{debug, info};

use super::nodeset::credentials_from_secret;
use super::{Action, Reconciler};
use crate::context::OperatorContext;
use crate::error::{ReconcileError, StoreError};
use crate::objects::TOR_SECRET_LABEL;

/// Fills labelled hidden-service secrets with a freshly issued identity.
///
/// A secret that already holds all three tor files is never touched again,
/// so an onion address survives controller restarts and re-applies of the
/// owning node set.
pub struct TorSecretReconciler {
    ctx: OperatorContext,
}

impl TorSecretReconciler {
    pub fn new(ctx: OperatorContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for TorSecretReconciler {
    fn kind(&self) -> &'static str {
        Secret::KIND
    }

    fn name(&self) -> &'static str {
        "tor_secret"
    }

    fn selector(&self) -> BTreeMap<String, String> {
        let (key, value) = TOR_SECRET_LABEL;
        BTreeMap::from([(key.to_owned(), value.to_owned())])
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let live = self.ctx.store.get(key).await?;
        if already_issued(&credentials_from_secret(key, live.clone())?) {
            debug!(%key, "credentials already issued");
            return Ok(Action::Done);
        }

        let mut secret: Secret =
            serde_json::from_value(live).map_err(|source| ReconcileError::Decode {
                key: key.clone(),
                source,
            })?;
        let credentials = issue().map_err(|source| ReconcileError::Issue {
            key: key.clone(),
            source,
        })?;
        let hostname = credentials.hostname().unwrap_or_default().to_owned();
        secret.data = Some(
            credentials
                .into_files()
                .into_iter()
                .map(|(name, bytes)| (name, ByteString(bytes)))
                .collect(),
        );

        // Carries the resource version read above; a concurrent writer
        // turns this into a conflict and the pass is retried.
        let object = serde_json::to_value(&secret).map_err(StoreError::from)?;
        self.ctx
            .store
            .update(key, object, &self.ctx.config.field_manager)
            .await?;

        self.ctx.count("tor.credentials.issued");
        info!(%key, %hostname, "issued hidden service credentials");
        Ok(Action::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ClusterApi, MemoryStore};
    use moneronet_telemetry::TelemetryHandle;
    use serde_json::json;
    use std::sync::Arc;

    fn secret_key() -> ObjectKey {
        ObjectKey::new("Secret", "default", "node-tor")
    }

    async fn setup(data: serde_json::Value) -> (Arc<MemoryStore>, TorSecretReconciler) {
        let store = Arc::new(MemoryStore::new());
        let object = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {
                "name": "node-tor",
                "namespace": "default",
                "labels": {"utxo.com.br/tor": "v3"}
            },
            "data": data
        });
        store.create(&secret_key(), object, "controller").await.unwrap();
        let ctx = OperatorContext::new(store.clone(), TelemetryHandle::default());
        (store, TorSecretReconciler::new(ctx))
    }

    #[tokio::test]
    async fn empty_secret_gets_an_identity() {
        let (store, reconciler) = setup(json!({})).await;
        assert_eq!(reconciler.reconcile(&secret_key()).await.unwrap(), Action::Done);

        let live = store.get(&secret_key()).await.unwrap();
        let creds = credentials_from_secret(&secret_key(), live).unwrap();
        assert!(already_issued(&creds));
        assert!(creds.hostname().unwrap().ends_with(".onion"));
    }

    #[tokio::test]
    async fn issued_identity_is_never_replaced() {
        let (store, reconciler) = setup(json!({})).await;
        reconciler.reconcile(&secret_key()).await.unwrap();
        let first = store.get(&secret_key()).await.unwrap();
        let writes = store.writes();

        reconciler.reconcile(&secret_key()).await.unwrap();
        assert_eq!(store.writes(), writes);
        assert_eq!(store.get(&secret_key()).await.unwrap()["data"], first["data"]);
    }

    #[tokio::test]
    async fn partial_identity_is_reissued() {
        // "abc.onion" base64
        let (store, reconciler) = setup(json!({"hostname": "YWJjLm9uaW9u"})).await;
        reconciler.reconcile(&secret_key()).await.unwrap();

        let live = store.get(&secret_key()).await.unwrap();
        let creds = credentials_from_secret(&secret_key(), live).unwrap();
        assert!(already_issued(&creds));
        assert_ne!(creds.hostname(), Some("abc.onion"));
    }

    #[tokio::test]
    async fn missing_secret_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let ctx = OperatorContext::new(store, TelemetryHandle::default());
        let err = TorSecretReconciler::new(ctx)
            .reconcile(&secret_key())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
