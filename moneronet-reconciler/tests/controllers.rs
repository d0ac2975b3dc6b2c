use std::sync::Arc;
use std::time::Duration;

use moneronet_apis::{
    AnonymizedConfig, MoneroMiningNodeSet, MoneroMiningNodeSetSpec, MoneroNetwork,
    MoneroNetworkSpec, MoneroNodeSet, MoneroNodeSetSpec, ObjectKey, Resource, REASON_FAILED,
};
use moneronet_reconciler::controller::{
    MiningReconciler, NetworkReconciler, NodeSetReconciler, Reconciler, TorSecretReconciler,
};
use moneronet_reconciler::{BackoffConfig, ClusterApi, Manager, MemoryStore, OperatorContext, ReconcilerConfig};
use moneronet_telemetry::TelemetryHandle;
use pretty_assertions::assert_eq;
use serde::Serialize;
use serde_json::Value;

const SETTLE: Duration = Duration::from_millis(100);
const DEADLINE: Duration = Duration::from_secs(10);

fn context(store: &Arc<MemoryStore>) -> OperatorContext {
    let store: Arc<dyn ClusterApi> = store.clone();
    OperatorContext::new(store, TelemetryHandle::default()).with_config(
        ReconcilerConfig::default(),
        BackoffConfig {
            base_delay_ms: 10,
            max_delay_ms: 50,
        },
    )
}

async fn seed<T: Resource + Serialize>(store: &MemoryStore, object: &T) -> ObjectKey {
    let key = object.key();
    store
        .create(&key, serde_json::to_value(object).unwrap(), "kubectl")
        .await
        .unwrap();
    key
}

async fn settle(store: &Arc<MemoryStore>) -> Manager {
    let manager = Manager::start(context(store));
    tokio::time::timeout(DEADLINE, manager.wait_idle(SETTLE))
        .await
        .expect("controllers did not settle");
    manager
}

async fn list(store: &MemoryStore, kind: &str) -> Vec<Value> {
    store
        .list(kind, Some("default"), &Default::default())
        .await
        .unwrap()
}

fn ready_reason(object: &Value) -> (String, String) {
    let condition = &object["status"]["conditions"][0];
    (
        condition["status"].as_str().unwrap_or_default().to_owned(),
        condition["reason"].as_str().unwrap_or_default().to_owned(),
    )
}

fn anonymized_node_set(name: &str) -> MoneroNodeSet {
    MoneroNodeSet::new(
        name,
        "default",
        MoneroNodeSetSpec {
            anonymized: AnonymizedConfig {
                enabled: true,
                secret_ref: None,
            },
            ..MoneroNodeSetSpec::default()
        },
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn network_members_peer_with_every_other_member() {
    let store = Arc::new(MemoryStore::new());
    let network = MoneroNetwork::new("mainnet", "default", MoneroNetworkSpec::default());
    let key = seed(&store, &network).await;
    settle(&store).await.shutdown().await;

    let members = list(&store, "MoneroNodeSet").await;
    assert_eq!(members.len(), 3);
    for (index, member) in members.iter().enumerate() {
        let name = format!("mainnet-{index}");
        assert_eq!(member["metadata"]["name"], name.as_str());
        let peers: Vec<&str> = member["spec"]["daemonArgs"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .filter(|arg| arg.starts_with("--add-exclusive-node="))
            .collect();
        assert_eq!(peers.len(), 2);
        assert!(peers.iter().all(|peer| !peer.ends_with(&name)));
        assert_eq!(ready_reason(member), ("True".into(), "Succeeded".into()));
    }

    assert_eq!(list(&store, "StatefulSet").await.len(), 3);
    assert_eq!(list(&store, "Service").await.len(), 3);
    assert_eq!(
        ready_reason(&store.get(&key).await.unwrap()),
        ("True".into(), "Succeeded".into())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn settled_cluster_repeats_without_writes() {
    let store = Arc::new(MemoryStore::new());
    let network_key = seed(
        &store,
        &MoneroNetwork::new("testnet", "default", MoneroNetworkSpec::default()),
    )
    .await;
    let node_key = seed(&store, &anonymized_node_set("hidden")).await;
    let mining_key = seed(
        &store,
        &MoneroMiningNodeSet::new("miners", "default", MoneroMiningNodeSetSpec::default()),
    )
    .await;
    settle(&store).await.shutdown().await;
    let writes = store.writes();

    let ctx = context(&store);
    NetworkReconciler::new(ctx.clone())
        .reconcile(&network_key)
        .await
        .unwrap();
    for member in list(&store, "MoneroNodeSet").await {
        let name = member["metadata"]["name"].as_str().unwrap();
        NodeSetReconciler::new(ctx.clone())
            .reconcile(&ObjectKey::new("MoneroNodeSet", "default", name))
            .await
            .unwrap();
    }
    NodeSetReconciler::new(ctx.clone())
        .reconcile(&node_key)
        .await
        .unwrap();
    MiningReconciler::new(ctx.clone())
        .reconcile(&mining_key)
        .await
        .unwrap();
    TorSecretReconciler::new(ctx)
        .reconcile(&ObjectKey::new("Secret", "default", "hidden-tor"))
        .await
        .unwrap();

    assert_eq!(store.writes(), writes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn anonymized_node_set_becomes_ready_once_identity_is_issued() {
    let store = Arc::new(MemoryStore::new());
    let key = seed(&store, &anonymized_node_set("hidden")).await;
    settle(&store).await.shutdown().await;

    let secret = store
        .get(&ObjectKey::new("Secret", "default", "hidden-tor"))
        .await
        .unwrap();
    assert_eq!(secret["metadata"]["labels"]["utxo.com.br/tor"], "v3");
    assert_eq!(secret["metadata"]["ownerReferences"][0]["name"], "hidden");

    let set = store.get(&key).await.unwrap();
    assert_eq!(ready_reason(&set), ("True".into(), "Succeeded".into()));
    let address = set["status"]["anonymizedAddress"].as_str().unwrap().to_owned();
    assert!(address.ends_with(".onion"));

    let statefulset = store
        .get(&ObjectKey::new("StatefulSet", "default", "hidden"))
        .await
        .unwrap();
    let rendered = statefulset.to_string();
    assert!(rendered.contains(&format!("--anonymous-inbound={address}:18083")));

    for (kind, name) in [
        ("ConfigMap", "hidden-tor-proxy"),
        ("ConfigMap", "hidden-tor-hidden-service"),
        ("Service", "hidden-tor-hidden-service"),
        ("Deployment", "hidden-tor-proxy"),
    ] {
        store
            .get(&ObjectKey::new(kind, "default", name))
            .await
            .unwrap_or_else(|err| panic!("{kind} {name}: {err}"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn onion_identity_survives_restarts() {
    let store = Arc::new(MemoryStore::new());
    let key = seed(&store, &anonymized_node_set("hidden")).await;
    let secret_key = ObjectKey::new("Secret", "default", "hidden-tor");

    settle(&store).await.shutdown().await;
    let first_secret = store.get(&secret_key).await.unwrap()["data"].clone();
    let first_address = store.get(&key).await.unwrap()["status"]["anonymizedAddress"].clone();

    settle(&store).await.shutdown().await;
    assert_eq!(store.get(&secret_key).await.unwrap()["data"], first_secret);
    assert_eq!(
        store.get(&key).await.unwrap()["status"]["anonymizedAddress"],
        first_address
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mining_set_runs_one_worker_per_replica() {
    let store = Arc::new(MemoryStore::new());
    let spec = MoneroMiningNodeSetSpec {
        replicas: 2,
        worker_args_template: vec!["--rig-id=$(id)".into()],
        ..MoneroMiningNodeSetSpec::default()
    };
    let key = seed(&store, &MoneroMiningNodeSet::new("miners", "default", spec)).await;
    settle(&store).await.shutdown().await;

    let workers = list(&store, "Deployment").await;
    assert_eq!(workers.len(), 2);
    for (index, worker) in workers.iter().enumerate() {
        assert_eq!(worker["metadata"]["name"], format!("miners-{index}").as_str());
        assert!(worker.to_string().contains(&format!("--rig-id={index}")));
    }
    assert_eq!(
        ready_reason(&store.get(&key).await.unwrap()),
        ("True".into(), "Succeeded".into())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleting_a_network_removes_everything_it_created() {
    let store = Arc::new(MemoryStore::new());
    let key = seed(
        &store,
        &MoneroNetwork::new("mainnet", "default", MoneroNetworkSpec::default()),
    )
    .await;
    settle(&store).await.shutdown().await;
    assert!(store.len() > 1);

    store.delete(&key).await.unwrap();
    assert!(store.is_empty());
}

async fn edit_spec(store: &MemoryStore, key: &ObjectKey, field: &str, value: Value) {
    let mut live = store.get(key).await.unwrap();
    live["spec"][field] = value;
    store.update(key, live, "kubectl").await.unwrap();
}

fn names(objects: &[Value]) -> Vec<String> {
    objects
        .iter()
        .filter_map(|object| object["metadata"]["name"].as_str().map(str::to_owned))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scaling_down_removes_surplus_members_and_workers() {
    let store = Arc::new(MemoryStore::new());
    let network_key = seed(
        &store,
        &MoneroNetwork::new("mainnet", "default", MoneroNetworkSpec::default()),
    )
    .await;
    let mining_spec = MoneroMiningNodeSetSpec {
        replicas: 3,
        ..MoneroMiningNodeSetSpec::default()
    };
    let mining_key = seed(
        &store,
        &MoneroMiningNodeSet::new("miners", "default", mining_spec),
    )
    .await;
    settle(&store).await.shutdown().await;
    assert_eq!(list(&store, "StatefulSet").await.len(), 3);
    assert_eq!(list(&store, "Deployment").await.len(), 3);

    edit_spec(&store, &network_key, "replicas", serde_json::json!(2)).await;
    edit_spec(&store, &mining_key, "replicas", serde_json::json!(1)).await;
    settle(&store).await.shutdown().await;

    let members = list(&store, "MoneroNodeSet").await;
    assert_eq!(names(&members), vec!["mainnet-0", "mainnet-1"]);
    assert_eq!(
        members[0]["spec"]["daemonArgs"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .filter(|arg| arg.starts_with("--add-exclusive-node="))
            .collect::<Vec<_>>(),
        vec!["--add-exclusive-node=mainnet-1"]
    );
    assert_eq!(
        names(&list(&store, "StatefulSet").await),
        vec!["mainnet-0", "mainnet-1"]
    );
    assert_eq!(
        names(&list(&store, "Service").await),
        vec!["mainnet-0", "mainnet-1"]
    );
    assert_eq!(names(&list(&store, "Deployment").await), vec!["miners-0"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabling_anonymity_removes_tor_objects_but_keeps_identity() {
    let store = Arc::new(MemoryStore::new());
    let key = seed(&store, &anonymized_node_set("hidden")).await;
    settle(&store).await.shutdown().await;
    assert_eq!(list(&store, "ConfigMap").await.len(), 2);

    edit_spec(
        &store,
        &key,
        "anonymized",
        serde_json::json!({"enabled": false}),
    )
    .await;
    settle(&store).await.shutdown().await;

    assert!(list(&store, "ConfigMap").await.is_empty());
    assert!(list(&store, "Deployment").await.is_empty());
    assert_eq!(names(&list(&store, "Service").await), vec!["hidden"]);
    assert_eq!(names(&list(&store, "Secret").await), vec!["hidden-tor"]);
    let set = store.get(&key).await.unwrap();
    assert_eq!(ready_reason(&set), ("True".into(), "Succeeded".into()));
    assert!(set["status"]["anonymizedAddress"].is_null());
}

#[tokio::test]
async fn invalid_spec_is_reported_on_status() {
    let store = Arc::new(MemoryStore::new());
    let spec = MoneroNodeSetSpec {
        disk_size: "plenty".into(),
        ..MoneroNodeSetSpec::default()
    };
    let key = seed(&store, &MoneroNodeSet::new("broken", "default", spec)).await;

    let err = NodeSetReconciler::new(context(&store))
        .reconcile(&key)
        .await
        .unwrap_err();
    assert!(!err.is_pending());

    let set = store.get(&key).await.unwrap();
    assert_eq!(ready_reason(&set), ("False".into(), REASON_FAILED.into()));
    assert_eq!(list(&store, "StatefulSet").await.len(), 0);
}
