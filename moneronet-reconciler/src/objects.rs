//! Builders for the Kubernetes child objects owned by the operator's kinds.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Affinity, ConfigMap, ConfigMapProjection, Container, ContainerPort, HTTPGetAction,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PodAffinityTerm, PodAntiAffinity, PodSpec,
    PodTemplateSpec, Probe, ProjectedVolumeSource, ResourceRequirements, Secret,
    SecretProjection, Service, ServicePort, ServiceSpec, Volume, VolumeMount, VolumeProjection,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use moneronet_apis::{MoneroMiningNodeSet, MoneroNodeSet, Resource, ServiceType};
use moneronet_tor::torrc::{HiddenServiceConfig, ProxyConfig};

use crate::monerod::{self, MonerodConfig};
use crate::topology::merged_slice;

pub const APP_LABEL: &str = "app";
pub const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

/// Label selecting the secrets the credential issuer is responsible for.
pub const TOR_SECRET_LABEL: (&str, &str) = ("utxo.com.br/tor", "v3");

pub const TORRC_KEY: &str = "torrc";
pub const TOR_VOLUME_NAME: &str = "tor";
pub const TORNETES_CONTAINER_NAME: &str = "tornetes";
pub const TORNETES_IMAGE: &str = "index.docker.io/utxobr/tornetes@sha256:3d103a73bca66fb27416b6bd23d3c66cd363157cd9f9d5a159157560ea4c48bf";
const TORNETES_SOURCE_MOUNT: &str = "/tor-original";

pub const XMRIG_CONTAINER_NAME: &str = "xmrig";

const REVISION_HISTORY_LIMIT: i32 = 0;
const TERMINATION_GRACE_PERIOD_SECONDS: i64 = 60;

pub fn app_label(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_owned(), name.to_owned())])
}

fn meta(name: &str, namespace: &str, labels: Option<BTreeMap<String, String>>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_owned()),
        namespace: Some(namespace.to_owned()),
        labels,
        ..ObjectMeta::default()
    }
}

fn selector(name: &str) -> LabelSelector {
    LabelSelector {
        match_labels: Some(app_label(name)),
        ..LabelSelector::default()
    }
}

fn tcp_port(name: &str, port: u16, node_port: Option<u16>) -> ServicePort {
    ServicePort {
        name: Some(name.to_owned()),
        port: i32::from(port),
        target_port: Some(IntOrString::Int(i32::from(port))),
        protocol: Some("TCP".to_owned()),
        node_port: node_port.map(i32::from),
        ..ServicePort::default()
    }
}

/// Required anti-affinity keeping pods labelled `app: <name>` on distinct hosts.
pub fn hard_anti_affinity(name: &str) -> Affinity {
    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
                label_selector: Some(selector(name)),
                topology_key: HOSTNAME_TOPOLOGY_KEY.to_owned(),
                ..PodAffinityTerm::default()
            }]),
            ..PodAntiAffinity::default()
        }),
        ..Affinity::default()
    }
}

pub fn node_service_name(set: &MoneroNodeSet) -> String {
    set.name().to_owned()
}

pub fn tor_proxy_name(set: &MoneroNodeSet) -> String {
    format!("{}-tor-proxy", set.name())
}

pub fn tor_hidden_service_name(set: &MoneroNodeSet) -> String {
    format!("{}-tor-hidden-service", set.name())
}

/// Service exposing the p2p and restricted RPC ports of a node set.
pub fn node_service(set: &MoneroNodeSet) -> Service {
    let node_port = |port: u16| match set.spec.service_type {
        ServiceType::NodePort => Some(port + monerod::NODE_PORT_OFFSET),
        ServiceType::ClusterIP => None,
    };
    let labels = app_label(set.name());

    Service {
        metadata: meta(&node_service_name(set), set.namespace(), Some(labels.clone())),
        spec: Some(ServiceSpec {
            selector: Some(labels),
            type_: match set.spec.service_type {
                ServiceType::NodePort => Some("NodePort".to_owned()),
                ServiceType::ClusterIP => None,
            },
            ports: Some(vec![
                tcp_port(
                    monerod::P2P_PORT_NAME,
                    monerod::P2P_PORT,
                    node_port(monerod::P2P_PORT),
                ),
                tcp_port(
                    monerod::RESTRICTED_PORT_NAME,
                    monerod::RESTRICTED_PORT,
                    node_port(monerod::RESTRICTED_PORT),
                ),
            ]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// Full monerod argument list; `hostname` is the issued onion address of an
/// anonymized node set.
pub fn monerod_args(set: &MoneroNodeSet, hostname: Option<&str>) -> Vec<String> {
    let mut defaults = monerod::default_args();
    if let Some(hostname) = hostname {
        defaults.extend(monerod::anonymized_args(hostname));
    }
    merged_slice(defaults, set.spec.daemon_args.iter().cloned())
}

fn monerod_container(set: &MoneroNodeSet, args: &[String]) -> Container {
    let mut command = vec![monerod::CONTAINER_NAME.to_owned()];
    command.extend(args.iter().cloned());

    Container {
        name: monerod::CONTAINER_NAME.to_owned(),
        image: Some(set.spec.daemon_image.clone()),
        command: Some(command),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some(monerod::PROBE_PATH.to_owned()),
                port: IntOrString::String(monerod::RESTRICTED_PORT_NAME.to_owned()),
                ..HTTPGetAction::default()
            }),
            period_seconds: Some(monerod::PROBE_PERIOD_SECONDS),
            initial_delay_seconds: Some(monerod::PROBE_INITIAL_DELAY_SECONDS),
            failure_threshold: Some(monerod::PROBE_FAILURE_THRESHOLD),
            ..Probe::default()
        }),
        resources: Some(ResourceRequirements {
            limits: Some(BTreeMap::from([
                (
                    "hugepages-2Mi".to_owned(),
                    Quantity(monerod::HUGEPAGES_LIMIT.to_owned()),
                ),
                ("memory".to_owned(), Quantity(monerod::MEMORY_LIMIT.to_owned())),
            ])),
            ..ResourceRequirements::default()
        }),
        ports: Some(vec![
            ContainerPort {
                name: Some(monerod::P2P_PORT_NAME.to_owned()),
                container_port: i32::from(monerod::P2P_PORT),
                protocol: Some("TCP".to_owned()),
                ..ContainerPort::default()
            },
            ContainerPort {
                name: Some(monerod::RESTRICTED_PORT_NAME.to_owned()),
                container_port: i32::from(monerod::RESTRICTED_PORT),
                protocol: Some("TCP".to_owned()),
                ..ContainerPort::default()
            },
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: monerod::DATA_VOLUME_NAME.to_owned(),
            mount_path: monerod::DATA_MOUNT_PATH.to_owned(),
            ..VolumeMount::default()
        }]),
        ..Container::default()
    }
}

fn tornetes_container() -> Container {
    Container {
        name: TORNETES_CONTAINER_NAME.to_owned(),
        image: Some(TORNETES_IMAGE.to_owned()),
        command: Some(vec![
            "tornetes".to_owned(),
            "run".to_owned(),
            format!("--source={TORNETES_SOURCE_MOUNT}/..data"),
            format!("--destination={}", moneronet_tor::torrc::HIDDEN_SERVICE_DIR),
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: TOR_VOLUME_NAME.to_owned(),
            mount_path: TORNETES_SOURCE_MOUNT.to_owned(),
            ..VolumeMount::default()
        }]),
        ..Container::default()
    }
}

fn config_map_projection(name: String) -> VolumeProjection {
    VolumeProjection {
        config_map: Some(ConfigMapProjection {
            name: name.into(),
            ..ConfigMapProjection::default()
        }),
        ..VolumeProjection::default()
    }
}

fn projected_tor_volume(sources: Vec<VolumeProjection>) -> Volume {
    Volume {
        name: TOR_VOLUME_NAME.to_owned(),
        projected: Some(ProjectedVolumeSource {
            sources: Some(sources),
            ..ProjectedVolumeSource::default()
        }),
        ..Volume::default()
    }
}

fn data_claim(set: &MoneroNodeSet) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(monerod::DATA_VOLUME_NAME.to_owned()),
            ..ObjectMeta::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_owned()]),
            storage_class_name: set.spec.storage_class.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_owned(),
                    Quantity(set.spec.disk_size.clone()),
                )])),
                ..VolumeResourceRequirements::default()
            }),
            ..PersistentVolumeClaimSpec::default()
        }),
        ..PersistentVolumeClaim::default()
    }
}

/// StatefulSet running monerod. With `hostname` set the pod also carries the
/// tor proxy sidecar and the anonymized arguments.
pub fn node_statefulset(set: &MoneroNodeSet, hostname: Option<&str>) -> StatefulSet {
    let args = monerod_args(set, hostname);
    let digest = MonerodConfig::from_args(&args).digest();

    let mut containers = vec![monerod_container(set, &args)];
    let mut volumes = None;
    if hostname.is_some() {
        containers.push(tornetes_container());
        volumes = Some(vec![projected_tor_volume(vec![config_map_projection(
            tor_proxy_name(set),
        )])]);
    }

    let template = PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(app_label(set.name())),
            annotations: Some(BTreeMap::from([(
                monerod::CONFIG_DIGEST_ANNOTATION.to_owned(),
                digest,
            )])),
            ..ObjectMeta::default()
        }),
        spec: Some(PodSpec {
            termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD_SECONDS),
            affinity: set
                .spec
                .hard_anti_affinity
                .then(|| hard_anti_affinity(set.name())),
            containers,
            volumes,
            ..PodSpec::default()
        }),
    };

    StatefulSet {
        metadata: meta(set.name(), set.namespace(), None),
        spec: Some(StatefulSetSpec {
            service_name: node_service_name(set).into(),
            replicas: Some(i32::try_from(set.spec.replicas).unwrap_or(i32::MAX)),
            revision_history_limit: Some(REVISION_HISTORY_LIMIT),
            selector: selector(set.name()),
            template,
            volume_claim_templates: Some(vec![data_claim(set)]),
            ..StatefulSetSpec::default()
        }),
        ..StatefulSet::default()
    }
}

/// Empty, labelled secret; its data is filled in once by the issuer.
pub fn tor_secret(set: &MoneroNodeSet) -> Secret {
    let (key, value) = TOR_SECRET_LABEL;
    Secret {
        metadata: meta(
            &set.tor_secret_name(),
            set.namespace(),
            Some(BTreeMap::from([(key.to_owned(), value.to_owned())])),
        ),
        ..Secret::default()
    }
}

fn torrc_config_map(name: &str, namespace: &str, torrc: String) -> ConfigMap {
    ConfigMap {
        metadata: meta(name, namespace, None),
        data: Some(BTreeMap::from([(TORRC_KEY.to_owned(), torrc)])),
        ..ConfigMap::default()
    }
}

pub fn tor_proxy_config_map(set: &MoneroNodeSet) -> ConfigMap {
    torrc_config_map(
        &tor_proxy_name(set),
        set.namespace(),
        ProxyConfig::default().to_string(),
    )
}

pub fn tor_hidden_service_config_map(set: &MoneroNodeSet) -> ConfigMap {
    let config = HiddenServiceConfig::new(
        node_service_name(set),
        [monerod::RESTRICTED_PORT, monerod::TOR_P2P_PORT],
    );
    torrc_config_map(
        &tor_hidden_service_name(set),
        set.namespace(),
        config.to_string(),
    )
}

/// Service exposing the anonymized p2p port of the node set's pods.
pub fn tor_hidden_service_service(set: &MoneroNodeSet) -> Service {
    let labels = app_label(set.name());
    Service {
        metadata: meta(
            &tor_hidden_service_name(set),
            set.namespace(),
            Some(labels.clone()),
        ),
        spec: Some(ServiceSpec {
            selector: Some(labels),
            ports: Some(vec![tcp_port(
                monerod::TOR_P2P_PORT_NAME,
                monerod::TOR_P2P_PORT,
                None,
            )]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// Deployment running tor with the hidden-service identity and torrc mounted.
pub fn tor_hidden_service_deployment(set: &MoneroNodeSet) -> Deployment {
    let name = tor_proxy_name(set);
    let secret = VolumeProjection {
        secret: Some(SecretProjection {
            name: set.tor_secret_name().into(),
            ..SecretProjection::default()
        }),
        ..VolumeProjection::default()
    };
    let volume = projected_tor_volume(vec![
        secret,
        config_map_projection(tor_hidden_service_name(set)),
    ]);

    Deployment {
        metadata: meta(&name, set.namespace(), None),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            revision_history_limit: Some(REVISION_HISTORY_LIMIT),
            selector: selector(&name),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_label(&name)),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![tornetes_container()],
                    volumes: Some(vec![volume]),
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

/// Single-replica xmrig worker number `index` of a mining node set.
pub fn mining_deployment(set: &MoneroMiningNodeSet, index: u32) -> Deployment {
    let mut command = vec![XMRIG_CONTAINER_NAME.to_owned()];
    command.extend(set.spec.worker_args(index));

    Deployment {
        metadata: meta(&set.worker_name(index), set.namespace(), None),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            revision_history_limit: Some(REVISION_HISTORY_LIMIT),
            selector: selector(set.name()),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_label(set.name())),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD_SECONDS),
                    affinity: set
                        .spec
                        .hard_anti_affinity
                        .then(|| hard_anti_affinity(set.name())),
                    containers: vec![Container {
                        name: XMRIG_CONTAINER_NAME.to_owned(),
                        image: Some(set.spec.worker_image.clone()),
                        command: Some(command),
                        ..Container::default()
                    }],
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}
