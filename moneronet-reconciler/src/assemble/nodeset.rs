use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::Resource as _;
use moneronet_apis::{MoneroNodeSet, Resource};
use moneronet_tor::{already_issued, Credentials};

use crate::desired::DesiredObject;
use crate::error::AssembleError;
use crate::objects;

/// The hidden-service secret of an anonymized node set. It is create-only so
/// an issued identity is never overwritten by a later pass.
pub fn tor_secret_object(set: &MoneroNodeSet) -> Result<DesiredObject, AssembleError> {
    Ok(DesiredObject::child(set, Secret::KIND, &objects::tor_secret(set))?.create_only())
}

/// Children of a node set: its Service and StatefulSet, followed by the tor
/// objects when anonymization is enabled.
///
/// An anonymized node set needs its issued `identity` to wire the onion
/// hostname into monerod's arguments; without one this fails with
/// [`AssembleError::PendingIdentity`] and emits nothing.
pub fn assemble_nodeset(
    set: &MoneroNodeSet,
    identity: Option<&Credentials>,
) -> Result<Vec<DesiredObject>, AssembleError> {
    set.validate()?;

    let hostname = if set.spec.anonymized.enabled {
        let hostname = identity
            .filter(|creds| already_issued(creds))
            .and_then(Credentials::hostname)
            .ok_or_else(|| AssembleError::PendingIdentity(set.key()))?;
        Some(hostname)
    } else {
        None
    };

    let mut desired = vec![
        DesiredObject::child(set, Service::KIND, &objects::node_service(set))?,
        DesiredObject::child(
            set,
            StatefulSet::KIND,
            &objects::node_statefulset(set, hostname),
        )?,
    ];

    if hostname.is_some() {
        desired.extend([
            DesiredObject::child(set, ConfigMap::KIND, &objects::tor_proxy_config_map(set))?,
            DesiredObject::child(
                set,
                ConfigMap::KIND,
                &objects::tor_hidden_service_config_map(set),
            )?,
            tor_secret_object(set)?,
            DesiredObject::child(
                set,
                Service::KIND,
                &objects::tor_hidden_service_service(set),
            )?,
            DesiredObject::child(
                set,
                Deployment::KIND,
                &objects::tor_hidden_service_deployment(set),
            )?,
        ]);
    }

    Ok(desired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use moneronet_apis::{AnonymizedConfig, MoneroNodeSetSpec};
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn defaulted(spec: MoneroNodeSetSpec) -> MoneroNodeSet {
        let mut set = MoneroNodeSet::new("node", "default", spec);
        set.apply_defaults();
        set
    }

    fn anonymized() -> MoneroNodeSet {
        defaulted(MoneroNodeSetSpec {
            anonymized: AnonymizedConfig {
                enabled: true,
                secret_ref: None,
            },
            ..MoneroNodeSetSpec::default()
        })
    }

    #[test]
    fn plain_node_set_yields_service_and_statefulset() {
        let desired = assemble_nodeset(&defaulted(MoneroNodeSetSpec::default()), None).unwrap();
        let kinds: Vec<_> = desired.iter().map(|d| d.key.kind.as_str()).collect();
        assert_eq!(kinds, vec!["Service", "StatefulSet"]);

        let sts = &desired[1].content;
        assert_eq!(sts["spec"]["replicas"], 1);
        let containers = sts["spec"]["template"]["spec"]["containers"].as_array().unwrap();
        assert_eq!(containers.len(), 1);
        let ports: Vec<_> = containers[0]["ports"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["containerPort"].clone())
            .collect();
        assert_eq!(ports, vec![Value::from(18080), Value::from(18089)]);
        let claims = sts["spec"]["volumeClaimTemplates"].as_array().unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0]["spec"]["resources"]["requests"]["storage"], "50Gi");
    }

    #[test]
    fn anonymized_without_identity_is_pending() {
        let set = anonymized();
        let err = assemble_nodeset(&set, None).unwrap_err();
        assert!(matches!(err, AssembleError::PendingIdentity(ref key) if *key == set.key()));

        let partial = Credentials::from_data(
            [("hostname".to_owned(), b"abc.onion".to_vec())].into_iter().collect(),
        );
        assert!(matches!(
            assemble_nodeset(&set, Some(&partial)),
            Err(AssembleError::PendingIdentity(_))
        ));
    }

    #[test]
    fn anonymized_with_identity_wires_hostname() {
        let creds = Credentials::from_seed([7u8; 32]);
        let hostname = creds.hostname().unwrap().to_owned();
        let desired = assemble_nodeset(&anonymized(), Some(&creds)).unwrap();

        let keys: Vec<_> = desired
            .iter()
            .map(|d| format!("{}/{}", d.key.kind, d.key.name))
            .collect();
        assert_eq!(
            keys,
            vec![
                "Service/node",
                "StatefulSet/node",
                "ConfigMap/node-tor-proxy",
                "ConfigMap/node-tor-hidden-service",
                "Secret/node-tor",
                "Service/node-tor-hidden-service",
                "Deployment/node-tor-proxy",
            ]
        );
        let secret = desired.iter().find(|d| d.key.kind == "Secret").unwrap();
        assert!(!secret.must_match_spec_on_update);

        let command = desired[1].content["spec"]["template"]["spec"]["containers"][0]["command"]
            .as_array()
            .unwrap()
            .clone();
        let inbound = format!("--anonymous-inbound={hostname}:18083,127.0.0.1:18083");
        assert!(command.contains(&Value::from(inbound)));
    }

    #[test]
    fn assembly_is_deterministic() {
        let creds = Credentials::from_seed([9u8; 32]);
        let set = anonymized();
        assert_eq!(
            assemble_nodeset(&set, Some(&creds)).unwrap(),
            assemble_nodeset(&set, Some(&creds)).unwrap()
        );
    }

    #[test]
    fn invalid_spec_is_rejected() {
        let mut set = defaulted(MoneroNodeSetSpec::default());
        set.spec.disk_size = "huge".into();
        assert!(matches!(
            assemble_nodeset(&set, None),
            Err(AssembleError::Invalid(_))
        ));
    }
}
