use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use moneronet_apis::{MoneroNetwork, MoneroNodeSet, Resource};

use crate::desired::DesiredObject;
use crate::error::AssembleError;
use crate::topology::{merged_slice, plan_exclusive_peers};

/// Member node set `index` of `network`, peered exclusively with every other member.
pub fn network_member(network: &MoneroNetwork, index: u32) -> MoneroNodeSet {
    let template = &network.spec.template;
    let peers = plan_exclusive_peers(index, network.spec.replicas, |peer| {
        network.member_name(peer)
    });

    let mut spec = template.spec.clone();
    spec.daemon_args = merged_slice(spec.daemon_args, peers);
    spec.apply_defaults();

    let metadata = &template.metadata;
    let mut member = MoneroNodeSet::new(&network.member_name(index), network.namespace(), spec);
    member.metadata = ObjectMeta {
        labels: (!metadata.labels.is_empty()).then(|| metadata.labels.clone()),
        annotations: (!metadata.annotations.is_empty()).then(|| metadata.annotations.clone()),
        ..member.metadata
    };
    member
}

/// One node set per network member, in index order.
pub fn assemble_network(network: &MoneroNetwork) -> Result<Vec<DesiredObject>, AssembleError> {
    network.validate()?;
    (0..network.spec.replicas)
        .map(|index| {
            let member = network_member(network, index);
            DesiredObject::child(network, MoneroNodeSet::KIND, &member).map_err(AssembleError::from)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use moneronet_apis::MoneroNetworkSpec;
    use pretty_assertions::assert_eq;

    fn network(replicas: u32) -> MoneroNetwork {
        let mut spec = MoneroNetworkSpec {
            replicas,
            ..MoneroNetworkSpec::default()
        };
        spec.template.spec.daemon_args = vec!["--out-peers=16".into()];
        spec.template
            .metadata
            .labels
            .insert("tier".into(), "public".into());
        let mut net = MoneroNetwork::new("mainnet", "default", spec);
        net.apply_defaults();
        net
    }

    #[test]
    fn three_members_with_two_peers_each() {
        let desired = assemble_network(&network(3)).unwrap();
        assert_eq!(desired.len(), 3);
        for (index, object) in desired.iter().enumerate() {
            assert_eq!(object.key.kind, "MoneroNodeSet");
            assert_eq!(object.key.name, format!("mainnet-{index}"));
            let member: MoneroNodeSet = serde_json::from_value(object.content.clone()).unwrap();
            let peers: Vec<_> = member
                .spec
                .daemon_args
                .iter()
                .filter(|arg| arg.starts_with("--add-exclusive-node="))
                .cloned()
                .collect();
            let expected: Vec<_> = (0..3)
                .filter(|peer| *peer != index)
                .map(|peer| format!("--add-exclusive-node=mainnet-{peer}"))
                .collect();
            assert_eq!(peers, expected);
            assert!(member.spec.daemon_args.contains(&"--out-peers=16".to_owned()));
            assert_eq!(member.metadata.labels.unwrap()["tier"], "public");
        }
    }

    #[test]
    fn members_are_defaulted() {
        let member = network_member(&network(1), 0);
        assert_eq!(member.spec.replicas, 1);
        assert_eq!(member.spec.disk_size, "50Gi");
        assert_eq!(member.spec.daemon_args, vec!["--out-peers=16"]);
    }

    #[test]
    fn reassembly_is_stable() {
        let net = network(4);
        assert_eq!(assemble_network(&net).unwrap(), assemble_network(&net).unwrap());
    }
}
