use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::Resource as _;
use moneronet_apis::{MoneroMiningNodeSet, Resource};

use crate::desired::DesiredObject;
use crate::error::AssembleError;
use crate::objects::mining_deployment;

/// One single-replica xmrig Deployment per worker, named `<parent>-<index>`.
pub fn assemble_mining(set: &MoneroMiningNodeSet) -> Result<Vec<DesiredObject>, AssembleError> {
    set.validate()?;
    (0..set.spec.replicas)
        .map(|index| {
            DesiredObject::child(set, Deployment::KIND, &mining_deployment(set, index))
                .map_err(AssembleError::from)
        })
        .collect()
}
