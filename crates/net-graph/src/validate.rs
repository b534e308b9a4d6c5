//! Whole-structure validation run once at the end of `NetworkBuilder::build`.

use net_core::NetResult;

use crate::error::GraphError;
use crate::network::Network;

/// Checks the setup errors from spec §7.1 that can only be detected once
/// every element has finished connecting. Per-connection errors (duplicate
/// registration, domain mismatch, over-full node count) are rejected
/// earlier, directly by `Network::connect`.
pub fn validate_structure(network: &Network) -> NetResult<()> {
    validate_node_counts(network)?;
    validate_effort_forcers(network)?;
    Ok(())
}

fn validate_node_counts(network: &Network) -> NetResult<()> {
    for element in network.elements() {
        let actual = element.number_of_nodes();
        if actual == 0 {
            return Err(GraphError::Unconnected(element.name().to_string()).into());
        }
        let requirement = element.kind().required_node_count();
        if !requirement.is_satisfied_by(actual) {
            return Err(GraphError::InvalidNodeCount {
                kind: element.kind(),
                requirement: requirement.to_string(),
                actual,
            }
            .into());
        }
    }
    Ok(())
}

fn validate_effort_forcers(network: &Network) -> NetResult<()> {
    for node in network.nodes() {
        let forcers = node
            .elements()
            .iter()
            .filter(|e| {
                network
                    .element(**e)
                    .map(|el| el.kind().is_effort_forcer())
                    .unwrap_or(false)
            })
            .count();
        if forcers > 1 {
            return Err(GraphError::MultipleEffortForcers(node.name().to_string()).into());
        }
    }
    Ok(())
}
