//! Graph-specific error types.

use net_core::NetError;
use thiserror::Error;

use crate::kind::ElementKind;

pub type GraphResult<T> = Result<T, GraphError>;

/// Setup/topology failures specific to graph primitives (spec §7.1).
///
/// `Network::connect` rejects duplicate connections and domain mismatches as
/// they happen; the rest only show up once every element has finished
/// connecting, so `validate::validate_structure` checks them in one pass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("element already connected to node (duplicate registration)")]
    DuplicateConnection,

    #[error("domain mismatch: element is {element}, node is {node}")]
    DomainMismatch { element: String, node: String },

    #[error("element kind {kind} requires {requirement} node(s), has {actual}")]
    InvalidNodeCount {
        kind: ElementKind,
        requirement: String,
        actual: usize,
    },

    #[error("element {0} has no connected nodes (must be connected before registration)")]
    Unconnected(String),

    #[error("node {0} has more than one effort-forcing element")]
    MultipleEffortForcers(String),
}

impl From<GraphError> for NetError {
    fn from(err: GraphError) -> Self {
        NetError::model(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_connection_message() {
        let err = GraphError::DuplicateConnection;
        assert!(err.to_string().contains("duplicate registration"));
    }

    #[test]
    fn converts_into_net_error() {
        let err: NetError = GraphError::Unconnected("r1".into()).into();
        assert!(matches!(err, NetError::ModelError { .. }));
    }
}
