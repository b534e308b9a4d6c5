//! Error types for solver operations.

use net_core::NetError;
use net_graph::GraphError;
use thiserror::Error;

pub type SolverResult<T> = Result<T, SolverError>;

/// Errors raised by the network solver core (spec §7).
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("{0}")]
    Net(#[from] NetError),

    /// Propagation or recursion ran past its iteration cap (spec §7.2).
    #[error("iteration cap exceeded: {what} (cap={cap})")]
    IterationCapExceeded { what: &'static str, cap: usize },

    /// A star-polygon transform was requested on a node that doesn't
    /// qualify (wrong degree, attached source/origin, dead-end branch).
    #[error("star-polygon transform not applicable: {what}")]
    TransformNotApplicable { what: String },

    /// A small-case solver's edge policy could not be satisfied (spec §4.3:
    /// e.g. `OPEN` in series with `FLOW_SOURCE`).
    #[error("small-case solver failed: {what}")]
    SmallCaseUnsolvable { what: String },

    /// No non-branching path exists from an expansion element to the
    /// nearest capacitance (spec §4.10).
    #[error("no expansion path to capacitance from element {element}")]
    NoExpansionPath { element: String },
}

impl SolverError {
    pub fn transform_not_applicable(what: impl Into<String>) -> Self {
        SolverError::TransformNotApplicable { what: what.into() }
    }

    pub fn small_case_unsolvable(what: impl Into<String>) -> Self {
        SolverError::SmallCaseUnsolvable { what: what.into() }
    }
}

impl From<SolverError> for NetError {
    fn from(e: SolverError) -> Self {
        match e {
            SolverError::Net(inner) => inner,
            other => NetError::model(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_cap_message_names_the_cap() {
        let err = SolverError::IterationCapExceeded {
            what: "propagation",
            cap: 1000,
        };
        assert!(err.to_string().contains("1000"));
    }
}
