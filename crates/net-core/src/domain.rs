//! Physical-domain tags (spec §3: "Node has a physical domain tag; only
//! same-domain elements may connect").

use core::fmt;

/// The physical analogy a node/element belongs to.
///
/// Only elements whose domain tag matches a node's may connect to it —
/// enforced by `net_graph::Network::connect` at setup time, not here.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DomainTag {
    Electrical,
    Thermal,
    HeatFluid,
    Phased,
    /// Escape hatch for analogies not anticipated by this enum (spec.md
    /// lists "electrical, thermal, heat-fluid, phased, …" with a
    /// trailing ellipsis — this keeps the tag set open without forcing
    /// every caller through a string).
    Custom(&'static str),
}

impl fmt::Display for DomainTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainTag::Electrical => write!(f, "electrical"),
            DomainTag::Thermal => write!(f, "thermal"),
            DomainTag::HeatFluid => write!(f, "heat-fluid"),
            DomainTag::Phased => write!(f, "phased"),
            DomainTag::Custom(name) => write!(f, "{name}"),
        }
    }
}
