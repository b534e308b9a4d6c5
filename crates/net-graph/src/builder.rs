//! Incremental network builder.

use net_core::{DomainTag, ElementId, NetResult, NodeId};

use crate::kind::ElementKind;
use crate::network::Network;
use crate::validate;

/// Builder for constructing a network incrementally.
///
/// Use `add_node`/`add_element`/`connect` to build up the topology, then
/// call `build()` to run the whole-structure validation (spec §7.1) and
/// freeze it into a `Network`.
#[derive(Debug, Default)]
pub struct NetworkBuilder {
    network: Network,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>, domain: DomainTag) -> NodeId {
        self.network.add_node(name, domain)
    }

    pub fn add_element(&mut self, name: impl Into<String>, domain: DomainTag, kind: ElementKind) -> ElementId {
        self.network.add_element(name, domain, kind)
    }

    pub fn connect(&mut self, element: ElementId, node: NodeId) -> NetResult<()> {
        self.network.connect(element, node)
    }

    pub fn connect_between(&mut self, element: ElementId, a: NodeId, b: NodeId) -> NetResult<()> {
        self.network.connect_between(element, a, b)
    }

    /// Validates and freezes the network (spec §7.1 setup errors).
    pub fn build(self) -> NetResult<Network> {
        validate::validate_structure(&self.network)?;
        Ok(self.network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_builds_a_valid_series_loop() {
        let mut b = NetworkBuilder::new();
        let n1 = b.add_node("n1", DomainTag::Electrical);
        let n2 = b.add_node("n2", DomainTag::Electrical);
        let n3 = b.add_node("n3", DomainTag::Electrical);
        let r1 = b.add_element("r1", DomainTag::Electrical, ElementKind::Dissipator);
        let src = b.add_element("v1", DomainTag::Electrical, ElementKind::EffortSource);
        let r2 = b.add_element("r2", DomainTag::Electrical, ElementKind::Dissipator);
        b.connect_between(r1, n1, n2).unwrap();
        b.connect_between(src, n2, n3).unwrap();
        b.connect_between(r2, n3, n1).unwrap();

        let net = b.build().unwrap();
        assert_eq!(net.node_count(), 3);
        assert_eq!(net.element_count(), 3);
    }

    #[test]
    fn build_fails_on_unconnected_element() {
        let mut b = NetworkBuilder::new();
        b.add_node("n1", DomainTag::Electrical);
        b.add_element("r1", DomainTag::Electrical, ElementKind::Dissipator);
        assert!(b.build().is_err());
    }

    #[test]
    fn build_fails_on_two_effort_forcers_at_one_node() {
        let mut b = NetworkBuilder::new();
        let n1 = b.add_node("n1", DomainTag::Electrical);
        let n2 = b.add_node("n2", DomainTag::Electrical);
        let n3 = b.add_node("n3", DomainTag::Electrical);
        let src1 = b.add_element("v1", DomainTag::Electrical, ElementKind::EffortSource);
        let src2 = b.add_element("v2", DomainTag::Electrical, ElementKind::EffortSource);
        b.connect_between(src1, n1, n2).unwrap();
        b.connect_between(src2, n1, n3).unwrap();
        assert!(b.build().is_err());
    }
}
