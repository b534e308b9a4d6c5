//! Overlay / Superposition Layer (C7, spec §4.7): one source's view of a
//! linear subnet with every other source replaced by its degenerate kind.

use std::collections::{HashSet, VecDeque};

use net_core::{ElementId, Tolerances};
use net_graph::{ElementKind, Network};

use crate::error::SolverResult;
use crate::recursive_simplifier::RecursiveSimplifier;

/// One overlay layer built for a single "sole source" (spec §4.7).
pub struct Overlay {
    pub sole_source: ElementId,
    pub network: Network,
    /// True when the sole source sits on no closed loop at all: the layer
    /// contributes nothing (spec §4.7 "degenerate case").
    pub degenerate: bool,
}

impl Overlay {
    /// Builds the overlay for `sole_source` out of `base`. `sources` lists
    /// every other source element (`EffortSource`/`FlowSource`) sharing the
    /// same linear subnet; each becomes a short or an open per spec §4.7.
    pub fn build(base: &Network, sources: &[ElementId], sole_source: ElementId) -> SolverResult<Self> {
        let mut network = base.clone();
        for &id in sources {
            if id == sole_source {
                continue;
            }
            match network.element(id)?.kind() {
                ElementKind::EffortSource => network.element_mut(id)?.set_bridged_connection(),
                ElementKind::FlowSource => network.element_mut(id)?.set_open_connection(),
                _ => {}
            }
        }

        let degenerate = !lies_on_closed_loop(&network, sole_source)?;
        Ok(Overlay { sole_source, network, degenerate })
    }

    /// Delegates the reduced overlay to the recursive simplifier (spec
    /// §4.7: "constructs a `RecursiveSimplifier` child and delegates").
    pub fn into_simplifier(self, tol: Tolerances) -> SolverResult<RecursiveSimplifier> {
        RecursiveSimplifier::build(self.network, tol)
    }
}

/// True if the source's two endpoints remain connected by some other path
/// once the source itself is excluded from the walk. This BFS plays the
/// role of the spec's "Merges/Bridges/Excises" pre-reduction: the recursive
/// simplifier's own dead-end-removal and fusion steps (C6) already collapse
/// opened/bridged chains exactly the way a dedicated graph-surgery pass
/// would, so no separate union-find is built here — the overlay only needs
/// to answer the one question C6 can't: is there a loop at all.
fn lies_on_closed_loop(network: &Network, sole_source: ElementId) -> SolverResult<bool> {
    let el = network.element(sole_source)?;
    if el.number_of_nodes() != 2 {
        return Ok(false);
    }
    let (start, goal) = (el.get_node(0).unwrap(), el.get_node(1).unwrap());
    if start == goal {
        return Ok(true);
    }

    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(start);
    queue.push_back(start);
    while let Some(node) = queue.pop_front() {
        if node == goal {
            return Ok(true);
        }
        for &eid in network.node(node)?.elements() {
            if eid == sole_source {
                continue;
            }
            if network.element(eid)?.kind() == ElementKind::Open {
                continue; // no current can cross an open branch (spec §4.5/§4.6)
            }
            let Ok(other) = network.only_other_node(eid, node) else {
                continue; // one-port element (origin/self-capacitance), not a path edge
            };
            if seen.insert(other) {
                queue.push_back(other);
            }
        }
    }
    Ok(seen.contains(&goal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use net_core::DomainTag;
    use net_graph::NetworkBuilder;

    #[test]
    fn source_inside_a_loop_is_not_degenerate() {
        let mut b = NetworkBuilder::new();
        let a = b.add_node("a", DomainTag::Electrical);
        let c = b.add_node("c", DomainTag::Electrical);
        let src = b.add_element("src", DomainTag::Electrical, ElementKind::EffortSource);
        let r = b.add_element("r", DomainTag::Electrical, ElementKind::Dissipator);
        b.connect_between(src, a, c).unwrap();
        b.connect_between(r, a, c).unwrap();
        let mut net = b.build().unwrap();
        net.element_mut(r).unwrap().set_resistance_parameter(10.0).unwrap();

        let overlay = Overlay::build(&net, &[src], src).unwrap();
        assert!(!overlay.degenerate);
    }

    #[test]
    fn source_with_no_return_path_is_degenerate() {
        let mut b = NetworkBuilder::new();
        let a = b.add_node("a", DomainTag::Electrical);
        let c = b.add_node("c", DomainTag::Electrical);
        let src = b.add_element("src", DomainTag::Electrical, ElementKind::EffortSource);
        b.connect_between(src, a, c).unwrap();
        let net = b.build().unwrap();

        let overlay = Overlay::build(&net, &[src], src).unwrap();
        assert!(overlay.degenerate);
    }

    #[test]
    fn return_path_through_another_sources_opened_branch_is_degenerate() {
        // sole's only return path from a to c runs through `other_flow`,
        // which this same overlay opens (FlowSource -> Open) before
        // degenerate-detection runs. That path must not count as closed.
        let mut b = NetworkBuilder::new();
        let a = b.add_node("a", DomainTag::Electrical);
        let c = b.add_node("c", DomainTag::Electrical);
        let sole = b.add_element("sole", DomainTag::Electrical, ElementKind::EffortSource);
        let other_flow = b.add_element("other_f", DomainTag::Electrical, ElementKind::FlowSource);
        b.connect_between(sole, a, c).unwrap();
        b.connect_between(other_flow, a, c).unwrap();
        let net = b.build().unwrap();

        let overlay = Overlay::build(&net, &[sole, other_flow], sole).unwrap();
        assert_eq!(overlay.network.element(other_flow).unwrap().kind(), ElementKind::Open);
        assert!(overlay.degenerate);
    }

    #[test]
    fn other_sources_are_shorted_or_opened() {
        let mut b = NetworkBuilder::new();
        let a = b.add_node("a", DomainTag::Electrical);
        let m = b.add_node("m", DomainTag::Electrical);
        let c = b.add_node("c", DomainTag::Electrical);
        let sole = b.add_element("sole", DomainTag::Electrical, ElementKind::EffortSource);
        let other_effort = b.add_element("other_e", DomainTag::Electrical, ElementKind::EffortSource);
        let other_flow = b.add_element("other_f", DomainTag::Electrical, ElementKind::FlowSource);
        let r = b.add_element("r", DomainTag::Electrical, ElementKind::Dissipator);
        b.connect_between(sole, a, c).unwrap();
        b.connect_between(other_effort, a, m).unwrap();
        b.connect_between(other_flow, m, c).unwrap();
        b.connect_between(r, a, c).unwrap();
        let mut net = b.build().unwrap();
        net.element_mut(r).unwrap().set_resistance_parameter(5.0).unwrap();

        let overlay = Overlay::build(&net, &[sole, other_effort, other_flow], sole).unwrap();
        assert_eq!(overlay.network.element(sole).unwrap().kind(), ElementKind::EffortSource);
        assert_eq!(overlay.network.element(other_effort).unwrap().kind(), ElementKind::Bridged);
        assert_eq!(overlay.network.element(other_flow).unwrap().kind(), ElementKind::Open);
    }
}
