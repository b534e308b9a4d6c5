//! Transfer Subnet Translator (C9, spec §4.9): maps a heterogeneous subnet
//! (capacitors, origins, arbitrary two-port media) onto a pure linear
//! electrical twin, solves the twin by superposition, and transfers results
//! back.
//!
//! Grounded on `ChildNetwork`'s parent/child index maps (spec §3 Child
//! Network): the twin *is* a child network of the subnet, just one whose
//! simplification step is "translate kind, don't fuse or transform".

use std::collections::HashMap;

use net_core::{ElementId, NetResult, NodeId, Real, Tolerances};
use net_graph::{ElementKind, Network};
use tracing::warn;

use crate::child_network::{ChildNetwork, ElementOrigin};
use crate::config::VALIDATION_TOLERANCE;
use crate::error::{SolverError, SolverResult};
use crate::propagation;
use crate::superposition::solve_by_superposition;

/// A heterogeneous subnet's linear electrical twin, plus the maps needed to
/// push tick-local parameter values in and solved values back out
/// (spec §4.9).
pub struct TransferSubnet {
    twin: ChildNetwork,
    /// Twin-space `EffortSource`/`FlowSource` element ids (includes the
    /// per-capacitance synthesized effort sources and any promoted extra
    /// origins) — the "N sources" the superposition driver dispatches over.
    sources: Vec<ElementId>,
}

impl TransferSubnet {
    /// Builds the twin and validates the subnet is well-formed for transfer
    /// (spec §4.9 "Validation on setup"). Topology is fixed at this point;
    /// only values are refreshed per tick thereafter.
    pub fn build(subnet: &Network) -> SolverResult<Self> {
        validate_subnet(subnet)?;

        let node_target = resolve_node_targets(subnet)?;
        let first_origin_id = subnet.elements().iter().find(|e| e.kind() == ElementKind::Origin).map(|e| e.id());
        let ground: Option<NodeId> = match first_origin_id {
            Some(id) => {
                let node = subnet.element(id)?.get_node(0).expect("origin has exactly one node (setup-validated)");
                Some(node_target[&node])
            }
            None => None,
        };

        let mut twin = ChildNetwork::new();
        let mut materialized: HashMap<NodeId, NodeId> = HashMap::new();
        let mut sources = Vec::new();

        for el in subnet.elements() {
            match el.kind() {
                ElementKind::Origin => {
                    let node = el.get_node(0).expect("origin has exactly one node (setup-validated)");
                    if Some(el.id()) == first_origin_id {
                        let child_node = carry_resolved(&mut twin, subnet, &node_target, &mut materialized, node)?;
                        let child_el = twin.network.add_element(el.name().to_string(), el.domain().clone(), ElementKind::Origin);
                        twin.network.connect(child_el, child_node)?;
                        if let Some(v) = el.effort_value() {
                            twin.network.element_mut(child_el)?.set_effort_value(v);
                        }
                        twin.set_element_origin(child_el, ElementOrigin::Direct(el.id()));
                        continue;
                    }

                    let rep = node_target[&node];
                    if Some(rep) == ground {
                        // Same effort as the ground origin: spec §4.9 merges
                        // it onto the ground node, no twin element needed.
                        continue;
                    }
                    let (Some(value), Some(ground)) = (el.effort_value(), ground) else {
                        continue;
                    };
                    let child_ground = carry_resolved(&mut twin, subnet, &node_target, &mut materialized, ground)?;
                    let child_node = carry_resolved(&mut twin, subnet, &node_target, &mut materialized, node)?;
                    let child_el = twin.network.add_element(
                        format!("{}_promoted", el.name()),
                        el.domain().clone(),
                        ElementKind::EffortSource,
                    );
                    twin.network.connect(child_el, child_node)?;
                    twin.network.connect(child_el, child_ground)?;
                    twin.network.element_mut(child_el)?.set_effort_value(value);
                    twin.set_element_origin(child_el, ElementOrigin::Direct(el.id()));
                    sources.push(child_el);
                }
                ElementKind::Capacitance => {
                    // Treated as an effort source this tick (spec §4.9);
                    // multi-node self-capacitances already had their extra
                    // nodes merged onto node 0 by `resolve_node_targets`, so
                    // only one twin node is needed on the capacitance side.
                    let node = el.get_node(0).expect("capacitance has at least one node (setup-validated)");
                    let child_node = carry_resolved(&mut twin, subnet, &node_target, &mut materialized, node)?;
                    let child_el = twin.network.add_element(el.name().to_string(), el.domain().clone(), ElementKind::EffortSource);
                    twin.network.connect(child_el, child_node)?;
                    match ground {
                        Some(ground) => {
                            let child_ground = carry_resolved(&mut twin, subnet, &node_target, &mut materialized, ground)?;
                            twin.network.connect(child_el, child_ground)?;
                        }
                        None => {
                            // No origin anywhere in this subnet: synthesize a
                            // local ground purely so the capacitance's
                            // effort source has two ports.
                            let local_ground = twin.network.add_node(format!("{}_ground", el.name()), el.domain().clone());
                            twin.network.connect(child_el, local_ground)?;
                        }
                    }
                    if let Some(value) = el.effort_value() {
                        twin.network.element_mut(child_el)?.set_effort_value(value);
                    }
                    twin.set_element_origin(child_el, ElementOrigin::Direct(el.id()));
                    sources.push(child_el);
                }
                ElementKind::Dissipator | ElementKind::Open | ElementKind::Bridged | ElementKind::EffortSource | ElementKind::FlowSource => {
                    let nodes = el.nodes().to_vec();
                    let child_el = twin.network.add_element(el.name().to_string(), el.domain().clone(), el.kind());
                    for n in nodes {
                        let cn = carry_resolved(&mut twin, subnet, &node_target, &mut materialized, n)?;
                        twin.network.connect(child_el, cn)?;
                    }
                    if el.kind() == ElementKind::Dissipator {
                        if let Ok(g) = el.get_conductance() {
                            twin.network.element_mut(child_el)?.set_conductance_parameter(g)?;
                        }
                    }
                    if let Some(v) = el.effort_value() {
                        twin.network.element_mut(child_el)?.set_effort_value(v);
                    }
                    if let Some(v) = el.flow_value() {
                        twin.network.element_mut(child_el)?.set_flow_value(v);
                    }
                    twin.set_element_origin(child_el, ElementOrigin::Direct(el.id()));
                    if matches!(el.kind(), ElementKind::EffortSource | ElementKind::FlowSource) {
                        sources.push(child_el);
                    }
                }
            }
        }

        Ok(TransferSubnet { twin, sources })
    }

    /// Copies this tick's R/E/F parameter values from the subnet into the
    /// twin (spec §4.9 `prepare`). Topology never changes after `build`.
    pub fn prepare(&mut self, subnet: &Network) -> SolverResult<()> {
        let ids: Vec<ElementId> = self.twin.network.elements().iter().map(|e| e.id()).collect();
        for child_id in ids {
            let Some(ElementOrigin::Direct(parent_id)) = self.twin.element_origin(child_id) else {
                continue;
            };
            let parent = subnet.element(parent_id)?;
            let child = self.twin.network.element_mut(child_id)?;
            match parent.kind() {
                ElementKind::Dissipator => {
                    if let Ok(g) = parent.get_conductance() {
                        child.set_conductance_parameter(g)?;
                    }
                }
                ElementKind::Capacitance | ElementKind::Origin | ElementKind::EffortSource => {
                    if let Some(v) = parent.effort_value() {
                        child.set_effort_value(v);
                    }
                }
                ElementKind::FlowSource => {
                    if let Some(v) = parent.flow_value() {
                        child.set_flow_value(v);
                    }
                }
                ElementKind::Open | ElementKind::Bridged => {}
            }
        }
        Ok(())
    }

    /// Solves the twin by superposition and transfers flows/efforts back
    /// onto the subnet (spec §4.9 `doCalculation`).
    pub fn do_calculation(&mut self, subnet: &mut Network, tol: Tolerances) -> SolverResult<()> {
        solve_by_superposition(&mut self.twin.network, &self.sources, tol)?;

        let direct: Vec<(ElementId, ElementId)> = subnet
            .elements()
            .iter()
            .filter_map(|e| self.twin.element_for_origin_direct(e.id()).map(|c| (e.id(), c)))
            .collect();

        for (parent_id, child_id) in direct {
            let no_flow = subnet.element(parent_id)?.no_flow_transfer();
            let nodes = subnet.element(parent_id)?.nodes().to_vec();
            for n in nodes {
                let Some(cn) = self.twin.child_of_node(n) else { continue };
                if let Some(e) = self.twin.network.node(cn)?.get_effort() {
                    subnet.node_mut(n)?.set_effort(e, None, false, tol)?;
                }
                if !no_flow {
                    if let Some(f) = self.twin.network.node(cn)?.get_flow(child_id) {
                        subnet.node_mut(n)?.set_flow(f, parent_id, false, tol)?;
                    }
                }
            }
        }

        // Nodes still lacking effort/flow are back-filled from a reachable
        // neighbor by the ordinary propagation iterator (admittance and
        // bridged relays, KCL closure, and the open-element zero-flow
        // sweep already do exactly this; spec §4.9 describes the same
        // mechanics by hand, so C2 is reused rather than duplicated).
        propagation::propagate(subnet, tol)?;

        warn_unflowed_nodes(subnet);
        Ok(())
    }
}

fn warn_unflowed_nodes(subnet: &Network) {
    for node in subnet.nodes() {
        if node.number_of_elements() == 0 {
            continue;
        }
        let all_no_flow = node
            .elements()
            .iter()
            .all(|&e| subnet.element(e).map(|el| el.no_flow_transfer()).unwrap_or(true));
        if !node.all_flows_updated() && !all_no_flow {
            warn!(
                node = node.id().index(),
                "transfer subnet left a node's flow unresolved (spec §4.9)"
            );
        }
    }
}

/// Setup validation (spec §4.9): every registered node is used by at least
/// one registered element. Every two-port element having both nodes
/// registered is guaranteed by construction — `Element::register_node` only
/// ever runs through `Network::connect`, so a partially-connected element
/// cannot exist in a frozen `Network`; `NetworkBuilder::build` already
/// rejects that at spec §7.1. The remaining check — "if all elements
/// incident on a node are of resistor kind, all must be registered in the
/// subnet" — holds trivially for any subnet expressed as one closed
/// `Network`: there is no way to reference an element that is not a member
/// of the network it's looked up in.
fn validate_subnet(subnet: &Network) -> SolverResult<()> {
    for node in subnet.nodes() {
        if node.number_of_elements() == 0 {
            return Err(SolverError::transform_not_applicable(format!(
                "transfer subnet node {} is registered but incident to no element",
                node.id()
            )));
        }
    }
    Ok(())
}

fn resolve(map: &HashMap<NodeId, NodeId>, mut n: NodeId) -> NodeId {
    while let Some(&next) = map.get(&n) {
        if next == n {
            break;
        }
        n = next;
    }
    n
}

fn union(map: &mut HashMap<NodeId, NodeId>, from: NodeId, to: NodeId) {
    let from_rep = resolve(map, from);
    let to_rep = resolve(map, to);
    if from_rep != to_rep {
        map.insert(from_rep, to_rep);
    }
}

/// Computes, for every node in `subnet`, the representative node it
/// resolves to once self-capacitance node merges and same-effort origin
/// merges are applied (spec §4.9: "self-capacitances with multiple nodes
/// have their extra nodes merged to a canonical representative"; "additional
/// origins with the same effort are merged to the ground node").
fn resolve_node_targets(subnet: &Network) -> SolverResult<HashMap<NodeId, NodeId>> {
    let mut target: HashMap<NodeId, NodeId> = subnet.nodes().iter().map(|n| (n.id(), n.id())).collect();

    for el in subnet.elements() {
        if el.kind() == ElementKind::Capacitance && el.number_of_nodes() > 1 {
            let canon = el.nodes()[0];
            for &extra in &el.nodes()[1..] {
                union(&mut target, extra, canon);
            }
        }
    }

    let mut ground: Option<(NodeId, Option<Real>)> = None;
    for el in subnet.elements() {
        if el.kind() != ElementKind::Origin {
            continue;
        }
        let node = resolve(&target, el.get_node(0).expect("origin has one node"));
        match &ground {
            None => ground = Some((node, el.effort_value())),
            Some((ground_node, ground_value)) => {
                let agrees = matches!((el.effort_value(), ground_value), (Some(a), Some(b)) if (a - b).abs() < VALIDATION_TOLERANCE);
                if agrees {
                    union(&mut target, node, *ground_node);
                }
            }
        }
    }

    // Flatten every chain so lookups are O(1) (no further union-find probing
    // needed at use sites).
    let keys: Vec<NodeId> = target.keys().copied().collect();
    for k in keys {
        let r = resolve(&target, k);
        target.insert(k, r);
    }
    Ok(target)
}

/// Carries a raw subnet node into the twin via its resolved representative,
/// reusing the twin node already materialized for that representative.
fn carry_resolved(
    twin: &mut ChildNetwork,
    subnet: &Network,
    node_target: &HashMap<NodeId, NodeId>,
    materialized: &mut HashMap<NodeId, NodeId>,
    raw: NodeId,
) -> NetResult<NodeId> {
    let rep = node_target[&raw];
    if let Some(&child) = materialized.get(&rep) {
        twin.map_node(raw, child);
        return Ok(child);
    }
    let child = twin.carry_node(subnet, rep)?;
    materialized.insert(rep, child);
    twin.map_node(raw, child);
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use net_core::DomainTag;
    use net_graph::NetworkBuilder;

    fn build_basic_subnet() -> (Network, ElementId, ElementId, ElementId) {
        let mut b = NetworkBuilder::new();
        let gnd = b.add_node("gnd", DomainTag::Thermal);
        let n1 = b.add_node("n1", DomainTag::Thermal);
        let origin = b.add_element("origin", DomainTag::Thermal, ElementKind::Origin);
        let cap = b.add_element("cap", DomainTag::Thermal, ElementKind::Capacitance);
        let r = b.add_element("r", DomainTag::Thermal, ElementKind::Dissipator);
        b.connect(origin, gnd).unwrap();
        b.connect(cap, n1).unwrap();
        b.connect_between(r, gnd, n1).unwrap();
        let mut net = b.build().unwrap();
        net.element_mut(origin).unwrap().set_effort_value(0.0);
        net.element_mut(cap).unwrap().set_effort_value(300.0);
        net.element_mut(r).unwrap().set_resistance_parameter(2.0).unwrap();
        (net, origin, cap, r)
    }

    #[test]
    fn capacitance_twin_is_an_effort_source() {
        let (subnet, _origin, cap, _r) = build_basic_subnet();
        let transfer = TransferSubnet::build(&subnet).unwrap();
        let child_id = transfer.twin.element_for_origin_direct(cap).unwrap();
        assert_eq!(transfer.twin.network.element(child_id).unwrap().kind(), ElementKind::EffortSource);
    }

    #[test]
    fn round_trips_effort_and_flow_to_the_subnet() {
        let (mut subnet, _origin, _cap, r) = build_basic_subnet();
        let mut transfer = TransferSubnet::build(&subnet).unwrap();
        transfer.prepare(&subnet).unwrap();
        transfer.do_calculation(&mut subnet, Tolerances::default()).unwrap();

        let gnd = subnet.nodes().iter().find(|n| n.name() == "gnd").unwrap().id();
        let n1 = subnet.nodes().iter().find(|n| n.name() == "n1").unwrap().id();
        assert!((subnet.node(n1).unwrap().get_effort().unwrap() - 300.0).abs() < 1e-6);
        assert!((subnet.node(gnd).unwrap().get_effort().unwrap() - 0.0).abs() < 1e-6);
        let flow = subnet.node(gnd).unwrap().get_flow(r).unwrap();
        assert!((flow - -150.0).abs() < 1e-6, "flow={flow}");
    }

    #[test]
    fn multi_node_self_capacitance_nodes_merge_to_one_twin_node() {
        let mut b = NetworkBuilder::new();
        let a = b.add_node("a", DomainTag::Thermal);
        let c = b.add_node("c", DomainTag::Thermal);
        let cap = b.add_element("cap", DomainTag::Thermal, ElementKind::Capacitance);
        b.connect(cap, a).unwrap();
        b.connect(cap, c).unwrap();
        let mut net = b.build().unwrap();
        net.element_mut(cap).unwrap().set_effort_value(310.0);

        let transfer = TransferSubnet::build(&net).unwrap();
        let child_id = transfer.twin.element_for_origin_direct(cap).unwrap();
        let child_a = transfer.twin.child_of_node(a).unwrap();
        let child_c = transfer.twin.child_of_node(c).unwrap();
        assert_eq!(child_a, child_c);
        assert_eq!(transfer.twin.network.element(child_id).unwrap().number_of_nodes(), 2);
    }

    #[test]
    fn extra_origin_with_different_effort_becomes_an_effort_source() {
        let mut b = NetworkBuilder::new();
        let gnd = b.add_node("gnd", DomainTag::Electrical);
        let other = b.add_node("other", DomainTag::Electrical);
        let origin1 = b.add_element("origin1", DomainTag::Electrical, ElementKind::Origin);
        let origin2 = b.add_element("origin2", DomainTag::Electrical, ElementKind::Origin);
        let r = b.add_element("r", DomainTag::Electrical, ElementKind::Dissipator);
        b.connect(origin1, gnd).unwrap();
        b.connect(origin2, other).unwrap();
        b.connect_between(r, gnd, other).unwrap();
        let mut net = b.build().unwrap();
        net.element_mut(origin1).unwrap().set_effort_value(0.0);
        net.element_mut(origin2).unwrap().set_effort_value(5.0);
        net.element_mut(r).unwrap().set_resistance_parameter(1.0).unwrap();

        let transfer = TransferSubnet::build(&net).unwrap();
        let child_id = transfer.twin.element_for_origin_direct(origin2).unwrap();
        assert_eq!(transfer.twin.network.element(child_id).unwrap().kind(), ElementKind::EffortSource);
        assert!(transfer.sources.contains(&child_id));
    }

    #[test]
    fn extra_origin_with_agreeing_effort_merges_without_a_new_element() {
        let mut b = NetworkBuilder::new();
        let gnd = b.add_node("gnd", DomainTag::Electrical);
        let other = b.add_node("other", DomainTag::Electrical);
        let origin1 = b.add_element("origin1", DomainTag::Electrical, ElementKind::Origin);
        let origin2 = b.add_element("origin2", DomainTag::Electrical, ElementKind::Origin);
        let r = b.add_element("r", DomainTag::Electrical, ElementKind::Dissipator);
        b.connect(origin1, gnd).unwrap();
        b.connect(origin2, other).unwrap();
        b.connect_between(r, gnd, other).unwrap();
        let mut net = b.build().unwrap();
        net.element_mut(origin1).unwrap().set_effort_value(0.0);
        net.element_mut(origin2).unwrap().set_effort_value(0.0);
        net.element_mut(r).unwrap().set_resistance_parameter(1.0).unwrap();

        let transfer = TransferSubnet::build(&net).unwrap();
        assert!(transfer.twin.element_for_origin_direct(origin2).is_none());
        let child_gnd = transfer.twin.child_of_node(gnd).unwrap();
        let child_other = transfer.twin.child_of_node(other).unwrap();
        assert_eq!(child_gnd, child_other);
    }

    #[test]
    fn unused_node_fails_validation() {
        let mut b = NetworkBuilder::new();
        b.add_node("stray", DomainTag::Electrical);
        let net = b.build().unwrap();
        assert!(TransferSubnet::build(&net).is_err());
    }
}
