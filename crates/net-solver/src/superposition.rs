//! Superposition Driver (C8, spec §4.8): combines the per-source overlays
//! (C7) of a linear subnet into one answer.

use std::collections::HashMap;

use net_core::{ElementId, NodeId, Real, Tolerances};
use net_graph::Network;
use rayon::prelude::*;
use tracing::warn;

use crate::error::SolverResult;
use crate::overlay::Overlay;
use crate::pool::WorkerPool;
use crate::propagation;

/// One source's contribution once its overlay has been solved.
struct LayerResult {
    /// Per-dissipator-family-element signed flow at that element's node 0,
    /// keyed by the base network's element id (spec §4.8 step 4).
    flows: Vec<(ElementId, Real)>,
    /// Per-node effort this layer determined, keyed by the base network's
    /// node id.
    efforts: Vec<(NodeId, Real)>,
}

/// Solves `base` — a fully linear subnet — by superposition over every
/// source element in `sources` (spec §4.8). `base` must already carry this
/// tick's R/E/F parameter values (spec §4.8 step 1, performed by the
/// caller — the transfer translator or decomposer — before this runs).
pub fn solve_by_superposition(base: &mut Network, sources: &[ElementId], tol: Tolerances) -> SolverResult<()> {
    // Step 2: a source whose value is literally 0.0 contributes nothing.
    let active: Vec<ElementId> = sources
        .iter()
        .copied()
        .filter(|&id| is_nonzero_source(base, id))
        .collect();

    // Step 3: pool-if-present else sequential.
    let layers: Vec<LayerResult> = match WorkerPool::global() {
        Some(pool) => pool.install(|| {
            active
                .par_iter()
                .map(|&id| solve_layer(base, sources, id, tol))
                .collect::<SolverResult<Vec<_>>>()
        })?,
        None => active
            .iter()
            .map(|&id| solve_layer(base, sources, id, tol))
            .collect::<SolverResult<Vec<_>>>()?,
    };

    // Step 4: flows sum exactly by the superposition theorem, so they're
    // safe to seed before the final sweep — admittance/KCL closure only
    // fill in a flow that's still `None`, never second-guess one already
    // present. Efforts are NOT seeded here: a layer's per-source effort is
    // only a real answer in that layer's degenerate network, and writing it
    // into `base` ahead of the final sweep would race the true value the
    // real sources/origins are about to derive for the same node.
    apply_flow_sums(base, &layers, tol)?;

    // Step 5: final propagation sweep restores the full node/element state.
    propagation::propagate(base, tol)?;

    // Step 4 cont'd: only now, for nodes the real network still can't pin
    // down, fall back to the cross-layer effort average (spec §4.8 step 4:
    // "a post-hoc pseudo-solution for floating nodes").
    apply_leftover_effort_averages(base, &layers, tol)?;
    check_kcl(base, tol);
    Ok(())
}

fn is_nonzero_source(base: &Network, id: ElementId) -> bool {
    match base.element(id) {
        Ok(el) => el.effort_value().or(el.flow_value()).map(|v| v != 0.0).unwrap_or(true),
        Err(_) => false,
    }
}

fn solve_layer(base: &Network, sources: &[ElementId], sole_source: ElementId, tol: Tolerances) -> SolverResult<LayerResult> {
    let overlay = Overlay::build(base, sources, sole_source)?;
    if overlay.degenerate {
        // spec §4.7: "layer contribution is identically zero" — every
        // dissipator-family element in this layer carries no flow at all.
        let flows = base
            .elements()
            .iter()
            .filter(|e| e.kind().is_dissipator_family())
            .map(|e| (e.id(), 0.0))
            .collect();
        return Ok(LayerResult { flows, efforts: Vec::new() });
    }

    let mut simplifier = overlay.into_simplifier(tol)?;
    simplifier.prepare()?;
    simplifier.solve(tol)?;

    let solved = simplifier.root();
    let flows = solved
        .elements()
        .iter()
        .filter(|e| e.kind().is_dissipator_family())
        .filter_map(|e| {
            let node0 = *e.nodes().first()?;
            solved.node(node0).ok()?.get_flow(e.id()).map(|f| (e.id(), f))
        })
        .collect();
    let efforts = solved
        .nodes()
        .iter()
        .filter_map(|n| n.get_effort().map(|e| (n.id(), e)))
        .collect();
    Ok(LayerResult { flows, efforts })
}

fn apply_flow_sums(base: &mut Network, layers: &[LayerResult], tol: Tolerances) -> SolverResult<()> {
    let mut flow_sums: HashMap<ElementId, Real> = HashMap::new();
    for layer in layers {
        for &(eid, f) in &layer.flows {
            *flow_sums.entry(eid).or_insert(0.0) += f;
        }
    }

    for el in base.elements().to_vec() {
        if let Some(&flow) = flow_sums.get(&el.id()) {
            let nodes = el.nodes();
            if nodes.len() == 2 {
                let (n0, n1) = (nodes[0], nodes[1]);
                base.node_mut(n0)?.set_flow(flow, el.id(), false, tol)?;
                base.node_mut(n1)?.set_flow(-flow, el.id(), false, tol)?;
            }
        }
    }
    Ok(())
}

fn apply_leftover_effort_averages(base: &mut Network, layers: &[LayerResult], tol: Tolerances) -> SolverResult<()> {
    let mut effort_sums: HashMap<NodeId, (Real, usize)> = HashMap::new();
    for layer in layers {
        for &(nid, e) in &layer.efforts {
            let entry = effort_sums.entry(nid).or_insert((0.0, 0));
            entry.0 += e;
            entry.1 += 1;
        }
    }

    for node in base.nodes().to_vec() {
        if node.get_effort().is_some() {
            continue;
        }
        if let Some(&(sum, count)) = effort_sums.get(&node.id()) {
            // spec §4.8 step 4: a post-hoc pseudo-solution for nodes left
            // floating even by the real sources/origins.
            base.node_mut(node.id())?.set_effort(sum / count as Real, None, false, tol)?;
        }
    }
    Ok(())
}

fn check_kcl(network: &Network, tol: Tolerances) {
    for node in network.nodes() {
        if !node.all_flows_updated() || node.number_of_elements() == 0 {
            continue;
        }
        let sum: Real = node.elements().iter().filter_map(|&e| node.get_flow(e)).sum();
        if sum.abs() > tol.abs {
            warn!(
                node = node.id().index(),
                sum, "superposition KCL sanity check exceeded tolerance (spec §4.8)"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use net_core::DomainTag;
    use net_graph::{ElementKind, NetworkBuilder};

    fn two_source_bridge() -> (Network, Vec<ElementId>) {
        // Two effort sources across a shared resistor bridge, both rooted
        // at a common origin so every node effort is determinable.
        let mut b = NetworkBuilder::new();
        let gnd = b.add_node("gnd", DomainTag::Electrical);
        let a = b.add_node("a", DomainTag::Electrical);
        let c = b.add_node("c", DomainTag::Electrical);
        let origin = b.add_element("origin", DomainTag::Electrical, ElementKind::Origin);
        let src_a = b.add_element("src_a", DomainTag::Electrical, ElementKind::EffortSource);
        let src_c = b.add_element("src_c", DomainTag::Electrical, ElementKind::EffortSource);
        let bridge = b.add_element("bridge", DomainTag::Electrical, ElementKind::Dissipator);
        b.connect(origin, gnd).unwrap();
        b.connect_between(src_a, gnd, a).unwrap();
        b.connect_between(src_c, gnd, c).unwrap();
        b.connect_between(bridge, a, c).unwrap();
        let mut net = b.build().unwrap();
        net.element_mut(origin).unwrap().set_effort_value(0.0);
        net.element_mut(src_a).unwrap().set_effort_value(10.0);
        net.element_mut(src_c).unwrap().set_effort_value(4.0);
        net.element_mut(bridge).unwrap().set_resistance_parameter(2.0).unwrap();
        (net, vec![src_a, src_c])
    }

    #[test]
    fn superposition_solves_bridge_flow() {
        let (mut net, sources) = two_source_bridge();
        solve_by_superposition(&mut net, &sources, Tolerances::default()).unwrap();
        let bridge = net.elements().iter().find(|e| e.name() == "bridge").unwrap().id();
        let a_node = net.nodes().iter().find(|n| n.name() == "a").unwrap().id();
        let i = net.node(a_node).unwrap().get_flow(bridge).unwrap();
        // do_calculation_effort_source's convention sets node1 = node0 -
        // value; gnd is node0 for both sources, so V_a = -10, V_c = -4,
        // V_a - V_c = -6, R = 2 -> I = -3 out of a into the bridge.
        assert!((i - -3.0).abs() < 1e-6, "i={i}");
        // Final sweep re-derives the bridge flow from the real (non-overlay)
        // network's own efforts, not just the superposition sum — this is
        // the case the sum-before-sweep ordering bug would have corrupted:
        // node a's true effort (-10) conflicts with no overlay's averaged
        // effort because averages are only a fallback for nodes the real
        // sweep leaves undetermined.
        assert!((net.node(a_node).unwrap().get_effort().unwrap() - -10.0).abs() < 1e-6);
    }

    #[test]
    fn zero_valued_source_is_skipped() {
        let (mut net, sources) = two_source_bridge();
        net.element_mut(sources[1]).unwrap().set_effort_value(0.0);
        solve_by_superposition(&mut net, &sources, Tolerances::default()).unwrap();
        let bridge = net.elements().iter().find(|e| e.name() == "bridge").unwrap().id();
        let a_node = net.nodes().iter().find(|n| n.name() == "a").unwrap().id();
        let i = net.node(a_node).unwrap().get_flow(bridge).unwrap();
        assert!((i - -5.0).abs() < 1e-6, "i={i}");
    }
}
