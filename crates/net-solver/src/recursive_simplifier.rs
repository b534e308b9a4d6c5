//! Recursive Simplifier (C6, spec §4.6): layered reduction of a
//! single-source network down to a terminal residual, solved by the small-
//! case solvers or the propagation iterator.

use std::collections::HashSet;

use net_core::{ElementId, NodeId, Tolerances};
use net_graph::{ElementKind, Network};
use tracing::{info, warn};

use crate::child_network::{ChildNetwork, ElementOrigin};
use crate::config::{RECURSION_DEPTH_CAP, TERMINAL_SIZE_WARNING_THRESHOLD};
use crate::error::{SolverError, SolverResult};
use crate::simplified_resistor::SimplifiedResistor;
use crate::small_case::solve_terminal;
use crate::transform::{star_delta, star_square, TransformRecord};

/// One reduction step applied while building a layer (spec §4.6 step
/// priority order).
enum Step {
    DeadEnds(Vec<(NodeId, ElementId)>),
    Fusions(Vec<SimplifiedResistor>),
    Transform(Vec<(TransformRecord, Vec<crate::transform::PolygonEdge>)>),
    None,
}

/// Orchestrates the layered reduction of a single-source network (spec
/// §4.6). Holds the full chain of networks from the root down to the
/// terminal residual, each with its own `ChildNetwork` maps back to its
/// immediate parent.
pub struct RecursiveSimplifier {
    root: Network,
    layers: Vec<ChildNetwork>,
}

impl RecursiveSimplifier {
    /// Builds the full layered chain for `root` down to a terminal residual
    /// (spec §4.6: "repeatedly produce a strictly simpler child network
    /// until the terminal is reached"). Recursion depth is capped at 1000
    /// (spec §4.6, §7.2: endless recursion is a model error).
    pub fn build(root: Network, tol: Tolerances) -> SolverResult<Self> {
        let mut simplifier = RecursiveSimplifier { root, layers: Vec::new() };
        let mut depth = 0;
        loop {
            if depth >= RECURSION_DEPTH_CAP {
                return Err(SolverError::IterationCapExceeded {
                    what: "recursive simplifier",
                    cap: RECURSION_DEPTH_CAP,
                });
            }
            let step = classify_step(simplifier.deepest_network())?;
            match step {
                Step::None => break,
                step => {
                    let child = apply_step(simplifier.deepest_network_mut(), step, tol)?;
                    simplifier.layers.push(child);
                }
            }
            depth += 1;
        }

        let terminal_size = simplifier.deepest_network().element_count();
        if terminal_size <= TERMINAL_SIZE_WARNING_THRESHOLD {
            info!(size = terminal_size, "recursive simplifier reached terminal layer");
        } else {
            warn!(
                size = terminal_size,
                "recursive simplifier terminal layer larger than expected (spec §4.6)"
            );
        }
        Ok(simplifier)
    }

    pub fn root(&self) -> &Network {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Network {
        &mut self.root
    }

    fn deepest_network(&self) -> &Network {
        self.layers.last().map(|l| &l.network).unwrap_or(&self.root)
    }

    fn deepest_network_mut(&mut self) -> &mut Network {
        match self.layers.last_mut() {
            Some(l) => &mut l.network,
            None => &mut self.root,
        }
    }

    /// Top-down pass: recomputes every fused/transform resistance starting
    /// at the root and pushing down to the terminal (spec §4.6
    /// `prepareRecursiveCalculation`).
    pub fn prepare(&mut self) -> SolverResult<()> {
        for i in 0..self.layers.len() {
            let (parent, child) = if i == 0 {
                (&self.root, &mut self.layers[0])
            } else {
                let (left, right) = self.layers.split_at_mut(i);
                (&left[i - 1].network, &mut right[0])
            };
            recompute_child(parent, child)?;
        }
        Ok(())
    }

    /// Bottom-up pass: solves the terminal residual, then back-transforms
    /// through each layer up to the root (spec §4.6
    /// `doRecursiveCalculation`).
    pub fn solve(&mut self, tol: Tolerances) -> SolverResult<()> {
        crate::propagation::do_calculation_on_enforcer_elements(self.deepest_network_mut(), tol)?;
        solve_terminal(self.deepest_network_mut(), tol)?;

        for i in (0..self.layers.len()).rev() {
            let (parent, child) = if i == 0 {
                (&mut self.root, &self.layers[0])
            } else {
                let (left, right) = self.layers.split_at_mut(i);
                (&mut left[i - 1].network, &right[0])
            };
            back_transform_layer(parent, child, tol)?;
            crate::propagation::propagate(parent, tol)?;
        }
        Ok(())
    }
}

/// Decides which simplification class applies next, in priority order (spec
/// §4.6: dead-end removal, parallel/series fusion, star-Δ, star-square,
/// generalized Y-N).
fn classify_step(network: &Network) -> SolverResult<Step> {
    let dead_ends = find_dead_ends(network)?;
    if !dead_ends.is_empty() {
        return Ok(Step::DeadEnds(dead_ends));
    }

    let fusions = find_fusions(network)?;
    if !fusions.is_empty() {
        return Ok(Step::Fusions(fusions));
    }

    let mut transforms = Vec::new();
    for node in network.nodes() {
        if let Some((record, edges)) = star_delta(network, node.id())? {
            transforms.push((record, edges));
        }
    }
    if !transforms.is_empty() {
        return Ok(Step::Transform(transforms));
    }

    for node in network.nodes() {
        if let Some((record, edges)) = star_square(network, node.id())? {
            transforms.push((record, edges));
        }
    }
    if !transforms.is_empty() {
        return Ok(Step::Transform(transforms));
    }

    for node in network.nodes() {
        let degree = node.number_of_elements();
        if degree >= 5 {
            if let Some((record, edges)) = crate::transform::star_polygon(network, node.id(), degree)? {
                transforms.push((record, edges));
            }
        }
    }
    if !transforms.is_empty() {
        return Ok(Step::Transform(transforms));
    }

    Ok(Step::None)
}

/// Any dissipator-family element incident to a degree-1 node: nothing else
/// balances flow at that node, so its flow must be zero and it can be cut
/// (spec §4.6 step 1).
fn find_dead_ends(network: &Network) -> SolverResult<Vec<(NodeId, ElementId)>> {
    let mut dead = Vec::new();
    for node in network.nodes() {
        if node.number_of_elements() != 1 {
            continue;
        }
        let eid = node.elements()[0];
        let el = network.element(eid)?;
        if el.kind().is_dissipator_family() {
            dead.push((node.id(), eid));
        }
    }
    Ok(dead)
}

/// Finds every parallel pair (two dissipator-family elements sharing both
/// endpoints) and every series chain through a degree-2, non-enforcer node
/// (spec §4.6 step 2: "at least one fusion must succeed").
fn find_fusions(network: &Network) -> SolverResult<Vec<SimplifiedResistor>> {
    let mut fusions = Vec::new();
    let mut used: HashSet<ElementId> = HashSet::new();

    // Parallel: any two dissipator-family elements sharing the same
    // unordered endpoint pair.
    let elements: Vec<ElementId> = network.elements().iter().map(|e| e.id()).collect();
    for i in 0..elements.len() {
        let a = elements[i];
        if used.contains(&a) || !network.element(a)?.kind().is_dissipator_family() {
            continue;
        }
        let a_nodes = network.element(a)?.nodes().to_vec();
        if a_nodes.len() != 2 {
            continue;
        }
        let mut group = vec![a];
        for &b in &elements[(i + 1)..] {
            if used.contains(&b) || !network.element(b)?.kind().is_dissipator_family() {
                continue;
            }
            let b_nodes = network.element(b)?.nodes().to_vec();
            if same_pair(&a_nodes, &b_nodes) {
                group.push(b);
            }
        }
        if group.len() > 1 {
            for &id in &group {
                used.insert(id);
            }
            fusions.push(SimplifiedResistor::parallel(group, (a_nodes[0], a_nodes[1])));
        }
    }

    // Series: any degree-2 node whose two incident elements are both
    // dissipator-family, unused by a parallel fusion above, and the node
    // itself carries no enforcer.
    for node in network.nodes() {
        if node.number_of_elements() != 2 {
            continue;
        }
        let els = node.elements();
        let (ea, eb) = (els[0], els[1]);
        if used.contains(&ea) || used.contains(&eb) {
            continue;
        }
        if !network.element(ea)?.kind().is_dissipator_family() || !network.element(eb)?.kind().is_dissipator_family() {
            continue;
        }
        let far_a = network.only_other_node(ea, node.id())?;
        let far_b = network.only_other_node(eb, node.id())?;
        used.insert(ea);
        used.insert(eb);
        let a_nodes = network.element(ea)?.nodes().to_vec();
        let reverse_a = a_nodes[0] != far_a; // traversal direction far_a -> node
        let b_nodes = network.element(eb)?.nodes().to_vec();
        let reverse_b = b_nodes[0] != node.id();
        fusions.push(SimplifiedResistor::series(
            vec![ea, eb],
            vec![reverse_a, reverse_b],
            vec![node.id()],
            (far_a, far_b),
        ));
    }

    Ok(fusions)
}

fn same_pair(a: &[NodeId], b: &[NodeId]) -> bool {
    a.len() == 2 && b.len() == 2 && ((a[0] == b[0] && a[1] == b[1]) || (a[0] == b[1] && a[1] == b[0]))
}

fn apply_step(parent: &mut Network, step: Step, tol: Tolerances) -> SolverResult<ChildNetwork> {
    let mut child = ChildNetwork::new();
    let consumed = consumed_elements(&step);

    match step {
        Step::DeadEnds(dead_ends) => {
            // The dead-end element's flow is forced to zero at both of its
            // endpoints: nothing else at the degree-1 node can balance it,
            // and it is excised from the child entirely (spec §4.6 step 1).
            for &(node_id, eid) in &dead_ends {
                let far = parent.only_other_node(eid, node_id)?;
                parent.node_mut(node_id)?.set_flow(0.0, eid, false, tol)?;
                parent.node_mut(far)?.set_flow(0.0, eid, false, tol)?;
            }
            let ids: Vec<ElementId> = parent.elements().iter().map(|e| e.id()).collect();
            for id in ids {
                if consumed.contains(&id) {
                    continue;
                }
                child.carry_element(parent, id)?;
            }
        }
        Step::Fusions(fusions) => {
            for el in parent.elements() {
                if consumed.contains(&el.id()) {
                    continue;
                }
                child.carry_element(parent, el.id())?;
            }
            for (idx, fusion) in fusions.iter().enumerate() {
                let (kind, g) = fusion.prepare(parent)?;
                let name = format!("fused{idx}");
                let a = child.carry_node(parent, fusion.endpoints.0)?;
                let b = child.carry_node(parent, fusion.endpoints.1)?;
                let domain = parent.node(fusion.endpoints.0)?.domain().clone();
                let child_el = child.network.add_element(name, domain, kind);
                if kind == ElementKind::Dissipator {
                    child.network.element_mut(child_el)?.set_conductance_parameter(g.unwrap())?;
                }
                child.network.connect_between(child_el, a, b)?;
                child.set_element_origin(child_el, ElementOrigin::Fused(idx));
            }
            store_fusions(&mut child, fusions);
        }
        Step::Transform(transforms) => {
            for el in parent.elements() {
                if consumed.contains(&el.id()) {
                    continue;
                }
                child.carry_element(parent, el.id())?;
            }
            for (t_idx, (record, edges)) in transforms.iter().enumerate() {
                let domain = parent.node(record.star_node)?.domain().clone();
                let mut outer_children = Vec::with_capacity(record.degree());
                for &outer in &record.outer_nodes {
                    outer_children.push(child.carry_node(parent, outer)?);
                }
                let k = record.degree();
                for i in 0..k {
                    for j in (i + 1)..k {
                        let edge = edges[record.pair_index(i, j)];
                        let kind = match edge {
                            crate::transform::PolygonEdge::Open => ElementKind::Open,
                            crate::transform::PolygonEdge::Bridged => ElementKind::Bridged,
                            crate::transform::PolygonEdge::Conductance(_) => ElementKind::Dissipator,
                        };
                        let name = format!("poly{t_idx}_{i}_{j}");
                        let eid = child.network.add_element(name, domain.clone(), kind);
                        if let crate::transform::PolygonEdge::Conductance(g) = edge {
                            child.network.element_mut(eid)?.set_conductance_parameter(g)?;
                        }
                        child.network.connect_between(eid, outer_children[i], outer_children[j])?;
                        child.set_element_origin(eid, ElementOrigin::TransformEdge { transform: t_idx, i, j });
                    }
                }
            }
            store_transforms(&mut child, transforms);
        }
        Step::None => unreachable!("apply_step called with Step::None"),
    }
    Ok(child)
}

fn consumed_elements(step: &Step) -> HashSet<ElementId> {
    let mut set = HashSet::new();
    match step {
        Step::DeadEnds(dead_ends) => {
            for &(_, eid) in dead_ends {
                set.insert(eid);
            }
        }
        Step::Fusions(fusions) => {
            for f in fusions {
                for &id in &f.parents {
                    set.insert(id);
                }
            }
        }
        Step::Transform(transforms) => {
            for (record, _) in transforms {
                for &b in &record.branches {
                    set.insert(b);
                }
            }
        }
        Step::None => {}
    }
    set
}

// Side-storage for the fusion/transform metadata produced by `apply_step`,
// retrieved by `recompute_child`/`back_transform_layer`. Kept on the
// `ChildNetwork` via its `element_origin` index plus these parallel lists.
fn store_fusions(child: &mut ChildNetwork, fusions: Vec<SimplifiedResistor>) {
    child.fusions = fusions;
}

fn store_transforms(child: &mut ChildNetwork, transforms: Vec<(TransformRecord, Vec<crate::transform::PolygonEdge>)>) {
    child.transforms = transforms.into_iter().map(|(r, _)| r).collect();
}

fn recompute_child(parent: &Network, child: &mut ChildNetwork) -> SolverResult<()> {
    for (idx, fusion) in child.fusions.clone().iter().enumerate() {
        let (kind, g) = fusion.prepare(parent)?;
        if let Some(eid) = child.element_for_origin(ElementOrigin::Fused(idx)) {
            child.network.element_mut(eid)?.set_kind_for_recomputation(kind);
            if kind == ElementKind::Dissipator {
                child.network.element_mut(eid)?.set_conductance_parameter(g.unwrap())?;
            }
        }
    }
    for (t_idx, record) in child.transforms.clone().iter().enumerate() {
        let edges = record.recompute(parent)?;
        let k = record.degree();
        for i in 0..k {
            for j in (i + 1)..k {
                if let Some(eid) = child.element_for_origin(ElementOrigin::TransformEdge { transform: t_idx, i, j }) {
                    let edge = edges[record.pair_index(i, j)];
                    let kind = match edge {
                        crate::transform::PolygonEdge::Open => ElementKind::Open,
                        crate::transform::PolygonEdge::Bridged => ElementKind::Bridged,
                        crate::transform::PolygonEdge::Conductance(_) => ElementKind::Dissipator,
                    };
                    child.network.element_mut(eid)?.set_kind_for_recomputation(kind);
                    if let crate::transform::PolygonEdge::Conductance(g) = edge {
                        child.network.element_mut(eid)?.set_conductance_parameter(g)?;
                    }
                }
            }
        }
    }
    // Also carry fresh parameter values for directly-carried elements
    // (non-fused, non-transform dissipators may have changed R/G this tick).
    for el in parent.elements() {
        if let Some(child_id) = child.element_for_origin_direct(el.id()) {
            if el.kind() == ElementKind::Dissipator {
                if let Ok(g) = el.get_conductance() {
                    child.network.element_mut(child_id)?.set_conductance_parameter(g)?;
                }
            }
        }
    }
    Ok(())
}

fn back_transform_layer(parent: &mut Network, child: &ChildNetwork, tol: Tolerances) -> SolverResult<()> {
    // Direct carries: relay effort/flow straight back.
    for el in parent.elements().to_vec().iter().map(|e| e.id()) {
        if let Some(child_id) = child.element_for_origin_direct(el) {
            let nodes = parent.element(el)?.nodes().to_vec();
            for n in &nodes {
                if let Some(cn) = child.child_of_node(*n) {
                    if let Some(e) = child.network.node(cn)?.get_effort() {
                        parent.node_mut(*n)?.set_effort(e, None, false, tol)?;
                    }
                    if let Some(f) = child.network.node(cn)?.get_flow(child_id) {
                        parent.node_mut(*n)?.set_flow(f, el, false, tol)?;
                    }
                }
            }
        }
    }

    for (idx, fusion) in child.fusions.iter().enumerate() {
        let Some(eid) = child.element_for_origin(ElementOrigin::Fused(idx)) else { continue };
        let a = child.child_of_node(fusion.endpoints.0);
        let b = child.child_of_node(fusion.endpoints.1);
        let (Some(a), Some(b)) = (a, b) else { continue };
        let ea = child.network.node(a)?.get_effort();
        let eb = child.network.node(b)?.get_effort();
        let flow = child.network.node(a)?.get_flow(eid);
        if let (Some(ea), Some(eb)) = (ea, eb) {
            fusion.do_calculation(parent, (ea, eb), flow.unwrap_or(0.0), tol)?;
        }
    }

    for record in &child.transforms {
        record.back_transform(parent, tol)?;
    }
    Ok(())
}
