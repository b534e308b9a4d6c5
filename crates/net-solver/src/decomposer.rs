//! Domain Analogy Decomposer (C10, spec §4.10): partitions a (possibly
//! multi-domain) graph into self-solving resistors, linear subnets bound to
//! a solver kind, and a single whole-graph propagation sweep.
//!
//! Grounded on `Overlay::lies_on_closed_loop`'s BFS shape for graph traversal
//! and on `ChildNetwork` for the parent↔subnet index maps (spec §3), used
//! here one layer up from the recursive simplifier: each discovered subnet
//! *is* a child network of the whole graph, carried unchanged rather than
//! fused or transformed.

use std::collections::{HashSet, VecDeque};

use net_core::{ElementId, NodeId, Tolerances};
use net_graph::{ElementKind, Network};

use crate::child_network::{ChildNetwork, ElementOrigin};
use crate::error::{SolverError, SolverResult};
use crate::propagation;
use crate::superposition::solve_by_superposition;
use crate::transfer::TransferSubnet;

/// How a partitioned subnet is bound to a solver this tick (spec §4.10).
enum SubnetBinding {
    SuperPosition,
    Transfer(TransferSubnet),
    /// Plain iterative propagation; reachable only for subnets containing an
    /// element whose `is_linear()` reports false. No element kind this core
    /// defines does — that branch exists for physics elements outside this
    /// workspace's scope (spec §1 Non-goals).
    SimpleIterator,
}

struct PartitionedSubnet {
    child: ChildNetwork,
    binding: SubnetBinding,
    /// Child-space `EffortSource`/`FlowSource` ids for the `SuperPosition`
    /// binding (unused by the other two bindings).
    sources: Vec<ElementId>,
}

/// The result of decomposing a graph from one seed node (spec §4.10).
pub struct Decomposition {
    effort_forced: HashSet<NodeId>,
    self_solving: Vec<ElementId>,
    subnets: Vec<PartitionedSubnet>,
    no_flow_transfer: Vec<ElementId>,
}

impl Decomposition {
    /// Nodes classified as effort-forced (incident to an `Origin` or
    /// `Capacitance`) — the boundary subnets were partitioned against.
    pub fn effort_forced_nodes(&self) -> &HashSet<NodeId> {
        &self.effort_forced
    }

    /// Elements tagged `no_flow_transfer` by expansion-path tracing (spec
    /// §4.10): their flow is left for the whole-graph last-iterator sweep
    /// to derive, rather than being copied back from a subnet solve.
    pub fn no_flow_transfer_elements(&self) -> &[ElementId] {
        &self.no_flow_transfer
    }

    /// Builds the decomposition starting a BFS from `seed` (spec §4.10:
    /// "performs a deque-driven BFS over the reachable graph, following
    /// `coupled_element` links across domain boundaries"). `expansion_elements`
    /// names the elements an external physics library has identified as
    /// injecting exogenous flow (the core's own kind lattice has no such
    /// concept — see DESIGN.md).
    pub fn build(network: &mut Network, seed: NodeId, expansion_elements: &[ElementId]) -> SolverResult<Self> {
        let (reachable_nodes, reachable_elements) = bfs_reachable(network, seed)?;
        let effort_forced = classify_effort_forced(network, &reachable_nodes)?;
        let self_solving = find_self_solving(network, &reachable_elements, &effort_forced)?;

        let mut excluded: HashSet<ElementId> = self_solving.iter().copied().collect();
        for &n in &reachable_nodes {
            for &e in network.node(n)?.elements() {
                if network.element(e)?.kind() == ElementKind::Origin {
                    excluded.insert(e);
                }
            }
        }

        let mut no_flow_transfer = Vec::new();
        for &exp in expansion_elements {
            if !reachable_elements.contains(&exp) {
                continue;
            }
            no_flow_transfer.extend(trace_path_to_capacitance(network, exp)?);
        }
        for &eid in &no_flow_transfer {
            network.element_mut(eid)?.set_no_flow_transfer(true);
        }

        let raw_subnets = partition_subnets(network, &reachable_nodes, &reachable_elements, &effort_forced, &excluded)?;

        let mut subnets = Vec::new();
        for raw in raw_subnets {
            subnets.push(build_subnet(network, &raw)?);
        }

        Ok(Decomposition {
            effort_forced,
            self_solving,
            subnets,
            no_flow_transfer,
        })
    }

    /// Refreshes this tick's R/E/F parameter values into every subnet
    /// (spec §4.10 prepare order: lastIterator → self-solving →
    /// transfer-subnets → superpositions → nonlinear nets; self-solving and
    /// the final iterator have no per-tick state of their own to prepare, so
    /// only the subnet value refresh is meaningful work here).
    pub fn prepare(&mut self, global: &Network) -> SolverResult<()> {
        for subnet in &mut self.subnets {
            refresh_child_values(global, &mut subnet.child)?;
            if let SubnetBinding::Transfer(transfer) = &mut subnet.binding {
                transfer.prepare(&subnet.child.network)?;
            }
        }
        Ok(())
    }

    /// Solves the tick in the order spec §4.10 names: transfer-subnets →
    /// enforcers → self-solving → superpositions → nonlinear nets → last
    /// iterator.
    pub fn solve(&mut self, global: &mut Network, tol: Tolerances) -> SolverResult<()> {
        for subnet in &mut self.subnets {
            if let SubnetBinding::Transfer(transfer) = &mut subnet.binding {
                transfer.do_calculation(&mut subnet.child.network, tol)?;
            }
        }

        propagation::do_calculation_on_enforcer_elements(global, tol)?;

        for &eid in &self.self_solving {
            solve_self_solving(global, eid, tol)?;
        }

        for subnet in &mut self.subnets {
            if let SubnetBinding::SuperPosition = subnet.binding {
                solve_by_superposition(&mut subnet.child.network, &subnet.sources, tol)?;
            }
        }

        for subnet in &mut self.subnets {
            if let SubnetBinding::SimpleIterator = subnet.binding {
                propagation::propagate(&mut subnet.child.network, tol)?;
            }
        }

        for subnet in &self.subnets {
            copy_subnet_back(global, subnet, tol)?;
        }

        // Last iterator: a final whole-graph sweep so every derived
        // property (KCL closures spanning subnet boundaries, bridged
        // relays through effort-forced nodes) is consistent end to end.
        propagation::propagate(global, tol)?;
        Ok(())
    }
}

fn bfs_reachable(network: &Network, seed: NodeId) -> SolverResult<(HashSet<NodeId>, HashSet<ElementId>)> {
    let mut nodes = HashSet::new();
    let mut elements = HashSet::new();
    let mut queue = VecDeque::new();
    nodes.insert(seed);
    queue.push_back(seed);

    while let Some(n) = queue.pop_front() {
        let incident: Vec<ElementId> = network.node(n)?.elements().to_vec();
        for eid in incident {
            elements.insert(eid);
            let el = network.element(eid)?;
            for &other in el.nodes() {
                if nodes.insert(other) {
                    queue.push_back(other);
                }
            }
            if let Some(coupled) = el.get_coupled_element() {
                elements.insert(coupled);
                for &cn in network.element(coupled)?.nodes() {
                    if nodes.insert(cn) {
                        queue.push_back(cn);
                    }
                }
            }
        }
    }
    Ok((nodes, elements))
}

/// A node is effort-forced if it is incident to an `Origin` or `Capacitance`
/// (spec §4.10) — not an `EffortSource`, which lives *inside* a subnet and
/// gets superposed rather than bounding one. At most one such element per
/// node (spec §3's single-effort-forcer invariant, already enforced for
/// `EffortSource`/`FlowSource`/`Origin` by `validate_effort_forcers`, but not
/// for `Capacitance`, so it's re-checked here).
fn classify_effort_forced(network: &Network, nodes: &HashSet<NodeId>) -> SolverResult<HashSet<NodeId>> {
    let mut forced = HashSet::new();
    for &n in nodes {
        let node = network.node(n)?;
        let mut count = 0;
        for &e in node.elements() {
            if matches!(network.element(e)?.kind(), ElementKind::Origin | ElementKind::Capacitance) {
                count += 1;
            }
        }
        if count > 1 {
            return Err(SolverError::transform_not_applicable(format!(
                "node {n} is incident to more than one origin/capacitance (spec §4.10)"
            )));
        }
        if count == 1 {
            forced.insert(n);
        }
    }
    Ok(forced)
}

/// A two-port `Dissipator`/`Open` element between two effort-forced nodes is
/// fully determined without any network context: `I = (Ea - Eb) * G` (spec
/// §4.10, glossary "self-solving resistor").
fn find_self_solving(
    network: &Network,
    elements: &HashSet<ElementId>,
    effort_forced: &HashSet<NodeId>,
) -> SolverResult<Vec<ElementId>> {
    let mut result = Vec::new();
    for &eid in elements {
        let el = network.element(eid)?;
        if !matches!(el.kind(), ElementKind::Dissipator | ElementKind::Open) || el.number_of_nodes() != 2 {
            continue;
        }
        let (a, b) = (el.nodes()[0], el.nodes()[1]);
        if effort_forced.contains(&a) && effort_forced.contains(&b) {
            result.push(eid);
        }
    }
    Ok(result)
}

struct RawSubnet {
    nodes: Vec<NodeId>,
    elements: Vec<ElementId>,
}

/// Groups the remaining elements into connected components bounded by
/// effort-forced nodes: traversal crosses into a non-forced node's other
/// elements, but never out past a forced one (spec §4.10: "partitions the
/// remaining elements into subnets bounded by effort-forced nodes").
fn partition_subnets(
    network: &Network,
    reachable_nodes: &HashSet<NodeId>,
    reachable_elements: &HashSet<ElementId>,
    effort_forced: &HashSet<NodeId>,
    excluded: &HashSet<ElementId>,
) -> SolverResult<Vec<RawSubnet>> {
    let mut visited = excluded.clone();
    let mut subnets = Vec::new();

    for el in network.elements() {
        let eid = el.id();
        if !reachable_elements.contains(&eid) || visited.contains(&eid) {
            continue;
        }

        let mut stack = vec![eid];
        visited.insert(eid);
        let mut members = Vec::new();
        let mut nodes_seen: HashSet<NodeId> = HashSet::new();

        while let Some(cur) = stack.pop() {
            members.push(cur);
            let nodes = network.element(cur)?.nodes().to_vec();
            for n in nodes {
                if !reachable_nodes.contains(&n) {
                    continue;
                }
                nodes_seen.insert(n);
                if effort_forced.contains(&n) {
                    continue;
                }
                for &other in network.node(n)?.elements() {
                    if other == cur || visited.contains(&other) || !reachable_elements.contains(&other) {
                        continue;
                    }
                    visited.insert(other);
                    stack.push(other);
                }
            }
        }

        subnets.push(RawSubnet {
            nodes: nodes_seen.into_iter().collect(),
            elements: members,
        });
    }

    Ok(subnets)
}

fn build_subnet(network: &Network, raw: &RawSubnet) -> SolverResult<PartitionedSubnet> {
    let mut child = ChildNetwork::new();
    for &n in &raw.nodes {
        child.carry_node(network, n)?;
    }
    for &e in &raw.elements {
        child.carry_element(network, e)?;
    }

    let has_storage = raw
        .elements
        .iter()
        .any(|&e| network.element(e).map(|el| el.kind() == ElementKind::Capacitance).unwrap_or(false));
    let all_linear = raw.elements.iter().all(|&e| network.element(e).map(|el| el.is_linear()).unwrap_or(true));

    let sources: Vec<ElementId> = raw
        .elements
        .iter()
        .filter(|&&e| {
            network
                .element(e)
                .map(|el| matches!(el.kind(), ElementKind::EffortSource | ElementKind::FlowSource))
                .unwrap_or(false)
        })
        .filter_map(|&e| child.element_for_origin_direct(e))
        .collect();

    let binding = if !all_linear {
        SubnetBinding::SimpleIterator
    } else if has_storage {
        SubnetBinding::Transfer(TransferSubnet::build(&child.network)?)
    } else {
        SubnetBinding::SuperPosition
    };

    Ok(PartitionedSubnet { child, binding, sources })
}

fn refresh_child_values(global: &Network, child: &mut ChildNetwork) -> SolverResult<()> {
    let ids: Vec<ElementId> = child.network.elements().iter().map(|e| e.id()).collect();
    for child_id in ids {
        let Some(ElementOrigin::Direct(parent_id)) = child.element_origin(child_id) else {
            continue;
        };
        let parent = global.element(parent_id)?;
        let el = child.network.element_mut(child_id)?;
        match parent.kind() {
            ElementKind::Dissipator => {
                if let Ok(g) = parent.get_conductance() {
                    el.set_conductance_parameter(g)?;
                }
            }
            ElementKind::EffortSource | ElementKind::Capacitance => {
                if let Some(v) = parent.effort_value() {
                    el.set_effort_value(v);
                }
            }
            ElementKind::FlowSource => {
                if let Some(v) = parent.flow_value() {
                    el.set_flow_value(v);
                }
            }
            ElementKind::Origin | ElementKind::Open | ElementKind::Bridged => {}
        }
    }
    Ok(())
}

fn copy_subnet_back(global: &mut Network, subnet: &PartitionedSubnet, tol: Tolerances) -> SolverResult<()> {
    for el in subnet.child.network.elements() {
        let Some(ElementOrigin::Direct(parent_id)) = subnet.child.element_origin(el.id()) else {
            continue;
        };
        let no_flow = global.element(parent_id)?.no_flow_transfer();
        let nodes = el.nodes().to_vec();
        for cn in nodes {
            let Some(pn) = subnet.child.parent_of_node(cn) else { continue };
            if let Some(e) = subnet.child.network.node(cn)?.get_effort() {
                global.node_mut(pn)?.set_effort(e, None, false, tol)?;
            }
            if !no_flow {
                if let Some(f) = subnet.child.network.node(cn)?.get_flow(el.id()) {
                    global.node_mut(pn)?.set_flow(f, parent_id, false, tol)?;
                }
            }
        }
    }
    Ok(())
}

fn solve_self_solving(global: &mut Network, eid: ElementId, tol: Tolerances) -> SolverResult<()> {
    let el = global.element(eid)?;
    let (a, b) = (el.nodes()[0], el.nodes()[1]);
    let g = el.get_conductance()?;
    let (ea, eb) = (global.node(a)?.get_effort(), global.node(b)?.get_effort());
    if let (Some(ea), Some(eb)) = (ea, eb) {
        let i = g * (ea - eb);
        global.node_mut(a)?.set_flow(i, eid, false, tol)?;
        global.node_mut(b)?.set_flow(-i, eid, false, tol)?;
    }
    Ok(())
}

/// Walks a single non-branching path from `start` until it reaches a node
/// incident to a `Capacitance`, marking every element visited along the way
/// `no_flow_transfer` (spec §4.10). Errors with `NoExpansionPath` if neither
/// direction out of `start` reaches one.
fn trace_path_to_capacitance(network: &Network, start: ElementId) -> SolverResult<Vec<ElementId>> {
    let el = network.element(start)?;
    if el.number_of_nodes() != 2 {
        return Err(SolverError::NoExpansionPath {
            element: start.to_string(),
        });
    }
    for &dir in el.nodes() {
        if let Some(path) = walk_direction(network, start, dir)? {
            return Ok(path);
        }
    }
    Err(SolverError::NoExpansionPath {
        element: start.to_string(),
    })
}

fn walk_direction(network: &Network, start: ElementId, toward: NodeId) -> SolverResult<Option<Vec<ElementId>>> {
    let mut path = vec![start];
    let mut current_el = start;
    let mut node = toward;
    let max_steps = network.element_count() + 1;

    for _ in 0..max_steps {
        let incident: Vec<ElementId> = network.node(node)?.elements().to_vec();
        if incident
            .iter()
            .any(|&e| e != current_el && network.element(e).map(|el| el.kind() == ElementKind::Capacitance).unwrap_or(false))
        {
            return Ok(Some(path));
        }
        if incident.len() != 2 {
            return Ok(None);
        }
        let next_el = incident.into_iter().find(|&e| e != current_el).expect("degree-2 node has another element");
        let next_node = network.only_other_node(next_el, node)?;
        path.push(next_el);
        current_el = next_el;
        node = next_node;
    }
    Ok(None)
}
