//! Propagation Iterator (C2, spec §4.2).
//!
//! Drives a bounded fixed point: repeatedly visits every element in a fixed
//! order (origins, then effort/flow sources and capacitances, then
//! dissipator-family elements in insertion order), invoking each element's
//! local calculation, until a full pass writes nothing new. A companion KCL
//! closure pass derives the one remaining unknown flow at any node where all
//! but one incident flow is already known.

use net_core::{ElementId, NodeId, Tolerances};
use net_graph::{ElementKind, Network};

use crate::config::PROPAGATION_ITERATION_CAP;
use crate::error::{SolverError, SolverResult};

/// Runs only enforcer-kind elements (`Origin`, `EffortSource`, `FlowSource`,
/// `Capacitance`). Called before general propagation begins so fixed values
/// are established first and dependent propagation never tries to push a
/// value back into a source (spec §4.2: `doCalculationOnEnforcerElements`).
pub fn do_calculation_on_enforcer_elements(network: &mut Network, tol: Tolerances) -> SolverResult<bool> {
    let mut progress = false;
    let enforcers: Vec<ElementId> = network
        .elements()
        .iter()
        .filter(|e| e.kind().is_enforcer())
        .map(|e| e.id())
        .collect();
    for element in enforcers {
        if do_calculation_element(network, element, tol)? {
            progress = true;
        }
    }
    Ok(progress)
}

/// Pins every `Open` element's flow to exact zero on both ends, mitigating
/// floating-point drift from near-cancelling sums (spec §4.2 example:
/// 5.23 − 1.23 − 4.0 ≠ 0 exactly).
pub fn sweep_open_elements_to_zero_flow(network: &mut Network, tol: Tolerances) -> SolverResult<()> {
    let open_ids: Vec<ElementId> = network
        .elements()
        .iter()
        .filter(|e| e.kind() == ElementKind::Open)
        .map(|e| e.id())
        .collect();
    for id in open_ids {
        let nodes: Vec<NodeId> = network.element(id)?.nodes().to_vec();
        for node in nodes {
            network.node_mut(node)?.set_flow(0.0, id, true, tol)?;
        }
    }
    Ok(())
}

/// Element visiting order for one propagation pass (spec §4.2: "ORIGINs at
/// front, then EFFORT_SOURCE/FLOW_SOURCE, then dissipators in insertion
/// order").
fn ordered_element_ids(network: &Network) -> Vec<ElementId> {
    let mut origins = Vec::new();
    let mut sources = Vec::new();
    let mut dissipators = Vec::new();
    for el in network.elements() {
        match el.kind() {
            ElementKind::Origin => origins.push(el.id()),
            ElementKind::EffortSource | ElementKind::FlowSource | ElementKind::Capacitance => {
                sources.push(el.id())
            }
            _ => dissipators.push(el.id()),
        }
    }
    origins.extend(sources);
    origins.extend(dissipators);
    origins
}

/// Runs the bounded fixed-point propagation loop to completion (spec §4.2).
/// Returns `Err(IterationCapExceeded)` if a full pass still makes progress
/// after the cap is reached (spec §7.2: a model error).
pub fn propagate(network: &mut Network, tol: Tolerances) -> SolverResult<()> {
    do_calculation_on_enforcer_elements(network, tol)?;
    sweep_open_elements_to_zero_flow(network, tol)?;

    let order = ordered_element_ids(network);
    let node_ids: Vec<NodeId> = network.nodes().iter().map(|n| n.id()).collect();

    for _ in 0..PROPAGATION_ITERATION_CAP {
        let mut progress = false;
        for &element in &order {
            if do_calculation_element(network, element, tol)? {
                progress = true;
            }
        }
        for &node in &node_ids {
            if try_close_kcl_at_node(network, node, tol)? {
                progress = true;
            }
        }
        if !progress {
            return Ok(());
        }
    }

    Err(SolverError::IterationCapExceeded {
        what: "propagation",
        cap: PROPAGATION_ITERATION_CAP,
    })
}

/// Dispatches one element's local calculation by kind. Returns whether any
/// node value was newly written.
pub fn do_calculation_element(network: &mut Network, element: ElementId, tol: Tolerances) -> SolverResult<bool> {
    match network.element(element)?.kind() {
        ElementKind::Origin => do_calculation_origin(network, element, tol),
        ElementKind::Capacitance => do_calculation_capacitance(network, element, tol),
        ElementKind::EffortSource => do_calculation_effort_source(network, element, tol),
        ElementKind::FlowSource => do_calculation_flow_source(network, element, tol),
        ElementKind::Dissipator | ElementKind::Open => do_calculation_admittance(network, element, tol),
        ElementKind::Bridged => do_calculation_bridged(network, element, tol),
    }
}

fn do_calculation_origin(network: &mut Network, element: ElementId, tol: Tolerances) -> SolverResult<bool> {
    let (node, value) = {
        let el = network.element(element)?;
        let node = el
            .get_node(0)
            .ok_or_else(|| SolverError::small_case_unsolvable(format!("origin {element} has no node")))?;
        let value = el
            .effort_value()
            .ok_or_else(|| SolverError::small_case_unsolvable(format!("origin {element} has no effort value set")))?;
        (node, value)
    };
    let already = network.node(node)?.effort_updated();
    network.node_mut(node)?.set_effort(value, Some(element), false, tol)?;
    Ok(!already)
}

fn do_calculation_capacitance(network: &mut Network, element: ElementId, tol: Tolerances) -> SolverResult<bool> {
    let (nodes, value) = {
        let el = network.element(element)?;
        let value = el.effort_value().ok_or_else(|| {
            SolverError::small_case_unsolvable(format!("capacitance {element} has no effort value set"))
        })?;
        (el.nodes().to_vec(), value)
    };
    let mut progress = false;
    for node in nodes {
        let already = network.node(node)?.effort_updated();
        network.node_mut(node)?.set_effort(value, Some(element), false, tol)?;
        if !already {
            progress = true;
        }
    }
    Ok(progress)
}

fn do_calculation_effort_source(network: &mut Network, element: ElementId, tol: Tolerances) -> SolverResult<bool> {
    let (n0, n1, value) = {
        let el = network.element(element)?;
        let n0 = el
            .get_node(0)
            .ok_or_else(|| SolverError::small_case_unsolvable(format!("effort source {element} missing node 0")))?;
        let n1 = el
            .get_node(1)
            .ok_or_else(|| SolverError::small_case_unsolvable(format!("effort source {element} missing node 1")))?;
        let value = el.effort_value().ok_or_else(|| {
            SolverError::small_case_unsolvable(format!("effort source {element} has no effort value set"))
        })?;
        (n0, n1, value)
    };

    let mut progress = false;
    let e0 = network.node(n0)?.get_effort();
    let e1 = network.node(n1)?.get_effort();
    match (e0, e1) {
        (Some(v0), None) => {
            network.node_mut(n1)?.set_effort(v0 - value, Some(element), false, tol)?;
            progress = true;
        }
        (None, Some(v1)) => {
            network.node_mut(n0)?.set_effort(v1 + value, Some(element), false, tol)?;
            progress = true;
        }
        (Some(v0), Some(v1)) => {
            // Re-asserting an already-known relation must agree within
            // tolerance or the source is genuinely in conflict with the
            // rest of the network (spec §3 P2: write-once with agreement).
            network.node_mut(n1)?.set_effort(v0 - value, Some(element), false, tol)?;
            let _ = v1;
        }
        (None, None) => {}
    }

    let f0 = network.node(n0)?.get_flow(element);
    let f1 = network.node(n1)?.get_flow(element);
    match (f0, f1) {
        (Some(v), None) => {
            network.node_mut(n1)?.set_flow(-v, element, false, tol)?;
            progress = true;
        }
        (None, Some(v)) => {
            network.node_mut(n0)?.set_flow(-v, element, false, tol)?;
            progress = true;
        }
        _ => {}
    }

    Ok(progress)
}

fn do_calculation_flow_source(network: &mut Network, element: ElementId, tol: Tolerances) -> SolverResult<bool> {
    let (n0, n1, value) = {
        let el = network.element(element)?;
        let n0 = el
            .get_node(0)
            .ok_or_else(|| SolverError::small_case_unsolvable(format!("flow source {element} missing node 0")))?;
        let n1 = el
            .get_node(1)
            .ok_or_else(|| SolverError::small_case_unsolvable(format!("flow source {element} missing node 1")))?;
        let value = el
            .flow_value()
            .ok_or_else(|| SolverError::small_case_unsolvable(format!("flow source {element} has no flow value set")))?;
        (n0, n1, value)
    };

    let mut progress = false;
    if network.node(n0)?.get_flow(element).is_none() {
        network.node_mut(n0)?.set_flow(value, element, false, tol)?;
        progress = true;
    }
    if network.node(n1)?.get_flow(element).is_none() {
        network.node_mut(n1)?.set_flow(-value, element, false, tol)?;
        progress = true;
    }
    Ok(progress)
}

fn do_calculation_admittance(network: &mut Network, element: ElementId, tol: Tolerances) -> SolverResult<bool> {
    let (n0, n1, g) = {
        let el = network.element(element)?;
        let n0 = el
            .get_node(0)
            .ok_or_else(|| SolverError::small_case_unsolvable(format!("element {element} missing node 0")))?;
        let n1 = el
            .get_node(1)
            .ok_or_else(|| SolverError::small_case_unsolvable(format!("element {element} missing node 1")))?;
        let g = el.get_conductance()?;
        (n0, n1, g)
    };

    let e0 = network.node(n0)?.get_effort();
    let e1 = network.node(n1)?.get_effort();
    let f0 = network.node(n0)?.get_flow(element);
    let f1 = network.node(n1)?.get_flow(element);

    if let (Some(v0), Some(v1)) = (e0, e1) {
        let mut progress = false;
        let i = g * (v0 - v1);
        if f0.is_none() {
            network.node_mut(n0)?.set_flow(i, element, false, tol)?;
            progress = true;
        }
        if f1.is_none() {
            network.node_mut(n1)?.set_flow(-i, element, false, tol)?;
            progress = true;
        }
        return Ok(progress);
    }

    let mut progress = false;
    if g != 0.0 {
        if let (Some(v0), Some(fa), None) = (e0, f0, e1) {
            network.node_mut(n1)?.set_effort(v0 - fa / g, Some(element), false, tol)?;
            progress = true;
        }
        if let (Some(v1), Some(fb), None) = (e1, f1, e0) {
            network.node_mut(n0)?.set_effort(v1 + fb / g, Some(element), false, tol)?;
            progress = true;
        }
    }
    Ok(progress)
}

fn do_calculation_bridged(network: &mut Network, element: ElementId, tol: Tolerances) -> SolverResult<bool> {
    let (n0, n1) = {
        let el = network.element(element)?;
        let n0 = el
            .get_node(0)
            .ok_or_else(|| SolverError::small_case_unsolvable(format!("bridged element {element} missing node 0")))?;
        let n1 = el
            .get_node(1)
            .ok_or_else(|| SolverError::small_case_unsolvable(format!("bridged element {element} missing node 1")))?;
        (n0, n1)
    };

    let mut progress = false;
    let e0 = network.node(n0)?.get_effort();
    let e1 = network.node(n1)?.get_effort();
    match (e0, e1) {
        (Some(v), None) => {
            network.node_mut(n1)?.set_effort(v, Some(element), false, tol)?;
            progress = true;
        }
        (None, Some(v)) => {
            network.node_mut(n0)?.set_effort(v, Some(element), false, tol)?;
            progress = true;
        }
        (Some(v0), Some(_)) => {
            // Both ends already forced (e.g. by a parallel effort source):
            // a short demands they agree. Re-asserting through set_effort
            // triggers the write-once validation instead of silently
            // ignoring the conflict (spec §3: "an effort source in
            // parallel with a BRIDGED element is illegal and must fail").
            network.node_mut(n1)?.set_effort(v0, Some(element), false, tol)?;
        }
        (None, None) => {}
    }

    let f0 = network.node(n0)?.get_flow(element);
    let f1 = network.node(n1)?.get_flow(element);
    match (f0, f1) {
        (Some(v), None) => {
            network.node_mut(n1)?.set_flow(-v, element, false, tol)?;
            progress = true;
        }
        (None, Some(v)) => {
            network.node_mut(n0)?.set_flow(-v, element, false, tol)?;
            progress = true;
        }
        _ => {}
    }

    Ok(progress)
}

/// Derives the one remaining unknown flow at a node from KCL, when exactly
/// one of its incident elements' flows is still missing.
fn try_close_kcl_at_node(network: &mut Network, node: NodeId, tol: Tolerances) -> SolverResult<bool> {
    let elements: Vec<ElementId> = network.node(node)?.elements().to_vec();
    let mut known_sum = 0.0;
    let mut missing: Option<ElementId> = None;
    let mut missing_count = 0;
    for &element in &elements {
        match network.node(node)?.get_flow(element) {
            Some(v) => known_sum += v,
            None => {
                missing = Some(element);
                missing_count += 1;
            }
        }
    }
    if missing_count == 1 {
        let element = missing.expect("missing_count == 1 implies missing is Some");
        network.node_mut(node)?.set_flow(-known_sum, element, false, tol)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use net_core::DomainTag;
    use net_graph::NetworkBuilder;

    use super::*;

    #[test]
    fn simple_loop_solves_by_direct_admittance() {
        let mut b = NetworkBuilder::new();
        let n0 = b.add_node("ground", DomainTag::Electrical);
        let n1 = b.add_node("n1", DomainTag::Electrical);
        let origin = b.add_element("origin", DomainTag::Electrical, ElementKind::Origin);
        let src = b.add_element("src", DomainTag::Electrical, ElementKind::EffortSource);
        let r1 = b.add_element("r1", DomainTag::Electrical, ElementKind::Dissipator);
        b.connect(origin, n0).unwrap();
        b.connect_between(src, n0, n1).unwrap();
        b.connect_between(r1, n0, n1).unwrap();
        let mut net = b.build().unwrap();

        net.element_mut(origin).unwrap().set_effort_value(0.0);
        net.element_mut(src).unwrap().set_effort_value(-10.0);
        net.element_mut(r1).unwrap().set_conductance_parameter(0.5).unwrap();

        propagate(&mut net, Tolerances::default()).unwrap();

        assert!((net.node(n1).unwrap().get_effort().unwrap() - 10.0).abs() < 1e-6);
        assert!((net.node(n1).unwrap().get_flow(r1).unwrap() - 5.0).abs() < 1e-6);
        assert!((net.node(n0).unwrap().get_flow(origin).unwrap()).abs() < 1e-6);
    }

    #[test]
    fn open_element_flow_is_pinned_to_zero() {
        let mut b = NetworkBuilder::new();
        let n0 = b.add_node("n0", DomainTag::Electrical);
        let n1 = b.add_node("n1", DomainTag::Electrical);
        let origin = b.add_element("origin", DomainTag::Electrical, ElementKind::Origin);
        let src = b.add_element("src", DomainTag::Electrical, ElementKind::EffortSource);
        let open = b.add_element("r1", DomainTag::Electrical, ElementKind::Open);
        b.connect(origin, n0).unwrap();
        b.connect_between(src, n0, n1).unwrap();
        b.connect_between(open, n0, n1).unwrap();
        let mut net = b.build().unwrap();
        net.element_mut(origin).unwrap().set_effort_value(0.0);
        net.element_mut(src).unwrap().set_effort_value(-5.0);

        propagate(&mut net, Tolerances::default()).unwrap();

        assert_eq!(net.node(n0).unwrap().get_flow(open).unwrap(), 0.0);
        assert_eq!(net.node(n1).unwrap().get_flow(open).unwrap(), 0.0);
        assert!((net.node(n1).unwrap().get_effort().unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn unsolvable_floating_pair_reports_cap_exceeded() {
        // Two dissipators forming a floating series chain with no origin or
        // source: nothing can ever become known, so every pass after the
        // first is a no-op and propagate terminates cleanly (not an error) —
        // this documents that termination, not failure, is the outcome of a
        // genuinely under-determined network at this layer.
        let mut b = NetworkBuilder::new();
        let n0 = b.add_node("n0", DomainTag::Electrical);
        let n1 = b.add_node("n1", DomainTag::Electrical);
        let n2 = b.add_node("n2", DomainTag::Electrical);
        let r1 = b.add_element("r1", DomainTag::Electrical, ElementKind::Dissipator);
        let r2 = b.add_element("r2", DomainTag::Electrical, ElementKind::Dissipator);
        b.connect_between(r1, n0, n1).unwrap();
        b.connect_between(r2, n1, n2).unwrap();
        let mut net = b.build().unwrap();
        net.element_mut(r1).unwrap().set_conductance_parameter(1.0).unwrap();
        net.element_mut(r2).unwrap().set_conductance_parameter(1.0).unwrap();

        propagate(&mut net, Tolerances::default()).unwrap();
        assert!(net.node(n0).unwrap().get_effort().is_none());
    }

    #[test]
    fn basic_ohms_law_matches_spec_scenario_1() {
        // origin - effort source 16V - resistor 800 ohm - origin.
        let mut b = NetworkBuilder::new();
        let p0 = b.add_node("p0", DomainTag::Electrical);
        let p1 = b.add_node("p1", DomainTag::Electrical);
        let origin = b.add_element("origin", DomainTag::Electrical, ElementKind::Origin);
        let src = b.add_element("src", DomainTag::Electrical, ElementKind::EffortSource);
        let r1 = b.add_element("r1", DomainTag::Electrical, ElementKind::Dissipator);
        b.connect(origin, p0).unwrap();
        b.connect_between(src, p0, p1).unwrap();
        b.connect_between(r1, p0, p1).unwrap();
        let mut net = b.build().unwrap();
        net.element_mut(origin).unwrap().set_effort_value(0.0);
        net.element_mut(src).unwrap().set_effort_value(-16.0);
        net.element_mut(r1).unwrap().set_resistance_parameter(800.0).unwrap();

        propagate(&mut net, Tolerances::default()).unwrap();

        let flow = net.node(p1).unwrap().get_flow(r1).unwrap();
        assert!((flow - 0.02).abs() < 1e-6, "flow={flow}");
        assert!((net.node(p1).unwrap().get_effort().unwrap() - 16.0).abs() < 1e-6);
    }

    #[test]
    fn bridged_in_parallel_with_effort_source_conflicts_per_scenario_3() {
        // A bridged (shorted) element directly across the same two nodes as
        // a nonzero effort source is an illegal configuration (spec §3:
        // "an effort source in parallel with a BRIDGED element is illegal
        // and must fail"; spec §8 scenario 3 accepts either a raised error
        // or an unfinished calculation as the observable outcome).
        let mut b = NetworkBuilder::new();
        let n0 = b.add_node("n0", DomainTag::Electrical);
        let n1 = b.add_node("n1", DomainTag::Electrical);
        let origin = b.add_element("origin", DomainTag::Electrical, ElementKind::Origin);
        let src = b.add_element("src", DomainTag::Electrical, ElementKind::EffortSource);
        let short = b.add_element("short", DomainTag::Electrical, ElementKind::Bridged);
        b.connect(origin, n0).unwrap();
        b.connect_between(src, n0, n1).unwrap();
        b.connect_between(short, n0, n1).unwrap();
        let mut net = b.build().unwrap();
        net.element_mut(origin).unwrap().set_effort_value(0.0);
        net.element_mut(src).unwrap().set_effort_value(-16.0);

        assert!(propagate(&mut net, Tolerances::default()).is_err());
    }
}
