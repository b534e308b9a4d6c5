//! Child Network (spec §3): a structurally simpler network derived from a
//! parent via one simplification step.
//!
//! A bidirectional index map between parent and child, generalized two ways
//! a plain 1:1 map doesn't need to handle: (a) not
//! every parent node/element survives into the child (dead-end removal), and
//! (b) a child element can represent a *set* of parent elements fused
//! together (`SimplifiedResistor`) or be synthesized with no direct parent
//! counterpart at all (a star→polygon branch/edge). `node_child_of`/
//! `node_parent_of` stay simple 1:1 maps; `ElementOrigin` carries the richer
//! relationship on the element side.

use std::collections::HashMap;

use net_core::{ElementId, NetResult, NodeId};
use net_graph::{ElementKind, Network};

use crate::simplified_resistor::SimplifiedResistor;
use crate::transform::TransformRecord;

/// What a child-network element stands for in its parent (spec §3 Child
/// Network: "bidirectional index maps child_of(parent_idx)/parent_of(child_idx)
/// over both nodes and elements").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementOrigin {
    /// Carried into the child unchanged (same kind, same parameter).
    Direct(ElementId),
    /// A `SimplifiedResistor` fusing one or more parent resistors (C5);
    /// index into the owning `RecursiveSimplifier`'s fusion list.
    Fused(usize),
    /// One star branch resistor of a star↔polygon transform (C4); index
    /// into the owning transform's branch list.
    TransformBranch { transform: usize, branch: usize },
    /// One polygon edge resistor of a star↔polygon transform (C4).
    TransformEdge { transform: usize, i: usize, j: usize },
}

/// One level of the recursive simplifier's layered reduction: a simpler
/// network plus the maps back to its immediate parent.
#[derive(Debug, Default)]
pub struct ChildNetwork {
    pub network: Network,
    node_child_of: HashMap<NodeId, NodeId>,
    node_parent_of: HashMap<NodeId, NodeId>,
    element_origin: HashMap<ElementId, ElementOrigin>,
    /// This layer's `SimplifiedResistor` fusions (C5), indexed by
    /// `ElementOrigin::Fused`.
    pub(crate) fusions: Vec<SimplifiedResistor>,
    /// This layer's star↔polygon transforms (C4), indexed by
    /// `ElementOrigin::TransformBranch`/`TransformEdge`.
    pub(crate) transforms: Vec<TransformRecord>,
}

impl ChildNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_node(&mut self, parent: NodeId, child: NodeId) {
        self.node_child_of.insert(parent, child);
        self.node_parent_of.insert(child, parent);
    }

    pub fn child_of_node(&self, parent: NodeId) -> Option<NodeId> {
        self.node_child_of.get(&parent).copied()
    }

    pub fn parent_of_node(&self, child: NodeId) -> Option<NodeId> {
        self.node_parent_of.get(&child).copied()
    }

    pub fn set_element_origin(&mut self, child: ElementId, origin: ElementOrigin) {
        self.element_origin.insert(child, origin);
    }

    pub fn element_origin(&self, child: ElementId) -> Option<ElementOrigin> {
        self.element_origin.get(&child).copied()
    }

    /// Finds the child element recorded with the given origin, if any. A
    /// linear scan is acceptable here: each layer holds at most a handful of
    /// fusions/transforms (spec §4.6 logs a WARNING past 4 residual
    /// elements, let alone per-step fusion counts).
    pub fn element_for_origin(&self, origin: ElementOrigin) -> Option<ElementId> {
        self.element_origin
            .iter()
            .find(|(_, o)| **o == origin)
            .map(|(id, _)| *id)
    }

    /// Finds the child element directly carrying a given parent element.
    pub fn element_for_origin_direct(&self, parent: ElementId) -> Option<ElementId> {
        self.element_for_origin(ElementOrigin::Direct(parent))
    }

    /// Carries a parent node into the child unchanged, reusing the mapping
    /// if this parent node has already been carried over this step.
    pub fn carry_node(&mut self, parent_net: &Network, parent_node: NodeId) -> NetResult<NodeId> {
        if let Some(existing) = self.child_of_node(parent_node) {
            return Ok(existing);
        }
        let p = parent_net.node(parent_node)?;
        let child_id = self.network.add_node(p.name().to_string(), p.domain().clone());
        self.map_node(parent_node, child_id);
        Ok(child_id)
    }

    /// Carries a parent element into the child unchanged: same kind, same
    /// numeric parameter, endpoints carried (or reused) via `carry_node`.
    pub fn carry_element(&mut self, parent_net: &Network, parent_el: ElementId) -> NetResult<ElementId> {
        let p = parent_net.element(parent_el)?;
        let child_id = self.network.add_element(p.name().to_string(), p.domain().clone(), p.kind());
        self.set_element_origin(child_id, ElementOrigin::Direct(parent_el));
        let nodes: Vec<NodeId> = p.nodes().to_vec();
        for node in nodes {
            let child_node = self.carry_node(parent_net, node)?;
            self.network.connect(child_id, child_node)?;
        }
        if p.kind() == ElementKind::Dissipator {
            if let Ok(g) = p.get_conductance() {
                self.network.element_mut(child_id)?.set_conductance_parameter(g)?;
            }
        }
        if let Some(v) = p.effort_value() {
            self.network.element_mut(child_id)?.set_effort_value(v);
        }
        if let Some(v) = p.flow_value() {
            self.network.element_mut(child_id)?.set_flow_value(v);
        }
        Ok(child_id)
    }
}
