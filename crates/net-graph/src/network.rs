use net_core::{DomainTag, ElementId, NetError, NetResult, NodeId};

use crate::element::Element;
use crate::error::GraphError;
use crate::kind::{ElementKind, NodeCountRequirement};
use crate::node::Node;

/// The arena owning every node and element of one network (spec §3:
/// "every created node/element is owned by exactly one network").
///
/// Nodes and elements live in flat vectors addressed by the stable
/// `NodeId`/`ElementId` handles from net-core; connectivity is stored as
/// index lists in both directions, which is what makes child networks
/// (net-solver) cheap to build on top.
#[derive(Clone, Debug, Default)]
pub struct Network {
    nodes: Vec<Node>,
    elements: Vec<Element>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>, domain: DomainTag) -> NodeId {
        let id = NodeId::from_index(self.nodes.len() as u32);
        self.nodes.push(Node::new(id, name, domain));
        id
    }

    pub fn add_element(&mut self, name: impl Into<String>, domain: DomainTag, kind: ElementKind) -> ElementId {
        let id = ElementId::from_index(self.elements.len() as u32);
        self.elements.push(Element::new(id, name, domain, kind));
        id
    }

    pub fn node(&self, id: NodeId) -> NetResult<&Node> {
        self.nodes.get(id.index() as usize).ok_or(NetError::IndexOob {
            what: "node",
            index: id.index() as usize,
            len: self.nodes.len(),
        })
    }

    pub fn node_mut(&mut self, id: NodeId) -> NetResult<&mut Node> {
        let len = self.nodes.len();
        self.nodes.get_mut(id.index() as usize).ok_or(NetError::IndexOob {
            what: "node",
            index: id.index() as usize,
            len,
        })
    }

    pub fn element(&self, id: ElementId) -> NetResult<&Element> {
        self.elements.get(id.index() as usize).ok_or(NetError::IndexOob {
            what: "element",
            index: id.index() as usize,
            len: self.elements.len(),
        })
    }

    pub fn element_mut(&mut self, id: ElementId) -> NetResult<&mut Element> {
        let len = self.elements.len();
        self.elements.get_mut(id.index() as usize).ok_or(NetError::IndexOob {
            what: "element",
            index: id.index() as usize,
            len,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Connects an element to a node (spec §4.1). Rejects a domain mismatch,
    /// a duplicate connection, or a connection that would exceed the
    /// element kind's node-count requirement.
    pub fn connect(&mut self, element: ElementId, node: NodeId) -> NetResult<()> {
        let kind = self.element(element)?.kind();
        let current_count = self.element(element)?.number_of_nodes();

        if self.node(node)?.domain() != self.element(element)?.domain() {
            return Err(GraphError::DomainMismatch {
                element: self.element(element)?.domain().to_string(),
                node: self.node(node)?.domain().to_string(),
            }
            .into());
        }
        if self.node(node)?.is_element_registered(element) {
            return Err(GraphError::DuplicateConnection.into());
        }
        if let NodeCountRequirement::Exactly(max) = kind.required_node_count() {
            if current_count >= max {
                return Err(GraphError::InvalidNodeCount {
                    kind,
                    requirement: kind.required_node_count().to_string(),
                    actual: current_count + 1,
                }
                .into());
            }
        }

        self.element_mut(element)?.register_node(node);
        self.node_mut(node)?.register_element(element);
        Ok(())
    }

    /// Convenience for the common two-port case.
    pub fn connect_between(&mut self, element: ElementId, a: NodeId, b: NodeId) -> NetResult<()> {
        self.connect(element, a)?;
        self.connect(element, b)?;
        Ok(())
    }

    /// Returns the node on the other end of a two-node element. Fails with
    /// `NoFlowThrough` if `element` does not have exactly two connections
    /// (spec §4.1, §7).
    pub fn only_other_node(&self, element: ElementId, from: NodeId) -> NetResult<NodeId> {
        let e = self.element(element)?;
        if e.number_of_nodes() != 2 {
            return Err(NetError::NoFlowThrough {
                what: "element",
                count: e.number_of_nodes(),
            });
        }
        let nodes = e.nodes();
        if nodes[0] == from {
            Ok(nodes[1])
        } else if nodes[1] == from {
            Ok(nodes[0])
        } else {
            Err(NetError::InvalidArg {
                what: "`from` node is not incident to element",
            })
        }
    }

    /// Returns the element on the other side of a degree-2 node. Fails with
    /// `NoFlowThrough` if `node` does not have exactly two incident elements
    /// (spec §4.1, §7).
    pub fn only_other_element(&self, node: NodeId, excluding: ElementId) -> NetResult<ElementId> {
        let n = self.node(node)?;
        if n.number_of_elements() != 2 {
            return Err(NetError::NoFlowThrough {
                what: "node",
                count: n.number_of_elements(),
            });
        }
        let elements = n.elements();
        if elements[0] == excluding {
            Ok(elements[1])
        } else if elements[1] == excluding {
            Ok(elements[0])
        } else {
            Err(NetError::InvalidArg {
                what: "`excluding` element is not incident to node",
            })
        }
    }

    /// Resets every node's per-tick effort/flow state (called at the start
    /// of `prepare_calculation`).
    pub fn reset_for_tick(&mut self) {
        for node in &mut self.nodes {
            node.reset_for_tick();
        }
    }
}
