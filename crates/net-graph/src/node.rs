use net_core::{nearly_equal, DomainTag, ElementId, NetError, NetResult, NodeId, Real, Tolerances};

/// A junction in the network graph (spec §3, §4.1).
///
/// Carries one scalar effort and one flow value per incident element, both
/// write-once per tick: the first write sticks, later non-forced writes must
/// agree within tolerance or the node raises `CalculationError` (P2).
#[derive(Clone, Debug)]
pub struct Node {
    id: NodeId,
    name: String,
    domain: DomainTag,
    elements: Vec<ElementId>,
    effort: Option<Real>,
    effort_source: Option<ElementId>,
    flows: Vec<(ElementId, Real)>,
}

impl Node {
    pub(crate) fn new(id: NodeId, name: impl Into<String>, domain: DomainTag) -> Self {
        Self {
            id,
            name: name.into(),
            domain,
            elements: Vec::new(),
            effort: None,
            effort_source: None,
            flows: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> &DomainTag {
        &self.domain
    }

    pub(crate) fn register_element(&mut self, element: ElementId) {
        self.elements.push(element);
    }

    /// Incident elements in registration order (spec §3: "a node knows its
    /// incident elements in registration order").
    pub fn elements(&self) -> &[ElementId] {
        &self.elements
    }

    pub fn number_of_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn get_element(&self, i: usize) -> Option<ElementId> {
        self.elements.get(i).copied()
    }

    pub fn is_element_registered(&self, element: ElementId) -> bool {
        self.elements.contains(&element)
    }

    /// Clears per-tick effort/flow state. Topology (incident elements) is
    /// immutable after setup and survives resets.
    pub fn reset_for_tick(&mut self) {
        self.effort = None;
        self.effort_source = None;
        self.flows.clear();
    }

    pub fn get_effort(&self) -> Option<Real> {
        self.effort
    }

    pub fn effort_updated(&self) -> bool {
        self.effort.is_some()
    }

    /// The element that most recently set this node's effort, if any.
    pub fn effort_source(&self) -> Option<ElementId> {
        self.effort_source
    }

    /// Write-once-per-tick effort assignment (spec §4.1).
    pub fn set_effort(
        &mut self,
        v: Real,
        source: Option<ElementId>,
        force: bool,
        tol: Tolerances,
    ) -> NetResult<()> {
        match self.effort {
            Some(prior) if !force && !nearly_equal(prior, v, tol) => Err(NetError::calculation(format!(
                "node {} effort write conflict: prior={prior}, new={v}",
                self.id
            ))),
            _ => {
                self.effort = Some(v);
                self.effort_source = source;
                Ok(())
            }
        }
    }

    pub fn get_flow(&self, element: ElementId) -> Option<Real> {
        self.flows.iter().find(|(e, _)| *e == element).map(|(_, f)| *f)
    }

    pub fn flow_updated(&self, element: ElementId) -> bool {
        self.get_flow(element).is_some()
    }

    pub fn all_flows_updated(&self) -> bool {
        self.elements.iter().all(|e| self.flow_updated(*e))
    }

    /// Write-once-per-tick flow assignment for one incident element
    /// (spec §4.1).
    pub fn set_flow(&mut self, v: Real, element: ElementId, force: bool, tol: Tolerances) -> NetResult<()> {
        if let Some(slot) = self.flows.iter_mut().find(|(e, _)| *e == element) {
            if force || nearly_equal(slot.1, v, tol) {
                slot.1 = v;
                Ok(())
            } else {
                Err(NetError::calculation(format!(
                    "node {} flow write conflict on element {element}: prior={}, new={v}",
                    self.id, slot.1
                )))
            }
        } else {
            self.flows.push((element, v));
            Ok(())
        }
    }
}
