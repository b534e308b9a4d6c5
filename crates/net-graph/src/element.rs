use net_core::{ensure_finite, DomainTag, ElementId, NetError, NetResult, NodeId, Real};

use crate::kind::ElementKind;

/// A two-port device (rare: one-port origins, multi-port self-capacitance)
/// with an element kind (spec §3).
#[derive(Clone, Debug)]
pub struct Element {
    id: ElementId,
    name: String,
    domain: DomainTag,
    kind: ElementKind,
    nodes: Vec<NodeId>,
    conductance: Option<Real>,
    effort_value: Option<Real>,
    flow_value: Option<Real>,
    coupled_element: Option<ElementId>,
    no_flow_transfer: bool,
    external_delta_effort: Real,
}

impl Element {
    pub(crate) fn new(id: ElementId, name: impl Into<String>, domain: DomainTag, kind: ElementKind) -> Self {
        Self {
            id,
            name: name.into(),
            domain,
            kind,
            nodes: Vec::new(),
            conductance: None,
            effort_value: None,
            flow_value: None,
            coupled_element: None,
            no_flow_transfer: false,
            external_delta_effort: 0.0,
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> &DomainTag {
        &self.domain
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub(crate) fn register_node(&mut self, node: NodeId) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn number_of_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn get_node(&self, i: usize) -> Option<NodeId> {
        self.nodes.get(i).copied()
    }

    pub fn get_coupled_element(&self) -> Option<ElementId> {
        self.coupled_element
    }

    pub fn set_coupled_element(&mut self, element: Option<ElementId>) {
        self.coupled_element = element;
    }

    /// Tagged by the transfer subnet translator / decomposer for elements
    /// that inject exogenous flow and must be excluded from solved-flow
    /// back-propagation (spec §4.9, §4.10).
    pub fn no_flow_transfer(&self) -> bool {
        self.no_flow_transfer
    }

    pub fn set_no_flow_transfer(&mut self, value: bool) {
        self.no_flow_transfer = value;
    }

    /// Layer-local effort offset applied by overlays (spec §6 Dissipator
    /// subcontract: `set_external_delta_effort`).
    pub fn external_delta_effort(&self) -> Real {
        self.external_delta_effort
    }

    pub fn set_external_delta_effort(&mut self, d: Real) {
        self.external_delta_effort = d;
    }

    /// Numeric G is only meaningful while `kind` is `Dissipator` (spec §3).
    /// `Open` reads as zero admittance (used directly by the star-polygon
    /// admittance formula); `Bridged` has no finite conductance.
    pub fn get_conductance(&self) -> NetResult<Real> {
        match self.kind {
            ElementKind::Dissipator => self
                .conductance
                .ok_or_else(|| NetError::model(format!("element {} has no conductance set", self.id))),
            ElementKind::Open => Ok(0.0),
            ElementKind::Bridged => Err(NetError::model(format!(
                "element {} is bridged: conductance is infinite",
                self.id
            ))),
            other => Err(NetError::InvalidArg {
                what: invalid_conductance_reason(other),
            }),
        }
    }

    pub fn get_resistance(&self) -> NetResult<Real> {
        let g = self.get_conductance()?;
        if g == 0.0 {
            Err(NetError::model(format!(
                "element {} is open: resistance is infinite",
                self.id
            )))
        } else {
            Ok(1.0 / g)
        }
    }

    pub fn set_conductance_parameter(&mut self, g: Real) -> NetResult<()> {
        if self.kind != ElementKind::Dissipator {
            return Err(NetError::InvalidArg {
                what: "set_conductance_parameter requires a Dissipator element",
            });
        }
        ensure_finite(g, "conductance")?;
        self.conductance = Some(g);
        Ok(())
    }

    pub fn set_resistance_parameter(&mut self, r: Real) -> NetResult<()> {
        if r == 0.0 {
            return Err(NetError::InvalidArg {
                what: "resistance parameter must be nonzero; use set_bridged_connection instead",
            });
        }
        self.set_conductance_parameter(1.0 / r)
    }

    /// Changes kind to `Open` by kind switch, never by numeric R→∞
    /// (spec §3, §6).
    pub fn set_open_connection(&mut self) {
        self.kind = ElementKind::Open;
        self.conductance = None;
    }

    /// Changes kind to `Bridged` by kind switch, never by numeric R→0
    /// (spec §3, §6).
    pub fn set_bridged_connection(&mut self) {
        self.kind = ElementKind::Bridged;
        self.conductance = None;
    }

    /// Retags a solver-synthesized element (a `SimplifiedResistor` fusion or
    /// a star↔polygon edge) to a freshly computed kind, clearing any
    /// now-stale conductance. Not part of the physics element contract —
    /// those elements switch kind only via `set_open_connection`/
    /// `set_bridged_connection`; synthesized elements have no `doCalculation`
    /// of their own and are retagged wholesale every tick by `net-solver`.
    pub fn set_kind_for_recomputation(&mut self, kind: ElementKind) {
        self.kind = kind;
        self.conductance = None;
    }

    pub fn effort_value(&self) -> Option<Real> {
        self.effort_value
    }

    pub fn set_effort_value(&mut self, v: Real) {
        self.effort_value = Some(v);
    }

    pub fn flow_value(&self) -> Option<Real> {
        self.flow_value
    }

    pub fn set_flow_value(&mut self, v: Real) {
        self.flow_value = Some(v);
    }

    /// The core never models nonlinear elements directly (spec §1
    /// Non-goals); always true at this layer.
    pub fn is_linear(&self) -> bool {
        true
    }
}

fn invalid_conductance_reason(kind: ElementKind) -> &'static str {
    match kind {
        ElementKind::EffortSource => "effort sources have no conductance",
        ElementKind::FlowSource => "flow sources have no conductance",
        ElementKind::Origin => "origins have no conductance",
        ElementKind::Capacitance => "capacitances have no conductance",
        _ => "conductance only applies to dissipator-family elements",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eid(i: u32) -> ElementId {
        ElementId::from_index(i)
    }

    #[test]
    fn resistance_round_trips_through_conductance() {
        let mut el = Element::new(eid(0), "r1", DomainTag::Electrical, ElementKind::Dissipator);
        el.set_resistance_parameter(4.0).unwrap();
        assert!((el.get_conductance().unwrap() - 0.25).abs() < 1e-12);
        assert!((el.get_resistance().unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn open_has_zero_conductance() {
        let el = Element::new(eid(0), "r1", DomainTag::Electrical, ElementKind::Open);
        assert_eq!(el.get_conductance().unwrap(), 0.0);
    }

    #[test]
    fn bridged_has_no_finite_conductance() {
        let el = Element::new(eid(0), "r1", DomainTag::Electrical, ElementKind::Bridged);
        assert!(el.get_conductance().is_err());
    }

    #[test]
    fn kind_switch_clears_conductance() {
        let mut el = Element::new(eid(0), "r1", DomainTag::Electrical, ElementKind::Dissipator);
        el.set_resistance_parameter(2.0).unwrap();
        el.set_open_connection();
        assert_eq!(el.kind(), ElementKind::Open);
        assert_eq!(el.get_conductance().unwrap(), 0.0);
    }

    #[test]
    fn non_dissipator_rejects_resistance_parameter() {
        let mut el = Element::new(eid(0), "s1", DomainTag::Electrical, ElementKind::EffortSource);
        assert!(el.set_resistance_parameter(4.0).is_err());
    }
}
