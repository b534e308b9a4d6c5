use core::fmt;

/// The kind of an element (spec §3). Dissipator-family kinds transition
/// among each other by kind change, not by numeric R/G limits — the numeric
/// conductance field is only meaningful while `kind` is `Dissipator`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Linear resistor (conductance G, resistance R = 1/G).
    Dissipator,
    /// Infinite resistance: a present-but-inactive connection.
    Open,
    /// Zero resistance: a short.
    Bridged,
    /// Imposes a fixed effort between its two ports.
    EffortSource,
    /// Imposes a fixed flow through itself.
    FlowSource,
    /// Ground reference with a fixed effort (one port).
    Origin,
    /// External storage exposing an effort boundary this tick; the core
    /// treats it as an effort source.
    Capacitance,
}

impl ElementKind {
    /// Dissipator, Open and Bridged are the same physical port in different
    /// numeric regimes; transforms and fusions treat them uniformly.
    pub fn is_dissipator_family(self) -> bool {
        matches!(
            self,
            ElementKind::Dissipator | ElementKind::Open | ElementKind::Bridged
        )
    }

    /// An ENFORCER element: its `do_calculation` imposes values on its nodes
    /// rather than deriving them (spec §3, §4.2 order policy).
    pub fn is_enforcer(self) -> bool {
        matches!(
            self,
            ElementKind::EffortSource
                | ElementKind::FlowSource
                | ElementKind::Origin
                | ElementKind::Capacitance
        )
    }

    /// Elements that impose a fixed effort directly. At most one of these
    /// may be incident to any given node (spec §3 invariant).
    pub fn is_effort_forcer(self) -> bool {
        matches!(
            self,
            ElementKind::EffortSource | ElementKind::Origin | ElementKind::Capacitance
        )
    }

    /// How many nodes a freshly built element of this kind must carry
    /// (spec §7.1: ">2-node non-capacitance element" is a setup error).
    pub fn required_node_count(self) -> NodeCountRequirement {
        match self {
            ElementKind::Origin => NodeCountRequirement::Exactly(1),
            ElementKind::Capacitance => NodeCountRequirement::AtLeast(1),
            _ => NodeCountRequirement::Exactly(2),
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElementKind::Dissipator => "dissipator",
            ElementKind::Open => "open",
            ElementKind::Bridged => "bridged",
            ElementKind::EffortSource => "effort_source",
            ElementKind::FlowSource => "flow_source",
            ElementKind::Origin => "origin",
            ElementKind::Capacitance => "capacitance",
        };
        write!(f, "{s}")
    }
}

/// Node-count requirement a given element kind places on setup validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeCountRequirement {
    Exactly(usize),
    AtLeast(usize),
}

impl NodeCountRequirement {
    pub fn is_satisfied_by(self, count: usize) -> bool {
        match self {
            NodeCountRequirement::Exactly(n) => count == n,
            NodeCountRequirement::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for NodeCountRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeCountRequirement::Exactly(n) => write!(f, "exactly {n}"),
            NodeCountRequirement::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}
