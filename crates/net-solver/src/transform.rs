//! Star↔Polygon Transforms (C4, spec §4.4): Y-Δ (k=3), Y-Square (k=4),
//! and the generalized Y-N (k≥5), all sharing one admittance-form formula
//! and one lookup-table pairing scheme.

use net_core::{ElementId, NetError, NetResult, NodeId, Real, Tolerances};
use net_graph::{ElementKind, Network};
use tracing::warn;

/// A star→polygon transform record (spec §3 "Transform Record"): a star
/// node, its k branch resistors, the k outer nodes at their far ends, and
/// the k(k−1)/2 polygon resistors connecting every pair of outer nodes.
#[derive(Clone, Debug)]
pub struct TransformRecord {
    pub star_node: NodeId,
    /// Parent branch resistors, in the star node's registration order.
    pub branches: Vec<ElementId>,
    /// Parent outer node at the far end of each branch, same order.
    pub outer_nodes: Vec<NodeId>,
}

impl TransformRecord {
    pub fn degree(&self) -> usize {
        self.branches.len()
    }

    /// `pair_of(i, j) -> polygon_idx` (spec §3), canonicalized on `i < j`
    /// and enumerated row-major: (0,1),(0,2),...,(0,k-1),(1,2),...
    pub fn pair_index(&self, i: usize, j: usize) -> usize {
        let k = self.degree();
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        debug_assert!(i != j && j < k);
        let mut idx = 0;
        for a in 0..i {
            idx += k - 1 - a;
        }
        idx + (j - i - 1)
    }

    pub fn pair_count(&self) -> usize {
        let k = self.degree();
        k * (k - 1) / 2
    }

    /// Inverse of `pair_index`: the (i, j) outer-node pair for a polygon edge.
    pub fn pair_of(&self, polygon_idx: usize) -> (usize, usize) {
        let k = self.degree();
        let mut remaining = polygon_idx;
        let mut i = 0;
        loop {
            let row_len = k - 1 - i;
            if remaining < row_len {
                return (i, i + 1 + remaining);
            }
            remaining -= row_len;
            i += 1;
        }
    }

    /// Detects whether `node` qualifies as a star node of the given degree
    /// (spec §4.4: "k≥3 dissipator branches, no sources/origins/capacitors
    /// attached, and each branch must actually lead somewhere"). Returns the
    /// branch element list in registration order if so.
    pub fn detect(network: &Network, node: NodeId, degree: usize) -> NetResult<Option<Vec<ElementId>>> {
        let n = network.node(node)?;
        if n.number_of_elements() != degree {
            return Ok(None);
        }
        let mut branches = Vec::with_capacity(degree);
        for &el_id in n.elements() {
            let el = network.element(el_id)?;
            if !el.kind().is_dissipator_family() {
                return Ok(None);
            }
            let other = network.only_other_node(el_id, node)?;
            // "No dead ends": the far node must itself connect to something
            // besides this one branch (a pure dead end is handled by the
            // recursive simplifier's dead-end-removal step, run earlier).
            if network.node(other)?.number_of_elements() < 2 {
                return Ok(None);
            }
            branches.push(el_id);
        }
        Ok(Some(branches))
    }

    /// Builds the record and computes every polygon-edge conductance for
    /// this tick (spec §4.4 forward transform). Returns the record plus the
    /// parallel list of polygon-edge kinds/conductances, indexed by
    /// `pair_index`.
    pub fn build(network: &Network, star_node: NodeId, branches: Vec<ElementId>) -> NetResult<(Self, Vec<PolygonEdge>)> {
        let mut outer_nodes = Vec::with_capacity(branches.len());
        for &b in &branches {
            outer_nodes.push(network.only_other_node(b, star_node)?);
        }
        let record = TransformRecord { star_node, branches, outer_nodes };
        let edges = record.forward_edges(network)?;
        Ok((record, edges))
    }

    fn branch_kinds(&self, network: &Network) -> NetResult<Vec<ElementKind>> {
        self.branches.iter().map(|&b| Ok(network.element(b)?.kind())).collect()
    }

    fn branch_conductances(&self, network: &Network) -> NetResult<Vec<Real>> {
        self.branches
            .iter()
            .map(|&b| {
                let el = network.element(b)?;
                match el.kind() {
                    ElementKind::Dissipator => el.get_conductance(),
                    ElementKind::Open => Ok(0.0),
                    ElementKind::Bridged => Ok(Real::INFINITY),
                    other => Err(NetError::model(format!("star branch cannot be a {other} element"))),
                }
            })
            .collect()
    }

    /// Forward transform (spec §4.4): default admittance formula plus the
    /// specialized bridge/open rules.
    fn forward_edges(&self, network: &Network) -> NetResult<Vec<PolygonEdge>> {
        let k = self.degree();
        let kinds = self.branch_kinds(network)?;
        let g = self.branch_conductances(network)?;

        let all_open = kinds.iter().all(|k| *k == ElementKind::Open);
        let all_bridged = kinds.iter().all(|k| *k == ElementKind::Bridged);
        let any_bridged = kinds.iter().any(|k| *k == ElementKind::Bridged);
        let bridge_count = kinds.iter().filter(|k| **k == ElementKind::Bridged).count();

        let mut edges = Vec::with_capacity(self.pair_count());
        if all_open {
            for _ in 0..self.pair_count() {
                edges.push(PolygonEdge::Open);
            }
            return Ok(edges);
        }
        if all_bridged {
            for _ in 0..self.pair_count() {
                edges.push(PolygonEdge::Bridged);
            }
            return Ok(edges);
        }

        if any_bridged {
            // Mixed bridges: non-bridged pairs -> Open; both-bridged pairs
            // -> Bridged; mixed pairs -> empirical G = G_nonbridged /
            // number_of_bridges (spec §4.4, §9 Open Question 1: implemented
            // verbatim as the source's stated rule).
            for i in 0..k {
                for j in (i + 1)..k {
                    let bi = kinds[i] == ElementKind::Bridged;
                    let bj = kinds[j] == ElementKind::Bridged;
                    edges.push(match (bi, bj) {
                        (true, true) => PolygonEdge::Bridged,
                        (false, false) => PolygonEdge::Open,
                        (true, false) => PolygonEdge::Conductance(nonzero_or_open(g[j] / bridge_count as Real)),
                        (false, true) => PolygonEdge::Conductance(nonzero_or_open(g[i] / bridge_count as Real)),
                    });
                }
            }
            return Ok(edges);
        }

        let sum_g: Real = g.iter().sum();
        // Any one branch open: every polygon edge incident to its outer
        // node becomes Open; survivors use the standard formula restricted
        // to the non-open branches (spec §4.4).
        let open_idx: Vec<usize> = (0..k).filter(|&i| kinds[i] == ElementKind::Open).collect();
        let survivors_sum: Real = (0..k).filter(|i| kinds[*i] != ElementKind::Open).map(|i| g[i]).sum();
        for i in 0..k {
            for j in (i + 1)..k {
                if open_idx.contains(&i) || open_idx.contains(&j) {
                    edges.push(PolygonEdge::Open);
                } else {
                    let denom = if open_idx.is_empty() { sum_g } else { survivors_sum };
                    edges.push(PolygonEdge::Conductance(nonzero_or_open(g[i] * g[j] / denom)));
                }
            }
        }
        Ok(edges)
    }

    /// Recomputes this tick's polygon edges against possibly-changed branch
    /// parameters, without re-detecting the star (topology is immutable
    /// after setup; spec §3 Child Network).
    pub fn recompute(&self, network: &Network) -> NetResult<Vec<PolygonEdge>> {
        self.forward_edges(network)
    }

    /// Back-transform (spec §4.4): the star node's effort is the
    /// weighted-admittance mean of its outer nodes' efforts, skipping opens.
    /// Special cascades mirror the forward rules.
    pub fn back_transform(&self, network: &mut Network, tol: Tolerances) -> NetResult<bool> {
        let kinds = self.branch_kinds(network)?;
        let already = network.node(self.star_node)?.effort_updated();
        if already {
            return Ok(false);
        }

        let all_open = kinds.iter().all(|k| *k == ElementKind::Open);
        if all_open {
            // §9 Open Question 2: pinned to the arithmetic mean over all k
            // outer efforts (not k-1), uniformly for every transform arity.
            let mut sum = 0.0;
            let mut count = 0;
            for &n in &self.outer_nodes {
                if let Some(e) = network.node(n)?.get_effort() {
                    sum += e;
                    count += 1;
                }
            }
            if count > 0 {
                let mean = sum / count as Real;
                warn!(
                    star = self.star_node.index(),
                    "all-open star back-transform: arithmetic mean pseudo-solution (spec §4.4, §9)"
                );
                network.node_mut(self.star_node)?.set_effort(mean, None, false, tol)?;
                return Ok(true);
            }
            return Ok(false);
        }

        let single_bridged = kinds.iter().filter(|k| **k == ElementKind::Bridged).count() == 1;
        if single_bridged {
            let idx = kinds.iter().position(|k| *k == ElementKind::Bridged).unwrap();
            if let Some(e) = network.node(self.outer_nodes[idx])?.get_effort() {
                network.node_mut(self.star_node)?.set_effort(e, None, false, tol)?;
                return Ok(true);
            }
            return Ok(false);
        }

        let g = self.branch_conductances(network)?;
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (i, &n) in self.outer_nodes.iter().enumerate() {
            if kinds[i] == ElementKind::Open {
                continue;
            }
            if let Some(e) = network.node(n)?.get_effort() {
                weighted_sum += g[i] * e;
                weight_total += g[i];
            }
        }
        if weight_total > 0.0 {
            let mean = weighted_sum / weight_total;
            network.node_mut(self.star_node)?.set_effort(mean, None, false, tol)?;
            return Ok(true);
        }
        Ok(false)
    }
}

fn nonzero_or_open(g: Real) -> Real {
    if g.is_finite() { g } else { 0.0 }
}

/// One polygon edge's computed state, produced by `TransformRecord::build`
/// before the edge elements are materialized into a child network.
#[derive(Clone, Copy, Debug)]
pub enum PolygonEdge {
    Open,
    Bridged,
    Conductance(Real),
}

/// Constructs a k=3 star→delta transform (spec §4.4 `StarDelta`).
pub fn star_delta(network: &Network, node: NodeId) -> NetResult<Option<(TransformRecord, Vec<PolygonEdge>)>> {
    star_polygon_of_degree(network, node, 3)
}

/// Constructs a k=4 star→square transform (spec §4.4 `StarSquare`, "6
/// resistors including two diagonals" — the two diagonals are simply two of
/// the six pairwise polygon edges; no separate math is needed).
pub fn star_square(network: &Network, node: NodeId) -> NetResult<Option<(TransformRecord, Vec<PolygonEdge>)>> {
    star_polygon_of_degree(network, node, 4)
}

/// Constructs the generalized k≥5 star→polygon transform (spec §4.4
/// `StarPolygonTransform`).
pub fn star_polygon(network: &Network, node: NodeId, degree: usize) -> NetResult<Option<(TransformRecord, Vec<PolygonEdge>)>> {
    star_polygon_of_degree(network, node, degree)
}

fn star_polygon_of_degree(
    network: &Network,
    node: NodeId,
    degree: usize,
) -> NetResult<Option<(TransformRecord, Vec<PolygonEdge>)>> {
    match TransformRecord::detect(network, node, degree)? {
        Some(branches) => Ok(Some(TransformRecord::build(network, node, branches)?)),
        None => Ok(None),
    }
}
