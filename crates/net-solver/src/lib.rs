//! Steady-state network solver for thermal-fluid, phased, and electrical
//! analogy networks.
//!
//! A tick runs the graph-surgery pipeline spec §4 lays out: a [`decomposer`]
//! partitions the whole graph into self-solving resistors and bounded
//! subnets, each subnet is reduced by the [`recursive_simplifier`] (fusing
//! dead ends and series/parallel runs, applying [`transform`]'s star-polygon
//! rewrites where a direct fusion can't reach a terminal shape), a storage
//! subnet is translated to a pure electrical twin by [`transfer`] before
//! solving, and a source-bearing linear subnet is solved by
//! [`superposition`] over one [`overlay`] per source. [`propagation`] is the
//! fixed-point sweep that both closes out a reduced network and serves as
//! the whole-graph "last iterator" pass.

pub mod child_network;
pub mod config;
pub mod decomposer;
pub mod error;
pub mod overlay;
pub mod pool;
pub mod propagation;
pub mod recursive_simplifier;
pub mod simplified_resistor;
pub mod small_case;
pub mod superposition;
pub mod transfer;
pub mod transform;

pub use child_network::{ChildNetwork, ElementOrigin};
pub use config::{PROPAGATION_ITERATION_CAP, RECURSION_DEPTH_CAP, VALIDATION_TOLERANCE, default_tolerances};
pub use decomposer::Decomposition;
pub use error::{SolverError, SolverResult};
pub use overlay::Overlay;
pub use pool::WorkerPool;
pub use propagation::propagate;
pub use recursive_simplifier::RecursiveSimplifier;
pub use simplified_resistor::{FusionKind, SimplifiedResistor};
pub use small_case::solve_terminal;
pub use superposition::solve_by_superposition;
pub use transfer::TransferSubnet;
pub use transform::{PolygonEdge, TransformRecord, star_delta, star_polygon, star_square};
