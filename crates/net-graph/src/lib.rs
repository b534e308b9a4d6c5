//! net-graph: graph primitives for the network solver core (spec §3, §4.1).
//!
//! Arena-based: nodes and elements live in flat vectors inside `Network`,
//! addressed by stable `NodeId`/`ElementId` handles from net-core.
//! Connectivity is stored as index lists in both directions, which is what
//! makes child networks cheap to build on top (net-solver).
//!
//! # Example
//!
//! ```
//! use net_core::DomainTag;
//! use net_graph::{ElementKind, NetworkBuilder};
//!
//! let mut builder = NetworkBuilder::new();
//! let n1 = builder.add_node("n1", DomainTag::Electrical);
//! let n2 = builder.add_node("n2", DomainTag::Electrical);
//! let r1 = builder.add_element("r1", DomainTag::Electrical, ElementKind::Dissipator);
//! builder.connect_between(r1, n1, n2).unwrap();
//! let network = builder.build().unwrap();
//!
//! assert_eq!(network.node_count(), 2);
//! assert_eq!(network.element_count(), 1);
//! ```

pub mod builder;
pub mod element;
pub mod error;
pub mod kind;
pub mod network;
pub mod node;
pub(crate) mod validate;

// Re-exports for ergonomics
pub use builder::NetworkBuilder;
pub use element::Element;
pub use error::{GraphError, GraphResult};
pub use kind::{ElementKind, NodeCountRequirement};
pub use network::Network;
pub use node::Node;
