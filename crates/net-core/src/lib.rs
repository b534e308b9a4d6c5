//! net-core: stable foundation for the network solver core.
//!
//! Contains:
//! - ids (stable compact IDs for graph/model objects)
//! - numeric (Real + tolerances + float helpers)
//! - domain (physical-domain tags for node/element analogies)
//! - error (shared error taxonomy: ModelError / CalculationError / NoFlowThrough)

pub mod domain;
pub mod error;
pub mod ids;
pub mod numeric;

// Re-exports: nice ergonomics for downstream crates
pub use domain::DomainTag;
pub use error::{NetError, NetResult};
pub use ids::*;
pub use numeric::*;
