use thiserror::Error;

pub type NetResult<T> = Result<T, NetError>;

/// Shared failure taxonomy for the network solver core (spec §6/§7).
///
/// `ModelError` covers setup and topology violations (fatal, abort the
/// tick). `CalculationError` covers numerical inconsistencies detected
/// mid-tick (recoverable: the solver logs a WARNING and proceeds with
/// the first-written value). `NoFlowThrough` is the specific failure of
/// a 2-connection navigation helper (`only_other_node`,
/// `only_other_element`) applied to an object that does not have exactly
/// two connections.
#[derive(Error, Debug, Clone)]
pub enum NetError {
    #[error("non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("index out of bounds: {what} (index={index}, len={len})")]
    IndexOob {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("model error: {what}")]
    ModelError { what: String },

    #[error("calculation error: {what}")]
    CalculationError { what: String },

    #[error("no flow through: {what} does not have exactly two connections (has {count})")]
    NoFlowThrough { what: &'static str, count: usize },
}

impl NetError {
    pub fn model(what: impl Into<String>) -> Self {
        NetError::ModelError { what: what.into() }
    }

    pub fn calculation(what: impl Into<String>) -> Self {
        NetError::CalculationError { what: what.into() }
    }
}
