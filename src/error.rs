//! Error types for tensor, layer and network operations.

use thiserror::Error;

/// Errors raised by the tensor engine, the layers and the network.
///
/// None of these are transient: they describe a structural misconfiguration
/// (wrong shapes, empty layers, mismatched datasets) and abort the operation
/// that hit them.
#[derive(Debug, Error)]
pub enum CnnError {
    /// Two shapes that must agree do not.
    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// An operation that must produce at least one region or map produced none.
    #[error("Empty result: {0}")]
    EmptyResult(String),

    /// Iteration past exhaustion or a write outside the tensor.
    #[error("Bounds violation: {0}")]
    BoundsViolation(String),

    /// Inputs and labels differ in length.
    #[error("Dataset length mismatch: {inputs} inputs but {labels} labels")]
    DatasetLengthMismatch { inputs: usize, labels: usize },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A layer was driven out of order (e.g. backward before a training forward).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CnnError {
    pub(crate) fn shape_mismatch(
        context: impl Into<String>,
        expected: &[usize],
        actual: &[usize],
    ) -> Self {
        CnnError::ShapeMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CnnError>;
