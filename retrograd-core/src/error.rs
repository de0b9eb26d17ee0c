use thiserror::Error;

/// Custom error type for the RetroGrad engine.
#[derive(Error, Debug, PartialEq, Clone)] // PartialEq for easier testing
pub enum GradError {
    #[error("Shape mismatch: expected {expected:?}, got {actual:?} during operation {operation}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
        operation: String,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual} during operation {operation}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        operation: String,
    },

    #[error("Incompatible shapes for operation {operation}: {shape1:?} and {shape2:?}")]
    IncompatibleShapes {
        shape1: Vec<usize>,
        shape2: Vec<usize>,
        operation: String,
    },

    #[error("Invalid permutation: dims {dims:?} are not a valid permutation for rank {rank}")]
    InvalidPermutation { dims: Vec<usize>, rank: usize },

    #[error("Index out of bounds: index {index:?} for shape {shape:?}")]
    IndexOutOfBounds {
        index: Vec<usize>,
        shape: Vec<usize>,
    },

    #[error("Container creation error: data length {data_len} does not match shape {shape:?}")]
    CreationError { data_len: usize, shape: Vec<usize> },

    #[error("Operation {operation} expected {expected} operand(s), got {actual}")]
    OperandCountMismatch {
        expected: usize,
        actual: usize,
        operation: String,
    },

    #[error("Invalid state for operation {operation}: {reason}")]
    InvalidState { operation: String, reason: String },

    #[error("No checkpoint stored under id {id}")]
    CheckpointNotFound { id: u64 },

    #[error("Non-finite value detected during operation {operation}")]
    NonFiniteValue { operation: String },

    #[error("Cannot stack an empty list of matrices")]
    EmptyMatrixList,

    #[error("Slice error: {message}")]
    SliceError { message: String },

    #[error("Deserialization error: {message}")]
    Deserialize { message: String },

    #[error("Compute backend error: {message}")]
    Backend { message: String },
}
