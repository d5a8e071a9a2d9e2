//! Failure taxonomy for graph compilation and pipeline execution.
//!
//! Every variant is fatal to the enclosing compile or run: the compiler is a
//! one-shot translation with no partial or best-effort mode.

use thiserror::Error;

use crate::backend::BackendError;
use crate::model::ElementType;

/// Errors surfaced while compiling or running an ONNX model.
#[derive(Debug, Error)]
pub enum OnnxError {
    /// The model references a tensor that is never produced, lacks shape
    /// metadata required for a custom node, or is otherwise inconsistent.
    #[error("invalid model: {reason}")]
    InvalidModel { reason: String },

    /// The dispatch table has no translator for this operator kind and no
    /// custom step is registered for it.
    #[error("unsupported operator {0:?}")]
    UnsupportedOperator(String),

    /// A translator's structural precondition failed: a required input or
    /// attribute is missing, has the wrong rank, or cannot be parsed.
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    /// A constant's element type cannot be represented at the requested
    /// precision.
    #[error("unsupported element type {source_type:?} for target {target:?}")]
    UnsupportedElementType {
        source_type: ElementType,
        target: crate::graph::DType,
    },

    /// A caller-supplied custom step violated its contract (wrong output
    /// count, shape mismatch against the declared value info).
    #[error("incorrect custom step for {op_type:?}: {reason}")]
    IncorrectCustomStep { op_type: String, reason: String },

    /// A custom step's `evaluate` failed; the underlying error is propagated
    /// verbatim.
    #[error("custom step evaluation failed")]
    Eval(#[source] anyhow::Error),

    /// The tensor backend rejected compilation or execution.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl OnnxError {
    pub fn invalid_model(reason: impl Into<String>) -> Self {
        OnnxError::InvalidModel {
            reason: reason.into(),
        }
    }
}

/// Structural errors raised while emitting target-graph operations.
///
/// These indicate that an operation's operands do not fit together
/// (broadcast failure, bad permutation, rank mismatch). At the compilation
/// boundary they are reported as [`OnnxError::UnsupportedInput`]. Custom
/// steps and conversion steps may construct their own when they extend the
/// graph.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct GraphError(String);

impl GraphError {
    pub fn new(message: impl Into<String>) -> Self {
        GraphError(message.into())
    }
}

impl From<GraphError> for OnnxError {
    fn from(err: GraphError) -> Self {
        OnnxError::UnsupportedInput(err.0)
    }
}
