//! Interface boundary to the tensor-compute backend.
//!
//! The compiler only *constructs* target graphs; turning a finished graph
//! into something that runs on actual hardware is the backend's job. A
//! backend receives the graph plus the chosen named output set and returns an
//! opaque executable exposing named-input -> named-output invocation. Feeds
//! and results are keyed by the *assigned* (sanitized) tensor names; the
//! [`CompiledGraph`](crate::CompiledGraph) wrapper translates between
//! original and assigned names for callers.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::graph::{Graph, TensorId, TensorSpec};

/// Backend-reported failure, either at compile or at execution time.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend compilation failed: {0}")]
    Compile(String),
    #[error("backend execution failed: {0}")]
    Execution(String),
}

impl BackendError {
    pub fn compile(reason: impl Into<String>) -> Self {
        BackendError::Compile(reason.into())
    }

    pub fn execution(reason: impl Into<String>) -> Self {
        BackendError::Execution(reason.into())
    }
}

/// Dense host-side tensor data exchanged with executables. Host payloads are
/// always f32; the graph-internal element type is a backend concern.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTensor {
    pub dims: Vec<usize>,
    pub data: Vec<f32>,
}

impl HostTensor {
    pub fn new(dims: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(dims.iter().product::<usize>(), data.len());
        HostTensor { dims, data }
    }

    pub fn zeros(dims: Vec<usize>) -> Self {
        let count = dims.iter().product();
        HostTensor {
            dims,
            data: vec![0.0; count],
        }
    }

    pub fn scalar(value: f32) -> Self {
        HostTensor {
            dims: vec![1],
            data: vec![value],
        }
    }

    pub fn element_count(&self) -> usize {
        self.data.len()
    }
}

/// A compiled, immutable executable produced by a backend.
///
/// Created once at compile time, reused for every invocation; using a
/// finished executable from multiple threads is safe.
pub trait Executable: Send + Sync {
    /// Input placeholder specs keyed by assigned name.
    fn input_specs(&self) -> &BTreeMap<String, TensorSpec>;

    /// Output specs keyed by the names chosen at compile time.
    fn output_specs(&self) -> &BTreeMap<String, TensorSpec>;

    /// Runs the executable. Every input named by [`Executable::input_specs`]
    /// must be present in `feeds` with a matching element count.
    fn run(&self, feeds: &HashMap<String, HostTensor>)
        -> Result<HashMap<String, HostTensor>, BackendError>;
}

/// A tensor-compute device capable of compiling target graphs.
pub trait TensorBackend: Send + Sync {
    type Executable: Executable;

    /// Human-readable backend identifier (e.g. `"ref-cpu"`).
    fn name(&self) -> &str;

    /// Stable identity of the underlying device, used to key caches of
    /// compiled artifacts.
    fn device_id(&self) -> u64;

    /// Compiles a finished graph with the given named output tensors.
    /// Compilation is synchronous; there are no internal timeouts.
    fn compile(
        &self,
        graph: Graph,
        outputs: &BTreeMap<String, TensorId>,
    ) -> Result<Self::Executable, BackendError>;
}
