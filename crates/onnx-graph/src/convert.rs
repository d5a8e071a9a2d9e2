//! Memoized auxiliary conversion graphs for data-boundary adaptation.
//!
//! Converting external data into a graph's expected layout (a resize, a
//! transpose, a cast) is itself a tiny target graph, and compiling one is
//! costly relative to running it. [`TensorConverter`] memoizes these graphs
//! in an LRU cache keyed by `(device, input shape, input dtype, ordered step
//! names)`; equal keys guarantee a behaviorally interchangeable executable.
//!
//! The converter is shared mutable state: `transform` serializes the
//! hit-check, miss-build and insertion under one lock so a race never builds
//! the same key twice. Contention only costs latency, never correctness.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::debug;

use crate::backend::{Executable, HostTensor, TensorBackend};
use crate::error::{GraphError, OnnxError};
use crate::graph::{DType, Graph, TensorId, TensorSpec};

/// One named conversion applied to the running tensor.
///
/// The name is part of the cache key, so two steps with the same name must
/// emit the same graph fragment for a given input.
pub struct ConversionStep {
    name: String,
    apply: Box<dyn Fn(&mut Graph, TensorId) -> Result<TensorId, GraphError> + Send + Sync>,
}

impl ConversionStep {
    pub fn new(
        name: impl Into<String>,
        apply: impl Fn(&mut Graph, TensorId) -> Result<TensorId, GraphError> + Send + Sync + 'static,
    ) -> Self {
        ConversionStep {
            name: name.into(),
            apply: Box::new(apply),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConversionKey {
    device_id: u64,
    dims: Vec<usize>,
    dtype: DType,
    steps: Vec<String>,
}

/// Conversion-graph cache bound to one backend device.
///
/// Construct one per device (or share process-wide behind an `Arc`); tests
/// should instantiate fresh converters instead of relying on globals.
pub struct TensorConverter<B: TensorBackend> {
    backend: Arc<B>,
    cache: Mutex<LruCache<ConversionKey, Arc<B::Executable>>>,
}

impl<B: TensorBackend> TensorConverter<B> {
    /// Default entry capacity; the practical key space is the handful of
    /// distinct (shape, dtype, step list) tuples an application touches.
    pub const DEFAULT_CAPACITY: usize = 42;

    pub fn new(backend: Arc<B>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least one");
        TensorConverter {
            backend,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn with_default_capacity(backend: Arc<B>) -> Self {
        Self::new(backend, Self::DEFAULT_CAPACITY)
    }

    /// Number of memoized conversion graphs.
    pub fn cached(&self) -> usize {
        self.cache.lock().expect("converter cache poisoned").len()
    }

    /// Applies `steps` in order to `input`, reusing the memoized executable
    /// for the `(device, shape, dtype, steps)` key when one exists. An empty
    /// step list is a pass-through and never touches the cache.
    pub fn transform(
        &self,
        input: &HostTensor,
        dtype: DType,
        steps: &[ConversionStep],
    ) -> Result<HostTensor, OnnxError> {
        if steps.is_empty() {
            return Ok(input.clone());
        }

        let key = ConversionKey {
            device_id: self.backend.device_id(),
            dims: input.dims.clone(),
            dtype,
            steps: steps.iter().map(|step| step.name.clone()).collect(),
        };

        let executable = {
            let mut cache = self.cache.lock().expect("converter cache poisoned");
            match cache.get(&key) {
                Some(executable) => Arc::clone(executable),
                None => {
                    debug!(steps = ?key.steps, "building conversion graph");
                    let executable = Arc::new(self.build(input, dtype, steps)?);
                    cache.put(key, Arc::clone(&executable));
                    executable
                }
            }
        };

        let mut feeds = HashMap::with_capacity(1);
        feeds.insert("X".to_string(), input.clone());
        let mut outputs = executable.run(&feeds)?;
        outputs
            .remove("Y")
            .ok_or_else(|| OnnxError::invalid_model("conversion graph produced no output"))
    }

    fn build(
        &self,
        input: &HostTensor,
        dtype: DType,
        steps: &[ConversionStep],
    ) -> Result<B::Executable, OnnxError> {
        let mut graph = Graph::new();
        let mut tensor = graph
            .placeholder("X", TensorSpec::new(dtype, input.dims.clone()))
            .map_err(OnnxError::from)?;
        for step in steps {
            tensor = (step.apply)(&mut graph, tensor)?;
        }
        let mut outputs = BTreeMap::new();
        outputs.insert("Y".to_string(), tensor);
        Ok(self.backend.compile(graph, &outputs)?)
    }
}
