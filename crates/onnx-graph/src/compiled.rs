//! Backend executable wrapper with name remapping.

use std::collections::{BTreeMap, HashMap};

use rand::Rng;
use tracing::debug;

use crate::backend::{Executable, HostTensor, TensorBackend};
use crate::build::BuildState;
use crate::config::GraphConfig;
use crate::error::OnnxError;
use crate::graph::{Graph, TensorId, TensorSpec};
use crate::model::Model;

/// A model compiled for one backend device.
///
/// Wraps the backend executable together with the bidirectional name remap
/// between the model's original tensor names and the backend-safe assigned
/// names, so callers keep addressing tensors by their ONNX names no matter
/// how the backend normalizes identifiers.
pub struct CompiledGraph<B: TensorBackend> {
    executable: B::Executable,
    /// original placeholder name -> assigned name
    feed_names: HashMap<String, String>,
    input_specs: BTreeMap<String, TensorSpec>,
    output_specs: BTreeMap<String, TensorSpec>,
}

impl<B: TensorBackend> std::fmt::Debug for CompiledGraph<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("feed_names", &self.feed_names)
            .field("input_specs", &self.input_specs)
            .field("output_specs", &self.output_specs)
            .finish()
    }
}

impl<B: TensorBackend> CompiledGraph<B> {
    /// Compiles `model` into a single executable.
    ///
    /// Drives one topological pass over the node list; an unknown operator
    /// kind fails the whole compile with
    /// [`UnsupportedOperator`](OnnxError::UnsupportedOperator).
    pub fn compile(model: &Model, backend: &B, config: &GraphConfig) -> Result<Self, OnnxError> {
        let mut state = BuildState::new(model, config);
        state.bind_placeholders(config)?;

        for node in model.nodes() {
            state.materialize_initializers(node)?;
            if !state.translate(node)? {
                return Err(OnnxError::UnsupportedOperator(node.op_type().to_string()));
            }
        }

        let outputs = state.resolve_outputs(config)?;
        let graph = state.take_segment();
        debug!(
            backend = backend.name(),
            nodes = graph.nodes().len(),
            "compiling graph"
        );
        Self::from_graph(backend, graph, outputs)
    }

    /// Compiles an already-built target graph with a chosen output set.
    pub(crate) fn from_graph(
        backend: &B,
        graph: Graph,
        outputs: BTreeMap<String, TensorId>,
    ) -> Result<Self, OnnxError> {
        let mut feed_names = HashMap::new();
        let mut input_specs = BTreeMap::new();
        for placeholder in graph.placeholders() {
            feed_names.insert(placeholder.requested.clone(), placeholder.assigned.clone());
            input_specs.insert(
                placeholder.requested.clone(),
                graph.spec(placeholder.id).clone(),
            );
        }
        let output_specs: BTreeMap<String, TensorSpec> = outputs
            .iter()
            .map(|(name, &id)| (name.clone(), graph.spec(id).clone()))
            .collect();

        let executable = backend.compile(graph, &outputs)?;
        Ok(CompiledGraph {
            executable,
            feed_names,
            input_specs,
            output_specs,
        })
    }

    /// Input specs keyed by original tensor name.
    pub fn input_specs(&self) -> &BTreeMap<String, TensorSpec> {
        &self.input_specs
    }

    /// Output specs keyed by original tensor name.
    pub fn output_specs(&self) -> &BTreeMap<String, TensorSpec> {
        &self.output_specs
    }

    /// The backend-assigned name for an original placeholder name.
    pub fn assigned_name(&self, original: &str) -> Option<&str> {
        self.feed_names.get(original).map(String::as_str)
    }

    /// Convenience for single-input graphs.
    pub fn input_name(&self) -> Option<&str> {
        (self.input_specs.len() == 1)
            .then(|| self.input_specs.keys().next().map(String::as_str))
            .flatten()
    }

    /// Convenience for single-output graphs.
    pub fn output_name(&self) -> Option<&str> {
        (self.output_specs.len() == 1)
            .then(|| self.output_specs.keys().next().map(String::as_str))
            .flatten()
    }

    /// Runs the executable with inputs keyed by original (or assigned)
    /// names; outputs come back under the original names.
    pub fn run(
        &self,
        inputs: &HashMap<String, HostTensor>,
    ) -> Result<HashMap<String, HostTensor>, OnnxError> {
        let mut feeds = HashMap::with_capacity(self.feed_names.len());
        for (original, assigned) in &self.feed_names {
            let tensor = inputs
                .get(original)
                .or_else(|| inputs.get(assigned))
                .ok_or_else(|| {
                    OnnxError::invalid_model(format!("missing input tensor {original:?}"))
                })?;
            feeds.insert(assigned.clone(), tensor.clone());
        }
        Ok(self.executable.run(&feeds)?)
    }

    /// Runs the graph once with uniform-random inputs to pay one-time
    /// execution costs up front. Not part of the deterministic surface.
    pub fn warm_up(&self) -> Result<(), OnnxError> {
        let mut rng = rand::thread_rng();
        let mut inputs = HashMap::new();
        for (name, spec) in &self.input_specs {
            let count = spec.element_count();
            let data: Vec<f32> = (0..count).map(|_| rng.gen_range(0.0..1.0)).collect();
            inputs.insert(name.clone(), HostTensor::new(spec.dims.clone(), data));
        }
        self.run(&inputs).map(|_| ())
    }
}
