//! Custom-operator pipeline: backend-compiled segments interleaved with
//! caller-supplied steps.
//!
//! When the dispatch table misses an operator kind for which the caller has
//! registered a [`CustomStep`], the graph is split at that node: everything
//! before it becomes a backend-compiled segment whose outputs are the
//! liveness-derived alive set, the custom node becomes an opaque host step,
//! and compilation continues into a fresh segment seeded with placeholders
//! for the alive tensors. With an empty step map the pipeline degenerates to
//! a single segment and behaves exactly like the plain compiler.

mod split;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::attrs::AttributeReader;
use crate::backend::{HostTensor, TensorBackend};
use crate::build::BuildState;
use crate::compiled::CompiledGraph;
use crate::config::GraphConfig;
use crate::error::{GraphError, OnnxError};
use crate::graph::{DType, Graph, TensorId, TensorSpec};
use crate::model::{Model, Node};

/// Caller-supplied implementation for an operator kind unknown to the
/// dispatch table.
pub trait CustomStep: Send + Sync {
    /// Adapts one segment output right before the boundary (e.g. a layout
    /// change the host step expects). Defaults to the identity.
    fn preprocess(
        &self,
        _graph: &mut Graph,
        input: TensorId,
        _input_name: &str,
    ) -> Result<TensorId, GraphError> {
        Ok(input)
    }

    /// Creates the placeholder re-introducing one host-produced output into
    /// the next segment, returning `(placeholder, tensor)`. The returned
    /// tensor may differ from the placeholder when the step wants an adapter
    /// subgraph after it; its shape must match the declared one.
    fn postprocess(
        &self,
        graph: &mut Graph,
        output_name: &str,
        dims: &[usize],
        dtype: DType,
    ) -> Result<(TensorId, TensorId), GraphError> {
        let id = graph.placeholder(output_name, TensorSpec::new(dtype, dims.to_vec()))?;
        Ok((id, id))
    }

    /// Evaluates the step on host tensors. Must return exactly one tensor
    /// per declared node output, each matching its declared shape.
    fn evaluate(
        &self,
        inputs: &[HostTensor],
        output_shapes: &[Vec<usize>],
        attrs: &dyn AttributeReader,
    ) -> anyhow::Result<Vec<HostTensor>>;
}

struct CustomRecord {
    node: Node,
    output_shapes: Vec<Vec<usize>>,
}

enum PipelineStep<B: TensorBackend> {
    Segment(CompiledGraph<B>),
    Custom(CustomRecord),
}

/// An ordered sequence of compiled segments and custom steps, behaving like
/// one executable with named inputs and outputs.
pub struct Pipeline<B: TensorBackend> {
    steps: Vec<PipelineStep<B>>,
    custom_steps: HashMap<String, Arc<dyn CustomStep>>,
}

impl<B: TensorBackend> std::fmt::Debug for Pipeline<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.steps.len())
            .field("custom_steps", &self.custom_steps.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<B: TensorBackend> Pipeline<B> {
    /// Compiles `model`, splitting at every node whose kind appears in
    /// `custom_steps`.
    pub fn compile(
        model: &Model,
        backend: &B,
        custom_steps: HashMap<String, Arc<dyn CustomStep>>,
        config: &GraphConfig,
    ) -> Result<Self, OnnxError> {
        let split_result = if custom_steps.is_empty() {
            HashMap::new()
        } else {
            let kinds: HashSet<String> = custom_steps.keys().cloned().collect();
            model.split_points(&kinds)
        };

        let mut state = BuildState::new(model, config);
        state.bind_placeholders(config)?;

        let mut steps: Vec<PipelineStep<B>> = Vec::new();

        for node in model.nodes() {
            state.materialize_initializers(node)?;
            if state.translate(node)? {
                continue;
            }

            // dispatch miss: look up a caller-provided implementation
            let (custom, alive) = match (
                custom_steps.get(node.op_type()),
                split_result.get(node.name()),
            ) {
                (Some(custom), Some(alive)) => (custom, alive),
                _ => return Err(OnnxError::UnsupportedOperator(node.op_type().to_string())),
            };
            debug!(
                node = node.name(),
                kind = node.op_type(),
                alive = alive.len(),
                "splitting at custom node"
            );

            // let the step adapt its inputs inside the finishing segment
            for name in node.inputs() {
                if name.is_empty() {
                    continue;
                }
                let id = state.tensors.get(name).ok_or_else(|| {
                    OnnxError::invalid_model(format!("tensor named {name:?} not found"))
                })?;
                let adapted = custom.preprocess(&mut state.graph, id, name)?;
                state.tensors.bind(name, adapted);
            }

            // the alive set is the segment's output contract
            let mut outputs = BTreeMap::new();
            let mut carried: Vec<(String, TensorSpec)> = Vec::with_capacity(alive.len());
            for name in alive {
                let id = state.tensors.get(name).ok_or_else(|| {
                    OnnxError::invalid_model(format!(
                        "alive tensor {name:?} is not bound at the boundary"
                    ))
                })?;
                outputs.insert(name.clone(), id);
                carried.push((name.clone(), state.graph.spec(id).clone()));
            }

            let segment = state.take_segment();
            steps.push(PipelineStep::Segment(CompiledGraph::from_graph(
                backend, segment, outputs,
            )?));

            // seed the next segment: placeholders for every carried tensor
            for (name, spec) in carried {
                let id = state
                    .graph
                    .placeholder(&name, spec)
                    .map_err(|err| OnnxError::invalid_model(err.to_string()))?;
                state.tensors.bind(&name, id);
            }

            // host-produced outputs re-enter through declared value info
            let mut output_shapes = Vec::with_capacity(node.outputs().len());
            for name in node.outputs() {
                let info = model.value_info(name).ok_or_else(|| {
                    OnnxError::invalid_model(format!("shaped tensor named {name:?} not found"))
                })?;
                let mut dims = Vec::with_capacity(info.dims.len());
                for &extent in &info.dims {
                    if extent < 1 {
                        return Err(OnnxError::invalid_model(format!(
                            "shaped tensor named {name:?} has a symbolic extent"
                        )));
                    }
                    dims.push(extent as usize);
                }

                let dtype = state.dtype();
                let (_placeholder, tensor) =
                    custom.postprocess(&mut state.graph, name, &dims, dtype)?;
                if state.graph.spec(tensor).dims != dims {
                    return Err(OnnxError::IncorrectCustomStep {
                        op_type: node.op_type().to_string(),
                        reason: format!(
                            "shape of tensor named {name:?} does not match the declared {dims:?}"
                        ),
                    });
                }
                state.tensors.bind(name, tensor);
                output_shapes.push(dims);
            }

            steps.push(PipelineStep::Custom(CustomRecord {
                node: node.clone(),
                output_shapes,
            }));
        }

        // final segment exposes the model outputs
        let outputs = state.resolve_outputs(config)?;
        let segment = state.take_segment();
        steps.push(PipelineStep::Segment(CompiledGraph::from_graph(
            backend, segment, outputs,
        )?));

        Ok(Pipeline {
            steps,
            custom_steps,
        })
    }

    fn first_segment(&self) -> &CompiledGraph<B> {
        match self.steps.first() {
            Some(PipelineStep::Segment(segment)) => segment,
            _ => unreachable!("pipeline always starts with a compiled segment"),
        }
    }

    fn last_segment(&self) -> &CompiledGraph<B> {
        match self.steps.last() {
            Some(PipelineStep::Segment(segment)) => segment,
            _ => unreachable!("pipeline always ends with a compiled segment"),
        }
    }

    /// Input specs keyed by original tensor name.
    pub fn input_specs(&self) -> &BTreeMap<String, TensorSpec> {
        self.first_segment().input_specs()
    }

    /// Output specs keyed by original tensor name.
    pub fn output_specs(&self) -> &BTreeMap<String, TensorSpec> {
        self.last_segment().output_specs()
    }

    /// Convenience for single-input pipelines.
    pub fn input_name(&self) -> Option<&str> {
        self.first_segment().input_name()
    }

    /// Convenience for single-output pipelines.
    pub fn output_name(&self) -> Option<&str> {
        self.last_segment().output_name()
    }

    /// Number of backend-compiled segments.
    pub fn segment_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step, PipelineStep::Segment(_)))
            .count()
    }

    /// Runs the pipeline, alternating segment execution with custom step
    /// evaluation. Signature-compatible with [`CompiledGraph::run`].
    pub fn run(
        &self,
        inputs: &HashMap<String, HostTensor>,
    ) -> Result<HashMap<String, HostTensor>, OnnxError> {
        let mut values = inputs.clone();

        for step in &self.steps {
            match step {
                PipelineStep::Segment(segment) => {
                    // a segment's outputs are the complete alive set, so
                    // earlier values are dropped on purpose
                    values = segment.run(&values)?;
                }
                PipelineStep::Custom(record) => {
                    let node = &record.node;
                    let custom = &self.custom_steps[node.op_type()];

                    let mut step_inputs = Vec::with_capacity(node.inputs().len());
                    for name in node.inputs() {
                        if name.is_empty() {
                            continue;
                        }
                        let value = values.get(name).ok_or_else(|| {
                            OnnxError::IncorrectCustomStep {
                                op_type: node.op_type().to_string(),
                                reason: format!("input named {name:?} not found"),
                            }
                        })?;
                        step_inputs.push(value.clone());
                    }

                    let step_outputs = custom
                        .evaluate(&step_inputs, &record.output_shapes, node)
                        .map_err(OnnxError::Eval)?;

                    if step_outputs.len() != node.outputs().len() {
                        return Err(OnnxError::IncorrectCustomStep {
                            op_type: node.op_type().to_string(),
                            reason: "unexpected number of outputs".to_string(),
                        });
                    }
                    for ((name, declared), tensor) in node
                        .outputs()
                        .iter()
                        .zip(&record.output_shapes)
                        .zip(step_outputs)
                    {
                        if &tensor.dims != declared {
                            return Err(OnnxError::IncorrectCustomStep {
                                op_type: node.op_type().to_string(),
                                reason: format!(
                                    "output named {name:?} has shape {:?}, declared {declared:?}",
                                    tensor.dims
                                ),
                            });
                        }
                        values.insert(name.clone(), tensor);
                    }
                }
            }
        }

        Ok(values)
    }

    /// Runs every compiled segment once with uniform-random inputs; custom
    /// steps are skipped. Not part of the deterministic surface.
    pub fn warm_up(&self) -> Result<(), OnnxError> {
        for step in &self.steps {
            if let PipelineStep::Segment(segment) = step {
                segment.warm_up()?;
            }
        }
        Ok(())
    }
}
