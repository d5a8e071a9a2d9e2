//! Single-pass graph construction shared by the plain compiler and the
//! custom-operator pipeline.
//!
//! One left-to-right pass over the (topologically sorted) node list drives
//! everything: initializer constants are materialized lazily on first use,
//! placeholders are bound up front with per-axis overrides and value-range
//! rescales, and each node goes through the dispatch table. Any per-node
//! failure aborts the whole compile.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::config::GraphConfig;
use crate::error::OnnxError;
use crate::graph::{BinaryOp, DType, Graph, TensorId, TensorSpec};
use crate::model::{Model, Node};
use crate::ops::{self, ConstantMap, SymbolTable, Translated, TranslateCx};

pub(crate) struct BuildState<'m> {
    model: &'m Model,
    dtype: DType,
    pub(crate) graph: Graph,
    pub(crate) tensors: SymbolTable,
    pub(crate) constants: ConstantMap<'m>,
}

impl<'m> BuildState<'m> {
    pub(crate) fn new(model: &'m Model, config: &GraphConfig) -> Self {
        BuildState {
            model,
            dtype: config.precision.dtype(),
            graph: Graph::new(),
            tensors: SymbolTable::new(),
            constants: ConstantMap::new(model.initializers()),
        }
    }

    pub(crate) fn dtype(&self) -> DType {
        self.dtype
    }

    fn cx(&mut self) -> TranslateCx<'_, 'm> {
        TranslateCx {
            graph: &mut self.graph,
            tensors: &self.tensors,
            constants: &mut self.constants,
            dtype: self.dtype,
        }
    }

    /// Creates one placeholder per declared external input, applying dim
    /// overrides and the input value-range rescale `y = (hi-lo)*x + lo`.
    pub(crate) fn bind_placeholders(&mut self, config: &GraphConfig) -> Result<(), OnnxError> {
        for input in self.model.inputs() {
            let options = config.inputs.get(&input.name);

            let mut dims = Vec::with_capacity(input.dims.len());
            for (axis, &extent) in input.dims.iter().enumerate() {
                match options.and_then(|o| o.dims.get(&axis)) {
                    Some(&value) => dims.push(value),
                    None if extent > 0 => dims.push(extent as usize),
                    None => {
                        return Err(OnnxError::invalid_model(format!(
                            "input {:?} axis {axis} has symbolic extent and no override",
                            input.name
                        )))
                    }
                }
            }

            let id = self
                .graph
                .placeholder(&input.name, TensorSpec::new(self.dtype, dims))
                .map_err(|err| OnnxError::invalid_model(err.to_string()))?;

            let bound = match options.and_then(|o| o.value_range) {
                Some((lo, hi)) => {
                    let scaled = self.graph.binary_scalar(BinaryOp::Mul, id, hi - lo)?;
                    self.graph.binary_scalar(BinaryOp::Add, scaled, lo)?
                }
                None => id,
            };
            self.tensors.bind(&input.name, bound);
        }
        Ok(())
    }

    /// Lazily materializes initializer constants referenced by `node` that
    /// are not yet bound in the current segment.
    pub(crate) fn materialize_initializers(&mut self, node: &Node) -> Result<(), OnnxError> {
        let model = self.model;
        for name in node.inputs() {
            if name.is_empty() || self.tensors.contains(name) {
                continue;
            }
            if let Some(data) = model.initializer(name) {
                let id = self.cx().materialize(data)?;
                trace!(constant = %name, "materialized initializer");
                self.tensors.bind(name, id);
            }
        }
        Ok(())
    }

    /// Dispatches one node. `Ok(false)` is a dispatch miss: the kind is
    /// unknown and the caller decides between failing and the custom-step
    /// fallback.
    pub(crate) fn translate(&mut self, node: &Node) -> Result<bool, OnnxError> {
        let Some(translator) = ops::lookup(node.op_type()) else {
            return Ok(false);
        };

        let mut cx = TranslateCx {
            graph: &mut self.graph,
            tensors: &self.tensors,
            constants: &mut self.constants,
            dtype: self.dtype,
        };
        match translator(&mut cx, node)? {
            Translated::One(id) => {
                for output in node.outputs() {
                    if !output.is_empty() {
                        self.tensors.bind(output, id);
                    }
                }
            }
            Translated::Many(ids) => {
                if ids.len() != node.outputs().len() {
                    return Err(ops::unsupported(node, "output arity mismatch"));
                }
                for (output, id) in node.outputs().iter().zip(ids) {
                    if !output.is_empty() {
                        self.tensors.bind(output, id);
                    }
                }
            }
        }
        Ok(true)
    }

    /// Resolves every declared graph output to its bound handle, appending
    /// the inverse value-range rescale `y = (x-lo)/(hi-lo)` where configured.
    pub(crate) fn resolve_outputs(
        &mut self,
        config: &GraphConfig,
    ) -> Result<BTreeMap<String, TensorId>, OnnxError> {
        let mut outputs = BTreeMap::new();
        for name in self.model.outputs() {
            let id = self.tensors.get(name).ok_or_else(|| {
                OnnxError::invalid_model(format!("tensor named {name:?} not found"))
            })?;
            let id = match config.outputs.get(name).and_then(|o| o.value_range) {
                Some((lo, hi)) => {
                    let shifted = self.graph.binary_scalar(BinaryOp::Sub, id, lo)?;
                    self.graph.binary_scalar(BinaryOp::Div, shifted, hi - lo)?
                }
                None => id,
            };
            outputs.insert(name.clone(), id);
        }
        debug!(outputs = outputs.len(), "resolved graph outputs");
        Ok(outputs)
    }

    /// Hands out the finished segment graph and starts a fresh one with an
    /// empty symbol table; the constants map carries over.
    pub(crate) fn take_segment(&mut self) -> Graph {
        self.tensors = SymbolTable::new();
        std::mem::take(&mut self.graph)
    }
}
