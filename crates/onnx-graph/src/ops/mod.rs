//! Operator translators and the kind dispatch table.
//!
//! Each supported ONNX operator kind maps to one pure translator function:
//! `(node, symbol table, constants) -> target tensor(s)`. Translators resolve
//! all of their inputs before emitting anything, apply the ONNX-defined
//! attribute defaults, and never write to the symbol table; output binding
//! is the graph builder's job.
//!
//! The table is a total function over kind strings: unknown kinds are an
//! explicit miss ([`lookup`] returns `None`), never a panic, so the pipeline
//! splitter can use a miss as its extension hook.

mod activation;
mod arithmetic;
mod conv;
mod gather;
mod gemm;
mod logical;
mod misc;
mod norm;
mod pool;
mod reduce;
mod resize;
mod shape_ops;

use std::collections::HashMap;

use half::f16;
use once_cell::sync::Lazy;

use crate::attrs::AttributeReader;
use crate::error::OnnxError;
use crate::graph::{ConstantData, DType, Graph, TensorId};
use crate::model::{Node, TensorData};

/// Name -> target tensor bindings for one graph segment. Entries are only
/// ever inserted or re-bound, never mutated in place.
#[derive(Debug, Default)]
pub(crate) struct SymbolTable {
    entries: HashMap<String, TensorId>,
}

impl SymbolTable {
    pub(crate) fn new() -> Self {
        SymbolTable::default()
    }

    pub(crate) fn get(&self, name: &str) -> Option<TensorId> {
        self.entries.get(name).copied()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub(crate) fn bind(&mut self, name: impl AsRef<str>, id: TensorId) {
        self.entries.insert(name.as_ref().to_string(), id);
    }
}

/// Constants visible to translators: the model's initializer table layered
/// under constants captured from `Constant` nodes during the pass.
#[derive(Debug)]
pub(crate) struct ConstantMap<'m> {
    model: &'m HashMap<String, TensorData>,
    local: HashMap<String, TensorData>,
}

impl<'m> ConstantMap<'m> {
    pub(crate) fn new(model: &'m HashMap<String, TensorData>) -> Self {
        ConstantMap {
            model,
            local: HashMap::new(),
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&TensorData> {
        self.local.get(name).or_else(|| self.model.get(name))
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.local.contains_key(name) || self.model.contains_key(name)
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, data: TensorData) {
        self.local.insert(name.into(), data);
    }
}

/// Result of a successful translation: most operators produce one tensor
/// bound to every declared output; `Split` produces one per output.
pub(crate) enum Translated {
    One(TensorId),
    Many(Vec<TensorId>),
}

/// Everything a translator may touch. The symbol table is deliberately
/// immutable here; only the builder binds outputs.
pub(crate) struct TranslateCx<'a, 'm> {
    pub(crate) graph: &'a mut Graph,
    pub(crate) tensors: &'a SymbolTable,
    pub(crate) constants: &'a mut ConstantMap<'m>,
    pub(crate) dtype: DType,
}

pub(crate) type Translator = fn(&mut TranslateCx, &Node) -> Result<Translated, OnnxError>;

/// Structural-failure error with operator context.
pub(crate) fn unsupported(node: &Node, detail: impl Into<String>) -> OnnxError {
    OnnxError::UnsupportedInput(format!(
        "{}({}): {}",
        node.op_type(),
        node.name(),
        detail.into()
    ))
}

/// `axis < 0` counts from the back; out-of-range is a miss.
pub(crate) fn normalize_axis(axis: i64, rank: usize) -> Option<usize> {
    let axis = if axis < 0 { axis + rank as i64 } else { axis };
    (0..rank as i64).contains(&axis).then_some(axis as usize)
}

impl<'a, 'm> TranslateCx<'a, 'm> {
    /// Resolves the i-th input from the symbol table.
    pub(crate) fn input(&self, node: &Node, index: usize) -> Option<TensorId> {
        node.input(index).and_then(|name| self.tensors.get(name))
    }

    /// Resolves the i-th input or fails; absence of a required input is a
    /// hard failure, never a default.
    pub(crate) fn require(&self, node: &Node, index: usize) -> Result<TensorId, OnnxError> {
        self.input(node, index)
            .ok_or_else(|| unsupported(node, format!("missing input {index}")))
    }

    /// Looks up the i-th input in the constants map.
    pub(crate) fn constant(&self, node: &Node, index: usize) -> Option<&TensorData> {
        node.input(index).and_then(|name| self.constants.get(name))
    }

    pub(crate) fn constant_floats(&self, node: &Node, index: usize) -> Option<Vec<f32>> {
        self.constant(node, index).and_then(TensorData::floats)
    }

    pub(crate) fn constant_ints(&self, node: &Node, index: usize) -> Option<Vec<i64>> {
        self.constant(node, index).and_then(TensorData::any_ints)
    }

    /// Materializes a constant payload into the target graph at the graph's
    /// float precision. Half precision rounds the payload through f16.
    pub(crate) fn materialize(&mut self, data: &TensorData) -> Result<TensorId, OnnxError> {
        let values = match self.dtype {
            DType::F16 => data
                .halfs()
                .map(|halfs| halfs.into_iter().map(f16::to_f32).collect::<Vec<f32>>()),
            _ => data.floats(),
        };
        let values = values.ok_or(OnnxError::UnsupportedElementType {
            source_type: data.element_type(),
            target: self.dtype,
        })?;
        let dims = if data.dims().is_empty() {
            vec![1]
        } else {
            data.dims().to_vec()
        };
        Ok(self
            .graph
            .constant(ConstantData::F32(values), dims, self.dtype)?)
    }

    /// Materializes an integer payload as an i32 index constant, keeping the
    /// original rank (scalars stay rank 0 so gather can drop the axis).
    pub(crate) fn materialize_indices(&mut self, data: &TensorData) -> Result<TensorId, OnnxError> {
        let values = data.any_ints().ok_or(OnnxError::UnsupportedElementType {
            source_type: data.element_type(),
            target: DType::I32,
        })?;
        let values: Vec<i32> = values.into_iter().map(|v| v as i32).collect();
        Ok(self
            .graph
            .constant(ConstantData::I32(values), data.dims().to_vec(), DType::I32)?)
    }
}

/// Attribute list pair helpers shared by the 2-D spatial translators.
pub(crate) fn ints_pair(node: &Node, name: &str, default: [i64; 2]) -> Option<[usize; 2]> {
    match node.attr_ints(name) {
        None => Some([default[0] as usize, default[1] as usize]),
        Some([a, b]) if *a >= 0 && *b >= 0 => Some([*a as usize, *b as usize]),
        Some(_) => None,
    }
}

pub(crate) fn ints_quad(node: &Node, name: &str, default: [i64; 4]) -> Option<[usize; 4]> {
    match node.attr_ints(name) {
        None => Some(default.map(|v| v as usize)),
        Some([a, b, c, d]) if [*a, *b, *c, *d].iter().all(|&v| v >= 0) => {
            Some([*a as usize, *b as usize, *c as usize, *d as usize])
        }
        Some(_) => None,
    }
}

static DISPATCH: Lazy<HashMap<&'static str, Translator>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, Translator> = HashMap::new();
    table.insert("Add", arithmetic::add);
    table.insert("Sub", arithmetic::sub);
    table.insert("Mul", arithmetic::mul);
    table.insert("Div", arithmetic::div);
    table.insert("Pow", arithmetic::pow);
    table.insert("Sqrt", arithmetic::sqrt);
    table.insert("Exp", arithmetic::exp);
    table.insert("Log", arithmetic::log);
    table.insert("Floor", arithmetic::floor);
    table.insert("Relu", activation::relu);
    table.insert("LeakyRelu", activation::leaky_relu);
    table.insert("PRelu", activation::prelu);
    table.insert("Elu", activation::elu);
    table.insert("Sigmoid", activation::sigmoid);
    table.insert("HardSigmoid", activation::hard_sigmoid);
    table.insert("Tanh", activation::tanh);
    table.insert("Softmax", activation::softmax);
    table.insert("BatchNormalization", norm::batch_norm);
    table.insert("InstanceNormalization", norm::instance_norm);
    table.insert("GroupNormalization", norm::group_norm);
    // group norm is not native to older opsets; producers emit it as a
    // custom kind with groups/epsilon passed as constant inputs
    table.insert("custom_group_norm", norm::custom_group_norm);
    table.insert("Conv", conv::conv);
    table.insert("FusedConv", conv::fused_conv);
    table.insert("ConvTranspose", conv::conv_transpose);
    table.insert("Gemm", gemm::gemm);
    table.insert("MatMul", gemm::matmul);
    table.insert("GlobalAveragePool", pool::global_avg_pool);
    table.insert("AveragePool", pool::avg_pool);
    table.insert("MaxPool", pool::max_pool);
    table.insert("Pad", shape_ops::pad);
    table.insert("Reshape", shape_ops::reshape);
    table.insert("Squeeze", shape_ops::squeeze);
    table.insert("Unsqueeze", shape_ops::unsqueeze);
    table.insert("Flatten", shape_ops::flatten);
    table.insert("Shape", shape_ops::shape);
    table.insert("Transpose", shape_ops::permute);
    table.insert("Slice", shape_ops::slice);
    table.insert("Split", shape_ops::split);
    table.insert("Concat", shape_ops::concat);
    table.insert("Expand", shape_ops::expand);
    table.insert("Tile", shape_ops::tile);
    table.insert("DepthToSpace", shape_ops::depth_to_space);
    table.insert("ReduceMean", reduce::reduce_mean);
    table.insert("ReduceSum", reduce::reduce_sum);
    table.insert("ReduceL2", reduce::reduce_l2);
    table.insert("Resize", resize::resize);
    table.insert("Upsample", resize::resize);
    table.insert("Gather", gather::gather);
    table.insert("GatherElements", gather::gather_elements);
    table.insert("Equal", logical::equal);
    table.insert("Greater", logical::greater);
    table.insert("Less", logical::less);
    table.insert("Where", logical::where_op);
    table.insert("Constant", misc::constant);
    table.insert("Dropout", misc::passthrough);
    table.insert("Cast", misc::passthrough);
    table.insert("Clip", misc::passthrough);
    table
});

/// Returns the translator for an operator kind, or `None` when the kind is
/// not handled so callers can fall back to extension mechanisms.
pub(crate) fn lookup(kind: &str) -> Option<Translator> {
    DISPATCH.get(kind).copied()
}

/// Operator kinds the built-in dispatch table translates, for diagnostics.
pub fn supported_kinds() -> Vec<&'static str> {
    let mut kinds: Vec<&'static str> = DISPATCH.keys().copied().collect();
    kinds.sort_unstable();
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OnnxError;
    use crate::model::ElementType;

    #[test]
    fn dispatch_misses_are_explicit() {
        assert!(lookup("Conv").is_some());
        assert!(lookup("TotallyUnknownOp").is_none());
    }

    #[test]
    fn axis_normalization() {
        assert_eq!(normalize_axis(-1, 4), Some(3));
        assert_eq!(normalize_axis(2, 4), Some(2));
        assert_eq!(normalize_axis(4, 4), None);
        assert_eq!(normalize_axis(-5, 4), None);
    }

    #[test]
    fn half_precision_constants_round_through_f16() {
        let mut graph = Graph::new();
        let tensors = SymbolTable::new();
        let model = HashMap::new();
        let mut constants = ConstantMap::new(&model);
        let mut cx = TranslateCx {
            graph: &mut graph,
            tensors: &tensors,
            constants: &mut constants,
            dtype: DType::F16,
        };

        let data = TensorData::from_f32s(vec![2], &[0.333_333_34, 1.0]);
        let id = cx.materialize(&data).unwrap();
        match &cx.graph.nodes()[id.index()].op {
            crate::graph::Op::Constant(ConstantData::F32(values)) => {
                assert_eq!(values[0], f16::from_f32(0.333_333_34).to_f32());
                assert_eq!(values[1], 1.0);
            }
            other => panic!("expected constant, got {other:?}"),
        }
    }

    #[test]
    fn float_payloads_cannot_become_index_constants() {
        let mut graph = Graph::new();
        let tensors = SymbolTable::new();
        let model = HashMap::new();
        let mut constants = ConstantMap::new(&model);
        let mut cx = TranslateCx {
            graph: &mut graph,
            tensors: &tensors,
            constants: &mut constants,
            dtype: DType::F32,
        };

        let data = TensorData::from_f32s(vec![2], &[1.0, 2.0]);
        let err = cx.materialize_indices(&data).unwrap_err();
        assert!(matches!(
            err,
            OnnxError::UnsupportedElementType {
                source_type: ElementType::F32,
                target: DType::I32,
            }
        ));
    }
}
