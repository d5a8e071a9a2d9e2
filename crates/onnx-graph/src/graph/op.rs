//! Operation vocabulary of the target tensor graph.
//!
//! The set is intentionally small: translators compose these primitives to
//! express the source format's operators (e.g. clip is a min/max chain,
//! leaky relu is `max(0,x) + alpha * min(0,x)`).

/// Element type of a target-graph tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    F32,
    I32,
    Bool,
}

impl DType {
    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::F32)
    }
}

/// Static shape plus element type of a target-graph tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorSpec {
    pub dtype: DType,
    pub dims: Vec<usize>,
}

impl TensorSpec {
    pub fn new(dtype: DType, dims: impl Into<Vec<usize>>) -> Self {
        TensorSpec {
            dtype,
            dims: dims.into(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Handle to a tensor in one target graph. Only meaningful together with the
/// graph that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub(crate) usize);

impl TensorId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Constant payload already converted to the graph's storage types.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantData {
    F32(Vec<f32>),
    I32(Vec<i32>),
}

impl ConstantData {
    pub fn len(&self) -> usize {
        match self {
            ConstantData::F32(values) => values.len(),
            ConstantData::I32(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Exp,
    Log,
    Sqrt,
    Floor,
    Tanh,
    Sigmoid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    Less,
    Greater,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceKind {
    Mean,
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    Nearest,
    Bilinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadMode {
    Constant,
    Reflect,
}

/// 2-D convolution geometry. `pads` is `[top, left, bottom, right]`, strides
/// and dilations are `[y, x]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conv2dSpec {
    pub strides: [usize; 2],
    pub dilations: [usize; 2],
    pub pads: [usize; 4],
    pub groups: usize,
}

/// 2-D pooling geometry; same layout conventions as [`Conv2dSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool2dSpec {
    pub kernel: [usize; 2],
    pub strides: [usize; 2],
    pub pads: [usize; 4],
}

/// One target-graph operation. Output shape and dtype live in the owning
/// node's [`TensorSpec`], computed at emission time.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// External input bound by name at execution time.
    Placeholder,
    Constant(ConstantData),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Compare(CompareOp),
    /// `[predicate, on_true, on_false]`, all broadcast together.
    Select,
    /// Batched matrix multiply; batch dims broadcast.
    MatMul,
    /// `[input, weights]`; weights are OIHW with I = channels/groups.
    Conv2d(Conv2dSpec),
    /// `[input, weights]`; weights are `[multiplier, channels, kH, kW]`.
    DepthwiseConv2d(Conv2dSpec),
    /// `[input, weights]`; weights are `[in, out/groups, kH, kW]`. The output
    /// extent is carried by the node spec (derived analytically upstream).
    ConvTranspose2d(Conv2dSpec),
    AvgPool2d(Pool2dSpec),
    MaxPool2d(Pool2dSpec),
    /// `[x, mean, variance, gamma, beta]`, all broadcast against `x`:
    /// `(x - mean) / sqrt(variance + epsilon) * gamma + beta`.
    Normalize { epsilon: f32 },
    Softmax { axis: usize },
    Reduce {
        kind: ReduceKind,
        axes: Vec<usize>,
        keepdims: bool,
    },
    /// Element-order-preserving shape change; target dims in the node spec.
    Reshape,
    Transpose { perm: Vec<usize> },
    Slice {
        starts: Vec<usize>,
        ends: Vec<usize>,
        steps: Vec<usize>,
    },
    Concat { axis: usize },
    Pad {
        mode: PadMode,
        begin: Vec<usize>,
        end: Vec<usize>,
        value: f32,
    },
    /// NCHW spatial resize; target H/W in the node spec.
    Resize { mode: ResizeMode },
    /// ONNX Gather: output is `data[..axis] ++ indices ++ data[axis+1..]`.
    Gather { axis: usize },
    /// Gather-along-axis (ONNX GatherElements): output has the indices shape.
    GatherElements { axis: usize },
    DepthToSpace { block: usize, pixel_shuffle: bool },
    Tile { repeats: Vec<usize> },
    /// Element type conversion; target dtype in the node spec.
    Cast,
}
