//! Target tensor graph under construction.
//!
//! [`Graph`] is the mutable build surface handed to operator translators: a
//! flat list of operation nodes in emission order (emission order IS
//! topological order, since an operand handle must exist before it can be
//! referenced). Every emit method performs shape/dtype inference up front and
//! fails with a [`GraphError`] when operands do not fit together, so backends
//! receive only well-formed graphs.
//!
//! Placeholder names are normalized to the backend-safe charset
//! `[A-Za-z0-9_]` at creation (backends commonly restrict identifier
//! charsets, e.g. dots become underscores). The graph records both the
//! requested and the assigned name so callers can keep an explicit remap
//! table across compilation boundaries.

mod op;

pub use op::{
    BinaryOp, CompareOp, ConstantData, Conv2dSpec, DType, Op, PadMode, Pool2dSpec, ReduceKind,
    ResizeMode, TensorId, TensorSpec, UnaryOp,
};

use crate::error::GraphError;

/// One emitted operation together with its operands and inferred result spec.
#[derive(Debug, Clone)]
pub struct OpNode {
    pub op: Op,
    pub inputs: Vec<TensorId>,
    pub spec: TensorSpec,
}

/// Requested/assigned name pair of one placeholder.
#[derive(Debug, Clone)]
pub struct Placeholder {
    pub requested: String,
    pub assigned: String,
    pub id: TensorId,
}

/// A target graph being assembled for backend compilation.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    nodes: Vec<OpNode>,
    placeholders: Vec<Placeholder>,
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Multidirectional (numpy-style) broadcast of two shapes.
pub(crate) fn broadcast_dims(a: &[usize], b: &[usize]) -> Result<Vec<usize>, GraphError> {
    let rank = a.len().max(b.len());
    let mut out = vec![0usize; rank];
    for i in 0..rank {
        let da = if i < rank - a.len() { 1 } else { a[i - (rank - a.len())] };
        let db = if i < rank - b.len() { 1 } else { b[i - (rank - b.len())] };
        out[i] = if da == db || db == 1 {
            da
        } else if da == 1 {
            db
        } else {
            return Err(GraphError::new(format!(
                "shapes {a:?} and {b:?} are not broadcastable"
            )));
        };
    }
    Ok(out)
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn nodes(&self) -> &[OpNode] {
        &self.nodes
    }

    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    pub fn spec(&self, id: TensorId) -> &TensorSpec {
        &self.nodes[id.0].spec
    }

    fn emit(&mut self, op: Op, inputs: Vec<TensorId>, spec: TensorSpec) -> TensorId {
        let id = TensorId(self.nodes.len());
        self.nodes.push(OpNode { op, inputs, spec });
        id
    }

    /// Creates an external input. The requested name is sanitized; the
    /// assigned name is recorded for boundary remapping and must be unique
    /// within the graph.
    pub fn placeholder(&mut self, name: &str, spec: TensorSpec) -> Result<TensorId, GraphError> {
        let assigned = sanitize_name(name);
        if self.placeholders.iter().any(|p| p.assigned == assigned) {
            return Err(GraphError::new(format!(
                "placeholder name {assigned:?} is already taken"
            )));
        }
        let id = self.emit(Op::Placeholder, Vec::new(), spec);
        self.placeholders.push(Placeholder {
            requested: name.to_string(),
            assigned,
            id,
        });
        Ok(id)
    }

    pub fn constant(
        &mut self,
        data: ConstantData,
        dims: Vec<usize>,
        dtype: DType,
    ) -> Result<TensorId, GraphError> {
        let expected: usize = dims.iter().product();
        if data.len() != expected {
            return Err(GraphError::new(format!(
                "constant payload has {} elements, shape {dims:?} wants {expected}",
                data.len()
            )));
        }
        Ok(self.emit(Op::Constant(data), Vec::new(), TensorSpec::new(dtype, dims)))
    }

    pub fn scalar(&mut self, value: f32, dtype: DType) -> Result<TensorId, GraphError> {
        self.constant(ConstantData::F32(vec![value]), vec![1], dtype)
    }

    /// A constant filled with one value, used e.g. to realize broadcasts.
    pub fn full(
        &mut self,
        value: f32,
        dims: Vec<usize>,
        dtype: DType,
    ) -> Result<TensorId, GraphError> {
        let count = dims.iter().product();
        self.constant(ConstantData::F32(vec![value; count]), dims, dtype)
    }

    pub fn unary(&mut self, op: UnaryOp, x: TensorId) -> Result<TensorId, GraphError> {
        let spec = self.spec(x).clone();
        Ok(self.emit(Op::Unary(op), vec![x], spec))
    }

    pub fn binary(&mut self, op: BinaryOp, a: TensorId, b: TensorId) -> Result<TensorId, GraphError> {
        let (sa, sb) = (self.spec(a), self.spec(b));
        if sa.dtype != sb.dtype {
            return Err(GraphError::new(format!(
                "binary operands disagree on dtype: {:?} vs {:?}",
                sa.dtype, sb.dtype
            )));
        }
        let dims = broadcast_dims(&sa.dims, &sb.dims)?;
        let dtype = sa.dtype;
        Ok(self.emit(Op::Binary(op), vec![a, b], TensorSpec::new(dtype, dims)))
    }

    pub fn add(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, GraphError> {
        self.binary(BinaryOp::Add, a, b)
    }

    pub fn sub(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, GraphError> {
        self.binary(BinaryOp::Sub, a, b)
    }

    pub fn mul(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, GraphError> {
        self.binary(BinaryOp::Mul, a, b)
    }

    pub fn div(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, GraphError> {
        self.binary(BinaryOp::Div, a, b)
    }

    pub fn minimum(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, GraphError> {
        self.binary(BinaryOp::Min, a, b)
    }

    pub fn maximum(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, GraphError> {
        self.binary(BinaryOp::Max, a, b)
    }

    /// `a op scalar` with the scalar materialized at the operand dtype.
    pub fn binary_scalar(
        &mut self,
        op: BinaryOp,
        a: TensorId,
        value: f32,
    ) -> Result<TensorId, GraphError> {
        let dtype = self.spec(a).dtype;
        let scalar = self.scalar(value, dtype)?;
        self.binary(op, a, scalar)
    }

    pub fn compare(&mut self, op: CompareOp, a: TensorId, b: TensorId) -> Result<TensorId, GraphError> {
        let dims = broadcast_dims(&self.spec(a).dims, &self.spec(b).dims)?;
        Ok(self.emit(Op::Compare(op), vec![a, b], TensorSpec::new(DType::Bool, dims)))
    }

    pub fn select(
        &mut self,
        predicate: TensorId,
        on_true: TensorId,
        on_false: TensorId,
    ) -> Result<TensorId, GraphError> {
        if self.spec(predicate).dtype != DType::Bool {
            return Err(GraphError::new("select predicate must be boolean"));
        }
        let (st, sf) = (self.spec(on_true), self.spec(on_false));
        if st.dtype != sf.dtype {
            return Err(GraphError::new("select branches disagree on dtype"));
        }
        let dtype = st.dtype;
        let dims = broadcast_dims(&st.dims, &sf.dims)?;
        let dims = broadcast_dims(&self.spec(predicate).dims, &dims)?;
        Ok(self.emit(
            Op::Select,
            vec![predicate, on_true, on_false],
            TensorSpec::new(dtype, dims),
        ))
    }

    /// Batched matrix multiply; batch dimensions broadcast, the two trailing
    /// dimensions contract as `[m, k] x [k, n] -> [m, n]`.
    pub fn matmul(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, GraphError> {
        let (sa, sb) = (self.spec(a), self.spec(b));
        if sa.rank() < 2 || sb.rank() < 2 {
            return Err(GraphError::new("matmul operands must have rank >= 2"));
        }
        if sa.dtype != sb.dtype {
            return Err(GraphError::new("matmul operands disagree on dtype"));
        }
        let (m, ka) = (sa.dims[sa.rank() - 2], sa.dims[sa.rank() - 1]);
        let (kb, n) = (sb.dims[sb.rank() - 2], sb.dims[sb.rank() - 1]);
        if ka != kb {
            return Err(GraphError::new(format!(
                "matmul inner dimensions disagree: {ka} vs {kb}"
            )));
        }
        let dtype = sa.dtype;
        let batch = broadcast_dims(&sa.dims[..sa.rank() - 2], &sb.dims[..sb.rank() - 2])?;
        let mut dims = batch;
        dims.push(m);
        dims.push(n);
        Ok(self.emit(Op::MatMul, vec![a, b], TensorSpec::new(dtype, dims)))
    }

    fn conv_output_extent(input: usize, kernel: usize, stride: usize, dilation: usize, pad: usize) -> Result<usize, GraphError> {
        let effective = (kernel - 1) * dilation + 1;
        let padded = input + pad;
        if padded < effective {
            return Err(GraphError::new(format!(
                "convolution window ({effective}) exceeds padded input ({padded})"
            )));
        }
        Ok((padded - effective) / stride + 1)
    }

    pub fn conv2d(
        &mut self,
        input: TensorId,
        weights: TensorId,
        spec: Conv2dSpec,
    ) -> Result<TensorId, GraphError> {
        let (si, sw) = (self.spec(input), self.spec(weights));
        if si.rank() != 4 || sw.rank() != 4 {
            return Err(GraphError::new("conv2d expects NCHW input and OIHW weights"));
        }
        let [n, c, h, w] = [si.dims[0], si.dims[1], si.dims[2], si.dims[3]];
        let [o, i_per_group, kh, kw] = [sw.dims[0], sw.dims[1], sw.dims[2], sw.dims[3]];
        if spec.groups == 0 || c % spec.groups != 0 || i_per_group * spec.groups != c {
            return Err(GraphError::new(format!(
                "conv2d channel/group mismatch: input C={c}, weights I={i_per_group}, groups={}",
                spec.groups
            )));
        }
        if o % spec.groups != 0 {
            return Err(GraphError::new("conv2d output channels not divisible by groups"));
        }
        let dtype = si.dtype;
        let oh = Self::conv_output_extent(h, kh, spec.strides[0], spec.dilations[0], spec.pads[0] + spec.pads[2])?;
        let ow = Self::conv_output_extent(w, kw, spec.strides[1], spec.dilations[1], spec.pads[1] + spec.pads[3])?;
        Ok(self.emit(
            Op::Conv2d(spec),
            vec![input, weights],
            TensorSpec::new(dtype, vec![n, o, oh, ow]),
        ))
    }

    /// Depthwise convolution with weights `[multiplier, channels, kH, kW]`.
    pub fn depthwise_conv2d(
        &mut self,
        input: TensorId,
        weights: TensorId,
        spec: Conv2dSpec,
    ) -> Result<TensorId, GraphError> {
        let (si, sw) = (self.spec(input), self.spec(weights));
        if si.rank() != 4 || sw.rank() != 4 {
            return Err(GraphError::new("depthwise conv2d expects rank-4 operands"));
        }
        let [n, c, h, w] = [si.dims[0], si.dims[1], si.dims[2], si.dims[3]];
        let [mult, wc, kh, kw] = [sw.dims[0], sw.dims[1], sw.dims[2], sw.dims[3]];
        if wc != c {
            return Err(GraphError::new(format!(
                "depthwise weights cover {wc} channels, input has {c}"
            )));
        }
        let dtype = si.dtype;
        let oh = Self::conv_output_extent(h, kh, spec.strides[0], spec.dilations[0], spec.pads[0] + spec.pads[2])?;
        let ow = Self::conv_output_extent(w, kw, spec.strides[1], spec.dilations[1], spec.pads[1] + spec.pads[3])?;
        Ok(self.emit(
            Op::DepthwiseConv2d(spec),
            vec![input, weights],
            TensorSpec::new(dtype, vec![n, mult * c, oh, ow]),
        ))
    }

    /// Transposed convolution. The caller supplies the analytically derived
    /// output H/W (it cannot be inferred from the operands alone).
    pub fn conv_transpose2d(
        &mut self,
        input: TensorId,
        weights: TensorId,
        spec: Conv2dSpec,
        output_hw: [usize; 2],
    ) -> Result<TensorId, GraphError> {
        let (si, sw) = (self.spec(input), self.spec(weights));
        if si.rank() != 4 || sw.rank() != 4 {
            return Err(GraphError::new("conv_transpose2d expects rank-4 operands"));
        }
        let [n, c] = [si.dims[0], si.dims[1]];
        let [wi, o_per_group, ..] = [sw.dims[0], sw.dims[1], sw.dims[2], sw.dims[3]];
        if wi != c {
            return Err(GraphError::new(format!(
                "conv_transpose2d weights expect {wi} input channels, input has {c}"
            )));
        }
        let dtype = si.dtype;
        let o = o_per_group * spec.groups;
        Ok(self.emit(
            Op::ConvTranspose2d(spec),
            vec![input, weights],
            TensorSpec::new(dtype, vec![n, o, output_hw[0], output_hw[1]]),
        ))
    }

    fn pool2d(
        &mut self,
        max: bool,
        input: TensorId,
        spec: Pool2dSpec,
    ) -> Result<TensorId, GraphError> {
        let si = self.spec(input);
        if si.rank() != 4 {
            return Err(GraphError::new("pooling expects NCHW input"));
        }
        let [n, c, h, w] = [si.dims[0], si.dims[1], si.dims[2], si.dims[3]];
        let dtype = si.dtype;
        let oh = Self::conv_output_extent(h, spec.kernel[0], spec.strides[0], 1, spec.pads[0] + spec.pads[2])?;
        let ow = Self::conv_output_extent(w, spec.kernel[1], spec.strides[1], 1, spec.pads[1] + spec.pads[3])?;
        let op = if max {
            Op::MaxPool2d(spec)
        } else {
            Op::AvgPool2d(spec)
        };
        Ok(self.emit(op, vec![input], TensorSpec::new(dtype, vec![n, c, oh, ow])))
    }

    pub fn avg_pool2d(&mut self, input: TensorId, spec: Pool2dSpec) -> Result<TensorId, GraphError> {
        self.pool2d(false, input, spec)
    }

    pub fn max_pool2d(&mut self, input: TensorId, spec: Pool2dSpec) -> Result<TensorId, GraphError> {
        self.pool2d(true, input, spec)
    }

    /// `(x - mean) / sqrt(variance + epsilon) * gamma + beta`, with mean,
    /// variance, gamma and beta broadcast against `x`.
    pub fn normalize(
        &mut self,
        x: TensorId,
        mean: TensorId,
        variance: TensorId,
        gamma: TensorId,
        beta: TensorId,
        epsilon: f32,
    ) -> Result<TensorId, GraphError> {
        let spec = self.spec(x).clone();
        for operand in [mean, variance, gamma, beta] {
            let dims = broadcast_dims(&spec.dims, &self.spec(operand).dims)?;
            if dims != spec.dims {
                return Err(GraphError::new(
                    "normalization statistics must broadcast to the input shape",
                ));
            }
        }
        Ok(self.emit(
            Op::Normalize { epsilon },
            vec![x, mean, variance, gamma, beta],
            spec,
        ))
    }

    pub fn softmax(&mut self, x: TensorId, axis: usize) -> Result<TensorId, GraphError> {
        let spec = self.spec(x).clone();
        if axis >= spec.rank() {
            return Err(GraphError::new("softmax axis out of range"));
        }
        Ok(self.emit(Op::Softmax { axis }, vec![x], spec))
    }

    pub fn reduce(
        &mut self,
        kind: ReduceKind,
        x: TensorId,
        axes: &[usize],
        keepdims: bool,
    ) -> Result<TensorId, GraphError> {
        let spec = self.spec(x);
        let mut axes: Vec<usize> = axes.to_vec();
        axes.sort_unstable();
        axes.dedup();
        for &axis in &axes {
            if axis >= spec.rank() {
                return Err(GraphError::new(format!(
                    "reduce axis {axis} out of range for rank {}",
                    spec.rank()
                )));
            }
        }
        let mut dims = Vec::with_capacity(spec.rank());
        for (i, &d) in spec.dims.iter().enumerate() {
            if axes.contains(&i) {
                if keepdims {
                    dims.push(1);
                }
            } else {
                dims.push(d);
            }
        }
        if dims.is_empty() {
            dims.push(1);
        }
        let dtype = spec.dtype;
        Ok(self.emit(
            Op::Reduce { kind, axes, keepdims },
            vec![x],
            TensorSpec::new(dtype, dims),
        ))
    }

    /// Reshape with ONNX extent conventions: `0` copies the input extent at
    /// that axis, a single `-1` is inferred from the remaining extents.
    pub fn reshape(&mut self, x: TensorId, shape: &[i64]) -> Result<TensorId, GraphError> {
        let spec = self.spec(x);
        let total = spec.element_count();
        let mut dims = Vec::with_capacity(shape.len());
        let mut infer = None;
        for (i, &d) in shape.iter().enumerate() {
            match d {
                -1 if infer.is_none() => {
                    infer = Some(i);
                    dims.push(1);
                }
                -1 => return Err(GraphError::new("reshape allows at most one -1 extent")),
                0 => {
                    let copied = *spec.dims.get(i).ok_or_else(|| {
                        GraphError::new("reshape 0-extent has no matching input axis")
                    })?;
                    dims.push(copied);
                }
                d if d > 0 => dims.push(d as usize),
                _ => return Err(GraphError::new(format!("invalid reshape extent {d}"))),
            }
        }
        let partial: usize = dims.iter().product();
        if let Some(i) = infer {
            if partial == 0 || total % partial != 0 {
                return Err(GraphError::new(format!(
                    "cannot infer reshape extent: {total} elements into {shape:?}"
                )));
            }
            dims[i] = total / partial;
        } else if partial != total {
            return Err(GraphError::new(format!(
                "reshape changes element count: {total} -> {partial}"
            )));
        }
        let dtype = spec.dtype;
        Ok(self.emit(Op::Reshape, vec![x], TensorSpec::new(dtype, dims)))
    }

    pub fn reshape_exact(&mut self, x: TensorId, dims: Vec<usize>) -> Result<TensorId, GraphError> {
        let shape: Vec<i64> = dims.iter().map(|&d| d as i64).collect();
        self.reshape(x, &shape)
    }

    /// Removes the listed unit axes, or every unit axis when `axes` is empty.
    pub fn squeeze(&mut self, x: TensorId, axes: &[usize]) -> Result<TensorId, GraphError> {
        let spec = self.spec(x);
        let dims: Vec<usize> = if axes.is_empty() {
            spec.dims.iter().copied().filter(|&d| d != 1).collect()
        } else {
            let mut dims = Vec::with_capacity(spec.rank());
            for (i, &d) in spec.dims.iter().enumerate() {
                if axes.contains(&i) {
                    if d != 1 {
                        return Err(GraphError::new(format!(
                            "squeeze axis {i} has extent {d}"
                        )));
                    }
                } else {
                    dims.push(d);
                }
            }
            dims
        };
        let dims = if dims.is_empty() { vec![1] } else { dims };
        self.reshape_exact(x, dims)
    }

    /// Inserts unit axes at the listed positions of the result shape.
    pub fn unsqueeze(&mut self, x: TensorId, axes: &[usize]) -> Result<TensorId, GraphError> {
        let spec = self.spec(x);
        let rank = spec.rank() + axes.len();
        let mut dims = vec![0usize; rank];
        for &axis in axes {
            if axis >= rank {
                return Err(GraphError::new("unsqueeze axis out of range"));
            }
            dims[axis] = 1;
        }
        let mut source = spec.dims.iter();
        for d in dims.iter_mut() {
            if *d == 0 {
                *d = *source
                    .next()
                    .ok_or_else(|| GraphError::new("unsqueeze axes overlap"))?;
            }
        }
        self.reshape_exact(x, dims)
    }

    /// Collapses to 2-D: `[prod(dims[..axis]), prod(dims[axis..])]`.
    pub fn flatten2d(&mut self, x: TensorId, axis: usize) -> Result<TensorId, GraphError> {
        let spec = self.spec(x);
        if axis > spec.rank() {
            return Err(GraphError::new("flatten axis out of range"));
        }
        let lead: usize = spec.dims[..axis].iter().product();
        let tail: usize = spec.dims[axis..].iter().product();
        self.reshape_exact(x, vec![lead, tail])
    }

    pub fn transpose(&mut self, x: TensorId, perm: &[usize]) -> Result<TensorId, GraphError> {
        let spec = self.spec(x);
        if perm.len() != spec.rank() {
            return Err(GraphError::new("transpose permutation length must equal rank"));
        }
        let mut seen = vec![false; perm.len()];
        let mut dims = Vec::with_capacity(perm.len());
        for &axis in perm {
            if axis >= spec.rank() || seen[axis] {
                return Err(GraphError::new("transpose permutation is not a permutation"));
            }
            seen[axis] = true;
            dims.push(spec.dims[axis]);
        }
        let dtype = spec.dtype;
        Ok(self.emit(
            Op::Transpose { perm: perm.to_vec() },
            vec![x],
            TensorSpec::new(dtype, dims),
        ))
    }

    /// Swaps two axes (identity permutation elsewhere).
    pub fn swap_axes(&mut self, x: TensorId, a: usize, b: usize) -> Result<TensorId, GraphError> {
        let rank = self.spec(x).rank();
        if a >= rank || b >= rank {
            return Err(GraphError::new("swap_axes axis out of range"));
        }
        let mut perm: Vec<usize> = (0..rank).collect();
        perm.swap(a, b);
        self.transpose(x, &perm)
    }

    /// Strided slice with per-axis `[start, end)` bounds, end exclusive and
    /// already clamped by the caller. Steps must be positive.
    pub fn slice(
        &mut self,
        x: TensorId,
        starts: &[usize],
        ends: &[usize],
        steps: &[usize],
    ) -> Result<TensorId, GraphError> {
        let spec = self.spec(x);
        let rank = spec.rank();
        if starts.len() != rank || ends.len() != rank || steps.len() != rank {
            return Err(GraphError::new("slice bounds must cover every axis"));
        }
        let mut dims = Vec::with_capacity(rank);
        for axis in 0..rank {
            if steps[axis] == 0 {
                return Err(GraphError::new("slice step must be positive"));
            }
            if ends[axis] > spec.dims[axis] || starts[axis] > ends[axis] {
                return Err(GraphError::new(format!(
                    "slice bounds [{}, {}) invalid for axis {axis} of extent {}",
                    starts[axis], ends[axis], spec.dims[axis]
                )));
            }
            dims.push((ends[axis] - starts[axis]).div_ceil(steps[axis]));
        }
        let dtype = spec.dtype;
        Ok(self.emit(
            Op::Slice {
                starts: starts.to_vec(),
                ends: ends.to_vec(),
                steps: steps.to_vec(),
            },
            vec![x],
            TensorSpec::new(dtype, dims),
        ))
    }

    pub fn concat(&mut self, inputs: &[TensorId], axis: usize) -> Result<TensorId, GraphError> {
        let first = inputs
            .first()
            .ok_or_else(|| GraphError::new("concat requires at least one operand"))?;
        let mut dims = self.spec(*first).dims.clone();
        let dtype = self.spec(*first).dtype;
        if axis >= dims.len() {
            return Err(GraphError::new("concat axis out of range"));
        }
        for &input in &inputs[1..] {
            let spec = self.spec(input);
            if spec.rank() != dims.len() || spec.dtype != dtype {
                return Err(GraphError::new("concat operands must agree on rank and dtype"));
            }
            for (i, (&a, &b)) in dims.iter().zip(spec.dims.iter()).enumerate() {
                if i != axis && a != b {
                    return Err(GraphError::new(format!(
                        "concat extent mismatch at axis {i}: {a} vs {b}"
                    )));
                }
            }
            dims[axis] += spec.dims[axis];
        }
        Ok(self.emit(
            Op::Concat { axis },
            inputs.to_vec(),
            TensorSpec::new(dtype, dims),
        ))
    }

    pub fn pad(
        &mut self,
        x: TensorId,
        mode: PadMode,
        begin: &[usize],
        end: &[usize],
        value: f32,
    ) -> Result<TensorId, GraphError> {
        let spec = self.spec(x);
        let rank = spec.rank();
        if begin.len() != rank || end.len() != rank {
            return Err(GraphError::new("pad amounts must cover every axis"));
        }
        let mut dims = Vec::with_capacity(rank);
        for axis in 0..rank {
            if mode == PadMode::Reflect && (begin[axis] >= spec.dims[axis] || end[axis] >= spec.dims[axis]) {
                return Err(GraphError::new("reflect pad amount exceeds input extent"));
            }
            dims.push(begin[axis] + spec.dims[axis] + end[axis]);
        }
        let dtype = spec.dtype;
        Ok(self.emit(
            Op::Pad {
                mode,
                begin: begin.to_vec(),
                end: end.to_vec(),
                value,
            },
            vec![x],
            TensorSpec::new(dtype, dims),
        ))
    }

    pub fn resize(
        &mut self,
        x: TensorId,
        mode: ResizeMode,
        height: usize,
        width: usize,
    ) -> Result<TensorId, GraphError> {
        let spec = self.spec(x);
        if spec.rank() != 4 {
            return Err(GraphError::new("resize expects NCHW input"));
        }
        if height == 0 || width == 0 {
            return Err(GraphError::new("resize target extent must be positive"));
        }
        let dims = vec![spec.dims[0], spec.dims[1], height, width];
        let dtype = spec.dtype;
        Ok(self.emit(Op::Resize { mode }, vec![x], TensorSpec::new(dtype, dims)))
    }

    /// ONNX Gather: indexes axis `axis` of `data` with an arbitrary-shape
    /// i32 index tensor.
    pub fn gather(
        &mut self,
        data: TensorId,
        indices: TensorId,
        axis: usize,
    ) -> Result<TensorId, GraphError> {
        let (sd, si) = (self.spec(data), self.spec(indices));
        if si.dtype != DType::I32 {
            return Err(GraphError::new("gather indices must be i32"));
        }
        if axis >= sd.rank() {
            return Err(GraphError::new("gather axis out of range"));
        }
        let mut dims = sd.dims[..axis].to_vec();
        dims.extend_from_slice(&si.dims);
        dims.extend_from_slice(&sd.dims[axis + 1..]);
        let dtype = sd.dtype;
        Ok(self.emit(
            Op::Gather { axis },
            vec![data, indices],
            TensorSpec::new(dtype, dims),
        ))
    }

    /// Gather-along-axis: indices must have the operand's rank; the result
    /// takes the indices shape.
    pub fn gather_elements(
        &mut self,
        data: TensorId,
        indices: TensorId,
        axis: usize,
    ) -> Result<TensorId, GraphError> {
        let (sd, si) = (self.spec(data), self.spec(indices));
        if si.dtype != DType::I32 {
            return Err(GraphError::new("gather_elements indices must be i32"));
        }
        if si.rank() != sd.rank() || axis >= sd.rank() {
            return Err(GraphError::new(
                "gather_elements indices must match operand rank",
            ));
        }
        let dims = si.dims.clone();
        let dtype = sd.dtype;
        Ok(self.emit(
            Op::GatherElements { axis },
            vec![data, indices],
            TensorSpec::new(dtype, dims),
        ))
    }

    pub fn depth_to_space(
        &mut self,
        x: TensorId,
        block: usize,
        pixel_shuffle: bool,
    ) -> Result<TensorId, GraphError> {
        let spec = self.spec(x);
        if spec.rank() != 4 {
            return Err(GraphError::new("depth_to_space expects NCHW input"));
        }
        let [n, c, h, w] = [spec.dims[0], spec.dims[1], spec.dims[2], spec.dims[3]];
        if block == 0 || c % (block * block) != 0 {
            return Err(GraphError::new(format!(
                "depth_to_space channels {c} not divisible by block^2 ({block})"
            )));
        }
        let dims = vec![n, c / (block * block), h * block, w * block];
        let dtype = spec.dtype;
        Ok(self.emit(
            Op::DepthToSpace { block, pixel_shuffle },
            vec![x],
            TensorSpec::new(dtype, dims),
        ))
    }

    pub fn tile(&mut self, x: TensorId, repeats: &[usize]) -> Result<TensorId, GraphError> {
        let spec = self.spec(x);
        if repeats.len() != spec.rank() {
            return Err(GraphError::new("tile repeats must cover every axis"));
        }
        let dims: Vec<usize> = spec
            .dims
            .iter()
            .zip(repeats.iter())
            .map(|(&d, &r)| d * r)
            .collect();
        let dtype = spec.dtype;
        Ok(self.emit(
            Op::Tile {
                repeats: repeats.to_vec(),
            },
            vec![x],
            TensorSpec::new(dtype, dims),
        ))
    }

    pub fn cast(&mut self, x: TensorId, dtype: DType) -> Result<TensorId, GraphError> {
        let spec = self.spec(x);
        if spec.dtype == dtype {
            return Ok(x);
        }
        let dims = spec.dims.clone();
        Ok(self.emit(Op::Cast, vec![x], TensorSpec::new(dtype, dims)))
    }

    /// Broadcasts `x` to `dims` by multiplying with a ones-constant of the
    /// target shape.
    pub fn expand(&mut self, x: TensorId, dims: Vec<usize>) -> Result<TensorId, GraphError> {
        let dtype = self.spec(x).dtype;
        let ones = self.full(1.0, dims, dtype)?;
        self.mul(x, ones)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_input(dims: &[usize]) -> (Graph, TensorId) {
        let mut graph = Graph::new();
        let id = graph
            .placeholder("x", TensorSpec::new(DType::F32, dims.to_vec()))
            .unwrap();
        (graph, id)
    }

    #[test]
    fn placeholder_names_are_sanitized() {
        let mut graph = Graph::new();
        graph
            .placeholder("input.1", TensorSpec::new(DType::F32, vec![1, 3]))
            .unwrap();
        let placeholder = &graph.placeholders()[0];
        assert_eq!(placeholder.requested, "input.1");
        assert_eq!(placeholder.assigned, "input_1");
    }

    #[test]
    fn broadcast_follows_numpy_rules() {
        assert_eq!(broadcast_dims(&[1, 3, 1], &[2, 1, 4]).unwrap(), vec![2, 3, 4]);
        assert_eq!(broadcast_dims(&[4], &[2, 3, 4]).unwrap(), vec![2, 3, 4]);
        assert!(broadcast_dims(&[2, 3], &[3, 2]).is_err());
    }

    #[test]
    fn binary_op_infers_broadcast_shape() {
        let (mut graph, x) = graph_with_input(&[2, 3, 4]);
        let bias = graph
            .constant(ConstantData::F32(vec![0.0; 4]), vec![4], DType::F32)
            .unwrap();
        let sum = graph.add(x, bias).unwrap();
        assert_eq!(graph.spec(sum).dims, vec![2, 3, 4]);
    }

    #[test]
    fn conv2d_infers_output_extent() {
        let (mut graph, x) = graph_with_input(&[1, 3, 8, 8]);
        let weights = graph
            .constant(
                ConstantData::F32(vec![0.0; 16 * 3 * 3 * 3]),
                vec![16, 3, 3, 3],
                DType::F32,
            )
            .unwrap();
        let spec = Conv2dSpec {
            strides: [2, 2],
            dilations: [1, 1],
            pads: [1, 1, 1, 1],
            groups: 1,
        };
        let out = graph.conv2d(x, weights, spec).unwrap();
        assert_eq!(graph.spec(out).dims, vec![1, 16, 4, 4]);
    }

    #[test]
    fn reshape_resolves_inferred_extent() {
        let (mut graph, x) = graph_with_input(&[2, 3, 4]);
        let out = graph.reshape(x, &[-1, 4]).unwrap();
        assert_eq!(graph.spec(out).dims, vec![6, 4]);
        let copied = graph.reshape(x, &[0, -1]).unwrap();
        assert_eq!(graph.spec(copied).dims, vec![2, 12]);
        assert!(graph.reshape(x, &[5, 5]).is_err());
    }

    #[test]
    fn reduce_respects_keepdims() {
        let (mut graph, x) = graph_with_input(&[2, 3, 4]);
        let kept = graph.reduce(ReduceKind::Mean, x, &[1, 2], true).unwrap();
        assert_eq!(graph.spec(kept).dims, vec![2, 1, 1]);
        let dropped = graph.reduce(ReduceKind::Sum, x, &[1, 2], false).unwrap();
        assert_eq!(graph.spec(dropped).dims, vec![2]);
    }

    #[test]
    fn gather_shapes_follow_onnx() {
        let (mut graph, x) = graph_with_input(&[5, 7]);
        let indices = graph
            .constant(ConstantData::I32(vec![0, 2, 4]), vec![3], DType::I32)
            .unwrap();
        let out = graph.gather(x, indices, 0).unwrap();
        assert_eq!(graph.spec(out).dims, vec![3, 7]);
    }

    #[test]
    fn conv_transpose_uses_supplied_extent() {
        let (mut graph, x) = graph_with_input(&[1, 4, 5, 5]);
        let weights = graph
            .constant(
                ConstantData::F32(vec![0.0; 4 * 8 * 2 * 2]),
                vec![4, 8, 2, 2],
                DType::F32,
            )
            .unwrap();
        let spec = Conv2dSpec {
            strides: [2, 2],
            dilations: [1, 1],
            pads: [0, 0, 0, 0],
            groups: 1,
        };
        let out = graph.conv_transpose2d(x, weights, spec, [10, 10]).unwrap();
        assert_eq!(graph.spec(out).dims, vec![1, 8, 10, 10]);
    }
}
