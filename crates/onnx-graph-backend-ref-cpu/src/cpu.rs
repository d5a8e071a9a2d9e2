//! Naive interpreter over `onnx-graph` target graphs.

use std::collections::{BTreeMap, HashMap};

use onnx_graph::backend::{BackendError, Executable, HostTensor, TensorBackend};
use onnx_graph::graph::{
    BinaryOp, CompareOp, ConstantData, Conv2dSpec, DType, Graph, Op, OpNode, PadMode, Pool2dSpec,
    ReduceKind, ResizeMode, TensorId, TensorSpec, UnaryOp,
};

/// Reference CPU device. The device id only matters for cache keying; tests
/// can construct distinct "devices" to exercise device-scoped caches.
#[derive(Debug, Clone)]
pub struct RefCpuBackend {
    device_id: u64,
}

impl RefCpuBackend {
    pub fn new() -> Self {
        RefCpuBackend { device_id: 0 }
    }

    pub fn with_device_id(device_id: u64) -> Self {
        RefCpuBackend { device_id }
    }
}

impl Default for RefCpuBackend {
    fn default() -> Self {
        RefCpuBackend::new()
    }
}

impl TensorBackend for RefCpuBackend {
    type Executable = CpuExecutable;

    fn name(&self) -> &str {
        "ref-cpu"
    }

    fn device_id(&self) -> u64 {
        self.device_id
    }

    fn compile(
        &self,
        graph: Graph,
        outputs: &BTreeMap<String, TensorId>,
    ) -> Result<Self::Executable, BackendError> {
        let mut input_specs = BTreeMap::new();
        for placeholder in graph.placeholders() {
            input_specs.insert(
                placeholder.assigned.clone(),
                graph.spec(placeholder.id).clone(),
            );
        }

        let mut output_specs = BTreeMap::new();
        for (name, &id) in outputs {
            if id.index() >= graph.nodes().len() {
                return Err(BackendError::compile(format!(
                    "output {name:?} references an unknown tensor"
                )));
            }
            output_specs.insert(name.clone(), graph.spec(id).clone());
        }

        Ok(CpuExecutable {
            graph,
            outputs: outputs.clone(),
            input_specs,
            output_specs,
        })
    }
}

/// A compiled graph held as an instruction list the interpreter walks in
/// emission order (emission order is topological order by construction).
pub struct CpuExecutable {
    graph: Graph,
    outputs: BTreeMap<String, TensorId>,
    input_specs: BTreeMap<String, TensorSpec>,
    output_specs: BTreeMap<String, TensorSpec>,
}

impl Executable for CpuExecutable {
    fn input_specs(&self) -> &BTreeMap<String, TensorSpec> {
        &self.input_specs
    }

    fn output_specs(&self) -> &BTreeMap<String, TensorSpec> {
        &self.output_specs
    }

    fn run(
        &self,
        feeds: &HashMap<String, HostTensor>,
    ) -> Result<HashMap<String, HostTensor>, BackendError> {
        let nodes = self.graph.nodes();
        let mut values: Vec<Option<HostTensor>> = vec![None; nodes.len()];

        for (index, node) in nodes.iter().enumerate() {
            let result = self.execute(node, index, feeds, &values)?;
            values[index] = Some(result);
        }

        let mut outputs = HashMap::with_capacity(self.outputs.len());
        for (name, &id) in &self.outputs {
            let value = values[id.index()]
                .clone()
                .ok_or_else(|| BackendError::execution("output tensor was never computed"))?;
            outputs.insert(name.clone(), value);
        }
        Ok(outputs)
    }
}

impl CpuExecutable {
    fn execute(
        &self,
        node: &OpNode,
        index: usize,
        feeds: &HashMap<String, HostTensor>,
        values: &[Option<HostTensor>],
    ) -> Result<HostTensor, BackendError> {
        let input = |i: usize| -> Result<&HostTensor, BackendError> {
            let id = node.inputs[i];
            values[id.index()]
                .as_ref()
                .ok_or_else(|| BackendError::execution("operand computed out of order"))
        };
        let out_dims = node.spec.dims.clone();

        match &node.op {
            Op::Placeholder => {
                let placeholder = self
                    .graph
                    .placeholders()
                    .iter()
                    .find(|p| p.id.index() == index)
                    .ok_or_else(|| BackendError::execution("placeholder without a name"))?;
                let fed = feeds.get(&placeholder.assigned).ok_or_else(|| {
                    BackendError::execution(format!(
                        "missing feed for input {:?}",
                        placeholder.assigned
                    ))
                })?;
                if fed.element_count() != node.spec.element_count() {
                    return Err(BackendError::execution(format!(
                        "feed {:?} has {} elements, expected {}",
                        placeholder.assigned,
                        fed.element_count(),
                        node.spec.element_count()
                    )));
                }
                Ok(HostTensor::new(out_dims, fed.data.clone()))
            }
            Op::Constant(data) => {
                let data = match data {
                    ConstantData::F32(values) => values.clone(),
                    ConstantData::I32(values) => values.iter().map(|&v| v as f32).collect(),
                };
                Ok(HostTensor::new(out_dims, data))
            }
            Op::Unary(op) => {
                let x = input(0)?;
                let f: fn(f32) -> f32 = match op {
                    UnaryOp::Exp => f32::exp,
                    UnaryOp::Log => f32::ln,
                    UnaryOp::Sqrt => f32::sqrt,
                    UnaryOp::Floor => f32::floor,
                    UnaryOp::Tanh => f32::tanh,
                    UnaryOp::Sigmoid => |v| 1.0 / (1.0 + (-v).exp()),
                };
                Ok(HostTensor::new(
                    out_dims,
                    x.data.iter().map(|&v| f(v)).collect(),
                ))
            }
            Op::Binary(op) => {
                let f: fn(f32, f32) -> f32 = match op {
                    BinaryOp::Add => |a, b| a + b,
                    BinaryOp::Sub => |a, b| a - b,
                    BinaryOp::Mul => |a, b| a * b,
                    BinaryOp::Div => |a, b| a / b,
                    BinaryOp::Pow => f32::powf,
                    BinaryOp::Min => f32::min,
                    BinaryOp::Max => f32::max,
                };
                Ok(broadcast_binary(input(0)?, input(1)?, &out_dims, f))
            }
            Op::Compare(op) => {
                let f: fn(f32, f32) -> f32 = match op {
                    CompareOp::Equal => |a, b| (a == b) as u8 as f32,
                    CompareOp::Less => |a, b| (a < b) as u8 as f32,
                    CompareOp::Greater => |a, b| (a > b) as u8 as f32,
                };
                Ok(broadcast_binary(input(0)?, input(1)?, &out_dims, f))
            }
            Op::Select => {
                let (pred, on_true, on_false) = (input(0)?, input(1)?, input(2)?);
                let count = out_dims.iter().product();
                let mut data = Vec::with_capacity(count);
                for flat in 0..count {
                    let coords = coords_of(flat, &out_dims);
                    let p = pred.data[broadcast_offset(&coords, &pred.dims)];
                    let value = if p != 0.0 {
                        on_true.data[broadcast_offset(&coords, &on_true.dims)]
                    } else {
                        on_false.data[broadcast_offset(&coords, &on_false.dims)]
                    };
                    data.push(value);
                }
                Ok(HostTensor::new(out_dims, data))
            }
            Op::MatMul => Ok(matmul(input(0)?, input(1)?, &out_dims)),
            Op::Conv2d(spec) => Ok(conv2d(input(0)?, input(1)?, spec, &out_dims)),
            Op::DepthwiseConv2d(spec) => {
                Ok(depthwise_conv2d(input(0)?, input(1)?, spec, &out_dims))
            }
            Op::ConvTranspose2d(spec) => {
                Ok(conv_transpose2d(input(0)?, input(1)?, spec, &out_dims))
            }
            Op::AvgPool2d(spec) => Ok(pool2d(input(0)?, spec, &out_dims, false)),
            Op::MaxPool2d(spec) => Ok(pool2d(input(0)?, spec, &out_dims, true)),
            Op::Normalize { epsilon } => {
                let (x, mean, var, gamma, beta) =
                    (input(0)?, input(1)?, input(2)?, input(3)?, input(4)?);
                let count = out_dims.iter().product();
                let mut data = Vec::with_capacity(count);
                for flat in 0..count {
                    let coords = coords_of(flat, &out_dims);
                    let m = mean.data[broadcast_offset(&coords, &mean.dims)];
                    let v = var.data[broadcast_offset(&coords, &var.dims)];
                    let g = gamma.data[broadcast_offset(&coords, &gamma.dims)];
                    let b = beta.data[broadcast_offset(&coords, &beta.dims)];
                    let value = (x.data[flat] - m) / (v + epsilon).sqrt() * g + b;
                    data.push(value);
                }
                Ok(HostTensor::new(out_dims, data))
            }
            Op::Softmax { axis } => Ok(softmax(input(0)?, *axis)),
            Op::Reduce {
                kind,
                axes,
                keepdims: _,
            } => Ok(reduce(input(0)?, *kind, axes, &out_dims)),
            Op::Reshape => Ok(HostTensor::new(out_dims, input(0)?.data.clone())),
            Op::Transpose { perm } => Ok(transpose(input(0)?, perm, &out_dims)),
            Op::Slice {
                starts,
                ends: _,
                steps,
            } => Ok(slice(input(0)?, starts, steps, &out_dims)),
            Op::Concat { axis } => {
                let inputs: Result<Vec<&HostTensor>, BackendError> =
                    (0..node.inputs.len()).map(input).collect();
                Ok(concat(&inputs?, *axis, &out_dims))
            }
            Op::Pad {
                mode,
                begin,
                end: _,
                value,
            } => Ok(pad(input(0)?, *mode, begin, *value, &out_dims)),
            Op::Resize { mode } => Ok(resize(input(0)?, *mode, &out_dims)),
            Op::Gather { axis } => gather(input(0)?, input(1)?, *axis, &out_dims),
            Op::GatherElements { axis } => gather_elements(input(0)?, input(1)?, *axis, &out_dims),
            Op::DepthToSpace {
                block,
                pixel_shuffle,
            } => Ok(depth_to_space(input(0)?, *block, *pixel_shuffle, &out_dims)),
            Op::Tile { repeats: _ } => Ok(tile(input(0)?, &out_dims)),
            Op::Cast => {
                let x = input(0)?;
                let data = match node.spec.dtype {
                    DType::I32 => x.data.iter().map(|&v| v as i32 as f32).collect(),
                    DType::Bool => x.data.iter().map(|&v| (v != 0.0) as u8 as f32).collect(),
                    DType::F16 | DType::F32 => x.data.clone(),
                };
                Ok(HostTensor::new(out_dims, data))
            }
        }
    }
}

fn coords_of(mut flat: usize, dims: &[usize]) -> Vec<usize> {
    let mut coords = vec![0usize; dims.len()];
    for axis in (0..dims.len()).rev() {
        coords[axis] = flat % dims[axis];
        flat /= dims[axis];
    }
    coords
}

/// Flat offset of right-aligned broadcast coordinates into a tensor of
/// `dims`; unit axes snap to index zero.
fn broadcast_offset(coords: &[usize], dims: &[usize]) -> usize {
    let skip = coords.len() - dims.len();
    let mut offset = 0usize;
    for (axis, &dim) in dims.iter().enumerate() {
        let coord = if dim == 1 { 0 } else { coords[skip + axis] };
        offset = offset * dim + coord;
    }
    offset
}

fn broadcast_binary(
    a: &HostTensor,
    b: &HostTensor,
    out_dims: &[usize],
    f: fn(f32, f32) -> f32,
) -> HostTensor {
    let count = out_dims.iter().product();
    let mut data = Vec::with_capacity(count);
    for flat in 0..count {
        let coords = coords_of(flat, out_dims);
        let lhs = a.data[broadcast_offset(&coords, &a.dims)];
        let rhs = b.data[broadcast_offset(&coords, &b.dims)];
        data.push(f(lhs, rhs));
    }
    HostTensor::new(out_dims.to_vec(), data)
}

fn matmul(a: &HostTensor, b: &HostTensor, out_dims: &[usize]) -> HostTensor {
    let rank = out_dims.len();
    let (m, n) = (out_dims[rank - 2], out_dims[rank - 1]);
    let k = a.dims[a.dims.len() - 1];
    let batch_dims = &out_dims[..rank - 2];
    let batch_count: usize = batch_dims.iter().product();

    let mut data = vec![0.0f32; batch_count * m * n];
    for batch in 0..batch_count {
        let coords = coords_of(batch, batch_dims);
        let a_base = broadcast_offset(&coords, &a.dims[..a.dims.len() - 2]) * m * k;
        let b_base = broadcast_offset(&coords, &b.dims[..b.dims.len() - 2]) * k * n;
        for row in 0..m {
            for col in 0..n {
                let mut acc = 0.0f32;
                for inner in 0..k {
                    acc += a.data[a_base + row * k + inner] * b.data[b_base + inner * n + col];
                }
                data[(batch * m + row) * n + col] = acc;
            }
        }
    }
    HostTensor::new(out_dims.to_vec(), data)
}

fn conv2d(x: &HostTensor, w: &HostTensor, spec: &Conv2dSpec, out_dims: &[usize]) -> HostTensor {
    let [n, oc, oh, ow] = [out_dims[0], out_dims[1], out_dims[2], out_dims[3]];
    let [c, h, width] = [x.dims[1], x.dims[2], x.dims[3]];
    let [kh, kw] = [w.dims[2], w.dims[3]];
    let c_per_group = c / spec.groups;
    let o_per_group = oc / spec.groups;

    let mut data = vec![0.0f32; n * oc * oh * ow];
    for batch in 0..n {
        for out_c in 0..oc {
            let group = out_c / o_per_group;
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut acc = 0.0f32;
                    for in_c in 0..c_per_group {
                        for ky in 0..kh {
                            let iy = (oy * spec.strides[0] + ky * spec.dilations[0]) as isize
                                - spec.pads[0] as isize;
                            if iy < 0 || iy >= h as isize {
                                continue;
                            }
                            for kx in 0..kw {
                                let ix = (ox * spec.strides[1] + kx * spec.dilations[1]) as isize
                                    - spec.pads[1] as isize;
                                if ix < 0 || ix >= width as isize {
                                    continue;
                                }
                                let x_index = ((batch * c + group * c_per_group + in_c) * h
                                    + iy as usize)
                                    * width
                                    + ix as usize;
                                let w_index = ((out_c * c_per_group + in_c) * kh + ky) * kw + kx;
                                acc += x.data[x_index] * w.data[w_index];
                            }
                        }
                    }
                    data[((batch * oc + out_c) * oh + oy) * ow + ox] = acc;
                }
            }
        }
    }
    HostTensor::new(out_dims.to_vec(), data)
}

/// Weights are `[multiplier, channels, kH, kW]`; output channel `c*M + m`.
fn depthwise_conv2d(
    x: &HostTensor,
    w: &HostTensor,
    spec: &Conv2dSpec,
    out_dims: &[usize],
) -> HostTensor {
    let [n, _oc, oh, ow] = [out_dims[0], out_dims[1], out_dims[2], out_dims[3]];
    let [c, h, width] = [x.dims[1], x.dims[2], x.dims[3]];
    let [mult, kh, kw] = [w.dims[0], w.dims[2], w.dims[3]];
    let oc = c * mult;

    let mut data = vec![0.0f32; n * oc * oh * ow];
    for batch in 0..n {
        for in_c in 0..c {
            for m in 0..mult {
                let out_c = in_c * mult + m;
                for oy in 0..oh {
                    for ox in 0..ow {
                        let mut acc = 0.0f32;
                        for ky in 0..kh {
                            let iy = (oy * spec.strides[0] + ky * spec.dilations[0]) as isize
                                - spec.pads[0] as isize;
                            if iy < 0 || iy >= h as isize {
                                continue;
                            }
                            for kx in 0..kw {
                                let ix = (ox * spec.strides[1] + kx * spec.dilations[1]) as isize
                                    - spec.pads[1] as isize;
                                if ix < 0 || ix >= width as isize {
                                    continue;
                                }
                                let x_index = ((batch * c + in_c) * h + iy as usize) * width
                                    + ix as usize;
                                let w_index = ((m * c + in_c) * kh + ky) * kw + kx;
                                acc += x.data[x_index] * w.data[w_index];
                            }
                        }
                        data[((batch * oc + out_c) * oh + oy) * ow + ox] = acc;
                    }
                }
            }
        }
    }
    HostTensor::new(out_dims.to_vec(), data)
}

/// Weights are `[in, out/groups, kH, kW]`; scatter-accumulate formulation.
fn conv_transpose2d(
    x: &HostTensor,
    w: &HostTensor,
    spec: &Conv2dSpec,
    out_dims: &[usize],
) -> HostTensor {
    let [n, oc, oh, ow] = [out_dims[0], out_dims[1], out_dims[2], out_dims[3]];
    let [c, h, width] = [x.dims[1], x.dims[2], x.dims[3]];
    let [o_per_group, kh, kw] = [w.dims[1], w.dims[2], w.dims[3]];
    let c_per_group = c / spec.groups;

    let mut data = vec![0.0f32; n * oc * oh * ow];
    for batch in 0..n {
        for in_c in 0..c {
            let group = in_c / c_per_group;
            for out_offset in 0..o_per_group {
                let out_c = group * o_per_group + out_offset;
                for iy in 0..h {
                    for ix in 0..width {
                        let x_value = x.data[((batch * c + in_c) * h + iy) * width + ix];
                        for ky in 0..kh {
                            let oy = (iy * spec.strides[0] + ky * spec.dilations[0]) as isize
                                - spec.pads[0] as isize;
                            if oy < 0 || oy >= oh as isize {
                                continue;
                            }
                            for kx in 0..kw {
                                let ox = (ix * spec.strides[1] + kx * spec.dilations[1]) as isize
                                    - spec.pads[1] as isize;
                                if ox < 0 || ox >= ow as isize {
                                    continue;
                                }
                                let w_index =
                                    ((in_c * o_per_group + out_offset) * kh + ky) * kw + kx;
                                data[((batch * oc + out_c) * oh + oy as usize) * ow + ox as usize] +=
                                    x_value * w.data[w_index];
                            }
                        }
                    }
                }
            }
        }
    }
    HostTensor::new(out_dims.to_vec(), data)
}

fn pool2d(x: &HostTensor, spec: &Pool2dSpec, out_dims: &[usize], max: bool) -> HostTensor {
    let [n, c, oh, ow] = [out_dims[0], out_dims[1], out_dims[2], out_dims[3]];
    let [h, width] = [x.dims[2], x.dims[3]];

    let mut data = vec![0.0f32; n * c * oh * ow];
    for batch in 0..n {
        for channel in 0..c {
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut acc = if max { f32::NEG_INFINITY } else { 0.0 };
                    let mut taps = 0usize;
                    for ky in 0..spec.kernel[0] {
                        let iy = (oy * spec.strides[0] + ky) as isize - spec.pads[0] as isize;
                        if iy < 0 || iy >= h as isize {
                            continue;
                        }
                        for kx in 0..spec.kernel[1] {
                            let ix = (ox * spec.strides[1] + kx) as isize - spec.pads[1] as isize;
                            if ix < 0 || ix >= width as isize {
                                continue;
                            }
                            let value = x.data
                                [((batch * c + channel) * h + iy as usize) * width + ix as usize];
                            if max {
                                acc = acc.max(value);
                            } else {
                                acc += value;
                            }
                            taps += 1;
                        }
                    }
                    // average excludes padding taps, per count_include_pad=0
                    let value = if max {
                        acc
                    } else if taps > 0 {
                        acc / taps as f32
                    } else {
                        0.0
                    };
                    data[((batch * c + channel) * oh + oy) * ow + ox] = value;
                }
            }
        }
    }
    HostTensor::new(out_dims.to_vec(), data)
}

fn softmax(x: &HostTensor, axis: usize) -> HostTensor {
    let dims = &x.dims;
    let axis_len = dims[axis];
    let inner: usize = dims[axis + 1..].iter().product();
    let outer: usize = dims[..axis].iter().product();

    let mut data = vec![0.0f32; x.data.len()];
    for o in 0..outer {
        for i in 0..inner {
            let index = |a: usize| (o * axis_len + a) * inner + i;
            let mut max = f32::NEG_INFINITY;
            for a in 0..axis_len {
                max = max.max(x.data[index(a)]);
            }
            let mut sum = 0.0f32;
            for a in 0..axis_len {
                let e = (x.data[index(a)] - max).exp();
                data[index(a)] = e;
                sum += e;
            }
            for a in 0..axis_len {
                data[index(a)] /= sum;
            }
        }
    }
    HostTensor::new(dims.clone(), data)
}

fn reduce(x: &HostTensor, kind: ReduceKind, axes: &[usize], out_dims: &[usize]) -> HostTensor {
    let count: usize = out_dims.iter().product();
    let mut data = vec![0.0f32; count];

    // accumulate every input element into its output slot
    let keepdims = out_dims.len() == x.dims.len();
    for flat in 0..x.data.len() {
        let coords = coords_of(flat, &x.dims);
        let mut out_offset = 0usize;
        let mut out_axis = 0usize;
        for (axis, &coord) in coords.iter().enumerate() {
            let reduced = axes.contains(&axis);
            if reduced && !keepdims {
                continue;
            }
            let coord = if reduced { 0 } else { coord };
            out_offset = out_offset * out_dims[out_axis] + coord;
            out_axis += 1;
        }
        data[out_offset] += x.data[flat];
    }

    if kind == ReduceKind::Mean {
        let reduced: usize = axes.iter().map(|&axis| x.dims[axis]).product();
        for value in &mut data {
            *value /= reduced as f32;
        }
    }
    HostTensor::new(out_dims.to_vec(), data)
}

fn transpose(x: &HostTensor, perm: &[usize], out_dims: &[usize]) -> HostTensor {
    let count = x.data.len();
    let mut data = vec![0.0f32; count];
    for flat in 0..count {
        let out_coords = coords_of(flat, out_dims);
        let mut in_coords = vec![0usize; perm.len()];
        for (out_axis, &in_axis) in perm.iter().enumerate() {
            in_coords[in_axis] = out_coords[out_axis];
        }
        data[flat] = x.data[offset_of(&in_coords, &x.dims)];
    }
    HostTensor::new(out_dims.to_vec(), data)
}

fn offset_of(coords: &[usize], dims: &[usize]) -> usize {
    let mut offset = 0usize;
    for (axis, &dim) in dims.iter().enumerate() {
        offset = offset * dim + coords[axis];
    }
    offset
}

fn slice(x: &HostTensor, starts: &[usize], steps: &[usize], out_dims: &[usize]) -> HostTensor {
    let count: usize = out_dims.iter().product();
    let mut data = Vec::with_capacity(count);
    for flat in 0..count {
        let coords = coords_of(flat, out_dims);
        let in_coords: Vec<usize> = coords
            .iter()
            .enumerate()
            .map(|(axis, &coord)| starts[axis] + coord * steps[axis])
            .collect();
        data.push(x.data[offset_of(&in_coords, &x.dims)]);
    }
    HostTensor::new(out_dims.to_vec(), data)
}

fn concat(inputs: &[&HostTensor], axis: usize, out_dims: &[usize]) -> HostTensor {
    let count: usize = out_dims.iter().product();
    let mut data = Vec::with_capacity(count);
    for flat in 0..count {
        let mut coords = coords_of(flat, out_dims);
        let mut source = 0usize;
        while coords[axis] >= inputs[source].dims[axis] {
            coords[axis] -= inputs[source].dims[axis];
            source += 1;
        }
        data.push(inputs[source].data[offset_of(&coords, &inputs[source].dims)]);
    }
    HostTensor::new(out_dims.to_vec(), data)
}

fn pad(
    x: &HostTensor,
    mode: PadMode,
    begin: &[usize],
    value: f32,
    out_dims: &[usize],
) -> HostTensor {
    let count: usize = out_dims.iter().product();
    let mut data = Vec::with_capacity(count);
    'outer: for flat in 0..count {
        let coords = coords_of(flat, out_dims);
        let mut in_coords = vec![0usize; coords.len()];
        for (axis, &coord) in coords.iter().enumerate() {
            let shifted = coord as isize - begin[axis] as isize;
            let extent = x.dims[axis] as isize;
            let resolved = match mode {
                PadMode::Constant => {
                    if shifted < 0 || shifted >= extent {
                        data.push(value);
                        continue 'outer;
                    }
                    shifted
                }
                PadMode::Reflect => {
                    let mut index = shifted;
                    while index < 0 || index >= extent {
                        if index < 0 {
                            index = -index;
                        }
                        if index >= extent {
                            index = 2 * (extent - 1) - index;
                        }
                    }
                    index
                }
            };
            in_coords[axis] = resolved as usize;
        }
        data.push(x.data[offset_of(&in_coords, &x.dims)]);
    }
    HostTensor::new(out_dims.to_vec(), data)
}

fn resize(x: &HostTensor, mode: ResizeMode, out_dims: &[usize]) -> HostTensor {
    let [n, c, oh, ow] = [out_dims[0], out_dims[1], out_dims[2], out_dims[3]];
    let [h, w] = [x.dims[2], x.dims[3]];
    let scale_y = h as f32 / oh as f32;
    let scale_x = w as f32 / ow as f32;

    let mut data = Vec::with_capacity(n * c * oh * ow);
    for batch in 0..n {
        for channel in 0..c {
            let plane = |y: usize, x_coord: usize| {
                x.data[((batch * c + channel) * h + y) * w + x_coord]
            };
            for oy in 0..oh {
                for ox in 0..ow {
                    let value = match mode {
                        ResizeMode::Nearest => {
                            let sy = ((oy as f32 * scale_y).floor() as usize).min(h - 1);
                            let sx = ((ox as f32 * scale_x).floor() as usize).min(w - 1);
                            plane(sy, sx)
                        }
                        ResizeMode::Bilinear => {
                            // half-pixel centers
                            let fy = ((oy as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (h - 1) as f32);
                            let fx = ((ox as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (w - 1) as f32);
                            let y0 = fy.floor() as usize;
                            let x0 = fx.floor() as usize;
                            let y1 = (y0 + 1).min(h - 1);
                            let x1 = (x0 + 1).min(w - 1);
                            let dy = fy - y0 as f32;
                            let dx = fx - x0 as f32;
                            let top = plane(y0, x0) * (1.0 - dx) + plane(y0, x1) * dx;
                            let bottom = plane(y1, x0) * (1.0 - dx) + plane(y1, x1) * dx;
                            top * (1.0 - dy) + bottom * dy
                        }
                    };
                    data.push(value);
                }
            }
        }
    }
    HostTensor::new(out_dims.to_vec(), data)
}

fn gather(
    data_tensor: &HostTensor,
    indices: &HostTensor,
    axis: usize,
    out_dims: &[usize],
) -> Result<HostTensor, BackendError> {
    let index_rank = indices.dims.len();
    let count: usize = out_dims.iter().product();
    let extent = data_tensor.dims[axis] as i64;

    let mut data = Vec::with_capacity(count);
    for flat in 0..count {
        let coords = coords_of(flat, out_dims);
        let index_coords = &coords[axis..axis + index_rank];
        let mut picked = indices.data[offset_of(index_coords, &indices.dims)] as i64;
        if picked < 0 {
            picked += extent;
        }
        if picked < 0 || picked >= extent {
            return Err(BackendError::execution(format!(
                "gather index {picked} out of range for extent {extent}"
            )));
        }
        let mut in_coords = Vec::with_capacity(data_tensor.dims.len());
        in_coords.extend_from_slice(&coords[..axis]);
        in_coords.push(picked as usize);
        in_coords.extend_from_slice(&coords[axis + index_rank..]);
        data.push(data_tensor.data[offset_of(&in_coords, &data_tensor.dims)]);
    }
    Ok(HostTensor::new(out_dims.to_vec(), data))
}

fn gather_elements(
    data_tensor: &HostTensor,
    indices: &HostTensor,
    axis: usize,
    out_dims: &[usize],
) -> Result<HostTensor, BackendError> {
    let count: usize = out_dims.iter().product();
    let extent = data_tensor.dims[axis] as i64;

    let mut data = Vec::with_capacity(count);
    for flat in 0..count {
        let coords = coords_of(flat, out_dims);
        let mut picked = indices.data[flat] as i64;
        if picked < 0 {
            picked += extent;
        }
        if picked < 0 || picked >= extent {
            return Err(BackendError::execution(format!(
                "gather index {picked} out of range for extent {extent}"
            )));
        }
        let mut in_coords = coords.clone();
        in_coords[axis] = picked as usize;
        data.push(data_tensor.data[offset_of(&in_coords, &data_tensor.dims)]);
    }
    Ok(HostTensor::new(out_dims.to_vec(), data))
}

fn depth_to_space(x: &HostTensor, block: usize, pixel_shuffle: bool, out_dims: &[usize]) -> HostTensor {
    let [n, oc, oh, ow] = [out_dims[0], out_dims[1], out_dims[2], out_dims[3]];
    let [c, h, w] = [x.dims[1], x.dims[2], x.dims[3]];

    let mut data = Vec::with_capacity(n * oc * oh * ow);
    for batch in 0..n {
        for out_c in 0..oc {
            for oy in 0..oh {
                for ox in 0..ow {
                    let (iy, by) = (oy / block, oy % block);
                    let (ix, bx) = (ox / block, ox % block);
                    let in_c = if pixel_shuffle {
                        // CRD: channel-major block layout
                        out_c * block * block + by * block + bx
                    } else {
                        // DCR: depth-major block layout
                        (by * block + bx) * oc + out_c
                    };
                    data.push(x.data[((batch * c + in_c) * h + iy) * w + ix]);
                }
            }
        }
    }
    HostTensor::new(out_dims.to_vec(), data)
}

fn tile(x: &HostTensor, out_dims: &[usize]) -> HostTensor {
    let count: usize = out_dims.iter().product();
    let mut data = Vec::with_capacity(count);
    for flat in 0..count {
        let coords = coords_of(flat, out_dims);
        let in_coords: Vec<usize> = coords
            .iter()
            .zip(x.dims.iter())
            .map(|(&coord, &dim)| coord % dim)
            .collect();
        data.push(x.data[offset_of(&in_coords, &x.dims)]);
    }
    HostTensor::new(out_dims.to_vec(), data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_offset_snaps_unit_axes() {
        // [C,1,1] statistics against NCHW coordinates
        assert_eq!(broadcast_offset(&[0, 2, 3, 1], &[4, 1, 1]), 2);
        // trailing-aligned rank difference
        assert_eq!(broadcast_offset(&[1, 2, 2], &[3]), 2);
    }

    #[test]
    fn softmax_normalizes_along_axis() {
        let x = HostTensor::new(vec![1, 3], vec![1.0, 2.0, 3.0]);
        let y = softmax(&x, 1);
        let sum: f32 = y.data.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(y.data[2] > y.data[1] && y.data[1] > y.data[0]);
    }

    #[test]
    fn reduce_mean_matches_hand_computation() {
        let x = HostTensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        let y = reduce(&x, ReduceKind::Mean, &[1], &[2, 1]);
        assert_eq!(y.data, vec![1.5, 3.5]);
    }

    #[test]
    fn reflect_pad_mirrors_without_edge_repeat() {
        let x = HostTensor::new(vec![4], vec![1.0, 2.0, 3.0, 4.0]);
        let y = pad(&x, PadMode::Reflect, &[2], 0.0, &[8]);
        assert_eq!(y.data, vec![3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0]);
    }

    #[test]
    fn nearest_resize_doubles_pixels() {
        let x = HostTensor::new(vec![1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        let y = resize(&x, ResizeMode::Nearest, &[1, 1, 4, 4]);
        assert_eq!(y.data[0], 1.0);
        assert_eq!(y.data[1], 1.0);
        assert_eq!(y.data[3], 2.0);
        assert_eq!(y.data[15], 4.0);
    }
}
