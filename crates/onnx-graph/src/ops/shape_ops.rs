//! Shape and layout manipulation operators.
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md

use crate::attrs::AttributeReader;
use crate::error::OnnxError;
use crate::graph::{ConstantData, PadMode, TensorId};
use crate::model::Node;

use super::{normalize_axis, unsupported, Translated, TranslateCx};

pub(crate) fn reshape(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;

    // the target shape must fold to a constant; this is a static-shape
    // compiler and data-dependent shapes have no placeholder to flow through
    let shape = cx
        .constant_ints(node, 1)
        .ok_or_else(|| unsupported(node, "shape input is not a constant"))?;

    Ok(Translated::One(cx.graph.reshape(input, &shape)?))
}

pub(crate) fn squeeze(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let raw_axes = node
        .attr_ints("axes")
        .map(|axes| axes.to_vec())
        .or_else(|| cx.constant_ints(node, 1))
        .unwrap_or_default();

    let rank = cx.graph.spec(input).rank();
    let mut axes = Vec::with_capacity(raw_axes.len());
    for axis in raw_axes {
        axes.push(
            normalize_axis(axis, rank).ok_or_else(|| unsupported(node, "axis out of range"))?,
        );
    }
    Ok(Translated::One(cx.graph.squeeze(input, &axes)?))
}

pub(crate) fn unsqueeze(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let raw_axes = node
        .attr_ints("axes")
        .map(|axes| axes.to_vec())
        .or_else(|| cx.constant_ints(node, 1))
        .ok_or_else(|| unsupported(node, "missing axes"))?;

    // axes are positions in the *output* shape
    let out_rank = cx.graph.spec(input).rank() + raw_axes.len();
    let mut axes = Vec::with_capacity(raw_axes.len());
    for axis in raw_axes {
        axes.push(
            normalize_axis(axis, out_rank)
                .ok_or_else(|| unsupported(node, "axis out of range"))?,
        );
    }
    Ok(Translated::One(cx.graph.unsqueeze(input, &axes)?))
}

pub(crate) fn flatten(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let rank = cx.graph.spec(input).rank();
    let axis = node.attr_i("axis").unwrap_or(1);
    // axis == rank is legal here: everything flattens into the leading dim
    let axis = if axis == rank as i64 {
        rank
    } else {
        normalize_axis(axis, rank).ok_or_else(|| unsupported(node, "axis out of range"))?
    };
    Ok(Translated::One(cx.graph.flatten2d(input, axis)?))
}

/// The input shape is static, so `Shape` folds to a constant of the graph
/// dtype. Opset-15 `start`/`end` attributes are not handled.
pub(crate) fn shape(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    if node.attr_i("start").is_some() || node.attr_i("end").is_some() {
        return Err(unsupported(node, "start/end attributes"));
    }
    let dims = cx.graph.spec(input).dims.clone();
    let values: Vec<f32> = dims.iter().map(|&d| d as f32).collect();
    let rank = dims.len();
    let dtype = cx.dtype;
    Ok(Translated::One(cx.graph.constant(
        ConstantData::F32(values),
        vec![rank],
        dtype,
    )?))
}

pub(crate) fn permute(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let perm = node
        .attr_ints("perm")
        .ok_or_else(|| unsupported(node, "missing perm"))?;
    let rank = cx.graph.spec(input).rank();
    let mut axes = Vec::with_capacity(perm.len());
    for &axis in perm {
        axes.push(
            normalize_axis(axis, rank).ok_or_else(|| unsupported(node, "perm out of range"))?,
        );
    }
    Ok(Translated::One(cx.graph.transpose(input, &axes)?))
}

pub(crate) fn slice(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let starts = cx
        .constant_ints(node, 1)
        .ok_or_else(|| unsupported(node, "starts input is not a constant"))?;
    let ends = cx
        .constant_ints(node, 2)
        .ok_or_else(|| unsupported(node, "ends input is not a constant"))?;
    if starts.len() != ends.len() {
        return Err(unsupported(node, "starts/ends length mismatch"));
    }
    let axes = cx.constant_ints(node, 3);
    let steps = cx.constant_ints(node, 4);

    let dims = cx.graph.spec(input).dims.clone();
    let rank = dims.len();

    // ONNX bounds may be negative (count from the back) or huge (clamp)
    let resolve = |value: i64, extent: usize| -> usize {
        let value = if value < 0 { value + extent as i64 } else { value };
        value.clamp(0, extent as i64) as usize
    };

    let mut shaped_starts = vec![0usize; rank];
    let mut shaped_ends: Vec<usize> = dims.clone();
    let mut shaped_steps = vec![1usize; rank];

    for (index, &start) in starts.iter().enumerate() {
        let axis = match &axes {
            Some(axes) => normalize_axis(axes[index], rank)
                .ok_or_else(|| unsupported(node, "slice axis out of range"))?,
            None => index,
        };
        if axis >= rank {
            return Err(unsupported(node, "slice axis out of range"));
        }
        let step = steps.as_ref().map(|s| s[index]).unwrap_or(1);
        if step < 1 {
            return Err(unsupported(node, "negative slice steps"));
        }
        shaped_starts[axis] = resolve(start, dims[axis]);
        shaped_ends[axis] = resolve(ends[index], dims[axis]).max(shaped_starts[axis]);
        shaped_steps[axis] = step as usize;
    }

    Ok(Translated::One(cx.graph.slice(
        input,
        &shaped_starts,
        &shaped_ends,
        &shaped_steps,
    )?))
}

pub(crate) fn split(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let dims = cx.graph.spec(input).dims.clone();
    let axis = normalize_axis(node.attr_i("axis").unwrap_or(0), dims.len())
        .ok_or_else(|| unsupported(node, "axis out of range"))?;

    let parts = node.outputs().len();
    let chunks: Vec<usize> = match node
        .attr_ints("split")
        .map(|chunks| chunks.to_vec())
        .or_else(|| cx.constant_ints(node, 1))
    {
        Some(chunks) => {
            if chunks.len() != parts || chunks.iter().any(|&c| c < 1) {
                return Err(unsupported(node, "split sizes do not match outputs"));
            }
            chunks.into_iter().map(|c| c as usize).collect()
        }
        // default: equal parts
        None => {
            if parts == 0 || dims[axis] % parts != 0 {
                return Err(unsupported(node, "axis extent not divisible into equal parts"));
            }
            vec![dims[axis] / parts; parts]
        }
    };
    if chunks.iter().sum::<usize>() != dims[axis] {
        return Err(unsupported(node, "split sizes do not cover the axis"));
    }

    let mut outputs: Vec<TensorId> = Vec::with_capacity(parts);
    let mut offset = 0usize;
    for &chunk in &chunks {
        let mut starts = vec![0usize; dims.len()];
        let mut ends = dims.clone();
        starts[axis] = offset;
        ends[axis] = offset + chunk;
        let steps = vec![1usize; dims.len()];
        outputs.push(cx.graph.slice(input, &starts, &ends, &steps)?);
        offset += chunk;
    }
    Ok(Translated::Many(outputs))
}

pub(crate) fn concat(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let axis_attr = node
        .attr_i("axis")
        .ok_or_else(|| unsupported(node, "missing axis"))?;

    let mut inputs = Vec::with_capacity(node.inputs().len());
    for index in 0..node.inputs().len() {
        inputs.push(cx.require(node, index)?);
    }
    let rank = cx.graph.spec(inputs[0]).rank();
    let axis =
        normalize_axis(axis_attr, rank).ok_or_else(|| unsupported(node, "axis out of range"))?;

    Ok(Translated::One(cx.graph.concat(&inputs, axis)?))
}

pub(crate) fn pad(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let mode = match node.attr_s("mode") {
        None | Some("") | Some("constant") => PadMode::Constant,
        Some("reflect") => PadMode::Reflect,
        Some(other) => return Err(unsupported(node, format!("pad mode {other:?}"))),
    };
    let pads = cx
        .constant_ints(node, 1)
        .or_else(|| node.attr_ints("pads").map(|p| p.to_vec()))
        .ok_or_else(|| unsupported(node, "missing pads"))?;
    let value = cx
        .constant_floats(node, 2)
        .and_then(|values| values.first().copied())
        .or_else(|| node.attr_f("value"))
        .unwrap_or(0.0);

    let rank = cx.graph.spec(input).rank();
    if pads.len() != 2 * rank || pads.iter().any(|&p| p < 0) {
        return Err(unsupported(node, "pads must list begin/end per axis"));
    }
    let begin: Vec<usize> = pads[..rank].iter().map(|&p| p as usize).collect();
    let end: Vec<usize> = pads[rank..].iter().map(|&p| p as usize).collect();

    Ok(Translated::One(cx.graph.pad(input, mode, &begin, &end, value)?))
}

pub(crate) fn expand(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let shape = cx
        .constant_ints(node, 1)
        .ok_or_else(|| unsupported(node, "shape input is not a constant"))?;
    if shape.iter().any(|&d| d < 1) {
        return Err(unsupported(node, "expand shape must be positive"));
    }
    let dims: Vec<usize> = shape.into_iter().map(|d| d as usize).collect();
    Ok(Translated::One(cx.graph.expand(input, dims)?))
}

pub(crate) fn tile(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let repeats = cx
        .constant_ints(node, 1)
        .ok_or_else(|| unsupported(node, "repeats input is not a constant"))?;
    if repeats.iter().any(|&r| r < 1) {
        return Err(unsupported(node, "repeats must be positive"));
    }
    let repeats: Vec<usize> = repeats.into_iter().map(|r| r as usize).collect();
    Ok(Translated::One(cx.graph.tile(input, &repeats)?))
}

pub(crate) fn depth_to_space(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let block = node
        .attr_i("blocksize")
        .filter(|&b| b > 0)
        .ok_or_else(|| unsupported(node, "missing blocksize"))?;
    let pixel_shuffle = node.attr_s("mode") == Some("CRD");
    Ok(Translated::One(cx.graph.depth_to_space(
        input,
        block as usize,
        pixel_shuffle,
    )?))
}
