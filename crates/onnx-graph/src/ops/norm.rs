//! Normalization operators.
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#BatchNormalization
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#InstanceNormalization
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#GroupNormalization

use crate::attrs::AttributeReader;
use crate::error::OnnxError;
use crate::graph::{ReduceKind, TensorId};
use crate::model::Node;

use super::{unsupported, Translated, TranslateCx};

const DEFAULT_EPSILON: f32 = 1e-5;

/// Reshapes rank-1 per-channel statistics to `[C, 1, 1]` so they broadcast
/// over NCHW activations.
fn reshape_hw(cx: &mut TranslateCx, tensor: TensorId) -> Result<TensorId, OnnxError> {
    let spec = cx.graph.spec(tensor);
    if spec.rank() == 1 {
        let c = spec.dims[0];
        return Ok(cx.graph.reshape_exact(tensor, vec![c, 1, 1])?);
    }
    Ok(tensor)
}

/// Population variance of `x` around `mean` over `axes`, keepdims.
fn variance(
    cx: &mut TranslateCx,
    x: TensorId,
    mean: TensorId,
    axes: &[usize],
) -> Result<TensorId, OnnxError> {
    let centered = cx.graph.sub(x, mean)?;
    let squared = cx.graph.mul(centered, centered)?;
    Ok(cx.graph.reduce(ReduceKind::Mean, squared, axes, true)?)
}

pub(crate) fn batch_norm(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let gamma = cx.require(node, 1)?;
    let beta = cx.require(node, 2)?;
    let mean = cx.require(node, 3)?;
    let var = cx.require(node, 4)?;

    let epsilon = node.attr_f("epsilon").unwrap_or(DEFAULT_EPSILON);
    let mean = reshape_hw(cx, mean)?;
    let var = reshape_hw(cx, var)?;
    let gamma = reshape_hw(cx, gamma)?;
    let beta = reshape_hw(cx, beta)?;

    Ok(Translated::One(
        cx.graph.normalize(input, mean, var, gamma, beta, epsilon)?,
    ))
}

pub(crate) fn instance_norm(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let gamma = cx.require(node, 1)?;
    let beta = cx.require(node, 2)?;

    let axes = [2usize, 3];
    let mean = cx.graph.reduce(ReduceKind::Mean, input, &axes, true)?;
    let var = variance(cx, input, mean, &axes)?;
    let gamma = reshape_hw(cx, gamma)?;
    let beta = reshape_hw(cx, beta)?;
    let epsilon = node.attr_f("epsilon").unwrap_or(DEFAULT_EPSILON);

    Ok(Translated::One(
        cx.graph.normalize(input, mean, var, gamma, beta, epsilon)?,
    ))
}

/// Shared group normalization body: reshape to `(-1, g, c/g, H, W)`, take
/// population statistics over the trailing axes, normalize and reshape back.
fn group_norm_body(
    cx: &mut TranslateCx,
    node: &Node,
    input: TensorId,
    gamma: TensorId,
    beta: TensorId,
    groups: usize,
    epsilon: Option<f32>,
) -> Result<Translated, OnnxError> {
    let orig_dims = cx.graph.spec(input).dims.clone();
    if orig_dims.len() != 4 {
        return Err(unsupported(node, "group norm expects NCHW input"));
    }
    let (c, h, w) = (orig_dims[1], orig_dims[2], orig_dims[3]);
    if groups == 0 || c % groups != 0 {
        return Err(unsupported(
            node,
            format!("channels {c} not divisible into {groups} groups"),
        ));
    }
    let section = c / groups;

    let x = cx.graph.reshape(
        input,
        &[-1, groups as i64, section as i64, h as i64, w as i64],
    )?;

    let axes = [2usize, 3, 4];
    let mean = cx.graph.reduce(ReduceKind::Mean, x, &axes, true)?;
    let var = variance(cx, x, mean, &axes)?;

    let stat_dims = vec![1, groups, section, 1, 1];
    let gamma = cx.graph.reshape_exact(gamma, stat_dims.clone())?;
    let beta = cx.graph.reshape_exact(beta, stat_dims)?;

    let normalized = cx
        .graph
        .normalize(x, mean, var, gamma, beta, epsilon.unwrap_or(DEFAULT_EPSILON))?;
    Ok(Translated::One(cx.graph.reshape_exact(normalized, orig_dims)?))
}

/// ONNX-18 form: `num_groups`/`epsilon` attributes, inputs `[x, scale, bias]`.
pub(crate) fn group_norm(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let gamma = cx.require(node, 1)?;
    let beta = cx.require(node, 2)?;
    let groups = node
        .attr_i("num_groups")
        .filter(|&g| g > 0)
        .ok_or_else(|| unsupported(node, "missing num_groups"))?;
    group_norm_body(cx, node, input, gamma, beta, groups as usize, node.attr_f("epsilon"))
}

/// Producer-emitted form: groups and epsilon arrive as constant inputs,
/// `[x, groups, scale, bias, epsilon]`.
pub(crate) fn custom_group_norm(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let gamma = cx.require(node, 2)?;
    let beta = cx.require(node, 3)?;
    let groups = cx
        .constant_floats(node, 1)
        .and_then(|values| values.first().copied())
        .filter(|&g| g >= 1.0)
        .ok_or_else(|| unsupported(node, "missing groups constant"))?;
    let epsilon = cx
        .constant_floats(node, 4)
        .and_then(|values| values.first().copied());
    group_norm_body(cx, node, input, gamma, beta, groups as usize, epsilon)
}
