//! Convolution operators.
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#Conv
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#ConvTranspose
//! https://github.com/microsoft/onnxruntime/blob/main/docs/ContribOperators.md#com.microsoft.FusedConv

use crate::attrs::AttributeReader;
use crate::error::OnnxError;
use crate::graph::{BinaryOp, Conv2dSpec, TensorId};
use crate::model::Node;

use super::{ints_pair, ints_quad, unsupported, Translated, TranslateCx};

/// Only explicit padding is supported; any `auto_pad` policy is rejected.
fn auto_pad_not_set(node: &Node) -> bool {
    matches!(node.attr_s("auto_pad"), None | Some("") | Some("NOTSET"))
}

fn conv_attrs(node: &Node) -> Result<Conv2dSpec, OnnxError> {
    let strides = ints_pair(node, "strides", [1, 1])
        .ok_or_else(|| unsupported(node, "malformed strides"))?;
    let dilations = ints_pair(node, "dilations", [1, 1])
        .ok_or_else(|| unsupported(node, "malformed dilations"))?;
    let pads = ints_quad(node, "pads", [0, 0, 0, 0])
        .ok_or_else(|| unsupported(node, "malformed pads"))?;
    let groups = node.attr_i("group").unwrap_or(1);
    if groups < 1 {
        return Err(unsupported(node, "group must be positive"));
    }
    Ok(Conv2dSpec {
        strides,
        dilations,
        pads,
        groups: groups as usize,
    })
}

/// Appends trailing unit dims to a rank-1 bias so it broadcasts over the
/// spatial axes.
fn bias_broadcast(cx: &mut TranslateCx, bias: TensorId, count: usize) -> Result<TensorId, OnnxError> {
    let spec = cx.graph.spec(bias);
    if spec.rank() == 1 {
        let mut dims = spec.dims.clone();
        dims.extend(std::iter::repeat(1).take(count));
        return Ok(cx.graph.reshape_exact(bias, dims)?);
    }
    Ok(bias)
}

fn conv_body(cx: &mut TranslateCx, node: &Node) -> Result<TensorId, OnnxError> {
    let input = cx.require(node, 0)?;
    let weights = cx.require(node, 1)?;
    if !auto_pad_not_set(node) {
        return Err(unsupported(node, "auto_pad is not supported"));
    }
    let spec = conv_attrs(node)?;

    let input_rank = cx.graph.spec(input).rank();
    if input_rank != 4 {
        return Err(unsupported(node, "only 2-D convolution is supported"));
    }

    // groups == output channels of the weight tensor marks a depthwise
    // convolution; the weight layout then carries the channel multiplier on
    // the O axis and needs an O<->I swap before the backend call
    let weight_o = cx.graph.spec(weights).dims[0];
    let convolution = if spec.groups != 1 && spec.groups == weight_o {
        let swapped = cx.graph.swap_axes(weights, 0, 1)?;
        cx.graph.depthwise_conv2d(input, swapped, spec)?
    } else {
        cx.graph.conv2d(input, weights, spec)?
    };

    match cx.input(node, 2) {
        Some(bias) => {
            let bias = bias_broadcast(cx, bias, input_rank - 2)?;
            Ok(cx.graph.add(convolution, bias)?)
        }
        None => Ok(convolution),
    }
}

pub(crate) fn conv(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    Ok(Translated::One(conv_body(cx, node)?))
}

pub(crate) fn fused_conv(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let mut output = conv_body(cx, node)?;

    if let Some(residual) = cx.input(node, 3) {
        output = cx.graph.add(output, residual)?;
    }

    match node.attr_s("activation") {
        Some("Relu") => output = cx.graph.binary_scalar(BinaryOp::Max, output, 0.0)?,
        None | Some("") => {}
        Some(other) => {
            return Err(unsupported(node, format!("unsupported activation {other:?}")))
        }
    }

    Ok(Translated::One(output))
}

pub(crate) fn conv_transpose(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let weights = cx.require(node, 1)?;
    if !auto_pad_not_set(node) {
        return Err(unsupported(node, "auto_pad is not supported"));
    }
    let spec = conv_attrs(node)?;
    let output_padding = ints_pair(node, "output_padding", [0, 0])
        .ok_or_else(|| unsupported(node, "malformed output_padding"))?;

    let input_dims = cx.graph.spec(input).dims.clone();
    let weight_dims = cx.graph.spec(weights).dims.clone();
    if input_dims.len() != 4 || weight_dims.len() != 4 {
        return Err(unsupported(node, "only 2-D transposed convolution is supported"));
    }

    // The output extent is derived analytically, never inferred:
    // out[i] = stride[i]*(in[i]-1) + output_padding[i]
    //        + ((kernel[i]-1)*dilation[i] + 1) - pad_begin[i] - pad_end[i]
    let extent = |axis: usize| -> Result<usize, OnnxError> {
        let numer = spec.strides[axis] * (input_dims[2 + axis] - 1)
            + output_padding[axis]
            + (weight_dims[2 + axis] - 1) * spec.dilations[axis]
            + 1;
        let pads = spec.pads[axis] + spec.pads[axis + 2];
        numer
            .checked_sub(pads)
            .filter(|&v| v > 0)
            .ok_or_else(|| unsupported(node, "padding swallows the whole output"))
    };
    let output_hw = [extent(0)?, extent(1)?];

    let convolution = cx.graph.conv_transpose2d(input, weights, spec, output_hw)?;

    match cx.input(node, 2) {
        Some(bias) => {
            let bias = bias_broadcast(cx, bias, 2)?;
            Ok(Translated::One(cx.graph.add(convolution, bias)?))
        }
        None => Ok(Translated::One(convolution)),
    }
}
