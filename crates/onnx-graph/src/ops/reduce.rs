//! Reduction operators.
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#ReduceMean
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#ReduceSum
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#ReduceL2

use crate::attrs::AttributeReader;
use crate::error::OnnxError;
use crate::graph::{ReduceKind, UnaryOp};
use crate::model::Node;

use super::{normalize_axis, unsupported, Translated, TranslateCx};

struct ReduceArgs {
    axes: Vec<usize>,
    keepdims: bool,
}

fn reduce_args(cx: &TranslateCx, node: &Node, rank: usize) -> Result<ReduceArgs, OnnxError> {
    let raw_axes = node
        .attr_ints("axes")
        .map(|axes| axes.to_vec())
        .or_else(|| cx.constant_ints(node, 1))
        .ok_or_else(|| unsupported(node, "missing axes"))?;
    let mut axes = Vec::with_capacity(raw_axes.len());
    for axis in raw_axes {
        axes.push(
            normalize_axis(axis, rank).ok_or_else(|| unsupported(node, "axis out of range"))?,
        );
    }
    Ok(ReduceArgs {
        axes,
        keepdims: node.attr_i("keepdims").unwrap_or(1) > 0,
    })
}

pub(crate) fn reduce_mean(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let args = reduce_args(cx, node, cx.graph.spec(input).rank())?;
    Ok(Translated::One(cx.graph.reduce(
        ReduceKind::Mean,
        input,
        &args.axes,
        args.keepdims,
    )?))
}

pub(crate) fn reduce_sum(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let args = reduce_args(cx, node, cx.graph.spec(input).rank())?;
    Ok(Translated::One(cx.graph.reduce(
        ReduceKind::Sum,
        input,
        &args.axes,
        args.keepdims,
    )?))
}

/// `sqrt(sum(x^2))` over the given axes.
pub(crate) fn reduce_l2(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let args = reduce_args(cx, node, cx.graph.spec(input).rank())?;
    let squared = cx.graph.mul(input, input)?;
    let summed = cx
        .graph
        .reduce(ReduceKind::Sum, squared, &args.axes, args.keepdims)?;
    Ok(Translated::One(cx.graph.unary(UnaryOp::Sqrt, summed)?))
}
