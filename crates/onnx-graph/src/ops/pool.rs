//! Pooling operators.
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#AveragePool
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#MaxPool
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#GlobalAveragePool

use crate::attrs::AttributeReader;
use crate::error::OnnxError;
use crate::graph::{Pool2dSpec, ReduceKind};
use crate::model::Node;

use super::{ints_pair, ints_quad, unsupported, Translated, TranslateCx};

pub(crate) fn global_avg_pool(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    if cx.graph.spec(input).rank() != 4 {
        return Err(unsupported(node, "global pooling expects NCHW input"));
    }
    Ok(Translated::One(cx.graph.reduce(
        ReduceKind::Mean,
        input,
        &[2, 3],
        true,
    )?))
}

fn pool(cx: &mut TranslateCx, node: &Node, max: bool) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let kernel = node
        .attr_ints("kernel_shape")
        .filter(|k| k.len() == 2 && k.iter().all(|&v| v > 0))
        .map(|k| [k[0] as usize, k[1] as usize])
        .ok_or_else(|| unsupported(node, "missing 2-D kernel_shape"))?;
    let strides = ints_pair(node, "strides", [1, 1])
        .ok_or_else(|| unsupported(node, "malformed strides"))?;
    let pads = ints_quad(node, "pads", [0, 0, 0, 0])
        .ok_or_else(|| unsupported(node, "malformed pads"))?;

    let spec = Pool2dSpec {
        kernel,
        strides,
        pads,
    };
    let output = if max {
        cx.graph.max_pool2d(input, spec)?
    } else {
        cx.graph.avg_pool2d(input, spec)?
    };
    Ok(Translated::One(output))
}

pub(crate) fn avg_pool(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    pool(cx, node, false)
}

pub(crate) fn max_pool(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    pool(cx, node, true)
}
