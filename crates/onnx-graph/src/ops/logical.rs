//! Comparison and selection operators.
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#Equal
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#Where

use crate::error::OnnxError;
use crate::graph::{CompareOp, DType};
use crate::model::Node;

use super::{Translated, TranslateCx};

fn compare(cx: &mut TranslateCx, node: &Node, op: CompareOp) -> Result<Translated, OnnxError> {
    let a = cx.require(node, 0)?;
    let b = cx.require(node, 1)?;
    Ok(Translated::One(cx.graph.compare(op, a, b)?))
}

pub(crate) fn equal(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    compare(cx, node, CompareOp::Equal)
}

pub(crate) fn greater(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    compare(cx, node, CompareOp::Greater)
}

pub(crate) fn less(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    compare(cx, node, CompareOp::Less)
}

pub(crate) fn where_op(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let predicate = cx.require(node, 0)?;
    let on_true = cx.require(node, 1)?;
    let on_false = cx.require(node, 2)?;
    // condition tensors materialized from constants arrive as floats
    let predicate = cx.graph.cast(predicate, DType::Bool)?;
    Ok(Translated::One(cx.graph.select(predicate, on_true, on_false)?))
}
