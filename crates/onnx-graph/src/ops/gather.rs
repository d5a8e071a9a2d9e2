//! Index gathering.
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#Gather
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#GatherElements

use crate::attrs::AttributeReader;
use crate::error::OnnxError;
use crate::graph::{DType, TensorId};
use crate::model::Node;

use super::{normalize_axis, unsupported, Translated, TranslateCx};

/// Prefers the constants map for indices so scalar index tensors keep their
/// true rank (a rank-0 index drops the gathered axis); runtime index tensors
/// are cast to i32.
fn indices(cx: &mut TranslateCx, node: &Node) -> Result<TensorId, OnnxError> {
    if let Some(data) = cx.constant(node, 1).cloned() {
        return cx.materialize_indices(&data);
    }
    let tensor = cx.require(node, 1)?;
    Ok(cx.graph.cast(tensor, DType::I32)?)
}

pub(crate) fn gather(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let data = cx.require(node, 0)?;
    let indices = indices(cx, node)?;
    let rank = cx.graph.spec(data).rank();
    let axis = normalize_axis(node.attr_i("axis").unwrap_or(0), rank)
        .ok_or_else(|| unsupported(node, "axis out of range"))?;
    Ok(Translated::One(cx.graph.gather(data, indices, axis)?))
}

pub(crate) fn gather_elements(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let data = cx.require(node, 0)?;
    let indices = indices(cx, node)?;
    let rank = cx.graph.spec(data).rank();
    let axis = normalize_axis(node.attr_i("axis").unwrap_or(0), rank)
        .ok_or_else(|| unsupported(node, "axis out of range"))?;
    Ok(Translated::One(cx.graph.gather_elements(data, indices, axis)?))
}
