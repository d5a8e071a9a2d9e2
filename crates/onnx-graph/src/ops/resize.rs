//! Spatial resize.
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#Resize
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#Upsample

use crate::attrs::AttributeReader;
use crate::error::OnnxError;
use crate::graph::ResizeMode;
use crate::model::Node;

use super::{unsupported, Translated, TranslateCx};

/// H/W scale factors come from the first 4-float constant among the trailing
/// inputs (`scales` moved around across opsets), else the `scales` attribute
/// kept by Upsample-7. The target extent uses the round policy:
/// `out = round(in * scale)`.
pub(crate) fn resize(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let input = cx.require(node, 0)?;
    let dims = cx.graph.spec(input).dims.clone();
    if dims.len() != 4 {
        return Err(unsupported(node, "resize expects NCHW input"));
    }

    let scales: Option<Vec<f32>> = (1..node.inputs().len())
        .filter_map(|index| cx.constant_floats(node, index))
        .find(|values| values.len() == 4)
        .or_else(|| {
            node.attr_floats("scales")
                .filter(|values| values.len() == 4)
                .map(|values| values.to_vec())
        });
    let (scale_h, scale_w) = match scales {
        Some(values) => (values[2], values[3]),
        None => (1.0, 1.0),
    };

    if scale_h == 1.0 && scale_w == 1.0 {
        return Ok(Translated::One(input));
    }
    if scale_h <= 0.0 || scale_w <= 0.0 {
        return Err(unsupported(node, "scales must be positive"));
    }

    let mode = if node.attr_s("mode") == Some("linear") {
        ResizeMode::Bilinear
    } else {
        ResizeMode::Nearest
    };

    let height = (dims[2] as f32 * scale_h).round() as usize;
    let width = (dims[3] as f32 * scale_w).round() as usize;

    Ok(Translated::One(cx.graph.resize(input, mode, height, width)?))
}
