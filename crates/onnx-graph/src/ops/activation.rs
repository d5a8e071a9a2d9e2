//! Activation functions.

use crate::attrs::AttributeReader;
use crate::error::OnnxError;
use crate::graph::{BinaryOp, TensorId, UnaryOp};
use crate::model::Node;

use super::{normalize_axis, unsupported, Translated, TranslateCx};

pub(crate) fn relu(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let x = cx.require(node, 0)?;
    Ok(Translated::One(cx.graph.binary_scalar(BinaryOp::Max, x, 0.0)?))
}

/// `y = max(0, x) + alpha * min(0, x)` with a broadcastable slope.
fn leaky(cx: &mut TranslateCx, x: TensorId, slope: TensorId) -> Result<TensorId, OnnxError> {
    let positive = cx.graph.binary_scalar(BinaryOp::Max, x, 0.0)?;
    let negative = cx.graph.binary_scalar(BinaryOp::Min, x, 0.0)?;
    let scaled = cx.graph.mul(slope, negative)?;
    Ok(cx.graph.add(positive, scaled)?)
}

pub(crate) fn leaky_relu(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let x = cx.require(node, 0)?;
    let alpha = node.attr_f("alpha").unwrap_or(0.01);
    let slope = cx.graph.scalar(alpha, cx.dtype)?;
    Ok(Translated::One(leaky(cx, x, slope)?))
}

pub(crate) fn prelu(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let x = cx.require(node, 0)?;

    if let Some(slope) = cx.input(node, 1) {
        return Ok(Translated::One(leaky(cx, x, slope)?));
    }

    let alpha = cx
        .constant_floats(node, 1)
        .and_then(|values| values.first().copied())
        .or_else(|| node.attr_f("alpha"))
        .ok_or_else(|| unsupported(node, "missing slope"))?;
    let slope = cx.graph.scalar(alpha, cx.dtype)?;
    Ok(Translated::One(leaky(cx, x, slope)?))
}

/// `y = max(0, x) + alpha * (exp(min(0, x)) - 1)`
pub(crate) fn elu(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let x = cx.require(node, 0)?;
    let alpha = node.attr_f("alpha").unwrap_or(1.0);
    let positive = cx.graph.binary_scalar(BinaryOp::Max, x, 0.0)?;
    let negative = cx.graph.binary_scalar(BinaryOp::Min, x, 0.0)?;
    let exp = cx.graph.unary(UnaryOp::Exp, negative)?;
    let shifted = cx.graph.binary_scalar(BinaryOp::Sub, exp, 1.0)?;
    let scaled = cx.graph.binary_scalar(BinaryOp::Mul, shifted, alpha)?;
    Ok(Translated::One(cx.graph.add(positive, scaled)?))
}

pub(crate) fn sigmoid(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let x = cx.require(node, 0)?;
    Ok(Translated::One(cx.graph.unary(UnaryOp::Sigmoid, x)?))
}

/// `y = max(0, min(1, alpha * x + beta))`
pub(crate) fn hard_sigmoid(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let x = cx.require(node, 0)?;
    let alpha = node.attr_f("alpha").unwrap_or(0.2);
    let beta = node.attr_f("beta").unwrap_or(0.5);
    let scaled = cx.graph.binary_scalar(BinaryOp::Mul, x, alpha)?;
    let shifted = cx.graph.binary_scalar(BinaryOp::Add, scaled, beta)?;
    let clipped = cx.graph.binary_scalar(BinaryOp::Min, shifted, 1.0)?;
    Ok(Translated::One(cx.graph.binary_scalar(BinaryOp::Max, clipped, 0.0)?))
}

pub(crate) fn tanh(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let x = cx.require(node, 0)?;
    Ok(Translated::One(cx.graph.unary(UnaryOp::Tanh, x)?))
}

pub(crate) fn softmax(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let x = cx.require(node, 0)?;
    let rank = cx.graph.spec(x).rank();
    let axis = normalize_axis(node.attr_i("axis").unwrap_or(-1), rank)
        .ok_or_else(|| unsupported(node, "axis out of range"))?;
    Ok(Translated::One(cx.graph.softmax(x, axis)?))
}
