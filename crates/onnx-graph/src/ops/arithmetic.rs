//! Elementwise arithmetic: https://github.com/onnx/onnx/blob/main/docs/Operators.md

use crate::error::OnnxError;
use crate::graph::{BinaryOp, UnaryOp};
use crate::model::Node;

use super::{Translated, TranslateCx};

fn binary(cx: &mut TranslateCx, node: &Node, op: BinaryOp) -> Result<Translated, OnnxError> {
    let a = cx.require(node, 0)?;
    let b = cx.require(node, 1)?;
    Ok(Translated::One(cx.graph.binary(op, a, b)?))
}

fn unary(cx: &mut TranslateCx, node: &Node, op: UnaryOp) -> Result<Translated, OnnxError> {
    let x = cx.require(node, 0)?;
    Ok(Translated::One(cx.graph.unary(op, x)?))
}

pub(crate) fn add(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    binary(cx, node, BinaryOp::Add)
}

pub(crate) fn sub(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    binary(cx, node, BinaryOp::Sub)
}

pub(crate) fn mul(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    binary(cx, node, BinaryOp::Mul)
}

pub(crate) fn div(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    binary(cx, node, BinaryOp::Div)
}

pub(crate) fn pow(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    binary(cx, node, BinaryOp::Pow)
}

pub(crate) fn sqrt(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    unary(cx, node, UnaryOp::Sqrt)
}

pub(crate) fn exp(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    unary(cx, node, UnaryOp::Exp)
}

pub(crate) fn log(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    unary(cx, node, UnaryOp::Log)
}

pub(crate) fn floor(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    unary(cx, node, UnaryOp::Floor)
}
