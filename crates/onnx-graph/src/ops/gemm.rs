//! Matrix products.
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#Gemm
//! https://github.com/onnx/onnx/blob/main/docs/Operators.md#MatMul

use crate::attrs::AttributeReader;
use crate::error::OnnxError;
use crate::graph::BinaryOp;
use crate::model::Node;

use super::{unsupported, Translated, TranslateCx};

/// `Y = alpha * A' * B' + beta * C`
pub(crate) fn gemm(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let mut a = cx.require(node, 0)?;
    let mut b = cx.require(node, 1)?;

    if cx.graph.spec(a).rank() != 2 || cx.graph.spec(b).rank() != 2 {
        return Err(unsupported(node, "gemm operands must be matrices"));
    }

    if node.attr_i("transA").unwrap_or(0) > 0 {
        a = cx.graph.swap_axes(a, 0, 1)?;
    }
    if node.attr_i("transB").unwrap_or(0) > 0 {
        b = cx.graph.swap_axes(b, 0, 1)?;
    }

    let alpha = node.attr_f("alpha").unwrap_or(1.0);
    let beta = node.attr_f("beta").unwrap_or(1.0);

    let mut product = cx.graph.matmul(a, b)?;
    if alpha != 1.0 {
        product = cx.graph.binary_scalar(BinaryOp::Mul, product, alpha)?;
    }

    match cx.input(node, 2) {
        Some(mut c) => {
            if beta != 1.0 {
                c = cx.graph.binary_scalar(BinaryOp::Mul, c, beta)?;
            }
            Ok(Translated::One(cx.graph.add(product, c)?))
        }
        None => Ok(Translated::One(product)),
    }
}

pub(crate) fn matmul(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let a = cx.require(node, 0)?;
    let b = cx.require(node, 1)?;
    Ok(Translated::One(cx.graph.matmul(a, b)?))
}
