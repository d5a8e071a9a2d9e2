//! Constant capture and inference no-ops.

use crate::attrs::AttributeReader;
use crate::error::OnnxError;
use crate::model::Node;

use super::{unsupported, Translated, TranslateCx};

/// Terminal `Constant` nodes feed the same constants map as the initializer
/// table so later nodes can look either up uniformly.
pub(crate) fn constant(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    let value = node
        .attr_tensor("value")
        .ok_or_else(|| unsupported(node, "missing value tensor"))?
        .clone();
    for output in node.outputs() {
        cx.constants.insert(output.clone(), value.clone());
    }
    Ok(Translated::One(cx.materialize(&value)?))
}

/// Identity for kinds whose effect is absorbed elsewhere: `Cast` (the graph
/// dtype is uniform), `Clip` (value ranges are handled at the boundaries)
/// and inference-time `Dropout`.
pub(crate) fn passthrough(cx: &mut TranslateCx, node: &Node) -> Result<Translated, OnnxError> {
    Ok(Translated::One(cx.require(node, 0)?))
}
