#![allow(dead_code)]

use std::collections::HashMap;

use onnx_graph::{
    AttributeValue, ElementType, HostTensor, Model, ModelInput, Node, TensorData, ValueInfo,
};

pub fn node(
    kind: &str,
    name: &str,
    inputs: &[&str],
    outputs: &[&str],
    attrs: Vec<(&str, AttributeValue)>,
) -> Node {
    Node::new(
        kind,
        name,
        inputs.iter().map(|s| s.to_string()).collect(),
        outputs.iter().map(|s| s.to_string()).collect(),
        attrs.into_iter().map(|(k, v)| (k.to_string(), v)),
    )
}

pub fn model(
    nodes: Vec<Node>,
    initializers: Vec<(&str, TensorData)>,
    inputs: Vec<(&str, Vec<i64>)>,
    outputs: &[&str],
    value_info: Vec<(&str, Vec<i64>)>,
) -> Model {
    let initializers: HashMap<String, TensorData> = initializers
        .into_iter()
        .map(|(name, data)| (name.to_string(), data))
        .collect();
    let inputs = inputs
        .into_iter()
        .map(|(name, dims)| ModelInput {
            name: name.to_string(),
            dims,
        })
        .collect();
    let value_info = value_info
        .into_iter()
        .map(|(name, dims)| {
            (
                name.to_string(),
                ValueInfo {
                    element_type: ElementType::F32,
                    dims,
                },
            )
        })
        .collect();
    Model::from_parts(
        nodes,
        initializers,
        inputs,
        outputs.iter().map(|s| s.to_string()).collect(),
        value_info,
    )
    .expect("test model is well formed")
}

/// Deterministic pseudo-weights: a small ramp cycling through a fixed range.
pub fn ramp(count: usize) -> Vec<f32> {
    (0..count).map(|i| ((i % 13) as f32 - 6.0) / 7.0).collect()
}

pub fn tensor(dims: &[usize], data: Vec<f32>) -> HostTensor {
    HostTensor::new(dims.to_vec(), data)
}

pub fn feeds(entries: Vec<(&str, HostTensor)>) -> HashMap<String, HostTensor> {
    entries
        .into_iter()
        .map(|(name, tensor)| (name.to_string(), tensor))
        .collect()
}

pub fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (index, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "value {index}: {a} vs {e} (tolerance {tolerance})"
        );
    }
}
