mod common;

use std::collections::{BTreeSet, HashSet};

use common::{model, node};
use onnx_graph::TensorData;

fn kinds(list: &[&str]) -> HashSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Two custom nodes, the first boundary crossed by a tensor that is still
/// consumed later, the second after that tensor's last consumer.
fn shared_tensor_model() -> onnx_graph::Model {
    model(
        vec![
            node("Relu", "relu_0", &["x"], &["s"], vec![]),
            node("Glow", "glow_0", &["s"], &["u"], vec![]),
            node("Add", "add_0", &["u", "s"], &["v"], vec![]),
            node("Glow", "glow_1", &["v"], &["w"], vec![]),
            node("Relu", "relu_1", &["w"], &["y"], vec![]),
        ],
        vec![],
        vec![("x", vec![1, 4])],
        &["y"],
        vec![],
    )
}

#[test]
fn alive_sets_track_remaining_consumers() {
    let model = shared_tensor_model();
    let boundaries = model.split_points(&kinds(&["Glow"]));

    assert_eq!(boundaries.len(), 2);
    // `s` is read again by add_0, so it crosses the first boundary
    assert_eq!(boundaries["glow_0"], names(&["s"]));
    // by the second boundary `s` is fully consumed and must be gone
    assert_eq!(boundaries["glow_1"], names(&["v"]));
}

#[test]
fn own_outputs_are_excluded_from_the_alive_set() {
    let model = shared_tensor_model();
    let boundaries = model.split_points(&kinds(&["Glow"]));
    assert!(!boundaries["glow_0"].contains("u"));
    assert!(!boundaries["glow_1"].contains("w"));
}

#[test]
fn initializer_inputs_never_cross_a_boundary() {
    let weights = TensorData::from_f32s(vec![4], &[1.0; 4]);
    let model = model(
        vec![
            node("Relu", "relu_0", &["x"], &["a"], vec![]),
            node("Glow", "glow_0", &["a", "w"], &["b"], vec![]),
            node("Relu", "relu_1", &["b"], &["y"], vec![]),
        ],
        vec![("w", weights)],
        vec![("x", vec![1, 4])],
        &["y"],
        vec![],
    );
    let boundaries = model.split_points(&kinds(&["Glow"]));
    assert_eq!(boundaries["glow_0"], names(&["a"]));
}

#[test]
fn splitting_by_multiple_kinds_merges_boundaries() {
    let model = shared_tensor_model();
    let glow = model.split_points(&kinds(&["Glow"]));
    let relu = model.split_points(&kinds(&["Relu"]));
    let both = model.split_points(&kinds(&["Glow", "Relu"]));

    assert_eq!(both.len(), glow.len() + relu.len());
    for (name, alive) in glow.iter().chain(relu.iter()) {
        assert_eq!(&both[name], alive);
    }
}

#[test]
fn no_split_kinds_means_no_boundaries() {
    let model = shared_tensor_model();
    assert!(model.split_points(&HashSet::new()).is_empty());
}
