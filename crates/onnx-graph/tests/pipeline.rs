mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{assert_close, feeds, model, node, ramp, tensor};
use onnx_graph::pipeline::CustomStep;
use onnx_graph::{
    AttributeReader, CompiledGraph, GraphConfig, HostTensor, OnnxError, Pipeline, TensorData,
};
use onnx_graph_backend_ref_cpu::RefCpuBackend;

/// Host implementation of the unknown `Negate` kind.
struct NegateStep;

impl CustomStep for NegateStep {
    fn evaluate(
        &self,
        inputs: &[HostTensor],
        output_shapes: &[Vec<usize>],
        _attrs: &dyn AttributeReader,
    ) -> anyhow::Result<Vec<HostTensor>> {
        let input = &inputs[0];
        Ok(vec![HostTensor::new(
            output_shapes[0].clone(),
            input.data.iter().map(|v| -v).collect(),
        )])
    }
}

/// Returns the wrong number of outputs on purpose.
struct BrokenArityStep;

impl CustomStep for BrokenArityStep {
    fn evaluate(
        &self,
        inputs: &[HostTensor],
        _output_shapes: &[Vec<usize>],
        _attrs: &dyn AttributeReader,
    ) -> anyhow::Result<Vec<HostTensor>> {
        Ok(vec![inputs[0].clone(), inputs[0].clone()])
    }
}

/// Returns a tensor that contradicts its declared shape.
struct WrongShapeStep;

impl CustomStep for WrongShapeStep {
    fn evaluate(
        &self,
        _inputs: &[HostTensor],
        _output_shapes: &[Vec<usize>],
        _attrs: &dyn AttributeReader,
    ) -> anyhow::Result<Vec<HostTensor>> {
        Ok(vec![HostTensor::new(vec![1], vec![0.0])])
    }
}

fn steps(entries: Vec<(&str, Arc<dyn CustomStep>)>) -> HashMap<String, Arc<dyn CustomStep>> {
    entries
        .into_iter()
        .map(|(kind, step)| (kind.to_string(), step))
        .collect()
}

/// `y = -(x * x) + x`, with the negation living outside the backend.
fn negate_model(with_value_info: bool) -> onnx_graph::Model {
    let value_info = if with_value_info {
        vec![("neg", vec![1i64, 4])]
    } else {
        vec![]
    };
    model(
        vec![
            node("Mul", "mul_0", &["x", "x"], &["sq"], vec![]),
            node("Negate", "negate_0", &["sq"], &["neg"], vec![]),
            node("Add", "add_0", &["neg", "x"], &["y"], vec![]),
        ],
        vec![],
        vec![("x", vec![1, 4])],
        &["y"],
        value_info,
    )
}

#[test]
fn custom_step_round_trip() {
    let backend = RefCpuBackend::new();
    let pipeline = Pipeline::compile(
        &negate_model(true),
        &backend,
        steps(vec![("Negate", Arc::new(NegateStep))]),
        &GraphConfig::single_precision(),
    )
    .expect("compile");

    assert_eq!(pipeline.segment_count(), 2);
    assert_eq!(pipeline.input_specs()["x"].dims, vec![1, 4]);
    assert_eq!(pipeline.output_specs()["y"].dims, vec![1, 4]);

    let x = [0.5f32, -1.0, 2.0, 0.0];
    let outputs = pipeline
        .run(&feeds(vec![("x", tensor(&[1, 4], x.to_vec()))]))
        .expect("run");

    let expected: Vec<f32> = x.iter().map(|v| -(v * v) + v).collect();
    assert_close(&outputs["y"].data, &expected, 1e-6);
}

#[test]
fn empty_custom_steps_match_the_plain_compiler() {
    let weights = TensorData::from_f32s(vec![2, 3, 3, 3], &ramp(2 * 3 * 3 * 3));
    let conv = model(
        vec![
            node("Conv", "conv_0", &["input", "w"], &["conv_out"], vec![]),
            node("Sigmoid", "sig_0", &["conv_out"], &["output"], vec![]),
        ],
        vec![("w", weights)],
        vec![("input", vec![1, 3, 6, 6])],
        &["output"],
        vec![],
    );

    let backend = RefCpuBackend::new();
    let config = GraphConfig::single_precision();
    let input = feeds(vec![("input", tensor(&[1, 3, 6, 6], ramp(3 * 36)))]);

    let plain = CompiledGraph::compile(&conv, &backend, &config)
        .expect("plain compile")
        .run(&input)
        .expect("plain run");
    let pipeline = Pipeline::compile(&conv, &backend, HashMap::new(), &config)
        .expect("pipeline compile");
    assert_eq!(pipeline.segment_count(), 1);
    let piped = pipeline.run(&input).expect("pipeline run");

    assert_eq!(plain["output"].data, piped["output"].data);
}

#[test]
fn missing_custom_step_is_an_unsupported_operator() {
    let backend = RefCpuBackend::new();
    let err = Pipeline::compile(
        &negate_model(true),
        &backend,
        steps(vec![("SomethingElse", Arc::new(NegateStep))]),
        &GraphConfig::single_precision(),
    )
    .expect_err("must fail");
    assert!(matches!(err, OnnxError::UnsupportedOperator(kind) if kind == "Negate"));
}

#[test]
fn missing_output_shape_metadata_is_an_invalid_model() {
    let backend = RefCpuBackend::new();
    let err = Pipeline::compile(
        &negate_model(false),
        &backend,
        steps(vec![("Negate", Arc::new(NegateStep))]),
        &GraphConfig::single_precision(),
    )
    .expect_err("must fail");
    assert!(matches!(err, OnnxError::InvalidModel { .. }));
}

#[test]
fn wrong_output_arity_is_attributed_to_the_custom_step() {
    let backend = RefCpuBackend::new();
    let pipeline = Pipeline::compile(
        &negate_model(true),
        &backend,
        steps(vec![("Negate", Arc::new(BrokenArityStep))]),
        &GraphConfig::single_precision(),
    )
    .expect("compile");

    let err = pipeline
        .run(&feeds(vec![("x", tensor(&[1, 4], vec![1.0; 4]))]))
        .expect_err("must fail");
    assert!(matches!(
        err,
        OnnxError::IncorrectCustomStep { op_type, .. } if op_type == "Negate"
    ));
}

#[test]
fn declared_shape_violations_are_attributed_to_the_custom_step() {
    let backend = RefCpuBackend::new();
    let pipeline = Pipeline::compile(
        &negate_model(true),
        &backend,
        steps(vec![("Negate", Arc::new(WrongShapeStep))]),
        &GraphConfig::single_precision(),
    )
    .expect("compile");

    let err = pipeline
        .run(&feeds(vec![("x", tensor(&[1, 4], vec![1.0; 4]))]))
        .expect_err("must fail");
    assert!(matches!(err, OnnxError::IncorrectCustomStep { .. }));
}

#[test]
fn two_boundaries_carry_distinct_alive_sets_end_to_end() {
    // y = relu(-(-(x*x) + x) * x), negation hosted twice
    let model = model(
        vec![
            node("Mul", "mul_0", &["x", "x"], &["sq"], vec![]),
            node("Negate", "negate_0", &["sq"], &["neg"], vec![]),
            node("Add", "add_0", &["neg", "x"], &["mid"], vec![]),
            node("Mul", "mul_1", &["mid", "x"], &["scaled"], vec![]),
            node("Negate", "negate_1", &["scaled"], &["neg2"], vec![]),
            node("Relu", "relu_0", &["neg2"], &["y"], vec![]),
        ],
        vec![],
        vec![("x", vec![1, 4])],
        &["y"],
        vec![("neg", vec![1, 4]), ("neg2", vec![1, 4])],
    );

    let backend = RefCpuBackend::new();
    let pipeline = Pipeline::compile(
        &model,
        &backend,
        steps(vec![("Negate", Arc::new(NegateStep))]),
        &GraphConfig::single_precision(),
    )
    .expect("compile");
    assert_eq!(pipeline.segment_count(), 3);

    let x = [0.5f32, -1.0, 2.0, -0.25];
    let outputs = pipeline
        .run(&feeds(vec![("x", tensor(&[1, 4], x.to_vec()))]))
        .expect("run");
    let expected: Vec<f32> = x
        .iter()
        .map(|v| {
            let mid = -(v * v) + v;
            (-(mid * v)).max(0.0)
        })
        .collect();
    assert_close(&outputs["y"].data, &expected, 1e-6);
}

#[test]
fn pipeline_warm_up_smoke() {
    let backend = RefCpuBackend::new();
    let pipeline = Pipeline::compile(
        &negate_model(true),
        &backend,
        steps(vec![("Negate", Arc::new(NegateStep))]),
        &GraphConfig::single_precision(),
    )
    .expect("compile");
    pipeline.warm_up().expect("warm up");
}
