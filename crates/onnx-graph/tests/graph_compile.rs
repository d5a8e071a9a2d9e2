mod common;

use common::{assert_close, feeds, model, node, ramp, tensor};
use onnx_graph::{
    AttributeValue, CompiledGraph, GraphConfig, InputConfig, OnnxError, OutputConfig, TensorData,
};
use onnx_graph_backend_ref_cpu::RefCpuBackend;

fn conv_bn_relu_model() -> onnx_graph::Model {
    let weights = TensorData::from_f32s(vec![4, 3, 3, 3], &ramp(4 * 3 * 3 * 3));
    let bias = TensorData::from_f32s(vec![4], &[0.1, -0.2, 0.3, -0.4]);
    let gamma = TensorData::from_f32s(vec![4], &[1.0; 4]);
    let beta = TensorData::from_f32s(vec![4], &[0.0; 4]);
    let mean = TensorData::from_f32s(vec![4], &[0.0; 4]);
    let var = TensorData::from_f32s(vec![4], &[1.0; 4]);

    model(
        vec![
            node("Conv", "conv_0", &["input", "w", "b"], &["conv_out"], vec![]),
            node(
                "BatchNormalization",
                "bn_0",
                &["conv_out", "gamma", "beta", "mean", "var"],
                &["bn_out"],
                vec![],
            ),
            node("Relu", "relu_0", &["bn_out"], &["output"], vec![]),
        ],
        vec![
            ("w", weights),
            ("b", bias),
            ("gamma", gamma),
            ("beta", beta),
            ("mean", mean),
            ("var", var),
        ],
        vec![("input", vec![1, 3, 8, 8])],
        &["output"],
        vec![],
    )
}

#[test]
fn conv_bn_relu_compiles_to_one_executable() {
    let backend = RefCpuBackend::new();
    let graph = CompiledGraph::compile(
        &conv_bn_relu_model(),
        &backend,
        &GraphConfig::single_precision(),
    )
    .expect("compile");

    assert_eq!(graph.input_specs().len(), 1);
    assert_eq!(graph.input_specs()["input"].dims, vec![1, 3, 8, 8]);
    assert_eq!(graph.output_specs()["output"].dims, vec![1, 4, 6, 6]);

    // a zero input must still produce a tensor of the declared shape
    let outputs = graph
        .run(&feeds(vec![(
            "input",
            tensor(&[1, 3, 8, 8], vec![0.0; 3 * 64]),
        )]))
        .expect("run");
    let output = &outputs["output"];
    assert_eq!(output.dims, vec![1, 4, 6, 6]);
    assert!(output.data.iter().all(|v| v.is_finite()));
}

#[test]
fn unregistered_operator_fails_with_typed_error() {
    let bad = model(
        vec![node("FancyNewOp", "fancy_0", &["input"], &["output"], vec![])],
        vec![],
        vec![("input", vec![1, 4])],
        &["output"],
        vec![],
    );
    let backend = RefCpuBackend::new();
    let err = CompiledGraph::compile(&bad, &backend, &GraphConfig::single_precision())
        .expect_err("must fail");
    match err {
        OnnxError::UnsupportedOperator(kind) => assert_eq!(kind, "FancyNewOp"),
        other => panic!("expected UnsupportedOperator, got {other:?}"),
    }
}

#[test]
fn conv_defaults_match_explicit_attributes() {
    let weights = || TensorData::from_f32s(vec![2, 3, 3, 3], &ramp(2 * 3 * 3 * 3));

    let implicit = model(
        vec![node("Conv", "conv_0", &["input", "w"], &["output"], vec![])],
        vec![("w", weights())],
        vec![("input", vec![1, 3, 6, 6])],
        &["output"],
        vec![],
    );
    let explicit = model(
        vec![node(
            "Conv",
            "conv_0",
            &["input", "w"],
            &["output"],
            vec![
                ("strides", AttributeValue::Ints(vec![1, 1])),
                ("dilations", AttributeValue::Ints(vec![1, 1])),
                ("pads", AttributeValue::Ints(vec![0, 0, 0, 0])),
            ],
        )],
        vec![("w", weights())],
        vec![("input", vec![1, 3, 6, 6])],
        &["output"],
        vec![],
    );

    let backend = RefCpuBackend::new();
    let config = GraphConfig::single_precision();
    let input = feeds(vec![("input", tensor(&[1, 3, 6, 6], ramp(3 * 36)))]);

    let lhs = CompiledGraph::compile(&implicit, &backend, &config)
        .expect("compile implicit")
        .run(&input)
        .expect("run implicit");
    let rhs = CompiledGraph::compile(&explicit, &backend, &config)
        .expect("compile explicit")
        .run(&input)
        .expect("run explicit");

    assert_eq!(lhs["output"].data, rhs["output"].data);
}

#[test]
fn compilation_is_deterministic() {
    let backend = RefCpuBackend::new();
    let config = GraphConfig::single_precision();
    let input = feeds(vec![("input", tensor(&[1, 3, 8, 8], ramp(3 * 64)))]);

    let first = CompiledGraph::compile(&conv_bn_relu_model(), &backend, &config)
        .expect("compile")
        .run(&input)
        .expect("run");
    let second = CompiledGraph::compile(&conv_bn_relu_model(), &backend, &config)
        .expect("compile")
        .run(&input)
        .expect("run");

    // bit-identical outputs, not merely close
    assert_eq!(first["output"].data, second["output"].data);
}

#[test]
fn placeholder_names_survive_backend_mangling() {
    let relu = model(
        vec![node("Relu", "relu_0", &["input.1"], &["out/0"], vec![])],
        vec![],
        vec![("input.1", vec![2, 2])],
        &["out/0"],
        vec![],
    );
    let backend = RefCpuBackend::new();
    let graph = CompiledGraph::compile(&relu, &backend, &GraphConfig::single_precision())
        .expect("compile");

    assert_eq!(graph.assigned_name("input.1"), Some("input_1"));

    // callers keep using the original ONNX names
    let outputs = graph
        .run(&feeds(vec![(
            "input.1",
            tensor(&[2, 2], vec![-1.0, 2.0, -3.0, 4.0]),
        )]))
        .expect("run");
    assert_eq!(outputs["out/0"].data, vec![0.0, 2.0, 0.0, 4.0]);
}

#[test]
fn value_ranges_rescale_at_the_boundaries() {
    let relu = model(
        vec![node("Relu", "relu_0", &["input"], &["output"], vec![])],
        vec![],
        vec![("input", vec![1, 2])],
        &["output"],
        vec![],
    );
    let mut config = GraphConfig::single_precision();
    config.inputs.insert(
        "input".to_string(),
        InputConfig {
            dims: Default::default(),
            value_range: Some((-1.0, 1.0)),
        },
    );
    config.outputs.insert(
        "output".to_string(),
        OutputConfig {
            value_range: Some((-1.0, 1.0)),
        },
    );

    let backend = RefCpuBackend::new();
    let graph = CompiledGraph::compile(&relu, &backend, &config).expect("compile");
    let outputs = graph
        .run(&feeds(vec![("input", tensor(&[1, 2], vec![0.75, 0.25]))]))
        .expect("run");

    // in: [0;1] -> [-1;1], relu, out: [-1;1] -> [0;1]
    // 0.75 -> 0.5 -> 0.5 -> 0.75 ; 0.25 -> -0.5 -> 0 -> 0.5
    assert_close(&outputs["output"].data, &[0.75, 0.5], 1e-6);
}

#[test]
fn dimension_overrides_bind_symbolic_extents() {
    let relu = model(
        vec![node("Relu", "relu_0", &["input"], &["output"], vec![])],
        vec![],
        vec![("input", vec![-1, 3])],
        &["output"],
        vec![],
    );
    let backend = RefCpuBackend::new();

    // without an override the symbolic extent is an error
    let err = CompiledGraph::compile(&relu, &backend, &GraphConfig::single_precision())
        .expect_err("must fail");
    assert!(matches!(err, OnnxError::InvalidModel { .. }));

    let mut config = GraphConfig::single_precision();
    config.inputs.insert(
        "input".to_string(),
        InputConfig {
            dims: [(0usize, 2usize)].into_iter().collect(),
            value_range: None,
        },
    );
    let graph = CompiledGraph::compile(&relu, &backend, &config).expect("compile");
    assert_eq!(graph.input_specs()["input"].dims, vec![2, 3]);
}

#[test]
fn gemm_matches_hand_computation() {
    let b = TensorData::from_f32s(vec![2, 3], &[0.5, -1.0, 2.0, 1.5, 0.0, -0.5]);
    let c = TensorData::from_f32s(vec![3], &[0.25, -0.25, 1.0]);
    let gemm = model(
        vec![node(
            "Gemm",
            "gemm_0",
            &["input", "b", "c"],
            &["output"],
            vec![
                ("alpha", AttributeValue::Float(2.0)),
                ("beta", AttributeValue::Float(0.5)),
            ],
        )],
        vec![("b", b), ("c", c)],
        vec![("input", vec![2, 2])],
        &["output"],
        vec![],
    );

    let backend = RefCpuBackend::new();
    let graph = CompiledGraph::compile(&gemm, &backend, &GraphConfig::single_precision())
        .expect("compile");
    let input = [1.0f32, 2.0, 3.0, 4.0];
    let outputs = graph
        .run(&feeds(vec![("input", tensor(&[2, 2], input.to_vec()))]))
        .expect("run");

    let b = [[0.5f32, -1.0, 2.0], [1.5, 0.0, -0.5]];
    let c = [0.25f32, -0.25, 1.0];
    let mut expected = vec![0.0f32; 6];
    for row in 0..2 {
        for col in 0..3 {
            let mut acc = 0.0;
            for inner in 0..2 {
                acc += input[row * 2 + inner] * b[inner][col];
            }
            expected[row * 3 + col] = 2.0 * acc + 0.5 * c[col];
        }
    }
    assert_close(&outputs["output"].data, &expected, 1e-5);
}

#[test]
fn group_normalization_normalizes_each_group() {
    let scale = TensorData::from_f32s(vec![4], &[1.0; 4]);
    let bias = TensorData::from_f32s(vec![4], &[0.0; 4]);
    let gn = model(
        vec![node(
            "GroupNormalization",
            "gn_0",
            &["input", "scale", "bias"],
            &["output"],
            vec![
                ("num_groups", AttributeValue::Int(2)),
                ("epsilon", AttributeValue::Float(0.0)),
            ],
        )],
        vec![("scale", scale), ("bias", bias)],
        vec![("input", vec![1, 4, 1, 2])],
        &["output"],
        vec![],
    );

    let backend = RefCpuBackend::new();
    let graph =
        CompiledGraph::compile(&gn, &backend, &GraphConfig::single_precision()).expect("compile");
    // group 0 covers channels {0,1}, group 1 covers {2,3}
    let input = vec![1.0, 3.0, 5.0, 7.0, 10.0, 12.0, 14.0, 16.0];
    let outputs = graph
        .run(&feeds(vec![("input", tensor(&[1, 4, 1, 2], input))]))
        .expect("run");

    // each group: population variance 5 around its own mean -> (x-m)/sqrt(5)
    let s = 5.0f32.sqrt();
    let expected = [
        -3.0 / s,
        -1.0 / s,
        1.0 / s,
        3.0 / s,
        -3.0 / s,
        -1.0 / s,
        1.0 / s,
        3.0 / s,
    ];
    assert_close(&outputs["output"].data, &expected, 1e-5);
}

#[test]
fn conv_transpose_derives_the_output_extent_analytically() {
    let weights = TensorData::from_f32s(vec![1, 1, 2, 2], &[1.0; 4]);
    let deconv = model(
        vec![node(
            "ConvTranspose",
            "deconv_0",
            &["input", "w"],
            &["output"],
            vec![("strides", AttributeValue::Ints(vec![2, 2]))],
        )],
        vec![("w", weights)],
        vec![("input", vec![1, 1, 2, 2])],
        &["output"],
        vec![],
    );

    let backend = RefCpuBackend::new();
    let graph = CompiledGraph::compile(&deconv, &backend, &GraphConfig::single_precision())
        .expect("compile");
    // stride*(in-1) + ((k-1)*d + 1) = 2*1 + 2 = 4
    assert_eq!(graph.output_specs()["output"].dims, vec![1, 1, 4, 4]);

    // stride 2 with a 2x2 ones kernel tiles each input pixel into its own
    // 2x2 block
    let outputs = graph
        .run(&feeds(vec![(
            "input",
            tensor(&[1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]),
        )]))
        .expect("run");
    let expected = [
        1.0, 1.0, 2.0, 2.0, //
        1.0, 1.0, 2.0, 2.0, //
        3.0, 3.0, 4.0, 4.0, //
        3.0, 3.0, 4.0, 4.0,
    ];
    assert_close(&outputs["output"].data, &expected, 1e-6);
}

#[test]
fn upsample_scales_follow_the_round_policy() {
    let upsample = model(
        vec![node(
            "Upsample",
            "up_0",
            &["input"],
            &["output"],
            vec![
                ("scales", AttributeValue::Floats(vec![1.0, 1.0, 2.0, 2.0])),
                ("mode", AttributeValue::String("nearest".to_string())),
            ],
        )],
        vec![],
        vec![("input", vec![1, 1, 2, 2])],
        &["output"],
        vec![],
    );

    let backend = RefCpuBackend::new();
    let graph = CompiledGraph::compile(&upsample, &backend, &GraphConfig::single_precision())
        .expect("compile");
    assert_eq!(graph.output_specs()["output"].dims, vec![1, 1, 4, 4]);

    let outputs = graph
        .run(&feeds(vec![(
            "input",
            tensor(&[1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]),
        )]))
        .expect("run");
    let expected = [
        1.0, 1.0, 2.0, 2.0, //
        1.0, 1.0, 2.0, 2.0, //
        3.0, 3.0, 4.0, 4.0, //
        3.0, 3.0, 4.0, 4.0,
    ];
    assert_close(&outputs["output"].data, &expected, 1e-6);
}

#[test]
fn split_binds_one_tensor_per_declared_output() {
    let split = model(
        vec![node(
            "Split",
            "split_0",
            &["input"],
            &["left", "right"],
            vec![("axis", AttributeValue::Int(1))],
        )],
        vec![],
        vec![("input", vec![1, 4])],
        &["left", "right"],
        vec![],
    );

    let backend = RefCpuBackend::new();
    let graph = CompiledGraph::compile(&split, &backend, &GraphConfig::single_precision())
        .expect("compile");
    let outputs = graph
        .run(&feeds(vec![(
            "input",
            tensor(&[1, 4], vec![1.0, 2.0, 3.0, 4.0]),
        )]))
        .expect("run");

    assert_eq!(outputs["left"].dims, vec![1, 2]);
    assert_eq!(outputs["left"].data, vec![1.0, 2.0]);
    assert_eq!(outputs["right"].data, vec![3.0, 4.0]);
}

#[test]
fn warm_up_runs_without_affecting_results() {
    let backend = RefCpuBackend::new();
    let graph = CompiledGraph::compile(
        &conv_bn_relu_model(),
        &backend,
        &GraphConfig::single_precision(),
    )
    .expect("compile");
    graph.warm_up().expect("warm up");

    let input = feeds(vec![("input", tensor(&[1, 3, 8, 8], ramp(3 * 64)))]);
    let first = graph.run(&input).expect("run");
    let second = graph.run(&input).expect("run");
    assert_eq!(first["output"].data, second["output"].data);
}
