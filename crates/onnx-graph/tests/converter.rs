mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{assert_close, tensor};
use onnx_graph::graph::{BinaryOp, DType};
use onnx_graph::{ConversionStep, TensorConverter};
use onnx_graph_backend_ref_cpu::RefCpuBackend;

/// A conversion step that counts how often its graph fragment is built;
/// builds only happen on cache misses.
fn counting_scale_step(name: &str, factor: f32, builds: Arc<AtomicUsize>) -> ConversionStep {
    ConversionStep::new(name, move |graph, tensor| {
        builds.fetch_add(1, Ordering::SeqCst);
        graph.binary_scalar(BinaryOp::Mul, tensor, factor)
    })
}

#[test]
fn equal_keys_reuse_the_memoized_conversion() {
    let builds = Arc::new(AtomicUsize::new(0));
    let converter = TensorConverter::new(Arc::new(RefCpuBackend::new()), 4);

    let input = tensor(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    let steps = vec![counting_scale_step("scale2", 2.0, Arc::clone(&builds))];

    let first = converter
        .transform(&input, DType::F32, &steps)
        .expect("transform");
    let second = converter
        .transform(&input, DType::F32, &steps)
        .expect("transform");

    assert_close(&first.data, &[2.0, 4.0, 6.0, 8.0], 1e-6);
    assert_eq!(first.data, second.data);
    // the second call must not have invoked the builder again
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(converter.cached(), 1);
}

#[test]
fn empty_step_lists_bypass_the_cache() {
    let converter = TensorConverter::new(Arc::new(RefCpuBackend::new()), 4);
    let input = tensor(&[3], vec![1.0, -2.0, 3.0]);

    let output = converter
        .transform(&input, DType::F32, &[])
        .expect("transform");
    assert_eq!(output, input);
    assert_eq!(converter.cached(), 0);
}

#[test]
fn shape_changes_are_distinct_cache_entries() {
    let builds = Arc::new(AtomicUsize::new(0));
    let converter = TensorConverter::new(Arc::new(RefCpuBackend::new()), 4);
    let steps = vec![counting_scale_step("scale2", 2.0, Arc::clone(&builds))];

    converter
        .transform(&tensor(&[2], vec![1.0, 2.0]), DType::F32, &steps)
        .expect("transform");
    converter
        .transform(&tensor(&[3], vec![1.0, 2.0, 3.0]), DType::F32, &steps)
        .expect("transform");

    assert_eq!(builds.load(Ordering::SeqCst), 2);
    assert_eq!(converter.cached(), 2);
}

#[test]
fn step_sequences_key_the_cache_in_order() {
    let builds = Arc::new(AtomicUsize::new(0));
    let converter = TensorConverter::new(Arc::new(RefCpuBackend::new()), 4);
    let input = tensor(&[2], vec![1.0, 10.0]);

    let double_then_shift = vec![
        counting_scale_step("scale2", 2.0, Arc::clone(&builds)),
        ConversionStep::new("shift1", |graph, tensor| {
            graph.binary_scalar(BinaryOp::Add, tensor, 1.0)
        }),
    ];
    let shift_then_double = vec![
        ConversionStep::new("shift1", |graph, tensor| {
            graph.binary_scalar(BinaryOp::Add, tensor, 1.0)
        }),
        counting_scale_step("scale2", 2.0, Arc::clone(&builds)),
    ];

    let a = converter
        .transform(&input, DType::F32, &double_then_shift)
        .expect("transform");
    let b = converter
        .transform(&input, DType::F32, &shift_then_double)
        .expect("transform");

    assert_close(&a.data, &[3.0, 21.0], 1e-6);
    assert_close(&b.data, &[4.0, 22.0], 1e-6);
    assert_eq!(converter.cached(), 2);
}

#[test]
fn eviction_removes_only_the_least_recently_used_entry() {
    let builds = Arc::new(AtomicUsize::new(0));
    let converter = TensorConverter::new(Arc::new(RefCpuBackend::new()), 2);
    let steps = vec![counting_scale_step("scale2", 2.0, Arc::clone(&builds))];

    let a = tensor(&[1], vec![1.0]);
    let b = tensor(&[2], vec![1.0, 2.0]);
    let c = tensor(&[3], vec![1.0, 2.0, 3.0]);

    converter.transform(&a, DType::F32, &steps).expect("build a");
    converter.transform(&b, DType::F32, &steps).expect("build b");
    assert_eq!(builds.load(Ordering::SeqCst), 2);

    // touch `a` so `b` becomes least recently used
    converter.transform(&a, DType::F32, &steps).expect("hit a");
    assert_eq!(builds.load(Ordering::SeqCst), 2);

    // at capacity: inserting `c` evicts `b`, not `a`
    converter.transform(&c, DType::F32, &steps).expect("build c");
    assert_eq!(builds.load(Ordering::SeqCst), 3);

    converter.transform(&a, DType::F32, &steps).expect("hit a");
    assert_eq!(builds.load(Ordering::SeqCst), 3);

    converter.transform(&b, DType::F32, &steps).expect("rebuild b");
    assert_eq!(builds.load(Ordering::SeqCst), 4);
}

#[test]
fn converter_is_shareable_across_threads() {
    let converter = Arc::new(TensorConverter::new(
        Arc::new(RefCpuBackend::new()),
        TensorConverter::<RefCpuBackend>::DEFAULT_CAPACITY,
    ));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let converter = Arc::clone(&converter);
            std::thread::spawn(move || {
                let input = tensor(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]);
                let steps = vec![ConversionStep::new("scale2", |graph, tensor| {
                    graph.binary_scalar(BinaryOp::Mul, tensor, 2.0)
                })];
                converter
                    .transform(&input, DType::F32, &steps)
                    .expect("transform")
            })
        })
        .collect();

    for handle in handles {
        let output = handle.join().expect("thread");
        assert_eq!(output.data, vec![2.0, 4.0, 6.0, 8.0]);
    }
    assert_eq!(converter.cached(), 1);
}
