//! Reference CPU backend for `onnx-graph`.
//!
//! A correctness-first interpreter over the target graph: every operation is
//! a naive f32 loop, integer and boolean tensors are carried in f32 storage,
//! and nothing is optimized. It exists so the compiler can be exercised
//! end-to-end without a GPU; it is not a kernel library.

pub mod cpu;

pub use cpu::{CpuExecutable, RefCpuBackend};
