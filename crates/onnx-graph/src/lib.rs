//! Compiles ONNX computation graphs into executables for portable tensor
//! backends.
//!
//! The crate consumes an already-decoded in-memory [`Model`] (wire-format
//! parsing is a loader concern) and drives one topological pass over its
//! node list, translating each operator into target tensor operations via a
//! static dispatch table. The finished target [`graph::Graph`] is handed to
//! a [`backend::TensorBackend`] for device compilation.
//!
//! Two entry points cover the two compilation modes:
//!
//! - [`CompiledGraph::compile`]: the whole model becomes one executable;
//!   any unknown operator kind fails the compile.
//! - [`Pipeline::compile`]: unknown kinds with a registered
//!   [`pipeline::CustomStep`] split the model into backend-compiled
//!   segments interleaved with host-evaluated steps, using a liveness
//!   analysis to derive the minimal cross-boundary tensor contract.
//!
//! [`convert::TensorConverter`] independently memoizes the small conversion
//! graphs used at data-ingestion boundaries.

pub mod attrs;
pub mod backend;
mod build;
mod compiled;
pub mod config;
pub mod convert;
pub mod error;
pub mod graph;
pub mod model;
pub mod ops;
pub mod pipeline;

pub use attrs::AttributeReader;
pub use backend::{BackendError, Executable, HostTensor, TensorBackend};
pub use compiled::CompiledGraph;
pub use config::{GraphConfig, InputConfig, OutputConfig, Precision};
pub use convert::{ConversionStep, TensorConverter};
pub use error::{GraphError, OnnxError};
pub use model::{AttributeValue, ElementType, Model, ModelInput, Node, TensorData, ValueInfo};
pub use pipeline::{CustomStep, Pipeline};
