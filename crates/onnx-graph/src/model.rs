//! In-memory representation of a decoded ONNX model.
//!
//! Wire-format deserialization lives outside this crate; loaders hand over an
//! already-decoded node/attribute list via [`Model::from_parts`]. The node
//! list is expected in file order, which ONNX guarantees to be topologically
//! sorted.

use std::collections::HashMap;

use crate::error::OnnxError;

/// Scalar element type tag of a serialized tensor payload.
///
/// Values mirror the ONNX `TensorProto.DataType` tags this compiler accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    F32,
    F16,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl ElementType {
    /// Byte width of one scalar.
    pub fn size_in_bytes(self) -> usize {
        match self {
            ElementType::I8 | ElementType::U8 => 1,
            ElementType::F16 | ElementType::I16 | ElementType::U16 => 2,
            ElementType::F32 | ElementType::I32 | ElementType::U32 => 4,
            ElementType::I64 | ElementType::U64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ElementType::F32 | ElementType::F16)
    }

    pub fn is_signed_integer(self) -> bool {
        matches!(
            self,
            ElementType::I8 | ElementType::I16 | ElementType::I32 | ElementType::I64
        )
    }

    pub fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            ElementType::U8 | ElementType::U16 | ElementType::U32 | ElementType::U64
        )
    }
}

/// An immutable named weight tensor: element type, shape and raw
/// little-endian payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorData {
    element_type: ElementType,
    dims: Vec<usize>,
    raw: Vec<u8>,
}

impl TensorData {
    /// Wraps an already-decoded raw payload. The payload length must equal
    /// `product(dims) * element size`.
    pub fn from_raw(element_type: ElementType, dims: Vec<usize>, raw: Vec<u8>) -> Self {
        debug_assert_eq!(
            raw.len(),
            dims.iter().product::<usize>() * element_type.size_in_bytes(),
            "tensor payload length does not match dims"
        );
        TensorData {
            element_type,
            dims,
            raw,
        }
    }

    pub fn from_f32s(dims: Vec<usize>, values: &[f32]) -> Self {
        let mut raw = Vec::with_capacity(values.len() * 4);
        for v in values {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        TensorData::from_raw(ElementType::F32, dims, raw)
    }

    pub fn from_i64s(dims: Vec<usize>, values: &[i64]) -> Self {
        let mut raw = Vec::with_capacity(values.len() * 8);
        for v in values {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        TensorData::from_raw(ElementType::I64, dims, raw)
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }
}

/// A typed node attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Float(f32),
    Int(i64),
    String(String),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Tensor(TensorData),
}

/// One operator invocation in the source graph.
#[derive(Debug, Clone)]
pub struct Node {
    op_type: String,
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    attributes: HashMap<String, AttributeValue>,
}

impl Node {
    pub fn new(
        op_type: impl Into<String>,
        name: impl Into<String>,
        inputs: Vec<String>,
        outputs: Vec<String>,
        attributes: impl IntoIterator<Item = (String, AttributeValue)>,
    ) -> Self {
        Node {
            op_type: op_type.into(),
            name: name.into(),
            inputs,
            outputs,
            attributes: attributes.into_iter().collect(),
        }
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Returns the i-th input name, treating the empty string (an ONNX
    /// "omitted optional input") as absent.
    pub fn input(&self, index: usize) -> Option<&str> {
        match self.inputs.get(index) {
            Some(name) if !name.is_empty() => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

/// A declared external input: name plus dimension list, `-1` marking a
/// symbolic dimension that must be overridden by configuration.
#[derive(Debug, Clone)]
pub struct ModelInput {
    pub name: String,
    pub dims: Vec<i64>,
}

/// Shape/type metadata declared for an intermediate tensor (`value_info`).
#[derive(Debug, Clone)]
pub struct ValueInfo {
    pub element_type: ElementType,
    pub dims: Vec<i64>,
}

/// A decoded ONNX model: initializers, declared inputs and outputs, the
/// topologically ordered node list, and optional per-tensor metadata.
#[derive(Debug, Clone)]
pub struct Model {
    nodes: Vec<Node>,
    initializers: HashMap<String, TensorData>,
    inputs: Vec<ModelInput>,
    outputs: Vec<String>,
    value_info: HashMap<String, ValueInfo>,
}

impl Model {
    /// Assembles a model from decoded parts.
    ///
    /// Initializer names may also appear in the declared input list (ONNX
    /// permits this); such entries are dropped from the external inputs.
    /// Declared external inputs must carry a float element type when one is
    /// given in `value_info` style parts; symbolic dims are preserved as -1.
    pub fn from_parts(
        nodes: Vec<Node>,
        initializers: HashMap<String, TensorData>,
        inputs: Vec<ModelInput>,
        outputs: Vec<String>,
        value_info: HashMap<String, ValueInfo>,
    ) -> Result<Model, OnnxError> {
        let inputs: Vec<ModelInput> = inputs
            .into_iter()
            .filter(|input| !initializers.contains_key(&input.name))
            .collect();

        for input in &inputs {
            if input.name.is_empty() {
                return Err(OnnxError::invalid_model("external input with empty name"));
            }
        }

        Ok(Model {
            nodes,
            initializers,
            inputs,
            outputs,
            value_info,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn initializers(&self) -> &HashMap<String, TensorData> {
        &self.initializers
    }

    pub fn initializer(&self, name: &str) -> Option<&TensorData> {
        self.initializers.get(name)
    }

    pub fn inputs(&self) -> &[ModelInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn value_info(&self, name: &str) -> Option<&ValueInfo> {
        self.value_info.get(name)
    }
}
