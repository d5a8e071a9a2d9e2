//! Typed readers over node attributes and constant tensor payloads.
//!
//! ONNX is a volatile format with many opsets: the same logical parameter may
//! arrive as an attribute or as a constant input depending on the producer.
//! Translators therefore read through these accessors and fall back between
//! the two sources themselves.

use half::f16;

use crate::model::{AttributeValue, ElementType, Node, TensorData};

/// Read access to a node's typed attributes.
///
/// Implemented by [`Node`] and handed to custom step evaluation so extension
/// code sees the same attribute surface as built-in translators.
pub trait AttributeReader {
    fn attr_s(&self, name: &str) -> Option<&str>;
    fn attr_f(&self, name: &str) -> Option<f32>;
    fn attr_i(&self, name: &str) -> Option<i64>;
    fn attr_floats(&self, name: &str) -> Option<&[f32]>;
    fn attr_ints(&self, name: &str) -> Option<&[i64]>;
    fn attr_tensor(&self, name: &str) -> Option<&TensorData>;
}

impl AttributeReader for Node {
    fn attr_s(&self, name: &str) -> Option<&str> {
        match self.attribute(name) {
            Some(AttributeValue::String(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    fn attr_f(&self, name: &str) -> Option<f32> {
        match self.attribute(name) {
            Some(AttributeValue::Float(value)) => Some(*value),
            _ => None,
        }
    }

    fn attr_i(&self, name: &str) -> Option<i64> {
        match self.attribute(name) {
            Some(AttributeValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    fn attr_floats(&self, name: &str) -> Option<&[f32]> {
        match self.attribute(name) {
            Some(AttributeValue::Floats(values)) => Some(values.as_slice()),
            _ => None,
        }
    }

    fn attr_ints(&self, name: &str) -> Option<&[i64]> {
        match self.attribute(name) {
            Some(AttributeValue::Ints(values)) => Some(values.as_slice()),
            _ => None,
        }
    }

    fn attr_tensor(&self, name: &str) -> Option<&TensorData> {
        match self.attribute(name) {
            Some(AttributeValue::Tensor(value)) => Some(value),
            _ => None,
        }
    }
}

fn chunks<const N: usize>(raw: &[u8]) -> impl Iterator<Item = [u8; N]> + '_ {
    raw.chunks_exact(N).map(|chunk| {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(chunk);
        bytes
    })
}

impl TensorData {
    /// Decodes the payload as f32 values, widening or converting from any
    /// supported element type.
    pub fn floats(&self) -> Option<Vec<f32>> {
        let raw = self.raw();
        match self.element_type() {
            ElementType::F32 => Some(chunks::<4>(raw).map(f32::from_le_bytes).collect()),
            ElementType::F16 => Some(
                chunks::<2>(raw)
                    .map(|b| f16::from_le_bytes(b).to_f32())
                    .collect(),
            ),
            ElementType::I8 => Some(raw.iter().map(|&b| b as i8 as f32).collect()),
            ElementType::I16 => Some(chunks::<2>(raw).map(|b| i16::from_le_bytes(b) as f32).collect()),
            ElementType::I32 => Some(chunks::<4>(raw).map(|b| i32::from_le_bytes(b) as f32).collect()),
            ElementType::I64 => Some(chunks::<8>(raw).map(|b| i64::from_le_bytes(b) as f32).collect()),
            ElementType::U8 => Some(raw.iter().map(|&b| b as f32).collect()),
            ElementType::U16 => Some(chunks::<2>(raw).map(|b| u16::from_le_bytes(b) as f32).collect()),
            ElementType::U32 => Some(chunks::<4>(raw).map(|b| u32::from_le_bytes(b) as f32).collect()),
            ElementType::U64 => Some(chunks::<8>(raw).map(|b| u64::from_le_bytes(b) as f32).collect()),
        }
    }

    /// Decodes the payload as f16 values; non-f16 sources are converted with
    /// round-to-nearest-even.
    pub fn halfs(&self) -> Option<Vec<f16>> {
        match self.element_type() {
            ElementType::F16 => Some(chunks::<2>(self.raw()).map(f16::from_le_bytes).collect()),
            _ => self
                .floats()
                .map(|values| values.into_iter().map(f16::from_f32).collect()),
        }
    }

    /// Decodes the payload as signed integers. Returns `None` for floating
    /// or unsigned element types.
    pub fn ints(&self) -> Option<Vec<i64>> {
        let raw = self.raw();
        match self.element_type() {
            ElementType::I8 => Some(raw.iter().map(|&b| b as i8 as i64).collect()),
            ElementType::I16 => Some(chunks::<2>(raw).map(|b| i16::from_le_bytes(b) as i64).collect()),
            ElementType::I32 => Some(chunks::<4>(raw).map(|b| i32::from_le_bytes(b) as i64).collect()),
            ElementType::I64 => Some(chunks::<8>(raw).map(i64::from_le_bytes).collect()),
            _ => None,
        }
    }

    /// Decodes the payload as unsigned integers. Returns `None` for floating
    /// or signed element types.
    pub fn uints(&self) -> Option<Vec<u64>> {
        let raw = self.raw();
        match self.element_type() {
            ElementType::U8 => Some(raw.iter().map(|&b| b as u64).collect()),
            ElementType::U16 => Some(chunks::<2>(raw).map(|b| u16::from_le_bytes(b) as u64).collect()),
            ElementType::U32 => Some(chunks::<4>(raw).map(|b| u32::from_le_bytes(b) as u64).collect()),
            ElementType::U64 => Some(chunks::<8>(raw).map(u64::from_le_bytes).collect()),
            _ => None,
        }
    }

    /// Signed or unsigned integer payload widened to i64, whichever applies.
    pub fn any_ints(&self) -> Option<Vec<i64>> {
        self.ints().or_else(|| {
            self.uints()
                .map(|values| values.into_iter().map(|v| v as i64).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;

    #[test]
    fn node_attribute_accessors_distinguish_types() {
        let node = Node::new(
            "Conv",
            "conv_0",
            vec![],
            vec![],
            [
                ("alpha".to_string(), AttributeValue::Float(0.5)),
                ("group".to_string(), AttributeValue::Int(2)),
                (
                    "strides".to_string(),
                    AttributeValue::Ints(vec![2, 2]),
                ),
                (
                    "mode".to_string(),
                    AttributeValue::String("reflect".to_string()),
                ),
            ],
        );

        assert_eq!(node.attr_f("alpha"), Some(0.5));
        assert_eq!(node.attr_i("group"), Some(2));
        assert_eq!(node.attr_ints("strides"), Some(&[2i64, 2][..]));
        assert_eq!(node.attr_s("mode"), Some("reflect"));
        // Wrong-typed and missing lookups are both misses.
        assert_eq!(node.attr_i("alpha"), None);
        assert_eq!(node.attr_f("missing"), None);
    }

    #[test]
    fn raw_payload_round_trips_through_floats() {
        let tensor = TensorData::from_f32s(vec![2, 2], &[1.0, -2.5, 0.0, 4.0]);
        assert_eq!(tensor.floats().unwrap(), vec![1.0, -2.5, 0.0, 4.0]);
        assert_eq!(tensor.ints(), None);
    }

    #[test]
    fn int64_payload_decodes_as_ints_and_floats() {
        let tensor = TensorData::from_i64s(vec![3], &[-1, 0, 7]);
        assert_eq!(tensor.ints().unwrap(), vec![-1, 0, 7]);
        assert_eq!(tensor.floats().unwrap(), vec![-1.0, 0.0, 7.0]);
        assert_eq!(tensor.uints(), None);
    }

    #[test]
    fn f16_payload_rounds_through_half() {
        let values = [1.0f32, 0.333_333_34, -2.0];
        let halfs: Vec<f16> = values.iter().copied().map(f16::from_f32).collect();
        let mut raw = Vec::new();
        for h in &halfs {
            raw.extend_from_slice(&h.to_le_bytes());
        }
        let tensor = TensorData::from_raw(ElementType::F16, vec![3], raw);
        let decoded = tensor.floats().unwrap();
        for (decoded, half) in decoded.iter().zip(halfs.iter()) {
            assert_eq!(*decoded, half.to_f32());
        }
    }
}
