//! Compilation configuration value objects.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::graph::DType;

/// Floating-point precision used for every tensor in a compiled graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    /// 16-bit floats; constants are rounded through f16 storage.
    #[default]
    Half,
    /// 32-bit floats.
    Single,
}

impl Precision {
    pub(crate) fn dtype(self) -> DType {
        match self {
            Precision::Half => DType::F16,
            Precision::Single => DType::F32,
        }
    }
}

/// Per-input compilation options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    /// Overrides for dynamic shape values: axis index -> extent
    /// (e.g. NCHW `{2: 512, 3: 512}`).
    #[serde(default)]
    pub dims: HashMap<usize, usize>,
    /// Value range for denormalization (e.g. [0;1] -> [-1;1]); applied as
    /// `y = (hi - lo) * x + lo` right after the placeholder.
    #[serde(default)]
    pub value_range: Option<(f32, f32)>,
}

/// Per-output compilation options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Value range for normalization (e.g. [-1;1] -> [0;1]); applied as
    /// `y = (x - lo) / (hi - lo)` before the output.
    #[serde(default)]
    pub value_range: Option<(f32, f32)>,
}

/// Graph building configuration: shape overrides, value ranges and the
/// element precision shared by all tensors of the compiled graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub inputs: HashMap<String, InputConfig>,
    #[serde(default)]
    pub outputs: HashMap<String, OutputConfig>,
    #[serde(default)]
    pub precision: Precision,
}

impl GraphConfig {
    /// Convenience constructor for the common single-precision test setup.
    pub fn single_precision() -> Self {
        GraphConfig {
            precision: Precision::Single,
            ..GraphConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_serde() {
        let mut config = GraphConfig::single_precision();
        config.inputs.insert(
            "input".to_string(),
            InputConfig {
                dims: [(2, 512), (3, 512)].into_iter().collect(),
                value_range: Some((-1.0, 1.0)),
            },
        );
        config
            .outputs
            .insert("output".to_string(), OutputConfig { value_range: Some((0.0, 1.0)) });

        let json = serde_json::to_string(&config).unwrap();
        let back: GraphConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.precision, Precision::Single);
        assert_eq!(back.inputs["input"].dims[&2], 512);
        assert_eq!(back.outputs["output"].value_range, Some((0.0, 1.0)));
    }
}
