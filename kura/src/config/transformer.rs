use serde::{Deserialize, Serialize};

use crate::quantization::{QuantizationMode, QuantizationSpec};

/// Codec defaults carried by a pre-quantized transformer.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct QuantizationSection {
    pub group_size: usize,
    pub bits: usize,
    #[serde(default)]
    pub mode: QuantizationMode,
}

impl From<QuantizationSection> for QuantizationSpec {
    fn from(section: QuantizationSection) -> Self {
        QuantizationSpec::new(section.group_size, section.bits, section.mode)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct TransformerConfig {
    #[serde(default)]
    pub in_channels: Option<usize>,
    #[serde(default)]
    pub num_layers: Option<usize>,
    #[serde(default)]
    pub num_attention_heads: Option<usize>,
    #[serde(default)]
    pub attention_head_dim: Option<usize>,
    #[serde(default)]
    pub patch_size: Option<usize>,
    #[serde(default)]
    pub quantization: Option<QuantizationSection>,
}

impl TransformerConfig {
    pub fn hidden_size(&self) -> Option<usize> {
        Some(self.num_attention_heads? * self.attention_head_dim?)
    }

    /// Codec defaults, falling back to `QuantizationSpec::default()` when
    /// the model carries none.
    pub fn quantization_spec(&self) -> QuantizationSpec {
        self.quantization.map(QuantizationSpec::from).unwrap_or_default()
    }
}
