use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::QuantizationError;

pub const SUPPORTED_GROUP_SIZES: [usize; 3] = [32, 64, 128];
pub const SUPPORTED_BITS: [usize; 2] = [4, 8];
pub const MXFP4_GROUP_SIZE: usize = 32;
pub const MXFP4_BITS: usize = 4;

#[derive(
    Debug, Serialize, Deserialize, PartialEq, Eq, Copy, Clone, Default, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum QuantizationMode {
    #[default]
    Affine,
    Mxfp4,
}

impl fmt::Display for QuantizationMode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            QuantizationMode::Affine => f.write_str("affine"),
            QuantizationMode::Mxfp4 => f.write_str("mxfp4"),
        }
    }
}

impl FromStr for QuantizationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "affine" => Ok(QuantizationMode::Affine),
            "mxfp4" => Ok(QuantizationMode::Mxfp4),
            other => Err(format!("unknown quantization mode \"{other}\"")),
        }
    }
}

fn default_group_size() -> usize {
    32
}

fn default_bits() -> usize {
    8
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Copy, Clone, Hash)]
pub struct QuantizationSpec {
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    #[serde(default = "default_bits")]
    pub bits: usize,
    #[serde(default)]
    pub mode: QuantizationMode,
}

impl Default for QuantizationSpec {
    fn default() -> Self {
        Self {
            group_size: default_group_size(),
            bits: default_bits(),
            mode: QuantizationMode::default(),
        }
    }
}

impl QuantizationSpec {
    pub fn new(
        group_size: usize,
        bits: usize,
        mode: QuantizationMode,
    ) -> Self {
        Self {
            group_size,
            bits,
            mode,
        }
    }

    pub fn mxfp4() -> Self {
        Self::new(MXFP4_GROUP_SIZE, MXFP4_BITS, QuantizationMode::Mxfp4)
    }

    pub fn validate(&self) -> Result<(), QuantizationError> {
        if !SUPPORTED_GROUP_SIZES.contains(&self.group_size) {
            return Err(QuantizationError::InvalidGroupSize(self.group_size));
        }
        if !SUPPORTED_BITS.contains(&self.bits) {
            return Err(QuantizationError::InvalidBits(self.bits));
        }
        if self.mode == QuantizationMode::Mxfp4 {
            if self.group_size != MXFP4_GROUP_SIZE {
                return Err(QuantizationError::InvalidGroupSize(
                    self.group_size,
                ));
            }
            if self.bits != MXFP4_BITS {
                return Err(QuantizationError::InvalidBits(self.bits));
            }
        }
        Ok(())
    }

    /// Largest code an element can take.
    pub fn max_code(&self) -> u8 {
        ((1u32 << self.bits) - 1) as u8
    }
}
