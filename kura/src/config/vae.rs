use serde::{Deserialize, Serialize};

fn default_latent_channels() -> usize {
    16
}

fn default_scaling_factor() -> f32 {
    1.0
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct VaeConfig {
    pub block_out_channels: Vec<usize>,
    #[serde(default = "default_latent_channels")]
    pub latent_channels: usize,
    #[serde(default = "default_scaling_factor")]
    pub scaling_factor: f32,
    #[serde(default)]
    pub shift_factor: Option<f32>,
}

impl VaeConfig {
    /// Pixels per latent along each spatial axis: every block after the
    /// first halves the resolution. `None` when the factor overflows `usize`.
    pub fn spatial_scale_factor(&self) -> Option<usize> {
        let downsamples =
            u32::try_from(self.block_out_channels.len().saturating_sub(1))
                .ok()?;
        1usize.checked_shl(downsamples)
    }
}
