mod error;
mod scheduler;
mod text_encoder;
mod transformer;
mod vae;

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

pub use error::ConfigError;
pub use scheduler::SchedulerConfig;
use serde::de::DeserializeOwned;
pub use text_encoder::TextEncoderConfig;
pub use transformer::{QuantizationSection, TransformerConfig};
pub use vae::VaeConfig;

pub const TRANSFORMER_CONFIG_PATH: &str = "transformer/config.json";
pub const VAE_CONFIG_PATH: &str = "vae/config.json";
pub const SCHEDULER_CONFIG_PATH: &str = "scheduler/scheduler_config.json";
pub const TEXT_ENCODER_CONFIG_PATH: &str = "text_encoder/config.json";

pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| {
        ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn load_optional<T: DeserializeOwned>(
    path: PathBuf
) -> Result<Option<T>, ConfigError> {
    if path.is_file() {
        load_config(&path).map(Some)
    } else {
        Ok(None)
    }
}

/// Component configs of a model directory. Components without a config
/// file are `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelConfigs {
    pub transformer: Option<TransformerConfig>,
    pub vae: Option<VaeConfig>,
    pub scheduler: Option<SchedulerConfig>,
    pub text_encoder: Option<TextEncoderConfig>,
}

impl ModelConfigs {
    pub fn load(model_dir: &Path) -> Result<Self, ConfigError> {
        Ok(Self {
            transformer: load_optional(model_dir.join(TRANSFORMER_CONFIG_PATH))?,
            vae: load_optional(model_dir.join(VAE_CONFIG_PATH))?,
            scheduler: load_optional(model_dir.join(SCHEDULER_CONFIG_PATH))?,
            text_encoder: load_optional(
                model_dir.join(TEXT_ENCODER_CONFIG_PATH),
            )?,
        })
    }
}
