use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use super::{
    QuantizationError, QuantizationMode, QuantizationSpec, TreeKind,
};

pub const MANIFEST_FILE_NAME: &str = "quantization.json";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct LayerQuantEntry {
    pub name: String,
    pub shape: Vec<usize>,
    pub in_dim: usize,
    pub out_dim: usize,
    /// Archive holding the full precision tensor, relative to the model
    /// directory.
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quant_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<QuantizationMode>,
}

impl LayerQuantEntry {
    /// Layer overrides applied field by field on top of `defaults`.
    pub fn effective_spec(
        &self,
        defaults: &QuantizationSpec,
    ) -> QuantizationSpec {
        QuantizationSpec {
            group_size: self.group_size.unwrap_or(defaults.group_size),
            bits: self.bits.unwrap_or(defaults.bits),
            mode: self.mode.unwrap_or(defaults.mode),
        }
    }

    /// Archive holding the quantized payload.
    pub fn payload_file(&self) -> &str {
        self.quant_file.as_deref().unwrap_or(&self.file)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
pub struct QuantizationManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(flatten)]
    pub defaults: QuantizationSpec,
    #[serde(default)]
    pub layers: Vec<LayerQuantEntry>,
}

impl QuantizationManifest {
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE_NAME)
    }

    pub fn load(dir: &Path) -> Result<Self, QuantizationError> {
        let path = Self::path_in(dir);
        let file = File::open(&path).map_err(|source| QuantizationError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            QuantizationError::Manifest {
                path,
                source,
            }
        })
    }

    pub fn save(
        &self,
        dir: &Path,
    ) -> Result<(), QuantizationError> {
        let path = Self::path_in(dir);
        let io_error = |source| QuantizationError::Io {
            path: path.clone(),
            source,
        };
        let file = File::create(&path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|source| {
            QuantizationError::Manifest {
                path: path.clone(),
                source,
            }
        })?;
        writer.flush().map_err(io_error)?;
        Ok(())
    }

    pub fn entry(
        &self,
        name: &str,
    ) -> Option<&LayerQuantEntry> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    /// Entry for a tree path, translating it into the archive spelling
    /// used by `tree_kind`.
    pub fn entry_for_path(
        &self,
        path: &str,
        tree_kind: TreeKind,
    ) -> Option<&LayerQuantEntry> {
        self.entry(&tree_kind.archive_key(path))
    }

    pub fn effective_spec(
        &self,
        entry: &LayerQuantEntry,
    ) -> QuantizationSpec {
        entry.effective_spec(&self.defaults)
    }
}

/// Whether `dir` holds a readable quantization manifest.
pub fn has_quantization(dir: &Path) -> bool {
    QuantizationManifest::load(dir).is_ok()
}
