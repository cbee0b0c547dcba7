use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

use super::{BindError, ParameterRegistry, ParameterValue};
use crate::{
    Tensor, TensorMap,
    archive::{Archive, is_archive_path},
    quantization::{
        QuantizationManifest, QuantizedKeys, QuantizedTensor, TreeKind,
        has_quantization,
    },
};

/// What to store for a layer that is quantized on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantizedBinding {
    /// Dequantize into the slot's working precision.
    #[default]
    Dequantize,
    /// Keep codes and group parameters; dense values are produced on demand.
    Preserve,
}

/// Applies flat name to tensor mappings onto a `ParameterRegistry`.
///
/// Names are given in archive spelling and translated into tree paths with
/// the binder's `TreeKind`.
pub struct WeightBinder<'registry> {
    registry: &'registry mut ParameterRegistry,
    quantized_binding: QuantizedBinding,
    tree_kind: TreeKind,
}

impl<'registry> WeightBinder<'registry> {
    pub fn new(registry: &'registry mut ParameterRegistry) -> Self {
        Self {
            registry,
            quantized_binding: QuantizedBinding::default(),
            tree_kind: TreeKind::default(),
        }
    }

    pub fn with_quantized_binding(
        mut self,
        quantized_binding: QuantizedBinding,
    ) -> Self {
        self.quantized_binding = quantized_binding;
        self
    }

    pub fn with_tree_kind(
        mut self,
        tree_kind: TreeKind,
    ) -> Self {
        self.tree_kind = tree_kind;
        self
    }

    pub fn registry(&self) -> &ParameterRegistry {
        self.registry
    }

    /// Binds one full precision tensor. Returns `false` when no parameter
    /// matches `name`.
    pub fn bind(
        &mut self,
        name: &str,
        tensor: &Tensor,
    ) -> Result<bool, BindError> {
        let path = self.tree_kind.tree_path(name);
        let Some(slot) = self.registry.slot_mut(&path) else {
            log::debug!("No parameter for \"{name}\", skipping");
            return Ok(false);
        };
        if slot.shape() != tensor.shape() {
            return Err(BindError::ApplicationFailed(format!(
                "\"{path}\" expects shape {:?}, got {:?}",
                slot.shape(),
                tensor.shape()
            )));
        }
        let value = tensor.to_data_type(slot.data_type())?;
        slot.set_value(ParameterValue::Dense(value));
        Ok(true)
    }

    pub fn bind_all(
        &mut self,
        tensors: &TensorMap,
    ) -> Result<usize, BindError> {
        let mut bound = 0;
        for (name, tensor) in tensors {
            if self.bind(name, tensor)? {
                bound += 1;
            }
        }
        Ok(bound)
    }

    /// Binds a quantized layer according to the binder's `QuantizedBinding`.
    pub fn bind_quantized(
        &mut self,
        name: &str,
        quantized: QuantizedTensor,
    ) -> Result<bool, BindError> {
        let path = self.tree_kind.tree_path(name);
        let Some(slot) = self.registry.slot_mut(&path) else {
            log::debug!("No parameter for quantized \"{name}\", skipping");
            return Ok(false);
        };
        if slot.shape() != quantized.shape() {
            return Err(BindError::ApplicationFailed(format!(
                "\"{path}\" expects shape {:?}, quantized layer has {:?}",
                slot.shape(),
                quantized.shape()
            )));
        }
        let value = match self.quantized_binding {
            QuantizedBinding::Dequantize => {
                ParameterValue::Dense(quantized.dequantize(slot.data_type())?)
            },
            QuantizedBinding::Preserve => ParameterValue::Quantized(quantized),
        };
        slot.set_value(value);
        Ok(true)
    }

    /// Binds every tensor of a full precision archive.
    pub fn bind_archive(
        &mut self,
        archive: &Archive,
    ) -> Result<usize, BindError> {
        self.bind_archive_skipping(archive, &HashSet::new())
    }

    fn bind_archive_skipping(
        &mut self,
        archive: &Archive,
        skip: &HashSet<String>,
    ) -> Result<usize, BindError> {
        let mut bound = 0;
        for name in archive.tensor_names() {
            if skip.contains(name) {
                continue;
            }
            let path = self.tree_kind.tree_path(name);
            if !self.registry.contains(&path) {
                log::debug!("No parameter for \"{name}\", skipping");
                continue;
            }
            if self.bind(name, &archive.tensor(name)?)? {
                bound += 1;
            }
        }
        Ok(bound)
    }

    /// Binds every archive below `dir`. When the directory carries a
    /// quantization manifest, listed layers are read from their quantized
    /// payload and their group parameters are not bound as tensors. A layer
    /// whose payload archive is missing fails before anything is bound.
    pub fn bind_directory(
        &mut self,
        dir: &Path,
    ) -> Result<usize, BindError> {
        let manifest = if has_quantization(dir) {
            Some(QuantizationManifest::load(dir)?)
        } else {
            None
        };

        let mut skip = HashSet::new();
        if let Some(manifest) = &manifest {
            for layer in &manifest.layers {
                let keys = QuantizedKeys::for_weight(&layer.name);
                skip.extend([keys.codes, keys.scales, keys.biases]);
            }
        }

        let mut archive_paths = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|error| {
                BindError::ApplicationFailed(format!(
                    "failed to walk {dir:?}: {error}"
                ))
            })?;
            if entry.file_type().is_file() && is_archive_path(entry.path()) {
                archive_paths.push(entry.into_path());
            }
        }
        let relative_paths: Vec<PathBuf> = archive_paths
            .iter()
            .map(|path| path.strip_prefix(dir).unwrap_or(path).to_path_buf())
            .collect();

        if let Some(manifest) = &manifest {
            if let Some(layer) = manifest.layers.iter().find(|layer| {
                !relative_paths.iter().any(|relative| {
                    Path::new(layer.payload_file()) == relative
                })
            }) {
                return Err(BindError::ApplicationFailed(format!(
                    "quantized layer \"{}\" names payload \"{}\", which is not an archive in {dir:?}",
                    layer.name,
                    layer.payload_file()
                )));
            }
        }

        let mut bound = 0;
        for (path, relative) in archive_paths.iter().zip(&relative_paths) {
            let archive = Archive::open(path)?;
            bound += self.bind_archive_skipping(&archive, &skip)?;

            let Some(manifest) = &manifest else {
                continue;
            };
            for layer in manifest.layers.iter().filter(|layer| {
                Path::new(layer.payload_file()) == relative
            }) {
                let quantized = QuantizedTensor::read(
                    &archive,
                    &layer.name,
                    &layer.shape,
                    manifest.effective_spec(layer),
                )?;
                if self.bind_quantized(&layer.name, quantized)? {
                    bound += 1;
                }
            }
        }
        log::info!("Bound {bound} parameters from {dir:?}");
        Ok(bound)
    }

    /// Adds an additive correction to the parameter at tree `path`.
    pub fn apply_correction(
        &mut self,
        path: &str,
        delta: &Tensor,
    ) -> Result<(), BindError> {
        self.registry.apply_correction(path, delta)
    }
}
