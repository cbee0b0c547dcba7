use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use ndarray::{ArrayView2, Ix2};

use super::{LoraError, remap_weight_key};
use crate::{
    DataType, Tensor, TensorMap,
    archive::{Archive, find_archives, is_archive_path},
    utils::{is_model_id, model_path},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Down,
    Up,
    Alpha,
}

const MARKERS: [(&str, Role); 4] = [
    ("lora_A", Role::Down),
    ("lora_down", Role::Down),
    ("lora_B", Role::Up),
    ("lora_up", Role::Up),
];

/// Splits a remapped key into its base path and adapter role.
fn classify(key: &str) -> Option<(&str, Role)> {
    if let Some(base) = key.strip_suffix(".alpha") {
        return Some((base, Role::Alpha));
    }
    let segments: Vec<&str> = key.split('.').collect();
    let (position, role) =
        segments.iter().enumerate().find_map(|(position, segment)| {
            MARKERS
                .iter()
                .find(|(marker, _)| marker == segment)
                .map(|&(_, role)| (position, role))
        })?;
    let base_length: usize =
        segments[..position].iter().map(|segment| segment.len() + 1).sum();
    Some((key.get(..base_length.checked_sub(1)?)?, role))
}

#[derive(Default)]
struct AdapterPair<'a> {
    down: Option<&'a Tensor>,
    up: Option<&'a Tensor>,
    alpha: Option<&'a Tensor>,
}

/// Low-rank adapter weights with keys already remapped onto the base
/// model's naming.
#[derive(Debug, Clone)]
pub struct LoraAdapter {
    source: PathBuf,
    tensors: TensorMap,
}

impl LoraAdapter {
    /// Loads an adapter from a local path or an `org/name` model id found
    /// in the storage directory.
    pub fn load(source: &str) -> Result<Self, LoraError> {
        let path = Path::new(source);
        if !path.exists() && is_model_id(source) {
            return Self::load_path(&model_path(source));
        }
        Self::load_path(path)
    }

    /// Loads an archive file, or every archive directly inside a directory.
    pub fn load_path(path: &Path) -> Result<Self, LoraError> {
        if !path.exists() {
            return Err(LoraError::DirectoryNotFound(path.to_path_buf()));
        }
        let archive_paths = if path.is_file() && is_archive_path(path) {
            vec![path.to_path_buf()]
        } else if path.is_dir() {
            find_archives(path).map_err(|source| LoraError::Io {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Vec::new()
        };
        if archive_paths.is_empty() {
            return Err(LoraError::WeightsNotFound(path.to_path_buf()));
        }

        let mut tensors = TensorMap::new();
        for archive_path in &archive_paths {
            let archive = Archive::open(archive_path)?;
            tensors.extend(archive.load_all_tensors(None)?);
        }
        log::info!(
            "Loaded {} LoRA tensors from {} archives in {:?}",
            tensors.len(),
            archive_paths.len(),
            path
        );
        Ok(Self::from_tensors(path, tensors))
    }

    /// Wraps raw adapter tensors, remapping their keys. Keys that remap to
    /// nothing are dropped.
    pub fn from_tensors(
        source: impl Into<PathBuf>,
        raw: TensorMap,
    ) -> Self {
        let mut tensors = TensorMap::with_capacity(raw.len());
        for (key, tensor) in raw {
            let remapped = remap_weight_key(&key);
            if remapped.is_empty() {
                log::debug!("LoRA key \"{key}\" names no weight, skipping");
                continue;
            }
            if tensors.insert(remapped.clone(), tensor).is_some() {
                log::warn!(
                    "LoRA key \"{key}\" collides with another tensor at \"{remapped}\""
                );
            }
        }
        Self {
            source: source.into(),
            tensors,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn tensors(&self) -> &TensorMap {
        &self.tensors
    }

    fn pairs(&self) -> IndexMap<&str, AdapterPair<'_>> {
        let mut pairs: IndexMap<&str, AdapterPair<'_>> = IndexMap::new();
        for (key, tensor) in &self.tensors {
            let Some((base, role)) = classify(key) else {
                log::warn!("Unused LoRA tensor \"{key}\"");
                continue;
            };
            let pair = pairs.entry(base).or_default();
            match role {
                Role::Down => pair.down = Some(tensor),
                Role::Up => pair.up = Some(tensor),
                Role::Alpha => pair.alpha = Some(tensor),
            }
        }
        pairs
    }

    /// Additive corrections keyed by the `<base>.weight` they apply to,
    /// `delta = up · down * scale`.
    pub fn deltas(
        &self,
        strength: f32,
    ) -> Result<TensorMap, LoraError> {
        self.pairs()
            .into_iter()
            .map(|(base, pair)| {
                let delta = pair_delta(base, &pair, strength)?;
                Ok((format!("{base}.weight"), delta))
            })
            .collect()
    }
}

fn matrix<'a>(
    base: &str,
    tensor: &'a Tensor,
) -> Result<ArrayView2<'a, f32>, LoraError> {
    tensor.as_view::<f32>().into_dimensionality::<Ix2>().map_err(|_| {
        LoraError::ApplicationFailed(format!(
            "\"{base}\" adapter matrix has shape {:?}, expected 2 dimensions",
            tensor.shape()
        ))
    })
}

fn pair_delta(
    base: &str,
    pair: &AdapterPair<'_>,
    strength: f32,
) -> Result<Tensor, LoraError> {
    let missing = |partner: &str| {
        LoraError::ApplicationFailed(format!(
            "\"{base}\" has no {partner} matrix"
        ))
    };
    let down = pair.down.ok_or_else(|| missing("down (lora_A)"))?;
    let up = pair.up.ok_or_else(|| missing("up (lora_B)"))?;

    let down = down.to_data_type(DataType::F32)?;
    let up = up.to_data_type(DataType::F32)?;
    let down_matrix = matrix(base, &down)?;
    let up_matrix = matrix(base, &up)?;

    let rank = down_matrix.nrows();
    if rank == 0 || up_matrix.ncols() != rank {
        return Err(LoraError::ApplicationFailed(format!(
            "\"{base}\" has incompatible adapter shapes: up {:?}, down {:?}",
            up.shape(),
            down.shape()
        )));
    }

    let scale = match pair.alpha {
        Some(alpha) => {
            let alpha = alpha.to_f32_vec()?;
            let &[alpha] = alpha.as_slice() else {
                return Err(LoraError::ApplicationFailed(format!(
                    "\"{base}\" alpha must be a single value"
                )));
            };
            strength * alpha / rank as f32
        },
        None => strength,
    };

    let product = up_matrix.dot(&down_matrix) * scale;
    let values: Vec<f32> = product.iter().copied().collect();
    Ok(Tensor::from_slice(product.shape(), &values)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            classify("blocks.0.attn.qkv.lora_A.weight"),
            Some(("blocks.0.attn.qkv", Role::Down))
        );
        assert_eq!(
            classify("blocks.0.attn.qkv.lora_up.weight"),
            Some(("blocks.0.attn.qkv", Role::Up))
        );
        assert_eq!(
            classify("blocks.0.attn.qkv.alpha"),
            Some(("blocks.0.attn.qkv", Role::Alpha))
        );
        assert_eq!(classify("blocks.0.attn.qkv.weight"), None);
        assert_eq!(classify("lora_A.weight"), None);
    }

    #[test]
    fn test_delta_with_alpha() {
        let mut raw = TensorMap::new();
        // rank 2, in 3, out 2
        raw.insert(
            "lora_unet_proj.lora_A.weight".to_string(),
            Tensor::from_slice(&[2, 3], &[1.0f32, 0.0, 0.0, 0.0, 1.0, 0.0])
                .unwrap(),
        );
        raw.insert(
            "lora_unet_proj.lora_B.weight".to_string(),
            Tensor::from_slice(&[2, 2], &[1.0f32, 2.0, 3.0, 4.0]).unwrap(),
        );
        raw.insert("lora_unet_proj.alpha".to_string(), Tensor::scalar(4.0f32));
        let adapter = LoraAdapter::from_tensors("memory", raw);

        let deltas = adapter.deltas(0.5).unwrap();
        let delta = &deltas["proj.weight"];
        assert_eq!(delta.shape(), &[2, 3]);
        // scale = 0.5 * 4 / 2 = 1
        assert_eq!(delta.as_slice::<f32>(), &[1.0, 2.0, 0.0, 3.0, 4.0, 0.0]);
    }

    #[test]
    fn test_missing_partner() {
        let mut raw = TensorMap::new();
        raw.insert(
            "proj.lora_down.weight".to_string(),
            Tensor::zeros(&[2, 4], DataType::F32),
        );
        let adapter = LoraAdapter::from_tensors("memory", raw);
        assert!(matches!(
            adapter.deltas(1.0),
            Err(LoraError::ApplicationFailed(_))
        ));
    }
}
