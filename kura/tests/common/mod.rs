#![allow(dead_code)]
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use kura::{
    Tensor, TensorMap,
    archive::{TensorView, write_archive, write_tensors},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

pub const MODEL_FILE_NAME: &str = "model.safetensors";

pub fn random_values(
    count: usize,
    seed: u64,
) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count).map(|_| rng.random_range(-1.0..1.0)).collect()
}

pub fn random_tensor(
    shape: &[usize],
    seed: u64,
) -> Tensor {
    let values = random_values(shape.iter().product(), seed);
    Tensor::from_slice(shape, &values).unwrap()
}

pub fn tensor_map(entries: &[(&str, Tensor)]) -> TensorMap {
    entries
        .iter()
        .map(|(name, tensor)| (name.to_string(), tensor.clone()))
        .collect()
}

pub fn write_fixture(
    path: &Path,
    tensors: &TensorMap,
) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    write_tensors(path, tensors, None).unwrap();
    path.to_path_buf()
}

pub fn write_fixture_with_metadata(
    path: &Path,
    tensors: &TensorMap,
    metadata: &[(&str, &str)],
) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let metadata: IndexMap<String, String> = metadata
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    let views: Vec<TensorView<'_>> = tensors
        .iter()
        .map(|(name, tensor)| TensorView::new(name, tensor))
        .collect();
    write_archive(path, &views, Some(&metadata)).unwrap();
    path.to_path_buf()
}

/// Archive made of a raw JSON header followed by `data`.
pub fn write_raw_archive(
    path: &Path,
    header: &str,
    data: &[u8],
) -> PathBuf {
    let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(data);
    std::fs::write(path, bytes).unwrap();
    path.to_path_buf()
}

pub fn max_abs_difference(
    left: &[f32],
    right: &[f32],
) -> f32 {
    left.iter()
        .zip(right)
        .map(|(left, right)| (left - right).abs())
        .fold(0.0, f32::max)
}
