use std::path::Path;

use anyhow::{Context, bail};
use console::style;
use kura::{
    TensorMap,
    archive::{Archive, find_archives, write_tensors},
    lora::LoraAdapter,
    quantization::{MANIFEST_FILE_NAME, QuantizationManifest},
};

/// Merges a LoRA adapter into the archives of `model_dir`, writing one
/// merged archive per input archive into `output`.
pub fn handle_merge_lora(
    model_dir: &Path,
    lora: &str,
    output: &Path,
    strength: f32,
) -> anyhow::Result<()> {
    if QuantizationManifest::path_in(model_dir).is_file() {
        bail!(
            "{model_dir:?} holds a quantized model ({MANIFEST_FILE_NAME}); \
             merge the LoRA into the full precision weights and quantize afterwards"
        );
    }
    let archive_paths = find_archives(model_dir)
        .with_context(|| format!("failed to list {model_dir:?}"))?;
    if archive_paths.is_empty() {
        bail!("no safetensors archives in {model_dir:?}");
    }

    let mut archives = Vec::with_capacity(archive_paths.len());
    let mut weights = TensorMap::new();
    for path in &archive_paths {
        let archive = Archive::open(path)
            .with_context(|| format!("failed to open {path:?}"))?;
        let tensors = archive.load_all_tensors(None)?;
        let names: Vec<String> = tensors.keys().cloned().collect();
        archives.push((path, archive.user_metadata().clone(), names));
        weights.extend(tensors);
    }

    let adapter = LoraAdapter::load(lora)
        .with_context(|| format!("failed to load LoRA \"{lora}\""))?;
    let merged = adapter
        .merge_into(&mut weights, strength)
        .with_context(|| format!("failed to merge {:?}", adapter.source()))?;

    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create {output:?}"))?;
    for (path, metadata, names) in archives {
        let chunk: TensorMap = names
            .into_iter()
            .filter_map(|name| {
                let tensor = weights.get(&name)?.clone();
                Some((name, tensor))
            })
            .collect();
        let Some(file_name) = path.file_name() else {
            bail!("archive path {path:?} has no file name");
        };
        let target = output.join(file_name);
        write_tensors(&target, &chunk, Some(&metadata))
            .with_context(|| format!("failed to write {target:?}"))?;
        log::info!("Wrote {} tensors to {target:?}", chunk.len());
    }

    println!(
        "{} {merged} layers at strength {strength} into {}",
        style("Merged").green().bold(),
        output.display()
    );
    Ok(())
}
