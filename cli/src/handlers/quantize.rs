use std::path::Path;

use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use kura::quantization::{
    QuantizationMode, QuantizationSpec, QuantizeEvent, Quantizer,
};

/// Spec requested on the command line. Missing values fall back to the
/// defaults of `mode`; explicit values are kept as given and checked by the
/// quantizer.
pub fn quantization_spec(
    mode: QuantizationMode,
    group_size: Option<usize>,
    bits: Option<usize>,
) -> QuantizationSpec {
    let defaults = match mode {
        QuantizationMode::Affine => QuantizationSpec::default(),
        QuantizationMode::Mxfp4 => QuantizationSpec::mxfp4(),
    };
    QuantizationSpec::new(
        group_size.unwrap_or(defaults.group_size),
        bits.unwrap_or(defaults.bits),
        mode,
    )
}

pub fn handle_quantize(
    input: &Path,
    output: &Path,
    spec: QuantizationSpec,
    model_id: Option<String>,
    revision: Option<String>,
) -> anyhow::Result<()> {
    let mut quantizer = Quantizer::new(spec);
    if let Some(model_id) = model_id {
        quantizer = quantizer.with_model_id(model_id);
    }
    if let Some(revision) = revision {
        quantizer = quantizer.with_revision(revision);
    }

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} {wide_msg}",
        )?
        .progress_chars("##-"),
    );
    let manifest = quantizer
        .quantize_directory_with_progress(input, output, |event| match event {
            QuantizeEvent::Started {
                tensors,
                ..
            } => {
                progress.set_length(tensors as u64);
            },
            QuantizeEvent::Tensor {
                name,
                ..
            } => {
                progress.set_message(name.to_string());
                progress.inc(1);
            },
            QuantizeEvent::ArchiveWritten {
                path,
            } => {
                progress.println(format!("wrote {}", path.display()));
            },
        })
        .with_context(|| {
            format!("failed to quantize {input:?} into {output:?}")
        })?;
    progress.finish_and_clear();

    println!(
        "{} {} layers ({} {}-bit, group size {}) into {}",
        style("Quantized").green().bold(),
        manifest.layers.len(),
        manifest.defaults.mode,
        manifest.defaults.bits,
        manifest.defaults.group_size,
        output.display()
    );
    Ok(())
}
