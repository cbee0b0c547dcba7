use std::path::Path;

use anyhow::Context;
use console::Style;
use indexmap::IndexMap;
use kura::archive::Archive;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TensorSummary {
    pub name: String,
    pub data_type: String,
    pub shape: Vec<usize>,
    pub bytes: usize,
}

#[derive(Debug, Serialize)]
pub struct ArchiveSummary {
    pub header_length: usize,
    pub metadata: IndexMap<String, String>,
    pub tensors: Vec<TensorSummary>,
}

/// Reads the header of an archive. Invalid tensor entries are counted but
/// not listed.
pub fn inspect_archive(path: &Path) -> anyhow::Result<ArchiveSummary> {
    let archive = Archive::open_lenient(path)
        .with_context(|| format!("failed to open {path:?}"))?;
    let tensors: Vec<TensorSummary> = archive
        .all_metadata()
        .into_iter()
        .map(|descriptor| TensorSummary {
            name: descriptor.name().to_string(),
            data_type: descriptor.data_type().archive_name().to_string(),
            shape: descriptor.shape().to_vec(),
            bytes: descriptor.byte_count(),
        })
        .collect();
    if tensors.len() != archive.len() {
        log::warn!(
            "{} of {} tensor entries in {path:?} are invalid",
            archive.len() - tensors.len(),
            archive.len()
        );
    }
    Ok(ArchiveSummary {
        header_length: archive.header_length(),
        metadata: archive.user_metadata().clone(),
        tensors,
    })
}

pub fn handle_inspect(
    path: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let summary = inspect_archive(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let bold = Style::new().bold();
    let dim = Style::new().dim();
    println!(
        "{} ({} tensors, header {} bytes)",
        bold.apply_to(path.display()),
        summary.tensors.len(),
        summary.header_length
    );
    for (key, value) in &summary.metadata {
        println!("  {} {key} = {value}", dim.apply_to("meta"));
    }
    for tensor in &summary.tensors {
        println!(
            "  {:<60} {:<5} {:<20} {}",
            tensor.name,
            tensor.data_type,
            format!("{:?}", tensor.shape),
            dim.apply_to(format!("{} B", tensor.bytes))
        );
    }
    let total: usize = summary.tensors.iter().map(|tensor| tensor.bytes).sum();
    println!("{} {total} B", bold.apply_to("total"));
    Ok(())
}
