use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use walkdir::WalkDir;

use super::{
    LayerQuantEntry, QuantizationError, QuantizationManifest, QuantizationSpec,
    QuantizedTensor, quantize,
};
use crate::{
    DataType,
    archive::{
        Archive, TensorDescriptor, TensorView, is_archive_path, write_archive,
    },
};

/// Decides whether a tensor gets quantized.
pub type LayerFilter =
    Box<dyn Fn(&TensorDescriptor, &QuantizationSpec) -> bool + Send + Sync>;

/// Progress notifications emitted while a directory is quantized.
#[derive(Debug, Clone, Copy)]
pub enum QuantizeEvent<'a> {
    Started {
        archives: usize,
        tensors: usize,
    },
    Tensor {
        archive: &'a Path,
        name: &'a str,
        quantized: bool,
    },
    ArchiveWritten {
        path: &'a Path,
    },
}

/// 2-D floating point `.weight` tensors whose rows split evenly into groups.
pub fn default_layer_filter(
    descriptor: &TensorDescriptor,
    spec: &QuantizationSpec,
) -> bool {
    match descriptor.shape() {
        &[_, in_dim] => {
            descriptor.data_type().is_floating_point()
                && descriptor.name().ends_with(".weight")
                && in_dim > 0
                && in_dim % spec.group_size == 0
        },
        _ => false,
    }
}

pub struct Quantizer {
    spec: QuantizationSpec,
    model_id: Option<String>,
    revision: Option<String>,
    filter: LayerFilter,
}

impl Quantizer {
    pub fn new(spec: QuantizationSpec) -> Self {
        Self {
            spec,
            model_id: None,
            revision: None,
            filter: Box::new(default_layer_filter),
        }
    }

    pub fn with_model_id(
        mut self,
        model_id: impl Into<String>,
    ) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_revision(
        mut self,
        revision: impl Into<String>,
    ) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn with_filter<F>(
        mut self,
        filter: F,
    ) -> Self
    where
        F: Fn(&TensorDescriptor, &QuantizationSpec) -> bool
            + Send
            + Sync
            + 'static,
    {
        self.filter = Box::new(filter);
        self
    }

    pub fn spec(&self) -> &QuantizationSpec {
        &self.spec
    }

    pub fn quantize_directory(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<QuantizationManifest, QuantizationError> {
        self.quantize_directory_with_progress(input, output, |_| {})
    }

    /// Quantizes every archive below `input` into the same relative location
    /// below `output`, copies the remaining files and writes the manifest.
    pub fn quantize_directory_with_progress<F>(
        &self,
        input: &Path,
        output: &Path,
        mut on_event: F,
    ) -> Result<QuantizationManifest, QuantizationError>
    where
        F: FnMut(QuantizeEvent<'_>),
    {
        self.spec.validate()?;

        let (archive_paths, side_files) = collect_files(input)?;
        if archive_paths.is_empty() {
            return Err(QuantizationError::NoSafetensorsFound(
                input.to_path_buf(),
            ));
        }
        create_dir(output)?;

        let archives = archive_paths
            .iter()
            .map(Archive::open)
            .collect::<Result<Vec<_>, _>>()?;
        on_event(QuantizeEvent::Started {
            archives: archives.len(),
            tensors: archives.iter().map(Archive::len).sum(),
        });

        let mut manifest = QuantizationManifest {
            model_id: self.model_id.clone(),
            revision: self.revision.clone(),
            defaults: self.spec,
            layers: Vec::new(),
        };

        for archive in &archives {
            let relative = relative_path(input, archive.path());
            let destination = output.join(&relative);
            if let Some(parent) = destination.parent() {
                create_dir(parent)?;
            }
            let layers = self.quantize_archive(
                archive,
                &relative,
                &destination,
                &mut on_event,
            )?;
            manifest.layers.extend(layers);
            on_event(QuantizeEvent::ArchiveWritten {
                path: &destination,
            });
        }

        for file in &side_files {
            let destination = output.join(relative_path(input, file));
            if let Some(parent) = destination.parent() {
                create_dir(parent)?;
            }
            std::fs::copy(file, &destination).map_err(|source| {
                QuantizationError::Io {
                    path: file.clone(),
                    source,
                }
            })?;
        }

        manifest.save(output)?;
        log::info!(
            "Quantized {} layers from {} archives into {:?}",
            manifest.layers.len(),
            archives.len(),
            output
        );
        Ok(manifest)
    }

    fn quantize_archive<F>(
        &self,
        archive: &Archive,
        relative: &Path,
        destination: &Path,
        on_event: &mut F,
    ) -> Result<Vec<LayerQuantEntry>, QuantizationError>
    where
        F: FnMut(QuantizeEvent<'_>),
    {
        let file = manifest_file_name(relative);
        let mut quantized: IndexMap<&str, QuantizedTensor> = IndexMap::new();
        let mut layers = Vec::new();

        for descriptor in archive.all_metadata() {
            let selected = (self.filter)(descriptor, &self.spec);
            if selected {
                let tensor = archive.tensor(descriptor.name())?;
                quantized
                    .insert(descriptor.name(), quantize(&tensor, &self.spec)?);
                layers.push(layer_entry(descriptor, &file));
                log::debug!(
                    "Quantized {} {:?} with {:?}",
                    descriptor.name(),
                    descriptor.shape(),
                    self.spec
                );
            }
            on_event(QuantizeEvent::Tensor {
                archive: archive.path(),
                name: descriptor.name(),
                quantized: selected,
            });
        }

        // Quantized layers expand into codes plus group parameters in place.
        let keyed: Vec<(String, &[usize], DataType, &[u8])> = archive
            .all_metadata()
            .into_iter()
            .map(|descriptor| -> Result<Vec<_>, QuantizationError> {
                Ok(match quantized.get(descriptor.name()) {
                    Some(q) => q
                        .archive_tensors(descriptor.name())
                        .into_iter()
                        .map(|(key, tensor)| {
                            (
                                key,
                                tensor.shape(),
                                tensor.data_type(),
                                tensor.as_bytes(),
                            )
                        })
                        .collect(),
                    None => vec![(
                        descriptor.name().to_string(),
                        descriptor.shape(),
                        descriptor.data_type(),
                        archive.tensor_data(descriptor.name())?,
                    )],
                })
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();

        let views: Vec<TensorView<'_>> = keyed
            .iter()
            .map(|(name, shape, data_type, data)| TensorView {
                name,
                data_type: *data_type,
                shape,
                data,
            })
            .collect();
        let metadata = archive.user_metadata();
        write_archive(
            destination,
            &views,
            (!metadata.is_empty()).then_some(metadata),
        )?;
        Ok(layers)
    }
}

fn layer_entry(
    descriptor: &TensorDescriptor,
    file: &str,
) -> LayerQuantEntry {
    let shape = descriptor.shape().to_vec();
    let in_dim = shape.last().copied().unwrap_or(0);
    let out_dim = shape[..shape.len().saturating_sub(1)].iter().product();
    LayerQuantEntry {
        name: descriptor.name().to_string(),
        shape,
        in_dim,
        out_dim,
        file: file.to_string(),
        quant_file: None,
        group_size: None,
        bits: None,
        mode: None,
    }
}

fn collect_files(
    input: &Path,
) -> Result<(Vec<PathBuf>, Vec<PathBuf>), QuantizationError> {
    let mut archives = Vec::new();
    let mut side_files = Vec::new();
    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = entry.map_err(|error| QuantizationError::Io {
            path: input.to_path_buf(),
            source: error.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if is_archive_path(entry.path()) {
            archives.push(entry.into_path());
        } else {
            side_files.push(entry.into_path());
        }
    }
    Ok((archives, side_files))
}

fn create_dir(path: &Path) -> Result<(), QuantizationError> {
    std::fs::create_dir_all(path).map_err(|source| {
        QuantizationError::OutputDirectoryCreationFailed {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn relative_path(
    root: &Path,
    path: &Path,
) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

/// Relative path spelled with `/` on every platform.
fn manifest_file_name(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
