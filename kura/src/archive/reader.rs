use std::{
    fs::File,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use memmap2::Mmap;

use super::{
    error::ArchiveError,
    header::{
        HEADER_LENGTH_SIZE, HeaderEntry, TensorDescriptor, parse_header,
        read_header_length,
    },
};
use crate::{DataType, Tensor, TensorMap};

/// How descriptor errors found while parsing the header are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// Any invalid tensor entry fails `open`.
    Strict,
    /// Invalid tensor entries are remembered and reported only when that
    /// tensor is requested.
    Lenient,
}

/// A memory-mapped tensor archive. Descriptors are parsed once at open time
/// and tensor bytes are only touched when a tensor is requested.
///
/// The file must not be modified or truncated while the archive is open.
pub struct Archive {
    path: PathBuf,
    mmap: Mmap,
    header_length: usize,
    user_metadata: IndexMap<String, String>,
    entries: IndexMap<String, HeaderEntry>,
}

impl Archive {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        Self::open_with(path, Validation::Strict)
    }

    pub fn open_lenient(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        Self::open_with(path, Validation::Lenient)
    }

    pub fn open_with(
        path: impl AsRef<Path>,
        validation: Validation,
    ) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_path_buf();
        let io_error = |source| ArchiveError::Io {
            path: path.clone(),
            source,
        };

        let file = File::open(&path).map_err(io_error)?;
        let file_size = file.metadata().map_err(io_error)?.len();
        if file_size < HEADER_LENGTH_SIZE as u64 {
            return Err(ArchiveError::FileTooSmall {
                path,
                size: file_size,
            });
        }

        // SAFETY: the mapping is read-only and archives are treated as
        // immutable while open. Another process truncating or rewriting the
        // file during the mapping's lifetime is undefined behavior (SIGBUS on
        // truncation); callers must not modify archives they have open.
        let mmap = unsafe { Mmap::map(&file) }.map_err(io_error)?;
        if mmap.len() < HEADER_LENGTH_SIZE {
            return Err(ArchiveError::FileTooSmall {
                path,
                size: mmap.len() as u64,
            });
        }
        let mut prefix = [0u8; HEADER_LENGTH_SIZE];
        prefix.copy_from_slice(&mmap[..HEADER_LENGTH_SIZE]);
        let header_length = read_header_length(prefix, mmap.len() as u64)?;

        let data_segment_start = HEADER_LENGTH_SIZE + header_length;
        let header = parse_header(
            &mmap[HEADER_LENGTH_SIZE..data_segment_start],
            mmap.len() - data_segment_start,
        )?;

        if validation == Validation::Strict {
            if let Some((name, Err(issue))) =
                header.entries.iter().find(|(_, entry)| entry.is_err())
            {
                return Err(issue.clone().into_error(name));
            }
        }

        log::debug!(
            "Opened archive {:?}: {} tensors, {} header bytes",
            path,
            header.entries.len(),
            header_length
        );

        Ok(Self {
            path,
            mmap,
            header_length,
            user_metadata: header.user_metadata,
            entries: header.entries,
        })
    }

    // Getters
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header_length(&self) -> usize {
        self.header_length
    }

    pub fn data_segment_start(&self) -> usize {
        HEADER_LENGTH_SIZE + self.header_length
    }

    /// Free-form `__metadata__` entries of the header.
    pub fn user_metadata(&self) -> &IndexMap<String, String> {
        &self.user_metadata
    }

    /// Tensor names in header declaration order.
    pub fn tensor_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.entries.contains_key(name)
    }

    /// Descriptor of a tensor, absent for unknown names and for entries a
    /// lenient archive found invalid.
    pub fn metadata(
        &self,
        name: &str,
    ) -> Option<&TensorDescriptor> {
        self.entries.get(name).and_then(|entry| entry.as_ref().ok())
    }

    pub fn all_metadata(&self) -> Vec<&TensorDescriptor> {
        self.entries.values().filter_map(|entry| entry.as_ref().ok()).collect()
    }

    fn descriptor(
        &self,
        name: &str,
    ) -> Result<&TensorDescriptor, ArchiveError> {
        match self.entries.get(name) {
            None => Err(ArchiveError::TensorNotFound(name.to_string())),
            Some(Ok(descriptor)) => Ok(descriptor),
            Some(Err(issue)) => Err(issue.clone().into_error(name)),
        }
    }

    /// Raw bytes of a tensor, borrowed from the mapping without conversion.
    pub fn tensor_data(
        &self,
        name: &str,
    ) -> Result<&[u8], ArchiveError> {
        let descriptor = self.descriptor(name)?;
        let start = self.data_segment_start() + descriptor.byte_offset_start();
        let end = self.data_segment_start() + descriptor.byte_offset_end();
        Ok(&self.mmap[start..end])
    }

    pub fn tensor(
        &self,
        name: &str,
    ) -> Result<Tensor, ArchiveError> {
        let descriptor = self.descriptor(name)?;
        let data = self.tensor_data(name)?;
        Tensor::from_bytes(descriptor.shape(), descriptor.data_type(), data)
            .map_err(|source| ArchiveError::Conversion {
                name: name.to_string(),
                target: descriptor.data_type(),
                source,
            })
    }

    /// Reads a tensor and converts its values into `data_type`.
    pub fn tensor_as(
        &self,
        name: &str,
        data_type: DataType,
    ) -> Result<Tensor, ArchiveError> {
        self.tensor(name)?.to_data_type(data_type).map_err(|source| {
            ArchiveError::Conversion {
                name: name.to_string(),
                target: data_type,
                source,
            }
        })
    }

    /// Materializes every tensor, stopping at the first failure.
    pub fn load_all_tensors(
        &self,
        data_type: Option<DataType>,
    ) -> Result<TensorMap, ArchiveError> {
        self.tensor_names()
            .map(|name| {
                let tensor = match data_type {
                    Some(data_type) => self.tensor_as(name, data_type)?,
                    None => self.tensor(name)?,
                };
                Ok((name.to_string(), tensor))
            })
            .collect()
    }
}

impl std::fmt::Debug for Archive {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("header_length", &self.header_length)
            .field("tensors", &self.entries.len())
            .finish()
    }
}
