use std::path::PathBuf;

use thiserror::Error;

use crate::{
    archive::{ArchiveError, ArchiveWriteError},
    tensor::TensorError,
};

#[derive(Debug, Error)]
pub enum QuantizationError {
    #[error("Unsupported group size {0}, expected one of 32, 64, 128")]
    InvalidGroupSize(usize),
    #[error("Unsupported bit width {0}, expected 4 or 8")]
    InvalidBits(usize),
    #[error("Quantization failed: {0}")]
    QuantizationFailed(String),
    #[error("No safetensors archives found in {0:?}")]
    NoSafetensorsFound(PathBuf),
    #[error("Failed to create output directory {path:?}")]
    OutputDirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid quantization manifest {path:?}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    ArchiveWrite(#[from] ArchiveWriteError),
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
