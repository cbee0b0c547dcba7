use std::path::PathBuf;

use thiserror::Error;

use crate::{DataType, tensor::TensorError};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to read archive {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "Archive {path:?} is {size} bytes long, too small to hold a header length."
    )]
    FileTooSmall {
        path: PathBuf,
        size: u64,
    },
    #[error(
        "Header length {header_length} does not fit in a file of {file_size} bytes."
    )]
    InvalidHeaderLength {
        header_length: u64,
        file_size: u64,
    },
    #[error("Malformed archive header: {0}")]
    MalformedHeader(String),
    #[error("Tensor \"{name}\" is missing the \"{field}\" header field.")]
    TensorMetadataMissing {
        name: String,
        field: &'static str,
    },
    #[error("Unsupported dtype {0}")]
    UnsupportedDType(String),
    #[error("Tensor \"{0}\" has invalid data offsets.")]
    InvalidOffsets(String),
    #[error("Tensor \"{0}\" has an invalid shape.")]
    InvalidShape(String),
    #[error("Tensor \"{0}\" not found.")]
    TensorNotFound(String),
    #[error("Failed to convert tensor \"{name}\" to {target:?}")]
    Conversion {
        name: String,
        target: DataType,
        #[source]
        source: TensorError,
    },
}
