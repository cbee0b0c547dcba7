use std::path::PathBuf;

use thiserror::Error;

use crate::{
    archive::ArchiveError, binder::BindError, tensor::TensorError,
};

#[derive(Debug, Error)]
pub enum LoraError {
    #[error("LoRA directory {0:?} does not exist")]
    DirectoryNotFound(PathBuf),
    #[error("No LoRA weights found in {0:?}")]
    WeightsNotFound(PathBuf),
    #[error("Failed to apply LoRA: {0}")]
    ApplicationFailed(String),
    #[error("I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
