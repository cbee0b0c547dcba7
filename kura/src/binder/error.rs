use thiserror::Error;

use crate::{
    archive::ArchiveError, quantization::QuantizationError,
    tensor::TensorError,
};

#[derive(Debug, Error)]
pub enum BindError {
    #[error("Failed to apply weights: {0}")]
    ApplicationFailed(String),
    #[error("Parameter \"{0}\" not found.")]
    ParameterNotFound(String),
    #[error("Couldn't find any parameters with prefix \"{0}\".")]
    SubtreeNotFound(String),
    #[error("Parameter \"{0}\" has not been bound yet.")]
    Unbound(String),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Quantization(#[from] QuantizationError),
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
