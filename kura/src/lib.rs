pub mod archive;
pub mod binder;
pub mod config;
mod data_type;
pub mod lora;
pub mod quantization;
mod tensor;
pub mod utils;

pub use data_type::{ArrayElement, DataType};
pub use tensor::{Tensor, TensorError, TensorMap, size_for_shape};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
