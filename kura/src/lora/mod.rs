mod adapter;
mod error;
mod merge;
mod remap;

pub use adapter::LoraAdapter;
pub use error::LoraError;
pub use merge::MergeTarget;
pub use remap::remap_weight_key;
