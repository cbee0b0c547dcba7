pub mod env_utils;
pub mod storage;

pub use env_utils::*;
pub use storage::*;
