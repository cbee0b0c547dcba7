mod inspect;
mod merge;
mod quantize;

pub use inspect::{handle_inspect, inspect_archive};
pub use merge::handle_merge_lora;
pub use quantize::{handle_quantize, quantization_spec};
