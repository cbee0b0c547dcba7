mod affine;
mod codec;
mod error;
mod manifest;
mod mxfp4;
mod naming;
mod quantizer;
mod spec;

pub use codec::{
    GroupParameters, QuantizedKeys, QuantizedTensor, dequantize, quantize,
};
pub use error::QuantizationError;
pub use manifest::{
    LayerQuantEntry, MANIFEST_FILE_NAME, QuantizationManifest,
    has_quantization,
};
pub use naming::TreeKind;
pub use quantizer::{
    LayerFilter, QuantizeEvent, Quantizer, default_layer_filter,
};
pub use spec::{
    MXFP4_BITS, MXFP4_GROUP_SIZE, QuantizationMode, QuantizationSpec,
    SUPPORTED_BITS, SUPPORTED_GROUP_SIZES,
};
