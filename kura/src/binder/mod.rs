mod error;
mod registry;
mod weight_binder;

pub use error::BindError;
pub use registry::{
    ParameterRegistry, ParameterSlot, ParameterSubtree, ParameterValue,
};
pub use weight_binder::{QuantizedBinding, WeightBinder};
