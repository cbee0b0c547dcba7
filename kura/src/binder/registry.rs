use indexmap::IndexMap;

use super::BindError;
use crate::{
    DataType, Tensor, archive::element_count, quantization::QuantizedTensor,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Dense(Tensor),
    Quantized(QuantizedTensor),
}

impl ParameterValue {
    pub fn is_quantized(&self) -> bool {
        matches!(self, ParameterValue::Quantized(_))
    }

    /// Full precision value in `data_type`, dequantizing if needed.
    pub fn dense(
        &self,
        data_type: DataType,
    ) -> Result<Tensor, BindError> {
        match self {
            ParameterValue::Dense(tensor) => {
                Ok(tensor.to_data_type(data_type)?)
            },
            ParameterValue::Quantized(quantized) => {
                Ok(quantized.dequantize(data_type)?)
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSlot {
    shape: Box<[usize]>,
    data_type: DataType,
    value: Option<ParameterValue>,
}

impl ParameterSlot {
    pub fn new(
        shape: &[usize],
        data_type: DataType,
    ) -> Self {
        Self {
            shape: shape.into(),
            data_type,
            value: None,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Working precision of the parameter.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn value(&self) -> Option<&ParameterValue> {
        self.value.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.value.is_some()
    }

    pub(crate) fn set_value(
        &mut self,
        value: ParameterValue,
    ) {
        self.value = Some(value);
    }
}

/// Parameters of a model, addressed by dotted path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterRegistry {
    slots: IndexMap<String, ParameterSlot>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a parameter. Declaring an existing path replaces its slot.
    pub fn register(
        &mut self,
        path: impl Into<String>,
        shape: &[usize],
        data_type: DataType,
    ) -> &mut Self {
        self.slots.insert(path.into(), ParameterSlot::new(shape, data_type));
        self
    }

    pub fn with_parameter(
        mut self,
        path: impl Into<String>,
        shape: &[usize],
        data_type: DataType,
    ) -> Self {
        self.register(path, shape, data_type);
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(
        &self,
        path: &str,
    ) -> bool {
        self.slots.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.slots.keys().map(String::as_str)
    }

    pub fn slot(
        &self,
        path: &str,
    ) -> Option<&ParameterSlot> {
        self.slots.get(path)
    }

    pub(crate) fn slot_mut(
        &mut self,
        path: &str,
    ) -> Option<&mut ParameterSlot> {
        self.slots.get_mut(path)
    }

    pub fn unbound_paths(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|(_, slot)| !slot.is_bound())
            .map(|(path, _)| path.as_str())
            .collect()
    }

    /// Value of a parameter at its working precision. Quantized values are
    /// dequantized on demand.
    pub fn dense(
        &self,
        path: &str,
    ) -> Result<Tensor, BindError> {
        let slot = self
            .slot(path)
            .ok_or_else(|| BindError::ParameterNotFound(path.to_string()))?;
        slot.value()
            .ok_or_else(|| BindError::Unbound(path.to_string()))?
            .dense(slot.data_type())
    }

    /// Value of a bound parameter with `delta` added, at its working
    /// precision. The registry is not modified.
    pub fn corrected(
        &self,
        path: &str,
        delta: &Tensor,
    ) -> Result<Tensor, BindError> {
        let slot = self.slot(path).ok_or_else(|| {
            BindError::ApplicationFailed(format!(
                "no parameter \"{path}\" to correct"
            ))
        })?;
        if slot.shape() != delta.shape() {
            return Err(BindError::ApplicationFailed(format!(
                "correction for \"{path}\" has shape {:?}, parameter has {:?}",
                delta.shape(),
                slot.shape()
            )));
        }
        let current = slot
            .value()
            .ok_or_else(|| BindError::Unbound(path.to_string()))?
            .dense(slot.data_type())?;
        Ok(current.add_tensor(delta)?)
    }

    /// Adds `delta` to a bound parameter. A preserved quantized value is
    /// replaced by its corrected dense form.
    pub fn apply_correction(
        &mut self,
        path: &str,
        delta: &Tensor,
    ) -> Result<(), BindError> {
        let corrected = self.corrected(path, delta)?;
        if let Some(slot) = self.slot_mut(path) {
            slot.set_value(ParameterValue::Dense(corrected));
        }
        Ok(())
    }

    pub fn total_elements(&self) -> usize {
        self.slots.values().map(|slot| element_count(slot.shape())).sum()
    }

    pub fn tree(&self) -> ParameterSubtree<'_> {
        ParameterSubtree {
            registry: self,
            prefix: None,
        }
    }

    pub fn subtree(
        &self,
        prefix: &str,
    ) -> Result<ParameterSubtree<'_>, BindError> {
        self.tree().subtree(prefix)
    }
}

/// Read-only view of the parameters below a dotted prefix.
#[derive(Debug, Clone)]
pub struct ParameterSubtree<'registry> {
    registry: &'registry ParameterRegistry,
    prefix: Option<String>,
}

impl<'registry> ParameterSubtree<'registry> {
    pub fn path_prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    fn join_prefix(
        &self,
        name: &str,
    ) -> String {
        self.prefix
            .as_ref()
            .map_or_else(|| name.to_string(), |p| format!("{p}.{name}"))
    }

    pub fn subtree(
        &self,
        name: &str,
    ) -> Result<Self, BindError> {
        let new_prefix = self.join_prefix(name);
        let has_children = self.registry.paths().any(|path| {
            path.strip_prefix(new_prefix.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
        });
        if has_children {
            Ok(Self {
                registry: self.registry,
                prefix: Some(new_prefix),
            })
        } else {
            Err(BindError::SubtreeNotFound(new_prefix))
        }
    }

    /// Names directly or transitively below this subtree, without the prefix.
    pub fn names(&self) -> Vec<&'registry str> {
        let registry = self.registry;
        match &self.prefix {
            None => registry.paths().collect(),
            Some(prefix) => registry
                .paths()
                .filter_map(|path| {
                    path.strip_prefix(prefix.as_str())?.strip_prefix('.')
                })
                .collect(),
        }
    }

    pub fn slot(
        &self,
        name: &str,
    ) -> Option<&'registry ParameterSlot> {
        self.registry.slot(&self.join_prefix(name))
    }

    pub fn leaf(
        &self,
        name: &str,
    ) -> Result<Tensor, BindError> {
        self.registry.dense(&self.join_prefix(name))
    }
}
