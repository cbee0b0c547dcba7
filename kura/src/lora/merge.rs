use super::{LoraAdapter, LoraError};
use crate::{
    Tensor, TensorMap,
    binder::{ParameterRegistry, ParameterValue},
};

/// Weights a LoRA adapter can be merged into.
///
/// Merging is split into a fallible staging step and an infallible commit so
/// that an adapter is applied either completely or not at all.
pub trait MergeTarget {
    /// Weight at `name` with `delta` added, in the weight's own data type.
    /// Must not modify the target.
    fn corrected(
        &self,
        name: &str,
        delta: &Tensor,
    ) -> Result<Tensor, LoraError>;

    /// Stores a value produced by `corrected` for the same `name`.
    fn replace(
        &mut self,
        name: &str,
        value: Tensor,
    );
}

impl MergeTarget for ParameterRegistry {
    fn corrected(
        &self,
        name: &str,
        delta: &Tensor,
    ) -> Result<Tensor, LoraError> {
        if !self.slot(name).is_some_and(|slot| slot.is_bound()) {
            return Err(LoraError::ApplicationFailed(format!(
                "no bound base weight \"{name}\" to merge into"
            )));
        }
        Ok(ParameterRegistry::corrected(self, name, delta)?)
    }

    fn replace(
        &mut self,
        name: &str,
        value: Tensor,
    ) {
        if let Some(slot) = self.slot_mut(name) {
            slot.set_value(ParameterValue::Dense(value));
        }
    }
}

impl MergeTarget for TensorMap {
    fn corrected(
        &self,
        name: &str,
        delta: &Tensor,
    ) -> Result<Tensor, LoraError> {
        let weight = self.get(name).ok_or_else(|| {
            LoraError::ApplicationFailed(format!(
                "no base weight \"{name}\" to merge into"
            ))
        })?;
        if weight.shape() != delta.shape() {
            return Err(LoraError::ApplicationFailed(format!(
                "delta for \"{name}\" has shape {:?}, base weight has {:?}",
                delta.shape(),
                weight.shape()
            )));
        }
        Ok(weight.add_tensor(delta)?)
    }

    fn replace(
        &mut self,
        name: &str,
        value: Tensor,
    ) {
        if let Some(weight) = self.get_mut(name) {
            *weight = value;
        }
    }
}

impl LoraAdapter {
    /// Merges every adapter pair into `target`. Every corrected weight is
    /// computed before the first one is stored, so a failure leaves `target`
    /// untouched. Returns the number of merged weights.
    pub fn merge_into<T: MergeTarget + ?Sized>(
        &self,
        target: &mut T,
        strength: f32,
    ) -> Result<usize, LoraError> {
        let deltas = self.deltas(strength)?;
        let staged = deltas
            .iter()
            .map(|(name, delta)| {
                Ok((name.as_str(), target.corrected(name, delta)?))
            })
            .collect::<Result<Vec<_>, LoraError>>()?;

        for (name, value) in staged {
            target.replace(name, value);
            log::debug!("Merged LoRA delta into \"{name}\"");
        }
        log::info!(
            "Merged {} LoRA deltas from {:?} at strength {strength}",
            deltas.len(),
            self.source()
        );
        Ok(deltas.len())
    }
}
