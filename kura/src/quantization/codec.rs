use itertools::Itertools;

use super::{
    QuantizationError, QuantizationMode, QuantizationSpec, affine, mxfp4,
};
use crate::{
    DataType, Tensor,
    archive::{Archive, element_count},
};

/// Per-group parameters, one variant per quantization mode.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupParameters {
    /// `F32` scales and biases, shape `[..., last_dim / group_size]`.
    Affine {
        scales: Tensor,
        biases: Tensor,
    },
    /// Biased E8M0 shared exponents as `U8`, shape
    /// `[..., last_dim / group_size]`.
    Mxfp4 {
        exponents: Tensor,
    },
}

impl GroupParameters {
    pub fn mode(&self) -> QuantizationMode {
        match self {
            GroupParameters::Affine {
                ..
            } => QuantizationMode::Affine,
            GroupParameters::Mxfp4 {
                ..
            } => QuantizationMode::Mxfp4,
        }
    }
}

/// Archive keys of a quantized weight: the codes replace the weight itself,
/// group parameters sit next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizedKeys {
    pub codes: String,
    pub scales: String,
    pub biases: String,
}

impl QuantizedKeys {
    pub fn for_weight(weight_name: &str) -> Self {
        let base = weight_name.strip_suffix(".weight").unwrap_or(weight_name);
        Self {
            codes: weight_name.to_string(),
            scales: format!("{base}.scales"),
            biases: format!("{base}.biases"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedTensor {
    codes: Tensor,
    parameters: GroupParameters,
    shape: Box<[usize]>,
    spec: QuantizationSpec,
}

fn failed(reason: impl Into<String>) -> QuantizationError {
    QuantizationError::QuantizationFailed(reason.into())
}

fn codes_shape(
    shape: &[usize],
    bits: usize,
) -> Box<[usize]> {
    let mut codes_shape = shape.to_vec();
    if let Some(last_dim) = codes_shape.last_mut() {
        *last_dim = *last_dim * bits / 8;
    }
    codes_shape.into()
}

fn parameters_shape(
    shape: &[usize],
    group_size: usize,
) -> Box<[usize]> {
    let mut parameters_shape = shape.to_vec();
    if let Some(last_dim) = parameters_shape.last_mut() {
        *last_dim /= group_size;
    }
    parameters_shape.into()
}

fn pack_codes(
    codes: &[u8],
    bits: usize,
) -> Vec<u8> {
    match bits {
        4 => codes
            .iter()
            .tuples()
            .map(|(&low, &high)| (low & 0x0f) | (high << 4))
            .collect(),
        _ => codes.to_vec(),
    }
}

fn unpack_codes(
    packed: &[u8],
    bits: usize,
) -> Vec<u8> {
    match bits {
        4 => packed.iter().flat_map(|&byte| [byte & 0x0f, byte >> 4]).collect(),
        _ => packed.to_vec(),
    }
}

impl QuantizedTensor {
    /// Assembles a quantized tensor from stored parts, checking that every
    /// part agrees with `shape` and `spec`.
    pub fn from_parts(
        codes: Tensor,
        parameters: GroupParameters,
        shape: &[usize],
        spec: QuantizationSpec,
    ) -> Result<Self, QuantizationError> {
        spec.validate()?;
        if parameters.mode() != spec.mode {
            return Err(failed(format!(
                "group parameters are {} but the layer is {}",
                parameters.mode(),
                spec.mode
            )));
        }
        let Some(&last_dim) = shape.last() else {
            return Err(failed("quantized tensors need at least one dimension"));
        };
        if last_dim % spec.group_size != 0 {
            return Err(failed(format!(
                "last dimension {last_dim} is not divisible by group size {}",
                spec.group_size
            )));
        }

        let expected_codes = codes_shape(shape, spec.bits);
        if codes.data_type() != DataType::U8 || codes.shape() != &*expected_codes
        {
            return Err(failed(format!(
                "codes must be U8 of shape {expected_codes:?}, got {:?} of shape {:?}",
                codes.data_type(),
                codes.shape()
            )));
        }

        let expected_parameters = parameters_shape(shape, spec.group_size);
        let check_parameter = |label: &str, tensor: &Tensor, data_type: DataType| {
            if tensor.data_type() != data_type
                || tensor.shape() != &*expected_parameters
            {
                return Err(failed(format!(
                    "{label} must be {data_type:?} of shape {expected_parameters:?}, got {:?} of shape {:?}",
                    tensor.data_type(),
                    tensor.shape()
                )));
            }
            Ok(())
        };
        match &parameters {
            GroupParameters::Affine {
                scales,
                biases,
            } => {
                check_parameter("scales", scales, DataType::F32)?;
                check_parameter("biases", biases, DataType::F32)?;
            },
            GroupParameters::Mxfp4 {
                exponents,
            } => {
                check_parameter("exponents", exponents, DataType::U8)?;
            },
        }

        Ok(Self {
            codes,
            parameters,
            shape: shape.into(),
            spec,
        })
    }

    /// Reads a quantized weight stored under `weight_name` (see
    /// `QuantizedKeys`). Group parameters stored in any floating point type
    /// are widened to `F32`.
    pub fn read(
        archive: &Archive,
        weight_name: &str,
        shape: &[usize],
        spec: QuantizationSpec,
    ) -> Result<Self, QuantizationError> {
        spec.validate()?;
        let keys = QuantizedKeys::for_weight(weight_name);
        let codes = archive.tensor(&keys.codes)?;
        let parameters = match spec.mode {
            QuantizationMode::Affine => GroupParameters::Affine {
                scales: archive.tensor_as(&keys.scales, DataType::F32)?,
                biases: archive.tensor_as(&keys.biases, DataType::F32)?,
            },
            QuantizationMode::Mxfp4 => GroupParameters::Mxfp4 {
                exponents: archive.tensor(&keys.scales)?,
            },
        };
        Self::from_parts(codes, parameters, shape, spec)
    }

    // Getters
    pub fn codes(&self) -> &Tensor {
        &self.codes
    }

    pub fn parameters(&self) -> &GroupParameters {
        &self.parameters
    }

    /// Shape of the original full precision tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn spec(&self) -> QuantizationSpec {
        self.spec
    }

    pub fn group_count(&self) -> usize {
        element_count(&self.shape) / self.spec.group_size
    }

    /// Tensors to store for this weight, keyed as in `QuantizedKeys`.
    pub fn archive_tensors(
        &self,
        weight_name: &str,
    ) -> Vec<(String, &Tensor)> {
        let keys = QuantizedKeys::for_weight(weight_name);
        match &self.parameters {
            GroupParameters::Affine {
                scales,
                biases,
            } => vec![
                (keys.codes, &self.codes),
                (keys.scales, scales),
                (keys.biases, biases),
            ],
            GroupParameters::Mxfp4 {
                exponents,
            } => vec![(keys.codes, &self.codes), (keys.scales, exponents)],
        }
    }

    pub fn dequantize(
        &self,
        data_type: DataType,
    ) -> Result<Tensor, QuantizationError> {
        dequantize(self, data_type)
    }
}

/// Quantizes `tensor` group-wise along its last dimension.
pub fn quantize(
    tensor: &Tensor,
    spec: &QuantizationSpec,
) -> Result<QuantizedTensor, QuantizationError> {
    spec.validate()?;
    let shape = tensor.shape();
    let Some(&last_dim) = shape.last() else {
        return Err(failed("cannot quantize a scalar"));
    };
    if last_dim == 0 || last_dim % spec.group_size != 0 {
        return Err(failed(format!(
            "last dimension {last_dim} is not divisible by group size {}",
            spec.group_size
        )));
    }

    let values = tensor.to_f32_vec()?;
    if values.iter().any(|v| !v.is_finite()) {
        return Err(failed("tensor contains non-finite values"));
    }

    let parameter_shape = parameters_shape(shape, spec.group_size);
    let (codes, parameters) = match spec.mode {
        QuantizationMode::Affine => {
            if let Some(group) =
                affine::overflowing_group(&values, spec.group_size)
            {
                return Err(failed(format!(
                    "value range of group {group} overflows f32"
                )));
            }
            let groups = affine::quantize_groups(
                &values,
                spec.group_size,
                spec.max_code(),
            );
            let parameters = GroupParameters::Affine {
                scales: Tensor::from_slice(&parameter_shape, &groups.scales)?,
                biases: Tensor::from_slice(&parameter_shape, &groups.biases)?,
            };
            (groups.codes, parameters)
        },
        QuantizationMode::Mxfp4 => {
            let groups = mxfp4::quantize_groups(&values, spec.group_size);
            let parameters = GroupParameters::Mxfp4 {
                exponents: Tensor::from_slice(
                    &parameter_shape,
                    &groups.exponents,
                )?,
            };
            (groups.codes, parameters)
        },
    };

    let packed = pack_codes(&codes, spec.bits);
    let codes = Tensor::from_slice(&codes_shape(shape, spec.bits), &packed)?;
    Ok(QuantizedTensor {
        codes,
        parameters,
        shape: shape.into(),
        spec: *spec,
    })
}

/// Reconstructs the full precision tensor and converts it to `data_type`.
pub fn dequantize(
    quantized: &QuantizedTensor,
    data_type: DataType,
) -> Result<Tensor, QuantizationError> {
    let spec = quantized.spec;
    let codes = unpack_codes(quantized.codes.as_slice::<u8>(), spec.bits);
    let values = match &quantized.parameters {
        GroupParameters::Affine {
            scales,
            biases,
        } => affine::dequantize_groups(
            &codes,
            scales.as_slice::<f32>(),
            biases.as_slice::<f32>(),
            spec.group_size,
        ),
        GroupParameters::Mxfp4 {
            exponents,
        } => mxfp4::dequantize_groups(
            &codes,
            exponents.as_slice::<u8>(),
            spec.group_size,
        ),
    };
    Ok(Tensor::from_slice(&quantized.shape, &values)?.to_data_type(data_type)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(shape: &[usize]) -> Tensor {
        let count: usize = shape.iter().product();
        let values: Vec<f32> =
            (0..count).map(|i| ((i * 13) % 29) as f32 * 0.1 - 1.4).collect();
        Tensor::from_slice(shape, &values).unwrap()
    }

    #[test]
    fn test_packing() {
        let codes = [1u8, 15, 0, 7];
        let packed = pack_codes(&codes, 4);
        assert_eq!(packed, vec![0xf1, 0x70]);
        assert_eq!(unpack_codes(&packed, 4), codes);
        assert_eq!(pack_codes(&codes, 8), codes);
    }

    #[test]
    fn test_quantized_shapes() {
        let spec = QuantizationSpec::new(32, 4, QuantizationMode::Affine);
        let quantized = quantize(&ramp(&[3, 64]), &spec).unwrap();
        assert_eq!(quantized.codes().shape(), &[3, 32]);
        assert_eq!(quantized.group_count(), 6);
        let GroupParameters::Affine {
            scales,
            biases,
        } = quantized.parameters()
        else {
            panic!("expected affine parameters");
        };
        assert_eq!(scales.shape(), &[3, 2]);
        assert_eq!(biases.shape(), &[3, 2]);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let spec = QuantizationSpec::default();
        assert!(matches!(
            quantize(&ramp(&[4, 48]), &spec),
            Err(QuantizationError::QuantizationFailed(_))
        ));
        assert!(matches!(
            quantize(&Tensor::scalar(1.0f32), &spec),
            Err(QuantizationError::QuantizationFailed(_))
        ));
        let mut extreme = vec![0.0f32; 32];
        extreme[0] = -3e38;
        extreme[1] = 3e38;
        let extreme = Tensor::from_slice(&[32], &extreme).unwrap();
        assert!(matches!(
            quantize(&extreme, &spec),
            Err(QuantizationError::QuantizationFailed(_))
        ));
        assert!(quantize(&extreme, &QuantizationSpec::mxfp4()).is_ok());
        let nan = Tensor::from_slice(&[32], &[f32::NAN; 32]).unwrap();
        assert!(matches!(
            quantize(&nan, &spec),
            Err(QuantizationError::QuantizationFailed(_))
        ));
    }

    #[test]
    fn test_from_parts_checks_consistency() {
        let spec = QuantizationSpec::new(32, 8, QuantizationMode::Affine);
        let quantized = quantize(&ramp(&[2, 32]), &spec).unwrap();
        let wrong_mode = QuantizedTensor::from_parts(
            quantized.codes().clone(),
            quantized.parameters().clone(),
            &[2, 32],
            QuantizationSpec::mxfp4(),
        );
        assert!(matches!(
            wrong_mode,
            Err(QuantizationError::QuantizationFailed(_))
        ));
        let wrong_shape = QuantizedTensor::from_parts(
            quantized.codes().clone(),
            quantized.parameters().clone(),
            &[4, 32],
            spec,
        );
        assert!(wrong_shape.is_err());
        let same = QuantizedTensor::from_parts(
            quantized.codes().clone(),
            quantized.parameters().clone(),
            &[2, 32],
            spec,
        )
        .unwrap();
        assert_eq!(same, quantized);
    }

    #[test]
    fn test_keys() {
        let keys = QuantizedKeys::for_weight("blocks.0.attn.qkv.weight");
        assert_eq!(keys.codes, "blocks.0.attn.qkv.weight");
        assert_eq!(keys.scales, "blocks.0.attn.qkv.scales");
        assert_eq!(keys.biases, "blocks.0.attn.qkv.biases");
        assert_eq!(QuantizedKeys::for_weight("proj").scales, "proj.scales");
    }
}
