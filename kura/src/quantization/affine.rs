//! Affine group quantization.
//!
//! Every contiguous group of `group_size` values stores one `scale` and one
//! `bias` (the group minimum). Reconstruction: `value = code * scale + bias`.

pub(super) struct AffineGroups {
    pub codes: Vec<u8>,
    pub scales: Vec<f32>,
    pub biases: Vec<f32>,
}

/// First group whose `max - min` is not representable as a finite `f32`.
pub(super) fn overflowing_group(
    values: &[f32],
    group_size: usize,
) -> Option<usize> {
    values.chunks_exact(group_size).position(|group| {
        let (min, max) = group_range(group);
        !(max - min).is_finite()
    })
}

fn group_range(group: &[f32]) -> (f32, f32) {
    group
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

pub(super) fn quantize_groups(
    values: &[f32],
    group_size: usize,
    max_code: u8,
) -> AffineGroups {
    let group_count = values.len() / group_size;
    let mut codes = Vec::with_capacity(values.len());
    let mut scales = Vec::with_capacity(group_count);
    let mut biases = Vec::with_capacity(group_count);
    let max_code = f32::from(max_code);

    for group in values.chunks_exact(group_size) {
        let (min, max) = group_range(group);
        let scale = (max - min) / max_code;
        scales.push(scale);
        biases.push(min);

        codes.extend(group.iter().map(|&v| {
            if scale > 0.0 {
                ((v - min) / scale).round().clamp(0.0, max_code) as u8
            } else {
                0
            }
        }));
    }

    AffineGroups {
        codes,
        scales,
        biases,
    }
}

pub(super) fn dequantize_groups(
    codes: &[u8],
    scales: &[f32],
    biases: &[f32],
    group_size: usize,
) -> Vec<f32> {
    codes
        .chunks_exact(group_size)
        .zip(scales.iter().zip(biases))
        .flat_map(|(group, (&scale, &bias))| {
            group.iter().map(move |&code| f32::from(code) * scale + bias)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_parameters() {
        let values: Vec<f32> = (0..32).map(|i| i as f32 - 8.0).collect();
        let groups = quantize_groups(&values, 32, 15);
        assert_eq!(groups.biases, vec![-8.0]);
        assert_eq!(groups.scales, vec![31.0 / 15.0]);
        assert_eq!(groups.codes[0], 0);
        assert_eq!(groups.codes[31], 15);
    }

    #[test]
    fn test_overflowing_range() {
        let mut values = vec![0.0f32; 64];
        values[40] = -3e38;
        values[41] = 3e38;
        assert_eq!(overflowing_group(&values, 32), Some(1));
        values[41] = 1e37;
        assert_eq!(overflowing_group(&values, 32), None);
    }

    #[test]
    fn test_constant_group_is_exact() {
        let values = vec![0.75f32; 64];
        let groups = quantize_groups(&values, 32, 255);
        assert!(groups.codes.iter().all(|&code| code == 0));
        let restored =
            dequantize_groups(&groups.codes, &groups.scales, &groups.biases, 32);
        assert_eq!(restored, values);
    }

    #[test]
    fn test_error_is_bounded_by_half_a_step() {
        let values: Vec<f32> =
            (0..128).map(|i| ((i * 37) % 101) as f32 / 17.0 - 2.5).collect();
        let groups = quantize_groups(&values, 64, 255);
        let restored =
            dequantize_groups(&groups.codes, &groups.scales, &groups.biases, 64);
        for (index, (original, restored)) in
            values.iter().zip(&restored).enumerate()
        {
            let step = groups.scales[index / 64];
            assert!((original - restored).abs() <= step * 0.5 + 1e-5);
        }
    }
}
