//! Micro-scaled FP4 (OCP MX) quantization.
//!
//! A group of 32 values shares one E8M0 exponent; every element is an E2M1
//! code: bit 3 is the sign, bits 0..3 index `E2M1_VALUES`.

const E2M1_VALUES: [f32; 8] = [0.0, 0.5, 1.0, 1.5, 2.0, 3.0, 4.0, 6.0];
const E2M1_MAX_EXPONENT: i32 = 2;
const SIGN_BIT: u8 = 0b1000;
const EXPONENT_BIAS: i32 = 127;

pub(super) struct Mxfp4Groups {
    pub codes: Vec<u8>,
    pub exponents: Vec<u8>,
}

fn encode_e2m1(value: f32) -> u8 {
    let sign = if value.is_sign_negative() { SIGN_BIT } else { 0 };
    let magnitude = value.abs();
    let index = E2M1_VALUES
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (*a - magnitude).abs().total_cmp(&(*b - magnitude).abs())
        })
        .map_or(0, |(index, _)| index as u8);
    if index == 0 { 0 } else { sign | index }
}

fn decode_e2m1(code: u8) -> f32 {
    let magnitude = E2M1_VALUES[usize::from(code & 0b0111)];
    if code & SIGN_BIT != 0 { -magnitude } else { magnitude }
}

fn shared_exponent(group: &[f32]) -> i32 {
    let absmax = group.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
    if absmax == 0.0 {
        return -EXPONENT_BIAS;
    }
    (absmax.log2().floor() as i32 - E2M1_MAX_EXPONENT)
        .clamp(-EXPONENT_BIAS, EXPONENT_BIAS)
}

fn exponent_scale(biased: u8) -> f32 {
    ((i32::from(biased) - EXPONENT_BIAS) as f32).exp2()
}

pub(super) fn quantize_groups(
    values: &[f32],
    group_size: usize,
) -> Mxfp4Groups {
    let mut codes = Vec::with_capacity(values.len());
    let mut exponents = Vec::with_capacity(values.len() / group_size);

    for group in values.chunks_exact(group_size) {
        let biased = (shared_exponent(group) + EXPONENT_BIAS) as u8;
        let scale = exponent_scale(biased);
        exponents.push(biased);
        codes.extend(group.iter().map(|&v| encode_e2m1(v / scale)));
    }

    Mxfp4Groups {
        codes,
        exponents,
    }
}

pub(super) fn dequantize_groups(
    codes: &[u8],
    exponents: &[u8],
    group_size: usize,
) -> Vec<f32> {
    codes
        .chunks_exact(group_size)
        .zip(exponents)
        .flat_map(|(group, &biased)| {
            let scale = exponent_scale(biased);
            group.iter().map(move |&code| decode_e2m1(code) * scale)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_e2m1_codes() {
        for (index, &value) in E2M1_VALUES.iter().enumerate().skip(1) {
            assert_eq!(encode_e2m1(value), index as u8);
            assert_eq!(encode_e2m1(-value), SIGN_BIT | index as u8);
            assert_eq!(decode_e2m1(encode_e2m1(-value)), -value);
        }
        assert_eq!(encode_e2m1(-0.0), 0);
        assert_eq!(encode_e2m1(100.0), 7);
        assert_eq!(encode_e2m1(2.4), 4);
        assert_eq!(encode_e2m1(2.6), 5);
    }

    #[test]
    fn test_exactly_representable_group() {
        let mut values = vec![0.0f32; 32];
        values[0] = 6.0;
        values[1] = -3.0;
        values[2] = 0.5;
        let groups = quantize_groups(&values, 32);
        assert_eq!(groups.exponents, vec![EXPONENT_BIAS as u8]);
        let restored = dequantize_groups(&groups.codes, &groups.exponents, 32);
        assert_eq!(restored, values);
    }

    #[test]
    fn test_zero_group() {
        let values = vec![0.0f32; 32];
        let groups = quantize_groups(&values, 32);
        assert_eq!(groups.exponents, vec![0]);
        assert!(groups.codes.iter().all(|&code| code == 0));
        assert_eq!(dequantize_groups(&groups.codes, &groups.exponents, 32), values);
    }

    #[test]
    fn test_scaled_group() {
        let values: Vec<f32> = (0..32).map(|i| (i as f32 - 16.0) * 0.125).collect();
        let groups = quantize_groups(&values, 32);
        // absmax 2.0 => exponent 1 - 2 = -1
        assert_eq!(groups.exponents, vec![(EXPONENT_BIAS - 1) as u8]);
        let restored = dequantize_groups(&groups.codes, &groups.exponents, 32);
        for (original, restored) in values.iter().zip(&restored) {
            assert!((original - restored).abs() <= 0.5 * original.abs().max(0.25));
        }
    }
}
