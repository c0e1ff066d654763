use crate::error::{LeakageError, Result};

/// Width of the operand registers of the modelled core
pub const WORD_BITS: usize = 32;

/// Number of set bits of `value`
pub fn hamming_weight(value: u32) -> u32 {
    value.count_ones()
}

/// Number of differing bits between `a` and `b`
pub fn hamming_distance(a: u32, b: u32) -> u32 {
    hamming_weight(a ^ b)
}

/// Bit decomposition of `value`, least significant bit first.
pub fn bits(value: u32) -> Vec<f64> {
    (0..WORD_BITS)
        .map(|bit| f64::from((value >> bit) & 1))
        .collect()
}

/// Interactions of neighbouring bits: entry `i` is 1 when bit `i` and bit
/// `i + 1` (wrapping to bit 0) are both set.
pub fn bit_interactions(value: u32) -> Vec<f64> {
    bits(value & value.rotate_right(1))
}

/// `vector` multiplied by `factor`
pub fn scaled(mut vector: Vec<f64>, factor: f64) -> Vec<f64> {
    vector.iter_mut().for_each(|value| *value *= factor);
    vector
}

/// One-hot vector of length `len`. `None` or an out of range position yields
/// all zeros.
pub fn one_hot(position: Option<usize>, len: usize) -> Vec<f64> {
    let mut vector = vec![0.0; len];
    if let Some(slot) = position.and_then(|position| vector.get_mut(position)) {
        *slot = 1.0;
    }
    vector
}

/// Element-wise product of coefficients and features, summed.
///
/// # Errors
///
/// `DimensionMismatch` if the lengths disagree. Nothing is truncated or
/// padded.
pub fn inner_product(term: &str, coefficients: &[f64], features: &[f64]) -> Result<f64> {
    if coefficients.len() != features.len() {
        return Err(LeakageError::DimensionMismatch {
            term: term.to_string(),
            expected: coefficients.len(),
            found: features.len(),
        });
    }
    Ok(coefficients
        .iter()
        .zip(features)
        .map(|(coefficient, feature)| coefficient * feature)
        .sum())
}
