use super::{FeatureVectors, LeakageModel};
use crate::error::{LeakageError, Result};
use crate::features::HAMMING_WEIGHT_OPERAND1;
use std::collections::HashSet;

/// Hamming weight of the first operand, independent of any coefficients.
pub struct HammingWeightModel {
    required_terms: HashSet<String>,
}

impl HammingWeightModel {
    pub fn new() -> Self {
        Self {
            required_terms: HashSet::from([HAMMING_WEIGHT_OPERAND1.to_string()]),
        }
    }
}

impl Default for HammingWeightModel {
    fn default() -> Self {
        Self::new()
    }
}

impl LeakageModel for HammingWeightModel {
    fn name(&self) -> &'static str {
        "hamming-weight"
    }

    fn required_terms(&self) -> &HashSet<String> {
        &self.required_terms
    }

    fn sample(&self, _opcode: &str, features: &FeatureVectors) -> Result<f64> {
        let values = features.get(HAMMING_WEIGHT_OPERAND1).ok_or_else(|| {
            LeakageError::NotFound(format!(
                "no feature vector supplied for interaction term '{}'",
                HAMMING_WEIGHT_OPERAND1
            ))
        })?;
        match values.as_slice() {
            [weight] => Ok(*weight),
            _ => Err(LeakageError::DimensionMismatch {
                term: HAMMING_WEIGHT_OPERAND1.to_string(),
                expected: 1,
                found: values.len(),
            }),
        }
    }
}
