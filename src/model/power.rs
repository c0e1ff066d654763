use super::{math, FeatureVectors, LeakageModel};
use crate::coefficients::Coefficients;
use crate::error::{LeakageError, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// Coefficient based power model.
///
/// The sample of an instruction is the constant of its category plus, for
/// every interaction term, the inner product of the term's coefficients with
/// the supplied feature vector.
pub struct PowerModel {
    coefficients: Arc<Coefficients>,
    required_terms: HashSet<String>,
    /// `required_terms` in a fixed order so that sums are reproducible
    ordered_terms: Vec<String>,
}

impl PowerModel {
    pub fn new(coefficients: Arc<Coefficients>) -> Self {
        let required_terms = coefficients.interaction_terms();
        let mut ordered_terms: Vec<String> = required_terms.iter().cloned().collect();
        ordered_terms.sort();
        Self {
            coefficients,
            required_terms,
            ordered_terms,
        }
    }
}

impl LeakageModel for PowerModel {
    fn name(&self) -> &'static str {
        "power"
    }

    fn required_terms(&self) -> &HashSet<String> {
        &self.required_terms
    }

    fn sample(&self, opcode: &str, features: &FeatureVectors) -> Result<f64> {
        // Resolve once, every term reads from the same category
        let category = self.coefficients.category_for(opcode)?;

        let mut sample = category.constant();
        for term in &self.ordered_terms {
            let coefficients = category.coefficients(term).ok_or_else(|| {
                LeakageError::NotFound(format!(
                    "interaction term '{}' was not found in category '{}'",
                    term,
                    category.name()
                ))
            })?;
            let values = features.get(term).ok_or_else(|| {
                LeakageError::NotFound(format!(
                    "no feature vector supplied for interaction term '{}'",
                    term
                ))
            })?;
            sample += math::inner_product(term, coefficients, values)?;
        }
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(entries: &[(&str, Vec<f64>)]) -> FeatureVectors {
        entries
            .iter()
            .map(|(term, values)| (term.to_string(), values.clone()))
            .collect()
    }

    fn model(json: &str) -> PowerModel {
        PowerModel::new(Arc::new(Coefficients::from_json_str(json).unwrap()))
    }

    const TWO_TERMS: &str = r#"{
        "ADD": {"Constant": 0.5, "Coefficients": {"HW": [1.0, 2.0], "HD": [0.25]}},
        "SUB": {"Constant": -1.5, "Coefficients": {"HW": [3.0, -1.0], "HD": [2.0]}}
    }"#;

    #[test]
    fn flat_example() {
        let model = model(r#"{"ADD": {"Constant": 0.5, "Coefficients": {"HW": [1.0, 2.0]}}}"#);
        let sample = model
            .sample("ADD", &features(&[("HW", vec![3.0, 4.0])]))
            .unwrap();
        assert_eq!(sample, 11.5);
    }

    #[test]
    fn categorized_example() {
        let model = model(
            r#"{"Arithmetic": {"Instructions": ["ADD", "SUB"], "Constant": 1.0, "Coefficients": {"HD": [0.5]}}}"#,
        );
        let sample = model.sample("SUB", &features(&[("HD", vec![2.0])])).unwrap();
        assert_eq!(sample, 2.0);
    }

    #[test]
    fn zero_features_give_constant() {
        let model = model(TWO_TERMS);
        let zero = features(&[("HW", vec![0.0, 0.0]), ("HD", vec![0.0])]);
        assert_eq!(model.sample("ADD", &zero).unwrap(), 0.5);
        assert_eq!(model.sample("SUB", &zero).unwrap(), -1.5);
    }

    #[test]
    fn linear_in_each_term() {
        let model = model(TWO_TERMS);
        let base = features(&[("HW", vec![1.0, 3.0]), ("HD", vec![5.0])]);
        let zero_hw = features(&[("HW", vec![0.0, 0.0]), ("HD", vec![5.0])]);
        let scaled = features(&[("HW", vec![4.0, 12.0]), ("HD", vec![5.0])]);

        let rest = model.sample("SUB", &zero_hw).unwrap();
        let contribution = model.sample("SUB", &base).unwrap() - rest;
        let scaled_contribution = model.sample("SUB", &scaled).unwrap() - rest;
        assert!((scaled_contribution - 4.0 * contribution).abs() < 1e-9);
    }

    #[test]
    fn dimension_mismatch() {
        let model = model(TWO_TERMS);
        let short = features(&[("HW", vec![1.0]), ("HD", vec![1.0])]);
        assert!(matches!(
            model.sample("ADD", &short),
            Err(LeakageError::DimensionMismatch { ref term, expected: 2, found: 1 }) if term == "HW"
        ));
        let long = features(&[("HW", vec![1.0, 2.0]), ("HD", vec![1.0, 0.0])]);
        assert!(matches!(
            model.sample("ADD", &long),
            Err(LeakageError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn missing_feature_or_opcode() {
        let model = model(TWO_TERMS);
        let partial = features(&[("HW", vec![1.0, 2.0])]);
        assert!(matches!(
            model.sample("ADD", &partial),
            Err(LeakageError::NotFound(_))
        ));
        let full = features(&[("HW", vec![1.0, 2.0]), ("HD", vec![1.0])]);
        assert!(matches!(
            model.sample("MUL", &full),
            Err(LeakageError::NotFound(_))
        ));
    }

    #[test]
    fn required_terms_follow_coefficients() {
        let model = model(TWO_TERMS);
        assert_eq!(
            model.required_terms(),
            &HashSet::from(["HW".to_string(), "HD".to_string()])
        );
    }
}
