//! # Leakage models
//!
//! A model turns the feature vectors of one executed instruction into a
//! single simulated leakage sample. Models are pure: the same opcode and
//! features always give the same sample, and no model keeps mutable state,
//! so one instance is shared by all worker threads.

pub mod math;
mod hamming_weight;
mod power;

pub use hamming_weight::HammingWeightModel;
pub use power::PowerModel;

use crate::coefficients::Coefficients;
use crate::error::Result;
use clap::ValueEnum;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Feature vectors of one instruction, keyed by interaction term
pub type FeatureVectors = HashMap<String, Vec<f64>>;

/// Common interface of all leakage models.
pub trait LeakageModel: Send + Sync {
    /// Short model name used in log output
    fn name(&self) -> &'static str;

    /// Interaction terms a caller has to supply feature vectors for.
    fn required_terms(&self) -> &HashSet<String>;

    /// Computes the leakage sample of one instruction.
    ///
    /// # Errors
    ///
    /// * `NotFound` - opcode without category, or a required term without
    ///   coefficients or without a supplied feature vector.
    /// * `DimensionMismatch` - feature vector length differs from the
    ///   coefficient count of its term.
    fn sample(&self, opcode: &str, features: &FeatureVectors) -> Result<f64>;
}

/// Selection of the model used for a simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// Coefficient based power model
    #[default]
    Power,
    /// Hamming weight of the first operand, needs no coefficients
    HammingWeight,
}

impl ModelKind {
    /// Whether the model reads a coefficient file
    pub fn needs_coefficients(&self) -> bool {
        matches!(self, ModelKind::Power)
    }

    /// Constructs the selected model.
    pub fn build(&self, coefficients: Arc<Coefficients>) -> Arc<dyn LeakageModel> {
        match self {
            ModelKind::Power => Arc::new(PowerModel::new(coefficients)),
            ModelKind::HammingWeight => Arc::new(HammingWeightModel::new()),
        }
    }
}
