//! # Coefficients
//!
//! Internal representation of a coefficient definition. The coefficients are
//! produced by profiling real hardware: every instruction category carries a
//! constant and, per interaction term, an ordered list of regression
//! coefficients (see <https://eprint.iacr.org/2016/517>, section 4.2).
//!
//! A definition is built once and never mutated afterwards, so it can be
//! shared between worker threads through an `Arc` without locking.

mod schema;
mod validate;

use crate::error::{LeakageError, Result};
use log::{debug, warn};
use schema::RawDefinition;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// A named group of instructions sharing one constant and one set of
/// coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    name: String,
    instructions: Option<Vec<String>>,
    constant: f64,
    coefficients: HashMap<String, Vec<f64>>,
}

impl Category {
    /// Creates a category. Without an instruction list the category name is
    /// the opcode it governs.
    pub fn new(
        name: impl Into<String>,
        instructions: Option<Vec<String>>,
        constant: f64,
        coefficients: HashMap<String, Vec<f64>>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions,
            constant,
            coefficients,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> Option<&[String]> {
        self.instructions.as_deref()
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// Coefficient sequence of one interaction term
    pub fn coefficients(&self, interaction_term: &str) -> Option<&[f64]> {
        self.coefficients.get(interaction_term).map(Vec::as_slice)
    }

    pub fn interaction_terms(&self) -> impl Iterator<Item = &str> {
        self.coefficients.keys().map(String::as_str)
    }
}

/// Validated coefficient definition with a precomputed opcode index.
#[derive(Debug, Clone, Default)]
pub struct Coefficients {
    categories: Vec<Category>,
    /// opcode or category name -> position in `categories`
    index: HashMap<String, usize>,
}

impl Coefficients {
    /// Builds the store from categories in definition order.
    ///
    /// The opcode index is filled category by category, first the category
    /// name, then its listed instructions. An entry already present is never
    /// overwritten, so overlapping definitions resolve to the first match.
    pub fn new(categories: Vec<Category>) -> Self {
        let mut index = HashMap::new();
        for (position, category) in categories.iter().enumerate() {
            index.entry(category.name.clone()).or_insert(position);
            for instruction in category.instructions.iter().flatten() {
                index.entry(instruction.clone()).or_insert(position);
            }
        }
        Self { categories, index }
    }

    /// Parses and validates a coefficient definition given as JSON text.
    ///
    /// # Errors
    ///
    /// Any schema violation is reported as `LeakageError::MalformedDefinition`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawDefinition = serde_json::from_str(json)
            .map_err(|e| LeakageError::MalformedDefinition(e.to_string()))?;
        let categories = validate::validate(raw.0)?;
        if categories.is_empty() {
            warn!("Coefficient definition contains no categories");
        }
        debug!("Loaded {} coefficient categories", categories.len());
        Ok(Self::new(categories))
    }

    /// Loads and validates a coefficient file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        debug!("Read coefficients from {}", path.display());
        Self::from_json_str(&content)
    }

    fn resolve(&self, opcode: &str) -> Result<&Category> {
        self.index
            .get(opcode)
            .map(|&position| &self.categories[position])
            .ok_or_else(|| {
                LeakageError::NotFound(format!(
                    "instruction '{}' was not found within the coefficients",
                    opcode
                ))
            })
    }

    /// Name of the category governing `opcode`. For a flat definition this
    /// is the opcode itself.
    pub fn category_of(&self, opcode: &str) -> Result<&str> {
        self.resolve(opcode).map(Category::name)
    }

    /// Position of the governing category in definition order
    pub fn category_position(&self, opcode: &str) -> Result<usize> {
        self.index.get(opcode).copied().ok_or_else(|| {
            LeakageError::NotFound(format!(
                "instruction '{}' was not found within the coefficients",
                opcode
            ))
        })
    }

    /// Interaction terms declared by the first category.
    ///
    /// All categories are expected to declare the same terms, so callers use
    /// this set for every lookup. Empty for an empty definition.
    pub fn interaction_terms(&self) -> HashSet<String> {
        self.categories
            .first()
            .map(|category| category.interaction_terms().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Coefficients of `interaction_term` for the category of `opcode`.
    pub fn coefficients(&self, opcode: &str, interaction_term: &str) -> Result<&[f64]> {
        let category = self.resolve(opcode)?;
        category.coefficients(interaction_term).ok_or_else(|| {
            LeakageError::NotFound(format!(
                "interaction term '{}' was not found in category '{}'",
                interaction_term, category.name
            ))
        })
    }

    /// Constant of the category of `opcode`.
    pub fn constant(&self, opcode: &str) -> Result<f64> {
        self.resolve(opcode).map(Category::constant)
    }

    /// Category governing `opcode`.
    pub fn category_for(&self, opcode: &str) -> Result<&Category> {
        self.resolve(opcode)
    }

    /// Category by its own name
    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.name == name)
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
