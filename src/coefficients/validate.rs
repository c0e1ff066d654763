//! Schema rules applied once when a coefficient file is loaded.
//!
//! Each rule returns `MalformedDefinition` on failure. Lookups later on can
//! then rely on a uniform term set and on disjoint instruction lists.

use super::schema::RawCategory;
use super::Category;
use crate::error::{LeakageError, Result};
use std::collections::{HashMap, HashSet};

fn malformed<T>(message: String) -> Result<T> {
    Err(LeakageError::MalformedDefinition(message))
}

/// Validate raw category records and turn them into typed categories.
pub(super) fn validate(raw: Vec<(String, RawCategory)>) -> Result<Vec<Category>> {
    let mut categories = Vec::with_capacity(raw.len());

    for (name, record) in raw {
        let constant = match record.constant {
            Some(constant) => constant,
            None => {
                return malformed(format!(
                    "Category '{}' must contain a Constant value",
                    name
                ))
            }
        };
        let coefficients = match record.coefficients {
            Some(coefficients) => coefficients,
            None => {
                return malformed(format!(
                    "Category '{}' must contain a set of Coefficients",
                    name
                ))
            }
        };
        if let Some(instructions) = &record.instructions {
            if instructions.is_empty() {
                return malformed(format!(
                    "Category '{}' must not contain an empty list of instructions",
                    name
                ));
            }
        }
        if let Some((term, _)) = coefficients.iter().find(|(_, values)| values.is_empty()) {
            return malformed(format!(
                "Interaction term '{}' in category '{}' must contain at least one value",
                term, name
            ));
        }

        categories.push(Category::new(
            name,
            record.instructions,
            constant,
            coefficients,
        ));
    }

    check_interaction_terms(&categories)?;
    check_instructions_unique(&categories)?;

    Ok(categories)
}

/// All categories must carry the terms of the first one, with the same
/// number of values each.
fn check_interaction_terms(categories: &[Category]) -> Result<()> {
    let Some(first) = categories.first() else {
        return Ok(());
    };
    let reference: HashMap<&str, usize> = first
        .coefficients
        .iter()
        .map(|(term, values)| (term.as_str(), values.len()))
        .collect();

    if reference.is_empty() {
        return malformed(format!(
            "Category '{}' must declare at least one interaction term",
            first.name
        ));
    }

    for category in categories.iter().skip(1) {
        if category.coefficients.len() != reference.len() {
            return malformed(format!(
                "Category '{}' declares {} interaction terms, expected {}",
                category.name,
                category.coefficients.len(),
                reference.len()
            ));
        }
        for (term, values) in &category.coefficients {
            match reference.get(term.as_str()) {
                None => {
                    return malformed(format!(
                        "Category '{}' declares interaction term '{}' which is missing in '{}'",
                        category.name, term, first.name
                    ))
                }
                Some(&expected) if expected != values.len() => {
                    return malformed(format!(
                        "Interaction term '{}' in category '{}' has {} values, expected {}",
                        term,
                        category.name,
                        values.len(),
                        expected
                    ))
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}

/// An instruction may belong to one category only, and may not share its
/// name with a different category.
fn check_instructions_unique(categories: &[Category]) -> Result<()> {
    let names: HashSet<&str> = categories.iter().map(|c| c.name.as_str()).collect();
    let mut owners: HashMap<&str, &str> = HashMap::new();

    for category in categories {
        for instruction in category.instructions.iter().flatten() {
            if instruction != &category.name && names.contains(instruction.as_str()) {
                return malformed(format!(
                    "Instruction '{}' in category '{}' collides with the category of the same name",
                    instruction, category.name
                ));
            }
            if let Some(owner) = owners.insert(instruction.as_str(), category.name.as_str()) {
                return malformed(format!(
                    "Instruction '{}' is listed in both '{}' and '{}'",
                    instruction, owner, category.name
                ));
            }
        }
    }
    Ok(())
}
