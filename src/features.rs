//! # Feature extraction
//!
//! Computes the feature vector of every interaction term for one executed
//! instruction, looking at the instruction itself and at its neighbours in
//! execution order. Operands the emulator did not report, and neighbours of
//! the first and last instruction, count as zero.
//!
//! Terms fall into three shapes:
//!
//! * bit terms: 32 entries, least significant bit first
//! * scalar terms: a single entry
//! * neighbour terms: one entry per category, only the entry of the
//!   neighbour's category is set. An absent or uncategorised neighbour gives
//!   all zeros.

use crate::coefficients::Coefficients;
use crate::emulator::{InstructionEvent, PC_INDEX};
use crate::error::{LeakageError, Result};
use crate::model::math::{bit_interactions, bits, hamming_distance, hamming_weight, one_hot, scaled};
use crate::model::FeatureVectors;
use itertools::Itertools;
use std::collections::HashSet;
use std::sync::Arc;

pub const OPERAND1: &str = "Operand1";
pub const OPERAND2: &str = "Operand2";
pub const OPERAND1_BIT_INTERACTIONS: &str = "Operand1_Bit_Interactions";
pub const OPERAND2_BIT_INTERACTIONS: &str = "Operand2_Bit_Interactions";
pub const BIT_FLIP1: &str = "Bit_Flip1";
pub const BIT_FLIP2: &str = "Bit_Flip2";
pub const BIT_FLIP1_BIT_INTERACTIONS: &str = "Bit_Flip1_Bit_Interactions";
pub const BIT_FLIP2_BIT_INTERACTIONS: &str = "Bit_Flip2_Bit_Interactions";
pub const HAMMING_WEIGHT_OPERAND1: &str = "Hamming_Weight_Operand1";
pub const HAMMING_WEIGHT_OPERAND2: &str = "Hamming_Weight_Operand2";
pub const HAMMING_WEIGHT_OPERAND1_PREVIOUS: &str = "Hamming_Weight_Operand1_Previous_Instruction";
pub const HAMMING_WEIGHT_OPERAND1_SUBSEQUENT: &str =
    "Hamming_Weight_Operand1_Subsequent_Instruction";
pub const HAMMING_WEIGHT_OPERAND2_PREVIOUS: &str = "Hamming_Weight_Operand2_Previous_Instruction";
pub const HAMMING_WEIGHT_OPERAND2_SUBSEQUENT: &str =
    "Hamming_Weight_Operand2_Subsequent_Instruction";
pub const HAMMING_DISTANCE_OPERAND1_PREVIOUS: &str =
    "Hamming_Distance_Operand1_Previous_Instruction";
pub const HAMMING_DISTANCE_OPERAND1_SUBSEQUENT: &str =
    "Hamming_Distance_Operand1_Subsequent_Instruction";
pub const HAMMING_DISTANCE_OPERAND2_PREVIOUS: &str =
    "Hamming_Distance_Operand2_Previous_Instruction";
pub const HAMMING_DISTANCE_OPERAND2_SUBSEQUENT: &str =
    "Hamming_Distance_Operand2_Subsequent_Instruction";
pub const PREVIOUS_INSTRUCTION: &str = "Previous_Instruction";
pub const SUBSEQUENT_INSTRUCTION: &str = "Subsequent_Instruction";
pub const HAMMING_DISTANCE_REGISTER_WRITE: &str = "Hamming_Distance_Register_Write";

/// Every term the extractor can compute
pub const SUPPORTED_TERMS: [&str; 21] = [
    OPERAND1,
    OPERAND2,
    OPERAND1_BIT_INTERACTIONS,
    OPERAND2_BIT_INTERACTIONS,
    BIT_FLIP1,
    BIT_FLIP2,
    BIT_FLIP1_BIT_INTERACTIONS,
    BIT_FLIP2_BIT_INTERACTIONS,
    HAMMING_WEIGHT_OPERAND1,
    HAMMING_WEIGHT_OPERAND2,
    HAMMING_WEIGHT_OPERAND1_PREVIOUS,
    HAMMING_WEIGHT_OPERAND1_SUBSEQUENT,
    HAMMING_WEIGHT_OPERAND2_PREVIOUS,
    HAMMING_WEIGHT_OPERAND2_SUBSEQUENT,
    HAMMING_DISTANCE_OPERAND1_PREVIOUS,
    HAMMING_DISTANCE_OPERAND1_SUBSEQUENT,
    HAMMING_DISTANCE_OPERAND2_PREVIOUS,
    HAMMING_DISTANCE_OPERAND2_SUBSEQUENT,
    PREVIOUS_INSTRUCTION,
    SUBSEQUENT_INSTRUCTION,
    HAMMING_DISTANCE_REGISTER_WRITE,
];

/// Instruction with its neighbours in execution order
#[derive(Clone, Copy, Debug)]
pub struct Window<'a> {
    pub previous: Option<&'a InstructionEvent>,
    pub current: &'a InstructionEvent,
    pub next: Option<&'a InstructionEvent>,
}

/// Yields one window per event, in order.
pub fn windows(events: &[InstructionEvent]) -> impl Iterator<Item = Window<'_>> {
    std::iter::once(None)
        .chain(events.iter().map(Some))
        .chain(std::iter::once(None))
        .tuple_windows::<(_, _, _)>()
        .filter_map(|(previous, current, next)| {
            current.map(|current| Window {
                previous,
                current,
                next,
            })
        })
}

/// Computes the feature vectors a model asks for.
pub struct FeatureExtractor {
    terms: Vec<String>,
    coefficients: Arc<Coefficients>,
}

impl FeatureExtractor {
    /// # Errors
    ///
    /// `UnsupportedTerm` if a term has no known feature computation.
    pub fn new(terms: &HashSet<String>, coefficients: Arc<Coefficients>) -> Result<Self> {
        let mut terms: Vec<String> = terms.iter().cloned().collect();
        terms.sort();
        if let Some(term) = terms
            .iter()
            .find(|term| !SUPPORTED_TERMS.contains(&term.as_str()))
        {
            return Err(LeakageError::UnsupportedTerm(term.clone()));
        }
        Ok(Self {
            terms,
            coefficients,
        })
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Feature vectors of every configured term for `window.current`.
    pub fn extract(&self, window: &Window) -> Result<FeatureVectors> {
        self.terms
            .iter()
            .map(|term| Ok((term.clone(), self.feature(term, window)?)))
            .collect()
    }

    /// One-hot vector of the neighbour's category, scaled by `factor`
    fn neighbour_vector(&self, neighbour: Option<&InstructionEvent>, factor: u32) -> Vec<f64> {
        let position = neighbour.and_then(|event| {
            self.coefficients
                .category_position(&event.opcode)
                .ok()
        });
        scaled(one_hot(position, self.coefficients.len()), f64::from(factor))
    }

    fn feature(&self, term: &str, window: &Window) -> Result<Vec<f64>> {
        let current = window.current;
        let previous_operand =
            |position: usize| window.previous.map(|e| e.operand(position)).unwrap_or(0);
        let next_operand = |position: usize| window.next.map(|e| e.operand(position)).unwrap_or(0);

        let vector = match term {
            OPERAND1 => bits(current.operand(0)),
            OPERAND2 => bits(current.operand(1)),
            OPERAND1_BIT_INTERACTIONS => bit_interactions(current.operand(0)),
            OPERAND2_BIT_INTERACTIONS => bit_interactions(current.operand(1)),
            BIT_FLIP1 => bits(current.operand(0) ^ previous_operand(0)),
            BIT_FLIP2 => bits(current.operand(1) ^ previous_operand(1)),
            BIT_FLIP1_BIT_INTERACTIONS => {
                bit_interactions(current.operand(0) ^ previous_operand(0))
            }
            BIT_FLIP2_BIT_INTERACTIONS => {
                bit_interactions(current.operand(1) ^ previous_operand(1))
            }
            HAMMING_WEIGHT_OPERAND1 => vec![f64::from(hamming_weight(current.operand(0)))],
            HAMMING_WEIGHT_OPERAND2 => vec![f64::from(hamming_weight(current.operand(1)))],
            HAMMING_WEIGHT_OPERAND1_PREVIOUS => {
                self.neighbour_vector(window.previous, hamming_weight(current.operand(0)))
            }
            HAMMING_WEIGHT_OPERAND1_SUBSEQUENT => {
                self.neighbour_vector(window.next, hamming_weight(current.operand(0)))
            }
            HAMMING_WEIGHT_OPERAND2_PREVIOUS => {
                self.neighbour_vector(window.previous, hamming_weight(current.operand(1)))
            }
            HAMMING_WEIGHT_OPERAND2_SUBSEQUENT => {
                self.neighbour_vector(window.next, hamming_weight(current.operand(1)))
            }
            HAMMING_DISTANCE_OPERAND1_PREVIOUS => self.neighbour_vector(
                window.previous,
                hamming_distance(current.operand(0), previous_operand(0)),
            ),
            HAMMING_DISTANCE_OPERAND1_SUBSEQUENT => self.neighbour_vector(
                window.next,
                hamming_distance(current.operand(0), next_operand(0)),
            ),
            HAMMING_DISTANCE_OPERAND2_PREVIOUS => self.neighbour_vector(
                window.previous,
                hamming_distance(current.operand(1), previous_operand(1)),
            ),
            HAMMING_DISTANCE_OPERAND2_SUBSEQUENT => self.neighbour_vector(
                window.next,
                hamming_distance(current.operand(1), next_operand(1)),
            ),
            PREVIOUS_INSTRUCTION => self.neighbour_vector(window.previous, 1),
            SUBSEQUENT_INSTRUCTION => self.neighbour_vector(window.next, 1),
            HAMMING_DISTANCE_REGISTER_WRITE => vec![current
                .deltas
                .iter()
                .filter(|delta| delta.register != PC_INDEX)
                .map(|delta| f64::from(hamming_distance(delta.before, delta.after)))
                .sum()],
            _ => return Err(LeakageError::UnsupportedTerm(term.to_string())),
        };
        Ok(vector)
    }
}
