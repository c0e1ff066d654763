//! # Emulator capability
//!
//! An emulator executes the target program and yields one
//! [`InstructionEvent`] per executed instruction, in execution order. The
//! leakage engine only consumes these events. Backends are picked with
//! [`EmulatorKind`] from the configuration.

mod recorded;
mod unicorn;

pub use recorded::RecordedTrace;
pub use unicorn::UnicornEmulator;

use crate::error::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Names of the recorded registers, in snapshot order
pub const REGISTER_NAMES: [&str; 17] = [
    "R0", "R1", "R2", "R3", "R4", "R5", "R6", "R7", "R8", "R9", "R10", "R11", "R12", "SP", "LR",
    "PC", "CPSR",
];

/// Snapshot position of the program counter
pub const PC_INDEX: usize = 15;

/// Register written by an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDelta {
    /// Position in [`REGISTER_NAMES`]
    pub register: usize,
    pub before: u32,
    pub after: u32,
}

/// One executed instruction as seen by the leakage engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionEvent {
    pub address: u64,
    /// Upper case mnemonic, e.g. `ADDS`
    pub opcode: String,
    /// Source operand values in order of appearance
    #[serde(default)]
    pub operands: Vec<u32>,
    /// Register file before the instruction executed
    #[serde(default)]
    pub registers: [u32; 17],
    #[serde(default)]
    pub deltas: Vec<RegisterDelta>,
}

impl InstructionEvent {
    pub fn new(address: u64, opcode: impl Into<String>, operands: Vec<u32>) -> Self {
        Self {
            address,
            opcode: opcode.into(),
            operands,
            registers: [0; 17],
            deltas: Vec::new(),
        }
    }

    /// Operand at `position` (0 based); absent operands read as zero.
    pub fn operand(&self, position: usize) -> u32 {
        self.operands.get(position).copied().unwrap_or(0)
    }
}

/// Capability of executing a program and reporting what was executed.
pub trait Emulator {
    /// Backend name for log output
    fn name(&self) -> &str;

    /// Executes the program once from the start.
    fn run(&mut self) -> Result<Vec<InstructionEvent>>;
}

/// Available emulator backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EmulatorKind {
    /// Emulate a Thumb ELF binary with unicorn
    #[default]
    Unicorn,
    /// Replay events recorded earlier
    Recorded,
}

/// Bit flip applied to a register right before instruction `cycle` executes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterFault {
    pub cycle: usize,
    pub register: String,
    pub bit: u8,
}

/// Everything a backend may need for construction
#[derive(Debug, Clone, Default)]
pub struct EmulatorOptions {
    pub elf: Option<PathBuf>,
    pub recorded_trace: Option<PathBuf>,
    pub max_instructions: usize,
    pub fault: Option<RegisterFault>,
}

/// Constructs the backend selected by `kind`.
pub fn build_emulator(kind: EmulatorKind, options: &EmulatorOptions) -> Result<Box<dyn Emulator>> {
    use crate::error::LeakageError;

    match kind {
        EmulatorKind::Unicorn => {
            let path = options.elf.clone().ok_or_else(|| {
                LeakageError::Emulation("the unicorn emulator requires an ELF file".to_string())
            })?;
            Ok(Box::new(UnicornEmulator::new(
                path,
                options.max_instructions,
                options.fault.clone(),
            )?))
        }
        EmulatorKind::Recorded => {
            let path = options.recorded_trace.clone().ok_or_else(|| {
                LeakageError::Emulation(
                    "the recorded emulator requires a recorded trace file".to_string(),
                )
            })?;
            if options.fault.is_some() {
                log::warn!("Fault injection is ignored when replaying a recorded trace");
            }
            Ok(Box::new(RecordedTrace::new(path)))
        }
    }
}
