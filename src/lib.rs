pub mod coefficients;
pub mod config;
mod disassembly;
pub mod elf_file;
pub mod emulator;
pub mod error;
pub mod features;
pub mod model;
pub mod report;
pub mod simulation;
mod simulation_thread;
pub mod trace;

pub mod prelude {
    pub use crate::coefficients::{Category, Coefficients};
    pub use crate::config::{Args, Config};
    pub use crate::elf_file::ElfFile;
    pub use crate::emulator::{
        build_emulator, Emulator, EmulatorKind, EmulatorOptions, InstructionEvent,
        RecordedTrace, RegisterFault, UnicornEmulator,
    };
    pub use crate::error::LeakageError;
    pub use crate::model::{FeatureVectors, HammingWeightModel, LeakageModel, ModelKind, PowerModel};
    pub use crate::report::{format_hotspots, hotspots, Hotspot};
    pub use crate::simulation::{Simulation, SimulationRun};
    pub use crate::trace::{Trace, TraceSet};
}
