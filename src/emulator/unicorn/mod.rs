use super::{Emulator, InstructionEvent, RegisterDelta, RegisterFault};
use crate::disassembly::Disassembly;
use crate::elf_file::ElfFile;
use crate::error::{LeakageError, Result};

mod callback;

use callback::hook_code_callback;
use log::{debug, info, warn};
use std::path::PathBuf;
use unicorn_engine::unicorn_const::{uc_error, Arch, Mode, Permission, SECOND_SCALE};
use unicorn_engine::{RegisterARM, Unicorn};

// Constant variable definitions
const STACK_BASE: u64 = 0x80100000;
const STACK_SIZE: usize = 0x10000;
/// Return address handed to the program; reaching it ends the run
const EXIT_ADDRESS: u64 = 0xAA01000;
const PAGE_SIZE: u64 = 0x1000;

pub const ARM_REG: [RegisterARM; 17] = [
    RegisterARM::R0,
    RegisterARM::R1,
    RegisterARM::R2,
    RegisterARM::R3,
    RegisterARM::R4,
    RegisterARM::R5,
    RegisterARM::R6,
    RegisterARM::R7,
    RegisterARM::R8,
    RegisterARM::R9,
    RegisterARM::R10,
    RegisterARM::R11,
    RegisterARM::R12,
    RegisterARM::SP,
    RegisterARM::LR,
    RegisterARM::PC,
    RegisterARM::CPSR,
];

/// Convert register name string to RegisterARM enum
fn get_register_from_name(name: &str) -> Option<RegisterARM> {
    match name.to_uppercase().as_str() {
        "R0" => Some(RegisterARM::R0),
        "R1" => Some(RegisterARM::R1),
        "R2" => Some(RegisterARM::R2),
        "R3" => Some(RegisterARM::R3),
        "R4" => Some(RegisterARM::R4),
        "R5" => Some(RegisterARM::R5),
        "R6" => Some(RegisterARM::R6),
        "R7" => Some(RegisterARM::R7),
        "R8" => Some(RegisterARM::R8),
        "R9" => Some(RegisterARM::R9),
        "R10" => Some(RegisterARM::R10),
        "R11" => Some(RegisterARM::R11),
        "R12" => Some(RegisterARM::R12),
        "SP" => Some(RegisterARM::SP),
        "LR" => Some(RegisterARM::LR),
        "PC" => Some(RegisterARM::PC),
        _ => None,
    }
}

fn uc_failure(context: &str, error: uc_error) -> LeakageError {
    LeakageError::Emulation(format!("{}: {:?}", context, error))
}

/// Register fault resolved to a unicorn register
#[derive(Clone, Copy, Debug)]
struct ArmFault {
    cycle: usize,
    register: RegisterARM,
    bit: u8,
}

impl ArmFault {
    fn from_config(fault: &RegisterFault) -> Result<Self> {
        let register = get_register_from_name(&fault.register).ok_or_else(|| {
            LeakageError::Emulation(format!("Invalid register name: '{}'", fault.register))
        })?;
        if fault.bit >= 32 {
            return Err(LeakageError::Emulation(format!(
                "Fault bit {} is outside of a 32 bit register",
                fault.bit
            )));
        }
        Ok(Self {
            cycle: fault.cycle,
            register,
            bit: fault.bit,
        })
    }
}

/// Raw record of one executed instruction
#[derive(Clone, Debug)]
struct Step {
    address: u64,
    instruction: Vec<u8>,
    registers: [u32; 17],
}

struct CpuState {
    steps: Vec<Step>,
    fault: Option<ArmFault>,
    executed: usize,
    max_instructions: usize,
    /// Set by the code hook when it had to abort the run
    failure: Option<String>,
}

/// Unicorn instance set up for one run of the target program
struct Cpu<'a> {
    emu: Unicorn<'a, CpuState>,
}

impl<'a> Cpu<'a> {
    fn new(fault: Option<ArmFault>, max_instructions: usize) -> Result<Self> {
        // Setup platform -> ARMv8-m.base
        let emu = Unicorn::new_with_data(
            Arch::ARM,
            Mode::LITTLE_ENDIAN | Mode::MCLASS,
            CpuState {
                steps: Vec::new(),
                fault,
                executed: 0,
                max_instructions,
                failure: None,
            },
        )
        .map_err(|e| uc_failure("failed to initialize Unicorn instance", e))?;

        debug!("Setup new unicorn instance");
        Ok(Self { emu })
    }

    /// Setup memory mapping for all loadable segments, the stack and the
    /// exit page
    fn setup_mmio(&mut self, file_data: &ElfFile) -> Result<()> {
        // Code and data, merged into page aligned regions
        let mut regions: Vec<(u64, u64)> = file_data
            .program_data
            .iter()
            .map(|(header, _)| {
                let start = header.p_paddr & !(PAGE_SIZE - 1);
                let end = (header.p_paddr + header.p_memsz.max(1) + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
                (start, end)
            })
            .collect();
        regions.sort_unstable();
        let mut merged: Vec<(u64, u64)> = Vec::new();
        for (start, end) in regions {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        for (start, end) in merged {
            self.emu
                .mem_map(start, (end - start) as usize, Permission::ALL)
                .map_err(|e| uc_failure("failed to map code page", e))?;
        }

        // Stack
        self.emu
            .mem_map(STACK_BASE, STACK_SIZE, Permission::READ | Permission::WRITE)
            .map_err(|e| uc_failure("failed to map stack page", e))?;

        // Return target of the program
        self.emu
            .mem_map(EXIT_ADDRESS, PAGE_SIZE as usize, Permission::ALL)
            .map_err(|e| uc_failure("failed to map exit page", e))?;
        Ok(())
    }

    /// Load program segments into simulation
    fn load_code(&mut self, file_data: &ElfFile) -> Result<()> {
        for (header, data) in &file_data.program_data {
            self.emu
                .mem_write(header.p_paddr, data)
                .map_err(|e| uc_failure("failed to write file data", e))?;
        }
        Ok(())
    }

    /// Initialize all required register to zero
    ///
    /// Additionally the SP is set to start of stack and LR to the exit page
    fn init_register(&mut self) -> Result<()> {
        for reg in ARM_REG.iter().filter(|reg| **reg != RegisterARM::CPSR) {
            self.emu
                .reg_write(*reg, 0x00)
                .map_err(|e| uc_failure("failed to clear register", e))?;
        }
        self.emu
            .reg_write(RegisterARM::SP, STACK_BASE + STACK_SIZE as u64 - 4)
            .map_err(|e| uc_failure("failed to set register", e))?;
        self.emu
            .reg_write(RegisterARM::LR, EXIT_ADDRESS | 1)
            .map_err(|e| uc_failure("failed to set register", e))?;
        Ok(())
    }

    /// Set code hook for tracing
    fn set_trace_hook(&mut self) -> Result<()> {
        self.emu
            .add_code_hook(1, 0, hook_code_callback)
            .map_err(|e| uc_failure("failed to setup trace hook", e))?;
        Ok(())
    }

    /// Execute code from `start` till the exit page
    ///
    /// The instruction limit is enforced by the code hook, so that exactly
    /// the recorded instructions count against it.
    fn run_steps(&mut self, start: u64) -> Result<()> {
        let ret_val = self
            .emu
            .emu_start(start | 1, EXIT_ADDRESS, 10 * SECOND_SCALE, 0);
        info!("Program stopped {:?}", ret_val);
        if let Err(e) = ret_val {
            return Err(match self.emu.pc_read() {
                Ok(pc) => uc_failure(&format!("execution stopped at PC 0x{:08X}", pc), e),
                Err(_) => uc_failure("execution stopped", e),
            });
        }
        if let Some(message) = self.emu.get_data_mut().failure.take() {
            return Err(LeakageError::Emulation(message));
        }
        let state = self.emu.get_data();
        if state.executed >= state.max_instructions {
            warn!(
                "Run truncated after {} instructions",
                state.max_instructions
            );
        }
        Ok(())
    }

    fn read_registers(&self) -> Result<[u32; 17]> {
        let mut registers = [0u32; 17];
        for (index, register) in ARM_REG.iter().enumerate() {
            registers[index] = self
                .emu
                .reg_read(*register)
                .map_err(|e| uc_failure(&format!("failed to read {:?}", register), e))?
                as u32;
        }
        Ok(registers)
    }

    fn take_steps(&mut self) -> Vec<Step> {
        std::mem::take(&mut self.emu.get_data_mut().steps)
    }
}

/// Registers that differ between two snapshots
fn register_deltas(before: &[u32; 17], after: &[u32; 17]) -> Vec<RegisterDelta> {
    before
        .iter()
        .zip(after.iter())
        .enumerate()
        .filter(|(_, (before, after))| before != after)
        .map(|(register, (before, after))| RegisterDelta {
            register,
            before: *before,
            after: *after,
        })
        .collect()
}

/// Emulates a Thumb ELF binary with unicorn and records every executed
/// instruction.
pub struct UnicornEmulator {
    file_data: ElfFile,
    max_instructions: usize,
    fault: Option<ArmFault>,
    cs: Disassembly,
}

impl UnicornEmulator {
    pub fn new(
        path: PathBuf,
        max_instructions: usize,
        fault: Option<RegisterFault>,
    ) -> Result<Self> {
        let fault = fault.as_ref().map(ArmFault::from_config).transpose()?;
        Ok(Self {
            file_data: ElfFile::new(path)?,
            max_instructions,
            fault,
            cs: Disassembly::new()?,
        })
    }

    pub fn file_data(&self) -> &ElfFile {
        &self.file_data
    }

    /// Turn raw steps into events: disassemble, resolve operand values and
    /// attach the register writes of each instruction.
    fn to_events(&self, steps: Vec<Step>, final_registers: [u32; 17]) -> Result<Vec<InstructionEvent>> {
        let mut events = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let (opcode, op_str) = self.cs.decode(&step.instruction, step.address)?;
            let after = steps
                .get(index + 1)
                .map(|next| &next.registers)
                .unwrap_or(&final_registers);
            events.push(InstructionEvent {
                address: step.address,
                operands: self.cs.operand_values(&opcode, &op_str, &step.registers),
                opcode,
                registers: step.registers,
                deltas: register_deltas(&step.registers, after),
            });
        }
        Ok(events)
    }
}

impl Emulator for UnicornEmulator {
    fn name(&self) -> &str {
        "unicorn"
    }

    fn run(&mut self) -> Result<Vec<InstructionEvent>> {
        let mut cpu = Cpu::new(self.fault, self.max_instructions)?;
        cpu.setup_mmio(&self.file_data)?;
        cpu.load_code(&self.file_data)?;
        cpu.init_register()?;
        cpu.set_trace_hook()?;
        cpu.run_steps(self.file_data.entry_point())?;

        let final_registers = cpu.read_registers()?;
        let steps = cpu.take_steps();
        debug!("Recorded {} executed instructions", steps.len());
        self.to_events(steps, final_registers)
    }
}
