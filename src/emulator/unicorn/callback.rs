use super::{CpuState, Step, Unicorn, ARM_REG, EXIT_ADDRESS};
use log::{debug, error};

/// Stops emulation, keeping `message` as the error of the run.
fn fail(emu: &mut Unicorn<CpuState>, message: String) {
    error!("{}", message);
    emu.get_data_mut().failure = Some(message);
    if let Err(e) = emu.emu_stop() {
        error!("Unable to stop emulation: {:?}", e);
    }
}

/// Code hook recording every executed instruction.
///
/// Stops before the exit page and once the instruction limit is reached. A
/// pending register fault is injected before the registers are captured, so
/// the recorded snapshot already contains the flipped bit.
pub(super) fn hook_code_callback(emu: &mut Unicorn<CpuState>, address: u64, size: u32) {
    let (executed, limit, fault) = {
        let state = emu.get_data();
        (state.executed, state.max_instructions, state.fault)
    };

    if address == EXIT_ADDRESS || executed >= limit {
        if executed >= limit {
            debug!("Instruction limit of {} reached at 0x{:X}", limit, address);
        }
        if let Err(e) = emu.emu_stop() {
            error!("Unable to stop emulation: {:?}", e);
        }
        return;
    }

    if let Some(fault) = fault.filter(|fault| fault.cycle == executed) {
        let value = match emu.reg_read(fault.register) {
            Ok(value) => value,
            Err(e) => {
                return fail(emu, format!("Fault read of {:?} failed: {:?}", fault.register, e));
            }
        };
        let flipped = value ^ (1u64 << fault.bit);
        if let Err(e) = emu.reg_write(fault.register, flipped) {
            return fail(emu, format!("Fault write of {:?} failed: {:?}", fault.register, e));
        }
        debug!(
            "Fault injected at cycle {}: {:?} 0x{:08X} -> 0x{:08X}",
            executed, fault.register, value, flipped
        );
    }

    // Prepare data record
    let mut step = Step {
        address,
        instruction: vec![0x00; size as usize],
        registers: [0; 17],
    };
    if let Err(e) = emu.mem_read(address, &mut step.instruction) {
        return fail(emu, format!("Unable to read instruction at 0x{:X}: {:?}", address, e));
    }
    for (index, register) in ARM_REG.iter().enumerate() {
        match emu.reg_read(*register) {
            Ok(value) => step.registers[index] = value as u32,
            Err(e) => {
                return fail(
                    emu,
                    format!("Unable to read {:?} at 0x{:X}: {:?}", register, address, e),
                );
            }
        }
    }

    // Record data
    let state = emu.get_data_mut();
    state.steps.push(step);
    state.executed += 1;
}
