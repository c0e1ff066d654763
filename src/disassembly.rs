use crate::error::{LeakageError, Result};
use capstone::prelude::*;
use regex::Regex;

/// Thumb disassembler turning executed instruction bytes into an opcode and
/// the values of its source operands.
pub struct Disassembly {
    cs: Capstone,
    operand_pattern: Regex,
}

/// Mnemonic prefixes whose first operand is written, not read
const DESTINATION_FIRST: [&str; 10] = [
    "mov", "mvn", "ldr", "ldm", "pop", "adr", "uxt", "sxt", "rev", "neg",
];

/// Mnemonic prefixes reading every operand
const ALL_SOURCES: [&str; 6] = ["str", "stm", "push", "cmp", "cmn", "tst"];

impl Disassembly {
    pub fn new() -> Result<Self> {
        let cs = Capstone::new()
            .arm()
            .mode(arch::arm::ArchMode::Thumb)
            .extra_mode([arch::arm::ArchExtraMode::MClass].iter().copied())
            .detail(false)
            .build()
            .map_err(|e| LeakageError::Emulation(format!("Failed to create Capstone object: {}", e)))?;

        let operand_pattern = Regex::new(
            r"\b(r1[0-2]|r[0-9]|sp|lr|pc|ip|fp|sb|sl)\b|#(-?0x[0-9a-f]+|-?[0-9]+)",
        )
        .map_err(|e| LeakageError::Emulation(e.to_string()))?;

        Ok(Self {
            cs,
            operand_pattern,
        })
    }

    /// Disassembles the instruction in `data` located at `address`.
    ///
    /// Returns the upper case mnemonic and the operand text.
    pub fn decode(&self, data: &[u8], address: u64) -> Result<(String, String)> {
        let insns = self
            .cs
            .disasm_count(data, address, 1)
            .map_err(|e| LeakageError::Emulation(format!("Failed to disassemble: {}", e)))?;

        let asm_cmd = insns.as_ref().first().ok_or_else(|| {
            LeakageError::Emulation(format!("No instruction decoded at 0x{:X}", address))
        })?;
        Ok((
            asm_cmd.mnemonic().unwrap_or_default().to_uppercase(),
            asm_cmd.op_str().unwrap_or_default().to_string(),
        ))
    }

    /// Values of the source operands named in `op_str`.
    ///
    /// Registers are read from `registers` (snapshot before execution),
    /// immediates are taken literally. The destination operand is skipped for
    /// three operand forms and for moves and loads.
    pub fn operand_values(&self, opcode: &str, op_str: &str, registers: &[u32; 17]) -> Vec<u32> {
        let lower = op_str.to_lowercase();
        let values: Vec<u32> = self
            .operand_pattern
            .captures_iter(&lower)
            .filter_map(|caps| {
                if let Some(register) = caps.get(1) {
                    register_index(register.as_str()).map(|index| registers[index])
                } else {
                    caps.get(2).and_then(|immediate| parse_immediate(immediate.as_str()))
                }
            })
            .collect();

        let mnemonic = opcode.to_lowercase();
        let reads_all = ALL_SOURCES.iter().any(|prefix| mnemonic.starts_with(prefix));
        let writes_first = DESTINATION_FIRST
            .iter()
            .any(|prefix| mnemonic.starts_with(prefix));

        if !reads_all && (values.len() >= 3 || (writes_first && !values.is_empty())) {
            values[1..].to_vec()
        } else {
            values
        }
    }
}

/// Snapshot index of a register name as printed by capstone
fn register_index(name: &str) -> Option<usize> {
    match name {
        "sb" => Some(9),
        "sl" => Some(10),
        "fp" => Some(11),
        "ip" => Some(12),
        "sp" => Some(13),
        "lr" => Some(14),
        "pc" => Some(15),
        _ => name.strip_prefix('r')?.parse().ok().filter(|index| *index <= 12),
    }
}

fn parse_immediate(text: &str) -> Option<u32> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match digits.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u32>().ok()?,
    };
    Some(if negative { value.wrapping_neg() } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registers() -> [u32; 17] {
        let mut registers = [0; 17];
        for (index, register) in registers.iter_mut().enumerate() {
            *register = 0x100 + index as u32;
        }
        registers
    }

    #[test]
    fn decode_thumb() {
        let cs = Disassembly::new().unwrap();
        // adds r0, r1, r2
        assert_eq!(
            cs.decode(&[0x88, 0x18], 0x1000).unwrap(),
            ("ADDS".to_string(), "r0, r1, r2".to_string())
        );
        // bx lr
        assert_eq!(cs.decode(&[0x70, 0x47], 0x1000).unwrap().0, "BX");
    }

    #[test]
    fn three_operand_form_skips_destination() {
        let cs = Disassembly::new().unwrap();
        assert_eq!(
            cs.operand_values("ADDS", "r0, r1, r2", &registers()),
            vec![0x101, 0x102]
        );
        assert_eq!(
            cs.operand_values("LSLS", "r3, r4, #2", &registers()),
            vec![0x104, 2]
        );
    }

    #[test]
    fn two_operand_forms() {
        let cs = Disassembly::new().unwrap();
        // r0 = r0 ^ r1 reads both
        assert_eq!(
            cs.operand_values("EORS", "r0, r1", &registers()),
            vec![0x100, 0x101]
        );
        assert_eq!(cs.operand_values("MOVS", "r0, #0x10", &registers()), vec![0x10]);
        assert_eq!(
            cs.operand_values("LDR", "r0, [r1, #4]", &registers()),
            vec![0x101, 4]
        );
    }

    #[test]
    fn stores_read_everything() {
        let cs = Disassembly::new().unwrap();
        assert_eq!(
            cs.operand_values("STR", "r2, [sp, #8]", &registers()),
            vec![0x102, 0x10D, 8]
        );
        assert_eq!(
            cs.operand_values("PUSH", "{r4, lr}", &registers()),
            vec![0x104, 0x10E]
        );
    }

    #[test]
    fn register_aliases_and_immediates() {
        assert_eq!(register_index("ip"), Some(12));
        assert_eq!(register_index("r12"), Some(12));
        assert_eq!(register_index("r13"), None);
        assert_eq!(parse_immediate("0x1f"), Some(0x1f));
        assert_eq!(parse_immediate("-1"), Some(u32::MAX));
    }
}
