//! # ELF File Parsing
//!
//! Extracts what the unicorn backend needs from a target binary: loadable
//! segments, the entry point and the global symbol table (used to name
//! addresses in leakage reports).

use crate::error::{LeakageError, Result};
use elf::{endian::AnyEndian, file::FileHeader, segment::ProgramHeader, symbol::Symbol, ElfBytes};
use std::collections::HashMap;

pub use elf::abi::*;

fn parse_error(context: &str, error: impl std::fmt::Display) -> LeakageError {
    LeakageError::Emulation(format!("{}: {}", context, error))
}

/// Parsed target binary.
pub struct ElfFile {
    /// ELF file header (machine type, entry point, endianness)
    pub header: FileHeader<AnyEndian>,
    /// PT_LOAD segments with their file data
    pub program_data: Vec<(ProgramHeader, Vec<u8>)>,
    /// Global and weak symbols by name
    pub symbol_map: HashMap<String, Symbol>,
}

impl ElfFile {
    /// Parses the ELF binary at `path`.
    ///
    /// # Errors
    ///
    /// * `Io` if the file cannot be read.
    /// * `Emulation` if the file is not a parsable ELF binary or has no
    ///   loadable segment.
    pub fn new(path: std::path::PathBuf) -> Result<Self> {
        let file_data = std::fs::read(&path)?;
        let elf_data = ElfBytes::<AnyEndian>::minimal_parse(file_data.as_ref())
            .map_err(|e| parse_error("Open file data failed", e))?;

        // Get all loadable program headers and the linked program data
        let segments = elf_data
            .segments()
            .ok_or_else(|| parse_error("Missing program headers", path.display()))?;
        let mut program_data: Vec<(ProgramHeader, Vec<u8>)> = Vec::new();
        for ph in segments.iter().filter(|ph| ph.p_type == PT_LOAD) {
            let data = elf_data
                .segment_data(&ph)
                .map_err(|e| parse_error("Segment data", e))?;
            program_data.push((ph, data.to_vec()));
        }
        if program_data.is_empty() {
            return Err(parse_error("No loadable segment", path.display()));
        }

        // Sum Strings with their symbol into a hashmap
        let common = elf_data
            .find_common_data()
            .map_err(|e| parse_error("Symbol tables", e))?;
        let mut symbol_map: HashMap<String, Symbol> = HashMap::new();
        if let (Some(symtab), Some(strtab)) = (common.symtab, common.symtab_strs) {
            for sym in symtab
                .iter()
                .filter(|sym| sym.st_bind() == STB_GLOBAL || sym.st_bind() == STB_WEAK)
            {
                let name = strtab
                    .get(sym.st_name as usize)
                    .map_err(|e| parse_error("Symbol name", e))?;
                symbol_map.insert(name.to_string(), sym);
            }
        }

        Ok(Self {
            header: elf_data.ehdr,
            program_data,
            symbol_map,
        })
    }

    /// Start address of the simulation: `main` if present, otherwise the ELF
    /// entry point. The Thumb bit is cleared.
    pub fn entry_point(&self) -> u64 {
        self.symbol_map
            .get("main")
            .map(|sym| sym.st_value)
            .unwrap_or(self.header.e_entry)
            & !1
    }

    /// Name of the function symbol containing `address`
    pub fn symbol_for(&self, address: u64) -> Option<&str> {
        self.symbol_map
            .iter()
            .filter(|(_, sym)| sym.st_symtype() == STT_FUNC && sym.st_size != 0)
            .find(|(_, sym)| {
                let start = sym.st_value & !1;
                (start..start + sym.st_size).contains(&address)
            })
            .map(|(name, _)| name.as_str())
    }
}
