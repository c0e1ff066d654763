//! Terminal summary of a simulated trace.

use crate::elf_file::ElfFile;
use crate::simulation::SimulationRun;
use colored::Colorize;
use itertools::Itertools;

/// Instruction with one of the largest samples of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Hotspot {
    /// Position in execution order
    pub index: usize,
    pub address: u64,
    pub opcode: String,
    pub sample: f64,
}

/// The `count` instructions with the largest samples, largest first.
///
/// Equal samples keep execution order.
pub fn hotspots(run: &SimulationRun, count: usize) -> Vec<Hotspot> {
    run.events
        .iter()
        .zip(run.trace.as_slice())
        .enumerate()
        .sorted_by(|(a_index, (_, a)), (b_index, (_, b))| {
            b.total_cmp(a).then(a_index.cmp(b_index))
        })
        .take(count)
        .map(|(index, (event, sample))| Hotspot {
            index,
            address: event.address,
            opcode: event.opcode.clone(),
            sample: *sample,
        })
        .collect()
}

/// Formats hotspots as colored table lines. Function names are resolved
/// when the ELF file is at hand.
pub fn format_hotspots(hotspots: &[Hotspot], file_data: Option<&ElfFile>) -> String {
    let Some(maximum) = hotspots.first().map(|hotspot| hotspot.sample) else {
        return format!("{}\n", "No samples recorded".yellow());
    };

    let mut output = format!("{}\n", "Leakage hotspots:".bold());
    for hotspot in hotspots {
        let sample = format!("{:>10.3}", hotspot.sample);
        // Highlight samples close to the maximum
        let sample = if hotspot.sample >= 0.9 * maximum {
            sample.red().bold()
        } else if hotspot.sample >= 0.5 * maximum {
            sample.yellow()
        } else {
            sample.green()
        };
        let location = file_data
            .and_then(|file| file.symbol_for(hotspot.address))
            .map(|symbol| format!(" <{}>", symbol))
            .unwrap_or_default();
        output.push_str(&format!(
            "  #{:<5} 0x{:08X}{}  {:<8} {}\n",
            hotspot.index, hotspot.address, location, hotspot.opcode, sample
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::InstructionEvent;
    use crate::trace::Trace;

    fn run(samples: &[f64]) -> SimulationRun {
        let mut trace = Trace::new();
        let events = samples
            .iter()
            .enumerate()
            .map(|(index, sample)| {
                trace.append(*sample);
                InstructionEvent::new(0x1000 + 2 * index as u64, "ADDS", vec![])
            })
            .collect();
        SimulationRun { events, trace }
    }

    #[test]
    fn largest_samples_first() {
        let hotspots = hotspots(&run(&[1.0, 4.0, 2.0, 4.0]), 3);
        let indices: Vec<usize> = hotspots.iter().map(|hotspot| hotspot.index).collect();
        assert_eq!(indices, vec![1, 3, 2]);
        assert_eq!(hotspots[0].address, 0x1002);
    }

    #[test]
    fn report_lists_every_hotspot() {
        colored::control::set_override(false);
        let report = format_hotspots(&hotspots(&run(&[1.0, 2.0]), 5), None);
        assert_eq!(report.lines().count(), 3);
        assert!(report.contains("0x00001002"));
        assert!(format_hotspots(&[], None).contains("No samples"));
    }
}
