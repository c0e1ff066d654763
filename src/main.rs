use clap::Parser;
use std::sync::Arc;

use leakage_simulator::prelude::*;

use git_version::git_version;
const GIT_VERSION: &str = git_version!(fallback = "unknown");

/// Program to simulate the power side channel leakage of ARMv8-M programs
///
fn main() -> Result<(), String> {
    // Get parameter from command line
    let args = Args::parse();

    // Load configuration from file if provided, otherwise use CLI args
    let config = match &args.config {
        Some(config_path) => {
            let mut config = Config::from_file(config_path)?;
            // Override config values with CLI args
            config.override_with_args(&args);
            config
        }
        None => Config::from_args(&args),
    };

    // Switch on with: RUST_LOG=debug cargo run, or log_level in the config
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    println!("--- Leakage simulator: {GIT_VERSION} ---\n");

    if config.runs == 0 {
        return Err("Number of runs must be greater than 0".to_string());
    }

    // Coefficients are optional for models that do not read them
    let coefficients = match &config.coefficients {
        Some(path) => {
            println!("Coefficients: {}", path.display());
            Coefficients::from_file(path).map_err(|e| e.to_string())?
        }
        None if config.model.needs_coefficients() => {
            return Err("The selected model requires a coefficient file".to_string());
        }
        None => Coefficients::default(),
    };
    let coefficients = Arc::new(coefficients);
    let model = config.model.build(Arc::clone(&coefficients));

    let mut emulator = build_emulator(config.emulator, &config.emulator_options())
        .map_err(|e| e.to_string())?;
    let simulation =
        Simulation::new(model, coefficients, config.threads).map_err(|e| e.to_string())?;

    // First run is kept for recording and the hotspot report
    let first = simulation
        .run(emulator.as_mut())
        .map_err(|e| e.to_string())?;
    if let Some(path) = &config.record {
        RecordedTrace::save(path, &first.events).map_err(|e| e.to_string())?;
        println!("Recorded {} instructions to {}", first.events.len(), path.display());
    }

    let mut trace_set = TraceSet::new();
    trace_set.push(first.trace.clone());
    if config.runs > 1 {
        let remaining = simulation
            .run_many(emulator.as_mut(), config.runs - 1)
            .map_err(|e| e.to_string())?;
        for trace in remaining.traces() {
            trace_set.push(trace.clone());
        }
    }

    println!(
        "Simulated {} traces with {} samples each",
        trace_set.number_of_traces(),
        trace_set.samples_per_trace()
    );

    if let Some(path) = &config.output {
        trace_set.save(path).map_err(|e| e.to_string())?;
        println!("Traces written to {}", path.display());
    }

    if config.hotspots > 0 {
        // Symbols are only available for ELF targets
        let file_data = config
            .elf
            .as_ref()
            .and_then(|path| ElfFile::new(path.clone()).ok());
        print!(
            "\n{}",
            format_hotspots(&hotspots(&first, config.hotspots), file_data.as_ref())
        );
    }
    Ok(())
}
