use crate::emulator::{EmulatorKind, EmulatorOptions, RegisterFault};
use crate::model::ModelKind;
use clap::Parser;
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;

/// Parse a register fault given as `cycle:register:bit`, e.g. `12:r3:0`
pub fn parse_register_fault(s: &str) -> Result<RegisterFault, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [cycle, register, bit] = parts.as_slice() else {
        return Err(format!(
            "Invalid fault '{}': expected format cycle:register:bit",
            s
        ));
    };
    let cycle = cycle
        .parse::<usize>()
        .map_err(|e| format!("Invalid fault cycle '{}': {}", cycle, e))?;
    let bit = bit
        .parse::<u8>()
        .map_err(|e| format!("Invalid fault bit '{}': {}", bit, e))?;
    Ok(RegisterFault {
        cycle,
        register: register.to_string(),
        bit,
    })
}

/// Custom deserializer accepting a fault as object or as `cycle:register:bit` string
fn deserialize_fault<'de, D>(deserializer: D) -> Result<Option<RegisterFault>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FaultHelper {
        Text(String),
        Fields(RegisterFault),
    }

    match Option::<FaultHelper>::deserialize(deserializer)? {
        None => Ok(None),
        Some(FaultHelper::Fields(fault)) => Ok(Some(fault)),
        Some(FaultHelper::Text(text)) => parse_register_fault(&text)
            .map(Some)
            .map_err(de::Error::custom),
    }
}

/// Configuration structure that can be loaded from JSON5
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub coefficients: Option<PathBuf>,
    #[serde(default)]
    pub elf: Option<PathBuf>,
    #[serde(default)]
    pub recorded_trace: Option<PathBuf>,
    #[serde(default)]
    pub emulator: EmulatorKind,
    #[serde(default)]
    pub model: ModelKind,
    #[serde(default = "Config::default_runs")]
    pub runs: usize,
    #[serde(default = "Config::default_threads")]
    pub threads: usize,
    #[serde(default = "Config::default_max_instructions")]
    pub max_instructions: usize,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default, deserialize_with = "deserialize_fault")]
    pub fault: Option<RegisterFault>,
    #[serde(default)]
    pub hotspots: usize,
    #[serde(default)]
    pub record: Option<PathBuf>,
    #[serde(default = "Config::default_log_level")]
    pub log_level: String,
}

impl Config {
    // Shared by the config file and the command line
    fn default_runs() -> usize {
        1
    }

    fn default_threads() -> usize {
        4
    }

    fn default_max_instructions() -> usize {
        2000
    }

    fn default_log_level() -> String {
        "info".to_string()
    }

    /// Load configuration from JSON5 file
    pub fn from_file(path: &PathBuf) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        Self::from_json5_str(&content)
    }

    pub fn from_json5_str(content: &str) -> Result<Self, String> {
        json5::from_str(content).map_err(|e| format!("Failed to parse JSON5 config: {}", e))
    }

    /// Create Config from command line arguments
    pub fn from_args(args: &Args) -> Self {
        Self {
            coefficients: args.coefficients.clone(),
            elf: args.elf.clone(),
            recorded_trace: args.recorded_trace.clone(),
            emulator: args.emulator.unwrap_or_default(),
            model: args.model.unwrap_or_default(),
            runs: args.runs.unwrap_or_else(Self::default_runs),
            threads: args.threads.unwrap_or_else(Self::default_threads),
            max_instructions: args
                .max_instructions
                .unwrap_or_else(Self::default_max_instructions),
            output: args.output.clone(),
            fault: args.fault.clone(),
            hotspots: args.hotspots.unwrap_or(0),
            record: args.record.clone(),
            log_level: args
                .log_level
                .clone()
                .unwrap_or_else(Self::default_log_level),
        }
    }

    /// Override config values with command line arguments
    pub fn override_with_args(&mut self, args: &Args) {
        // Override options only if provided
        if let Some(runs) = args.runs {
            self.runs = runs;
        }
        if let Some(threads) = args.threads {
            self.threads = threads;
        }
        if let Some(max_instructions) = args.max_instructions {
            self.max_instructions = max_instructions;
        }
        if args.coefficients.is_some() {
            self.coefficients = args.coefficients.clone();
        }
        if args.elf.is_some() {
            self.elf = args.elf.clone();
        }
        if args.recorded_trace.is_some() {
            self.recorded_trace = args.recorded_trace.clone();
        }
        if let Some(emulator) = args.emulator {
            self.emulator = emulator;
        }
        if let Some(model) = args.model {
            self.model = model;
        }
        if args.output.is_some() {
            self.output = args.output.clone();
        }
        if args.fault.is_some() {
            self.fault = args.fault.clone();
        }
        if let Some(hotspots) = args.hotspots {
            self.hotspots = hotspots;
        }
        if args.record.is_some() {
            self.record = args.record.clone();
        }
        if let Some(log_level) = &args.log_level {
            self.log_level = log_level.clone();
        }
    }

    /// Construction parameters of the selected emulator backend
    pub fn emulator_options(&self) -> EmulatorOptions {
        EmulatorOptions {
            elf: self.elf.clone(),
            recorded_trace: self.recorded_trace.clone(),
            max_instructions: self.max_instructions,
            fault: self.fault.clone(),
        }
    }
}

/// Command-line arguments structure for the leakage simulator.
///
/// Values given here override the ones of a configuration file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Load configuration from JSON5 file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Leakage coefficient definition (JSON)
    #[arg(short = 'k', long)]
    pub coefficients: Option<PathBuf>,

    /// ELF file executed by the unicorn emulator
    #[arg(short, long)]
    pub elf: Option<PathBuf>,

    /// Recorded instruction trace replayed by the recorded emulator
    #[arg(long)]
    pub recorded_trace: Option<PathBuf>,

    /// Emulator backend
    #[arg(long, value_enum)]
    pub emulator: Option<EmulatorKind>,

    /// Leakage model
    #[arg(long, value_enum)]
    pub model: Option<ModelKind>,

    /// Number of simulated executions [default: 1]
    #[arg(short, long)]
    pub runs: Option<usize>,

    /// Number of threads started in parallel [default: 4]
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Maximum number of instructions to be executed [default: 2000]
    #[arg(short, long)]
    pub max_instructions: Option<usize>,

    /// Write the trace set as JSON to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Flip a register bit before an instruction executes.
    ///   --fault cycle:register:bit
    ///     E.g.: --fault 12:r3:0
    #[arg(long, value_parser = parse_register_fault, verbatim_doc_comment)]
    pub fault: Option<RegisterFault>,

    /// Print the given number of instructions with the largest samples
    #[arg(long)]
    pub hotspots: Option<usize>,

    /// Save the executed instructions of the first run for later replay
    #[arg(long)]
    pub record: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long)]
    pub log_level: Option<String>,
}
