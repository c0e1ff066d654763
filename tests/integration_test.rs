use leakage_simulator::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn load_coefficients(name: &str) -> Arc<Coefficients> {
    Arc::new(Coefficients::from_file(&Path::new("tests/data").join(name)).unwrap())
}

fn assert_samples(trace: &Trace, expected: &[f64]) {
    assert_eq!(trace.len(), expected.len());
    for (sample, expected) in trace.as_slice().iter().zip(expected) {
        assert!(
            (sample - expected).abs() < 1e-9,
            "sample {} != {}",
            sample,
            expected
        );
    }
}

#[test]
/// Test of the coefficient file examples
///
/// Loads a flat and a categorized definition and checks lookups and samples
fn coefficient_files() {
    let flat = load_coefficients("coefficients_flat.json");
    assert_eq!(flat.len(), 2);
    assert_eq!(flat.category_of("ADD").unwrap(), "ADD");
    assert_eq!(flat.category_of("SUB").unwrap(), "SUB");
    assert_eq!(flat.interaction_terms().len(), 3);
    let model = PowerModel::new(Arc::clone(&flat));
    let features = FeatureVectors::from([
        ("Hamming_Weight_Operand1".to_string(), vec![2.0]),
        ("Hamming_Weight_Operand2".to_string(), vec![1.0]),
        ("Previous_Instruction".to_string(), vec![0.0, 1.0]),
    ]);
    // 0.5 + 1.0*2 + 2.0*1 + 3.0 (after SUB)
    assert_eq!(model.sample("ADD", &features).unwrap(), 7.5);

    let categorized = load_coefficients("coefficients.json");
    assert_eq!(categorized.len(), 3);
    assert_eq!(categorized.category_of("STR").unwrap(), "Memory");
    assert_eq!(categorized.constant("BX").unwrap(), 0.5);
    assert_eq!(categorized.interaction_terms().len(), 3);
    assert!(matches!(
        categorized.constant("MUL"),
        Err(LeakageError::NotFound(_))
    ));
}

#[test]
/// Test of a flat definition through the simulation pipeline
///
/// Every instruction is its own category, so the previous instruction term
/// is indexed by instruction
fn flat_definition_trace() {
    let coefficients = load_coefficients("coefficients_flat.json");
    let model = ModelKind::Power.build(Arc::clone(&coefficients));
    let simulation = Simulation::new(model, coefficients, 2).unwrap();
    let events = vec![
        InstructionEvent::new(0x1000, "ADD", vec![3, 4]),
        InstructionEvent::new(0x1004, "SUB", vec![7, 1]),
        InstructionEvent::new(0x1008, "ADD", vec![0, 0]),
    ];

    let trace = simulation.trace_events(&events).unwrap();
    // ADD: 0.5 + 1.0*2 + 2.0*1 (no previous instruction)
    // SUB: 1.0 + 0.5*3 + 0.5*1 + 1.0 (after ADD)
    // ADD: 0.5 + 3.0 (after SUB)
    assert_samples(&trace, &[4.5, 4.0, 3.5]);
}

#[test]
fn malformed_coefficient_file() {
    assert!(matches!(
        Coefficients::from_file(Path::new("tests/data/coefficients_malformed.json")),
        Err(LeakageError::MalformedDefinition(_))
    ));
    assert!(matches!(
        Coefficients::from_file(Path::new("tests/data/missing.json")),
        Err(LeakageError::Io(_))
    ));
}

#[test]
/// Test of the full pipeline on a recorded execution
///
/// Replays four instructions and checks every sample against the values
/// computed by hand from the coefficient file
fn recorded_power_trace() {
    let coefficients = load_coefficients("coefficients.json");
    let model = ModelKind::Power.build(Arc::clone(&coefficients));
    let simulation = Simulation::new(model, coefficients, 4).unwrap();
    let mut emulator = RecordedTrace::new(PathBuf::from("tests/data/recorded_trace.json"));

    let run = simulation.run(&mut emulator).unwrap();
    assert_eq!(run.events.len(), 4);
    // MOVS: 1 + 0.5*2 (no previous instruction)
    // ADDS: 1 + 0.5*2 + 0.25*0 + 0.0 (after Arithmetic)
    // LDR:  2 + 1.0*1 + 0.5*3 + 0.1 (after Arithmetic)
    // BX:   0.5 + 1.0 (after Memory)
    assert_samples(&run.trace, &[2.0, 2.0, 4.6, 1.5]);
}

#[test]
fn repeated_runs() {
    let coefficients = load_coefficients("coefficients.json");
    let model = ModelKind::Power.build(Arc::clone(&coefficients));
    let simulation = Simulation::new(model, coefficients, 2).unwrap();
    let mut emulator = RecordedTrace::new(PathBuf::from("tests/data/recorded_trace.json"));

    let trace_set = simulation.run_many(&mut emulator, 3).unwrap();
    assert_eq!(trace_set.number_of_traces(), 3);
    assert_eq!(trace_set.samples_per_trace(), 4);
    assert!(trace_set
        .traces()
        .iter()
        .all(|trace| trace == &trace_set.traces()[0]));
}

#[test]
fn hamming_weight_without_coefficients() {
    let coefficients = Arc::new(Coefficients::default());
    let model = ModelKind::HammingWeight.build(Arc::clone(&coefficients));
    let simulation = Simulation::new(model, coefficients, 1).unwrap();
    let mut emulator = RecordedTrace::new(PathBuf::from("tests/data/recorded_trace.json"));

    let run = simulation.run(&mut emulator).unwrap();
    assert_samples(&run.trace, &[2.0, 2.0, 1.0, 6.0]);
}

#[test]
fn unknown_instruction_fails_the_run() {
    let path = std::env::temp_dir().join("leakage_simulator_unknown_instruction.json");
    let events = vec![
        InstructionEvent::new(0x1000, "ADDS", vec![1]),
        InstructionEvent::new(0x1002, "UDIV", vec![4, 2]),
    ];
    RecordedTrace::save(&path, &events).unwrap();

    let coefficients = load_coefficients("coefficients.json");
    let model = ModelKind::Power.build(Arc::clone(&coefficients));
    let simulation = Simulation::new(model, coefficients, 2).unwrap();
    let result = simulation.run(&mut RecordedTrace::new(path.clone()));
    std::fs::remove_file(&path).ok();
    assert!(matches!(result, Err(LeakageError::NotFound(_))));
}

#[test]
/// Test of the configuration file api
///
/// Builds emulator and simulation the same way the binary does and writes
/// the trace set
fn config_file_pipeline() {
    let config = Config::from_file(&PathBuf::from("tests/data/config.json5")).unwrap();
    assert_eq!(config.emulator, EmulatorKind::Recorded);
    assert_eq!(config.runs, 2);

    let coefficients = Arc::new(Coefficients::from_file(config.coefficients.as_ref().unwrap()).unwrap());
    let model = config.model.build(Arc::clone(&coefficients));
    let mut emulator = build_emulator(config.emulator, &config.emulator_options()).unwrap();
    let simulation = Simulation::new(model, coefficients, config.threads).unwrap();
    let trace_set = simulation
        .run_many(emulator.as_mut(), config.runs)
        .unwrap();

    let output = std::env::temp_dir().join("leakage_simulator_traces.json");
    trace_set.save(&output).unwrap();
    let written: Vec<Vec<f64>> =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    std::fs::remove_file(&output).ok();
    assert_eq!(written.len(), 2);
    assert_eq!(written[0].len(), 4);
}

const THUMB_ELF: &str = "tests/bin/thumb_arith.elf";

/// Return address handed to the program, with the Thumb bit set
const RETURN_ADDRESS: u32 = 0x0AA0_1001;

fn unicorn_events(max_instructions: usize, fault: Option<RegisterFault>) -> Vec<InstructionEvent> {
    let mut emulator =
        UnicornEmulator::new(PathBuf::from(THUMB_ELF), max_instructions, fault).unwrap();
    emulator.run().unwrap()
}

fn delta_of(event: &InstructionEvent, register: usize) -> Option<(u32, u32)> {
    event
        .deltas
        .iter()
        .find(|delta| delta.register == register)
        .map(|delta| (delta.before, delta.after))
}

#[test]
/// Test of the unicorn backend on a small Thumb program
///
/// movs r0, #5; movs r1, #3; adds r2, r0, r1; eors r2, r1; bx lr
fn unicorn_execution() {
    let events = unicorn_events(100, None);
    let opcodes: Vec<&str> = events.iter().map(|event| event.opcode.as_str()).collect();
    assert_eq!(opcodes, ["MOVS", "MOVS", "ADDS", "EORS", "BX"]);
    let addresses: Vec<u64> = events.iter().map(|event| event.address).collect();
    assert_eq!(
        addresses,
        [0x0800_0000, 0x0800_0002, 0x0800_0004, 0x0800_0006, 0x0800_0008]
    );

    assert_eq!(events[0].operands, vec![5]);
    assert_eq!(events[1].operands, vec![3]);
    assert_eq!(events[2].operands, vec![5, 3]);
    assert_eq!(events[3].operands, vec![8, 3]);
    assert_eq!(events[4].operands, vec![RETURN_ADDRESS]);

    assert_eq!(delta_of(&events[0], 0), Some((0, 5)));
    assert_eq!(delta_of(&events[0], 1), None);
    assert_eq!(delta_of(&events[1], 1), Some((0, 3)));
    assert_eq!(delta_of(&events[2], 2), Some((0, 8)));
    assert_eq!(delta_of(&events[3], 2), Some((8, 11)));
    assert_eq!(events[3].registers[2], 8);
}

#[test]
fn unicorn_instruction_limit() {
    let events = unicorn_events(3, None);
    let opcodes: Vec<&str> = events.iter().map(|event| event.opcode.as_str()).collect();
    assert_eq!(opcodes, ["MOVS", "MOVS", "ADDS"]);
}

#[test]
/// Test of the register bit flip
///
/// Bit 1 of r0 is flipped right before the third instruction, so the
/// snapshot of that instruction already holds the faulted value
fn unicorn_register_fault() {
    let fault = RegisterFault {
        cycle: 2,
        register: "r0".to_string(),
        bit: 1,
    };
    let events = unicorn_events(100, Some(fault));
    assert_eq!(events.len(), 5);
    assert_eq!(events[1].registers[0], 5);
    assert_eq!(events[2].registers[0], 7);
    assert_eq!(events[2].operands, vec![7, 3]);
    assert_eq!(events[3].registers[2], 10);
    assert_eq!(delta_of(&events[3], 2), Some((10, 9)));
}

#[test]
fn unicorn_symbols() {
    let file_data = ElfFile::new(PathBuf::from(THUMB_ELF)).unwrap();
    assert_eq!(file_data.entry_point(), 0x0800_0000);
    assert_eq!(file_data.symbol_for(0x0800_0004), Some("main"));
    assert_eq!(file_data.symbol_for(0x0800_0010), None);
}

#[test]
/// Test of the full pipeline with the unicorn backend
///
/// The hamming weight model samples the first source operand
fn unicorn_hamming_weight_trace() {
    let coefficients = Arc::new(Coefficients::default());
    let model = ModelKind::HammingWeight.build(Arc::clone(&coefficients));
    let simulation = Simulation::new(model, coefficients, 2).unwrap();
    let options = EmulatorOptions {
        elf: Some(PathBuf::from(THUMB_ELF)),
        max_instructions: 100,
        ..Default::default()
    };
    let mut emulator = build_emulator(EmulatorKind::Unicorn, &options).unwrap();

    let run = simulation.run(emulator.as_mut()).unwrap();
    assert_samples(&run.trace, &[2.0, 2.0, 2.0, 1.0, 6.0]);
}
