use crate::coefficients::Coefficients;
use crate::emulator::{Emulator, InstructionEvent};
use crate::error::{LeakageError, Result};
use crate::features::{windows, FeatureExtractor};
use crate::model::LeakageModel;
use crate::simulation_thread::SimulationThread;
use crate::trace::{Trace, TraceSet};
use crossbeam_channel::unbounded;
use log::{debug, info, warn};
use std::sync::Arc;

/// Result of one simulated execution.
///
/// `trace.as_slice()[i]` is the leakage sample of `events[i]`.
#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub events: Vec<InstructionEvent>,
    pub trace: Trace,
}

/// Leakage simulation pipeline.
///
/// Owns everything a run needs: the model, the feature extractor for the
/// terms of that model and the sample worker pool. Samples of one run are
/// computed concurrently and appended to the trace in execution order.
pub struct Simulation {
    model: Arc<dyn LeakageModel>,
    extractor: FeatureExtractor,
    pool: SimulationThread,
}

impl Simulation {
    /// Creates the pipeline and starts `threads` sample workers.
    ///
    /// # Errors
    ///
    /// * `UnsupportedTerm` - the model needs a term without feature computation.
    /// * `Worker` - `threads` is 0.
    pub fn new(
        model: Arc<dyn LeakageModel>,
        coefficients: Arc<Coefficients>,
        threads: usize,
    ) -> Result<Self> {
        let extractor = FeatureExtractor::new(model.required_terms(), coefficients)?;
        let mut pool = SimulationThread::new();
        pool.start_worker_threads(Arc::clone(&model), threads)?;
        info!(
            "Simulation with {} model, terms {:?}, {} threads",
            model.name(),
            extractor.terms(),
            threads
        );
        Ok(Self {
            model,
            extractor,
            pool,
        })
    }

    pub fn model(&self) -> &dyn LeakageModel {
        self.model.as_ref()
    }

    /// Computes the trace of an already recorded instruction sequence.
    ///
    /// # Errors
    ///
    /// The error of the earliest instruction whose sample failed. No partial
    /// trace is returned.
    pub fn trace_events(&self, events: &[InstructionEvent]) -> Result<Trace> {
        self.pool.reset_workload_counter();
        let (result_sender, result_receiver) = unbounded();

        for (index, window) in windows(events).enumerate() {
            self.pool.send_workload(
                index,
                window.current.opcode.clone(),
                self.extractor.extract(&window)?,
                result_sender.clone(),
            )?;
        }
        // Receiving ends once every job dropped its sender
        drop(result_sender);

        let mut samples: Vec<Option<f64>> = vec![None; events.len()];
        let mut first_error: Option<(usize, LeakageError)> = None;
        for (index, sample) in result_receiver.iter() {
            match sample {
                Ok(value) => samples[index] = Some(value),
                Err(e) => {
                    if first_error.as_ref().map_or(true, |(first, _)| index < *first) {
                        first_error = Some((index, e));
                    }
                }
            }
        }
        if let Some((index, e)) = first_error {
            warn!(
                "Sample of instruction {} ({} at 0x{:X}) failed: {}",
                index, events[index].opcode, events[index].address, e
            );
            return Err(e);
        }

        // Serial append in execution order
        let mut trace = Trace::with_capacity(events.len());
        for (index, sample) in samples.into_iter().enumerate() {
            let sample = sample.ok_or_else(|| {
                LeakageError::Worker(format!("No sample computed for instruction {}", index))
            })?;
            trace.append(sample);
        }
        debug!(
            "Computed {} samples",
            self.pool.get_workload_counter()
        );
        Ok(trace)
    }

    /// Runs the program once and computes its trace.
    pub fn run(&self, emulator: &mut dyn Emulator) -> Result<SimulationRun> {
        let events = emulator.run()?;
        info!(
            "{} emulator executed {} instructions",
            emulator.name(),
            events.len()
        );
        let trace = self.trace_events(&events)?;
        Ok(SimulationRun { events, trace })
    }

    /// Runs the program `runs` times and collects one trace per run.
    pub fn run_many(&self, emulator: &mut dyn Emulator, runs: usize) -> Result<TraceSet> {
        let mut trace_set = TraceSet::new();
        for run in 0..runs {
            debug!("Run {} of {}", run + 1, runs);
            let SimulationRun { trace, .. } = self.run(emulator)?;
            trace_set.push(trace);
        }
        Ok(trace_set)
    }
}
