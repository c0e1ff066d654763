use crate::error::Result;
use log::{debug, warn};
use serde::Serialize;
use std::path::Path;

/// Leakage samples of one simulated execution, index aligned with the
/// executed instructions.
///
/// Append only: there is no way to remove or reorder samples.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Trace {
    samples: Vec<f64>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, sample: f64) {
        self.samples.push(sample);
    }

    /// Samples in instruction order
    pub fn as_slice(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Traces of several runs of the same program.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TraceSet {
    traces: Vec<Trace>,
}

impl TraceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a finished trace.
    ///
    /// Returns `true` if its length differs from the first trace, which means
    /// the target program does not run in constant time.
    pub fn push(&mut self, trace: Trace) -> bool {
        let differs = self
            .traces
            .first()
            .is_some_and(|first| first.len() != trace.len());
        if differs {
            warn!(
                "The target program did not run in a constant number of instructions. \
                 Trace 0 has {} samples, trace {} has {}",
                self.traces[0].len(),
                self.traces.len(),
                trace.len()
            );
        }
        self.traces.push(trace);
        differs
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn number_of_traces(&self) -> usize {
        self.traces.len()
    }

    /// Samples of the first trace, zero without traces
    pub fn samples_per_trace(&self) -> usize {
        self.traces.first().map(Trace::len).unwrap_or(0)
    }

    /// Writes all traces as a JSON array of arrays.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer(std::io::BufWriter::new(file), self)?;
        debug!(
            "Saved {} traces to {}",
            self.number_of_traces(),
            path.display()
        );
        Ok(())
    }
}
