use super::{Emulator, InstructionEvent};
use crate::error::Result;
use log::debug;
use std::path::{Path, PathBuf};

/// Replays an execution trace stored as a JSON array of events.
pub struct RecordedTrace {
    path: PathBuf,
}

impl RecordedTrace {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Stores `events` so that they can be replayed later.
    pub fn save(path: &Path, events: &[InstructionEvent]) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer(std::io::BufWriter::new(file), events)?;
        debug!("Recorded {} events to {}", events.len(), path.display());
        Ok(())
    }
}

impl Emulator for RecordedTrace {
    fn name(&self) -> &str {
        "recorded"
    }

    fn run(&mut self) -> Result<Vec<InstructionEvent>> {
        let content = std::fs::read_to_string(&self.path)?;
        let events: Vec<InstructionEvent> = serde_json::from_str(&content)?;
        debug!(
            "Replaying {} events from {}",
            events.len(),
            self.path.display()
        );
        Ok(events)
    }
}
