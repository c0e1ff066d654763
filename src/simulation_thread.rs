use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{spawn, JoinHandle};

use crate::error::{LeakageError, Result};
use crate::model::{FeatureVectors, LeakageModel};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error};

/// Result of one sample computation, tagged with its instruction index
pub type SampleResult = (usize, Result<f64>);

/// Represents one sample computation sent to the worker threads.
///
/// # Fields
///
/// * `index` - Position of the instruction in execution order.
/// * `opcode` - Opcode of the instruction.
/// * `features` - Feature vectors of every required interaction term.
/// * `result_sender` - Channel receiving the tagged sample.
pub struct WorkloadMessage {
    pub index: usize,
    pub opcode: String,
    pub features: FeatureVectors,
    pub result_sender: Sender<SampleResult>,
}

/// Pool of worker threads computing leakage samples.
///
/// Workers only read the shared model, so the samples of independent
/// instructions are computed concurrently. Results come back tagged with the
/// instruction index; the caller is the single writer of the trace and
/// appends them in order.
///
/// # Lifecycle
///
/// 1. Create with `new()` to establish communication channels
/// 2. Call `start_worker_threads()` to spawn worker thread pool
/// 3. Use `send_workload()` to distribute sample computations
/// 4. Worker threads are joined when the pool is dropped
pub struct SimulationThread {
    /// Channel for sending workload messages to worker threads.
    workload_sender: Option<Sender<WorkloadMessage>>,
    /// Channel for receiving workload messages (shared by all worker threads).
    workload_receiver: Receiver<WorkloadMessage>,
    /// Shared counter for tracking completed jobs across threads.
    work_load_counter: Arc<AtomicUsize>,
    handles: Vec<JoinHandle<()>>,
}

impl SimulationThread {
    pub fn new() -> Self {
        // Create a channel for sending jobs to threads
        let (workload_sender, workload_receiver): (
            Sender<WorkloadMessage>,
            Receiver<WorkloadMessage>,
        ) = unbounded();

        SimulationThread {
            workload_sender: Some(workload_sender),
            workload_receiver,
            work_load_counter: Arc::new(AtomicUsize::new(0)),
            handles: Vec::new(),
        }
    }

    /// Starts `number_of_threads` workers computing samples with `model`.
    ///
    /// # Errors
    ///
    /// `Worker` if `number_of_threads` is 0.
    pub fn start_worker_threads(
        &mut self,
        model: Arc<dyn LeakageModel>,
        number_of_threads: usize,
    ) -> Result<()> {
        // Check that number of threads is greater than 0
        if number_of_threads == 0 {
            return Err(LeakageError::Worker(
                "Number of threads must be greater than 0".to_string(),
            ));
        }

        for _ in 0..number_of_threads {
            // Copy data to be moved into threads
            let receiver = self.workload_receiver.clone();
            let workload_counter = Arc::clone(&self.work_load_counter);
            let model = Arc::clone(&model);
            let handle = spawn(move || {
                // Loop until the workload channel is closed
                while let Ok(msg) = receiver.recv() {
                    let WorkloadMessage {
                        index,
                        opcode,
                        features,
                        result_sender,
                    } = msg;

                    let sample = model.sample(&opcode, &features);
                    // Counted before sending, so a received sample is always counted
                    workload_counter.fetch_add(1, Ordering::SeqCst);
                    // The receiver is gone once the caller gave up on this run
                    if result_sender.send((index, sample)).is_err() {
                        debug!("Dropped sample {} of an abandoned run", index);
                    }
                }
            });
            self.handles.push(handle);
        }
        debug!("Started {} sample worker threads", number_of_threads);
        Ok(())
    }

    /// Queues one sample computation.
    pub fn send_workload(
        &self,
        index: usize,
        opcode: String,
        features: FeatureVectors,
        result_sender: Sender<SampleResult>,
    ) -> Result<()> {
        if let Some(sender) = &self.workload_sender {
            let msg = WorkloadMessage {
                index,
                opcode,
                features,
                result_sender,
            };
            sender
                .send(msg)
                .map_err(|e| LeakageError::Worker(format!("Failed to send workload: {}", e)))
        } else {
            Err(LeakageError::Worker(
                "Workload sender channel is closed".to_string(),
            ))
        }
    }

    /// Number of jobs finished since the last reset
    pub fn get_workload_counter(&self) -> usize {
        self.work_load_counter.load(Ordering::SeqCst)
    }

    pub fn reset_workload_counter(&self) {
        self.work_load_counter.store(0, Ordering::SeqCst);
    }
}

impl Default for SimulationThread {
    fn default() -> Self {
        Self::new()
    }
}

/// Closes the workload channel and joins all worker threads.
impl Drop for SimulationThread {
    fn drop(&mut self) {
        // Drop the main workload channel
        self.workload_sender = None;

        // Wait for all threads to finish processing
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.join() {
                error!("A thread panicked: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HammingWeightModel;
    use crate::features::HAMMING_WEIGHT_OPERAND1;

    #[test]
    fn zero_threads_rejected() {
        let mut pool = SimulationThread::new();
        assert!(pool
            .start_worker_threads(Arc::new(HammingWeightModel::new()), 0)
            .is_err());
    }

    #[test]
    fn results_are_tagged_with_index() {
        let mut pool = SimulationThread::new();
        pool.start_worker_threads(Arc::new(HammingWeightModel::new()), 3)
            .unwrap();

        let (sender, receiver) = unbounded();
        for index in 0..20 {
            let features =
                FeatureVectors::from([(HAMMING_WEIGHT_OPERAND1.to_string(), vec![index as f64])]);
            pool.send_workload(index, "ADDS".to_string(), features, sender.clone())
                .unwrap();
        }
        drop(sender);

        let mut results: Vec<(usize, f64)> = receiver
            .iter()
            .map(|(index, sample)| (index, sample.unwrap()))
            .collect();
        results.sort_by_key(|(index, _)| *index);
        assert_eq!(results.len(), 20);
        assert!(results
            .iter()
            .all(|(index, sample)| *sample == *index as f64));
        assert_eq!(pool.get_workload_counter(), 20);
        pool.reset_workload_counter();
        assert_eq!(pool.get_workload_counter(), 0);
    }
}
