//! Instrumented models for coordinator tests.

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use gossamer_core::{BlockLayout, ParameterVector};

use crate::model::{Model, ModelError, Progress};

pub(crate) fn test_params() -> Arc<ParameterVector> {
    Arc::new(ParameterVector::zeroed(64, BlockLayout::new(16).unwrap()))
}

/// What one model instance did, observable after its thread is gone.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct WorkerRecord {
    pub start: u64,
    pub cursor: u64,
    pub steps: u64,
}

/// A model that counts steps and tracks its cursor in a shared ledger,
/// writing a token value into the shared parameter vector on every
/// forward pass.
pub(crate) struct CountingModel {
    params: Arc<ParameterVector>,
    dataset_len: u64,
    cursor: u64,
    steps: u64,
    slot: usize,
    ledger: Arc<Mutex<Vec<WorkerRecord>>>,
    progress: Option<Progress>,
    /// This instance fails its forward pass once it has taken this
    /// many steps.
    fail_after: Option<u64>,
    /// Forks registered under this ledger slot fail immediately.
    fail_fork_slot: Option<usize>,
}

impl CountingModel {
    pub fn new(params: &Arc<ParameterVector>, dataset_len: u64) -> Self {
        let ledger = Arc::new(Mutex::new(vec![WorkerRecord::default()]));
        Self {
            params: Arc::clone(params),
            dataset_len,
            cursor: 0,
            steps: 0,
            slot: 0,
            ledger,
            progress: None,
            fail_after: None,
            fail_fork_slot: None,
        }
    }

    /// Ledger slot 0 is this instance; forks take slots in fork order.
    pub fn ledger(&self) -> Arc<Mutex<Vec<WorkerRecord>>> {
        Arc::clone(&self.ledger)
    }

    pub fn failing_after(mut self, steps: u64) -> Self {
        self.fail_after = Some(steps);
        self
    }

    pub fn failing_fork(mut self, slot: usize) -> Self {
        self.fail_fork_slot = Some(slot);
        self
    }

    fn record(&self) {
        let mut ledger = self.ledger.lock().unwrap();
        let record = &mut ledger[self.slot];
        record.cursor = self.cursor;
        record.steps = self.steps;
    }
}

impl Model for CountingModel {
    fn forward(&mut self) -> Result<(), ModelError> {
        if let Some(limit) = self.fail_after {
            if self.steps >= limit {
                return Err(anyhow!("injected failure in worker slot {}", self.slot));
            }
        }
        // Exercise the shared vector the way a real model would:
        // unsynchronized read-modify-write.
        let len = self.params.len();
        let weights = self.params.view_mut();
        weights[self.slot % len] += 1.0;
        Ok(())
    }

    fn backward(&mut self) -> Result<(), ModelError> {
        // Schedules read aggregate progress, like a real model.
        let _ = self.progress.as_ref().map(Progress::get);
        Ok(())
    }

    fn reset_errors(&mut self) {}

    fn params(&self) -> usize {
        self.params.len()
    }

    fn dataset_len(&self) -> u64 {
        self.dataset_len
    }

    fn cursor(&self) -> u64 {
        self.cursor
    }

    fn seek(&mut self, pos: u64) {
        self.cursor = pos;
        let mut ledger = self.ledger.lock().unwrap();
        let record = &mut ledger[self.slot];
        record.start = pos;
        record.cursor = pos;
    }

    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.dataset_len;
        self.steps += 1;
        self.record();
    }

    fn bind_progress(&mut self, progress: Progress) {
        self.progress = Some(progress);
    }

    fn fork(&self, params: &Arc<ParameterVector>) -> Box<dyn Model> {
        let slot = {
            let mut ledger = self.ledger.lock().unwrap();
            ledger.push(WorkerRecord::default());
            ledger.len() - 1
        };
        Box::new(Self {
            params: Arc::clone(params),
            dataset_len: self.dataset_len,
            cursor: 0,
            steps: 0,
            slot,
            ledger: Arc::clone(&self.ledger),
            progress: None,
            fail_after: if self.fail_fork_slot == Some(slot) {
                Some(0)
            } else {
                None
            },
            fail_fork_slot: None,
        })
    }
}
