//! Single-worker execution, the deterministic baseline.

use std::{
    sync::Arc,
    thread,
};

use gossamer_core::ParameterVector;

use crate::{
    model::{Model, ModelError, Progress},
    step, Trainer, TrainerError,
};

/// Runs one worker over the dataset, either on the caller's thread
/// ([`run`]) or on a dedicated thread ([`start`]/[`join`]).
///
/// Used to validate correctness: with a single worker there are no
/// concurrent parameter writes from the trainer, so results are
/// reproducible for a fixed model and dataset order.
///
/// [`run`]: #method.run
/// [`start`]: #method.start
/// [`join`]: #method.join
pub struct SingleThreaded {
    worker: Option<Box<dyn Model>>,
    inspector: Box<dyn Model>,
    limit: u64,
    progress: Progress,
    thread: Option<thread::JoinHandle<(Box<dyn Model>, Result<(), ModelError>)>>,
}

impl SingleThreaded {
    /// Creates a single-worker trainer with a budget of `limit`
    /// samples (0 = unbounded).
    pub fn new(mut model: Box<dyn Model>, params: &Arc<ParameterVector>, limit: u64) -> Self {
        let progress = Progress::new();
        model.bind_progress(progress.clone());
        let inspector = model.fork(params);
        Self {
            worker: Some(model),
            inspector,
            limit,
            progress,
            thread: None,
        }
    }

    /// Runs the whole budget on the caller's thread.
    ///
    /// # Errors
    /// Fails if the worker was moved to a dedicated thread by
    /// [`start`], or with the model's own error if a step fails.
    ///
    /// [`start`]: #method.start
    pub fn run(&mut self) -> Result<(), TrainerError> {
        let model = self
            .worker
            .as_mut()
            .ok_or(TrainerError::AlreadyStarted)?;
        run_loop(model.as_mut(), self.limit, &self.progress)
            .map_err(|source| TrainerError::Worker { id: 0, source })
    }
}

impl Trainer for SingleThreaded {
    fn model(&self) -> &dyn Model {
        self.inspector.as_ref()
    }

    fn start(&mut self) -> Result<(), TrainerError> {
        let mut model = self.worker.take().ok_or(TrainerError::AlreadyStarted)?;
        let limit = self.limit;
        let progress = self.progress.clone();
        let handle = thread::Builder::new()
            .name("trainer-0".into())
            .spawn(move || {
                let result = run_loop(model.as_mut(), limit, &progress);
                (model, result)
            })?;
        self.thread = Some(handle);
        Ok(())
    }

    fn join(&mut self) -> Result<(), TrainerError> {
        let handle = self.thread.take().ok_or(TrainerError::NotStarted)?;
        match handle.join() {
            Ok((model, result)) => {
                self.worker = Some(model);
                result.map_err(|source| TrainerError::Worker { id: 0, source })
            }
            Err(_) => Err(TrainerError::WorkerPanicked(0)),
        }
    }

    fn processed(&self) -> u64 {
        self.progress.get()
    }
}

fn run_loop(model: &mut dyn Model, limit: u64, progress: &Progress) -> Result<(), ModelError> {
    let mut done = 0;
    while limit == 0 || done < limit {
        step(model)?;
        model.advance();
        progress.bump();
        done += 1;
    }
    Ok(())
}
