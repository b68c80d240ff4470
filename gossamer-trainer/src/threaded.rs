//! Multi-worker lock-free execution.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use gossamer_core::ParameterVector;

use crate::{
    model::{Model, ModelError, Progress},
    rendezvous::Rendezvous,
    step, Trainer, TrainerError,
};

/// Runs several workers in parallel over the same parameter vector.
///
/// The dataset is partitioned evenly: worker `t` of `K` starts its
/// cursor at `dataset_len * t / K` and advances with wraparound, so a
/// bounded run touches each worker's share once. Every worker owns a
/// private fork of the model topology; only the parameter vector is
/// shared, and writes to it are unsynchronized by design.
///
/// Beyond the [`Trainer`] contract this strategy supports cooperative
/// [`cancel`] and a [`suspend`]/[`resume`] pair for reading a
/// consistent-ish snapshot of the parameters without stopping
/// training for good.
///
/// [`Trainer`]: trait.Trainer.html
/// [`cancel`]: #method.cancel
/// [`suspend`]: #method.suspend
/// [`resume`]: #method.resume
pub struct Threaded {
    inspector: Box<dyn Model>,
    contexts: Vec<WorkerContext>,
    threads: Vec<(usize, thread::JoinHandle<Result<(), ModelError>>)>,
    steps_per_worker: u64,
    progress: Progress,
    rendezvous: Arc<Rendezvous>,
    cancelled: Arc<AtomicBool>,
    started: bool,
}

struct WorkerContext {
    id: usize,
    model: Box<dyn Model>,
}

impl Threaded {
    /// Creates a coordinator with `workers` workers (0 = one per
    /// available core), each budgeted `steps_per_worker` samples
    /// (0 = unbounded).
    pub fn new(
        mut model: Box<dyn Model>,
        params: &Arc<ParameterVector>,
        steps_per_worker: u64,
        workers: usize,
    ) -> Self {
        let workers = if workers == 0 {
            num_cpus::get()
        } else {
            workers
        };
        let progress = Progress::new();
        let dataset_len = model.dataset_len();
        let contexts = (0..workers)
            .map(|id| {
                let mut fork = model.fork(params);
                fork.bind_progress(progress.clone());
                fork.seek(dataset_len * id as u64 / workers as u64);
                WorkerContext { id, model: fork }
            })
            .collect();
        model.bind_progress(progress.clone());
        Self {
            inspector: model,
            contexts,
            threads: Vec::new(),
            steps_per_worker,
            progress,
            rendezvous: Arc::new(Rendezvous::new(workers)),
            cancelled: Arc::new(AtomicBool::new(false)),
            started: false,
        }
    }

    /// Number of workers.
    pub fn workers(&self) -> usize {
        self.contexts.len() + self.threads.len()
    }

    /// Requests a cooperative stop: every worker exits at its next
    /// iteration boundary, never mid-step. Workers parked in a
    /// suspend are released so [`join`] returns normally.
    ///
    /// [`join`]: trait.Trainer.html#tymethod.join
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.rendezvous.release();
    }

    /// Blocks until every still-running worker has halted at its next
    /// step boundary. Workers that already finished their budget are
    /// not waited on.
    ///
    /// Must be paired with [`resume`]; no-op before [`start`].
    ///
    /// [`resume`]: #method.resume
    /// [`start`]: trait.Trainer.html#tymethod.start
    pub fn suspend(&self) {
        if !self.started {
            return;
        }
        self.rendezvous.pause();
    }

    /// Releases all suspended workers simultaneously.
    pub fn resume(&self) {
        if !self.started {
            return;
        }
        self.rendezvous.release();
    }
}

impl Trainer for Threaded {
    fn model(&self) -> &dyn Model {
        self.inspector.as_ref()
    }

    fn start(&mut self) -> Result<(), TrainerError> {
        if self.started {
            return Err(TrainerError::AlreadyStarted);
        }
        self.started = true;
        let workers = self.contexts.len();
        for context in self.contexts.drain(..) {
            let WorkerContext { id, mut model } = context;
            let steps = self.steps_per_worker;
            let progress = self.progress.clone();
            let rendezvous = Arc::clone(&self.rendezvous);
            let cancelled = Arc::clone(&self.cancelled);
            let handle = thread::Builder::new()
                .name(format!("trainer-{}", id))
                .spawn(move || {
                    let result =
                        worker_loop(model.as_mut(), steps, &rendezvous, &cancelled, &progress);
                    rendezvous.leave();
                    if let Err(ref err) = result {
                        error!("worker {} failed: {}", id, err);
                    }
                    result
                })?;
            self.threads.push((id, handle));
        }
        info!("started {} trainer workers", workers);
        Ok(())
    }

    fn join(&mut self) -> Result<(), TrainerError> {
        if !self.started {
            return Err(TrainerError::NotStarted);
        }
        let mut first_failure = None;
        for (id, handle) in self.threads.drain(..) {
            let failure = match handle.join() {
                Ok(Ok(())) => None,
                Ok(Err(source)) => Some(TrainerError::Worker { id, source }),
                Err(_) => Some(TrainerError::WorkerPanicked(id)),
            };
            if first_failure.is_none() {
                first_failure = failure;
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn processed(&self) -> u64 {
        self.progress.get()
    }
}

fn worker_loop(
    model: &mut dyn Model,
    steps: u64,
    rendezvous: &Rendezvous,
    cancelled: &AtomicBool,
    progress: &Progress,
) -> Result<(), ModelError> {
    let mut done = 0;
    while steps == 0 || done < steps {
        rendezvous.checkpoint();
        if cancelled.load(Ordering::Acquire) {
            break;
        }
        step(model)?;
        model.advance();
        progress.bump();
        done += 1;
    }
    Ok(())
}
