//! # Gossamer trainer
//!
//! Training coordinators that drive a [`Model`] against the shared
//! parameter vector. Two execution strategies implement the same
//! [`Trainer`] contract:
//!
//! - [`SingleThreaded`] runs one worker, either on the caller's thread
//!   (the deterministic baseline used to validate correctness) or on a
//!   dedicated thread;
//! - [`Threaded`] partitions the dataset across several workers, each
//!   owning a private fork of the model topology while sharing the
//!   same parameter vector, and mutating it without locks in the
//!   asynchronous ("Hogwild") style. It adds cooperative
//!   [`cancel`], and [`suspend`]/[`resume`] built on a two-phase
//!   [`Rendezvous`], so a caller can read a quiescent-ish snapshot of
//!   the parameters without permanently stopping training.
//!
//! Alternate execution backends (GPU-offloaded, natively compiled) can
//! implement [`Trainer`] as additional strategies; none ship in this
//! crate.
//!
//! [`Model`]: model/trait.Model.html
//! [`Trainer`]: trait.Trainer.html
//! [`SingleThreaded`]: struct.SingleThreaded.html
//! [`Threaded`]: struct.Threaded.html
//! [`cancel`]: struct.Threaded.html#method.cancel
//! [`suspend`]: struct.Threaded.html#method.suspend
//! [`resume`]: struct.Threaded.html#method.resume
//! [`Rendezvous`]: rendezvous/struct.Rendezvous.html

#[macro_use]
extern crate tracing;

pub mod model;
pub mod rendezvous;

mod single;
mod threaded;

#[cfg(test)]
mod testing;

pub use self::{
    model::{Model, ModelError, Progress},
    rendezvous::Rendezvous,
    single::SingleThreaded,
    threaded::Threaded,
};

use thiserror::Error;

#[derive(Debug, Error)]
/// An error returned by a training coordinator.
pub enum TrainerError {
    #[error("trainer already started")]
    AlreadyStarted,
    #[error("trainer was not started")]
    NotStarted,
    #[error("failed to spawn worker thread")]
    Spawn(#[from] std::io::Error),
    #[error("worker {id} failed: {source}")]
    Worker {
        id: usize,
        #[source]
        source: ModelError,
    },
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),
}

/// A training execution strategy.
///
/// All strategies run full forward+backward steps against the shared
/// parameter vector and expose the same control surface; callers pick
/// a strategy, not an API.
pub trait Trainer {
    /// A read-only handle to one worker's live topology, for
    /// inspection. The weights it sees are the shared vector's current
    /// (racy) values.
    fn model(&self) -> &dyn Model;

    /// Starts the workers. Non-blocking.
    ///
    /// # Errors
    /// Fails if the trainer was already started.
    fn start(&mut self) -> Result<(), TrainerError>;

    /// Blocks until every worker has finished its iteration budget and
    /// surfaces the first worker failure, if any.
    fn join(&mut self) -> Result<(), TrainerError>;

    /// Total number of samples processed across all workers.
    ///
    /// Thread-safe and monotonically non-decreasing.
    fn processed(&self) -> u64;
}

/// One training step: forward pass, clear the interior error
/// accumulators, backward pass.
pub(crate) fn step(model: &mut dyn Model) -> Result<(), ModelError> {
    model.forward()?;
    model.reset_errors();
    model.backward()
}
