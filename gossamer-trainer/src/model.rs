//! The model collaborator.
//!
//! The trainer does not know any layer math. It drives a [`Model`]:
//! forward and backward passes, error-accumulator resets, a dataset
//! cursor, and a factory that produces per-worker topology forks bound
//! to the same shared parameter vector. Everything else (activation
//! functions, loss, momentum and regularization policy, where the
//! samples actually live) belongs to the implementor.
//!
//! [`Model`]: trait.Model.html

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use gossamer_core::ParameterVector;

/// An error raised by a model implementation during a step.
pub type ModelError = anyhow::Error;

/// A cloneable handle on the aggregate number of samples processed
/// across all workers of a coordinator.
///
/// Models read it to compute learning-rate and momentum schedules from
/// cluster-wide progress rather than per-worker progress.
#[derive(Debug, Clone, Default)]
pub struct Progress(Arc<AtomicU64>);

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// The aggregate sample count. Approximate while workers run.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Records one processed sample. Called once per worker step.
    pub(crate) fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// A trainable model bound to a shared parameter vector.
///
/// Implementations hold their private working state (activations,
/// error accumulators, dataset cursor) per instance, while all
/// instances forked from one another index into the same shared
/// [`ParameterVector`]. The trainer may therefore run many forks
/// concurrently; parameter writes race benignly by design.
pub trait Model: Send {
    /// Runs the forward pass for the sample under the cursor,
    /// producing activations for all layers.
    fn forward(&mut self) -> Result<(), ModelError>;

    /// Computes and applies gradients for the sample under the cursor,
    /// using the implementation's own momentum/regularization policy.
    fn backward(&mut self) -> Result<(), ModelError>;

    /// Clears the error accumulators of all interior layers. Called
    /// between the forward and backward pass of every step.
    fn reset_errors(&mut self);

    /// Total number of trainable parameters. Defines the minimum
    /// length of the shared parameter vector.
    fn params(&self) -> usize;

    /// Number of samples in the dataset.
    fn dataset_len(&self) -> u64;

    /// The current dataset cursor.
    fn cursor(&self) -> u64;

    /// Moves the cursor to `pos`.
    fn seek(&mut self, pos: u64);

    /// Advances the cursor by one sample, wrapping modulo
    /// [`dataset_len`].
    ///
    /// [`dataset_len`]: #tymethod.dataset_len
    fn advance(&mut self);

    /// Gives the model the aggregate progress counter to drive its
    /// schedules.
    fn bind_progress(&mut self, progress: Progress);

    /// Builds a fresh topology bound to the given shared parameter
    /// vector: private working state, shared weights.
    ///
    /// This is an explicit factory rather than a clone so that no
    /// accidental aliasing of per-worker state can occur.
    fn fork(&self, params: &Arc<ParameterVector>) -> Box<dyn Model>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_shared_between_clones() {
        let progress = Progress::new();
        let view = progress.clone();
        assert_eq!(view.get(), 0);
        progress.bump();
        progress.bump();
        assert_eq!(view.get(), 2);
    }
}
