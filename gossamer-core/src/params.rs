//! The shared parameter vector.
//!
//! One flat buffer of `f32` values holds every trainable parameter of
//! the model. Training workers and the gossip streamer all read and
//! write it concurrently without locks; approximate consistency is the
//! point, not a defect. See [`ParameterVector`] for the contract.
//!
//! [`ParameterVector`]: struct.ParameterVector.html

use std::cell::UnsafeCell;

use rand::Rng;

use crate::block::BlockLayout;

/// The flat buffer of trainable values, shared by every worker thread
/// and the gossip streamer.
///
/// The buffer is created once, its length rounded up to a multiple of
/// the block length, and never resized. All access goes through
/// [`view`] and [`view_mut`], which hand out overlapping unsynchronized
/// slices: concurrent writers may interleave arbitrarily and a reader
/// may observe a value mid-update. This is the deliberate lock-free
/// ("Hogwild") design: workers tolerate each other's noise, and the
/// gossip protocol tolerates torn blocks the same way it tolerates
/// lost datagrams. Do not "fix" this by adding synchronization that
/// would serialize writers.
///
/// [`view`]: #method.view
/// [`view_mut`]: #method.view_mut
pub struct ParameterVector {
    data: UnsafeCell<Box<[f32]>>,
}

// SAFETY: the buffer is plain `f32` data with a fixed length. Races on
// the values themselves are accepted by the callers of `view_mut`; no
// pointer or length ever changes after construction, so handing slices
// across threads cannot corrupt memory, only values.
unsafe impl Send for ParameterVector {}
unsafe impl Sync for ParameterVector {}

impl ParameterVector {
    /// Creates a zero-filled vector of at least `min_len` values,
    /// padded up to a multiple of the layout's block length.
    pub fn zeroed(min_len: usize, layout: BlockLayout) -> Self {
        let len = layout.padded_len(min_len);
        Self {
            data: UnsafeCell::new(vec![0.0; len].into_boxed_slice()),
        }
    }

    /// Creates a vector of at least `min_len` values drawn uniformly
    /// from `[-amplitude, amplitude)`, padded like [`zeroed`].
    ///
    /// Padding values are left at zero; they are gossiped like any
    /// other block but no layer maps onto them.
    ///
    /// [`zeroed`]: #method.zeroed
    pub fn randomized<R: Rng>(
        min_len: usize,
        layout: BlockLayout,
        rng: &mut R,
        amplitude: f32,
    ) -> Self {
        let vector = Self::zeroed(min_len, layout);
        for w in vector.view_mut()[..min_len].iter_mut() {
            *w = rng.gen_range(-amplitude..amplitude);
        }
        vector
    }

    /// Total number of values, always a multiple of the block length.
    pub fn len(&self) -> usize {
        self.view().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A racy read view of the whole vector.
    ///
    /// Values read while another thread writes may be stale or torn
    /// between elements; callers must tolerate that.
    pub fn view(&self) -> &[f32] {
        unsafe { &*self.data.get() }
    }

    /// A racy write view of the whole vector.
    ///
    /// Multiple threads may hold write views at once; last write wins
    /// per element, with no ordering between elements.
    #[allow(clippy::mut_from_ref)]
    pub fn view_mut(&self) -> &mut [f32] {
        unsafe { &mut *self.data.get() }
    }

    /// Copies the current values out. The copy is only as consistent
    /// as a racy read can be.
    pub fn snapshot(&self) -> Vec<f32> {
        self.view().to_vec()
    }
}

/// The parameter range of one layer within the shared vector.
///
/// Layers never hold references to one another or to the buffer; they
/// record where their weights live and index into whatever vector the
/// model is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpan {
    pub offset: usize,
    pub len: usize,
}

impl ParamSpan {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Sequentially assigns parameter spans while a model topology is
/// being laid out.
///
/// The final [`len`] is the minimum parameter-vector length for the
/// topology; pass it to [`ParameterVector::zeroed`] or
/// [`ParameterVector::randomized`], which pad it to a block multiple.
///
/// [`len`]: #method.len
/// [`ParameterVector::zeroed`]: struct.ParameterVector.html#method.zeroed
/// [`ParameterVector::randomized`]: struct.ParameterVector.html#method.randomized
#[derive(Debug, Default)]
pub struct SpanAllocator {
    next: usize,
}

impl SpanAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next `len` values.
    pub fn alloc(&mut self, len: usize) -> ParamSpan {
        let span = ParamSpan {
            offset: self.next,
            len,
        };
        self.next += len;
        span
    }

    /// Total number of values allocated so far.
    pub fn len(&self) -> usize {
        self.next
    }

    pub fn is_empty(&self) -> bool {
        self.next == 0
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn layout() -> BlockLayout {
        BlockLayout::new(100).unwrap()
    }

    #[test]
    fn pads_to_a_block_multiple() {
        let params = ParameterVector::zeroed(250, layout());
        assert_eq!(params.len(), 300);
        assert!(params.view().iter().all(|&w| w == 0.0));
    }

    #[test]
    fn views_share_the_same_storage() {
        let params = ParameterVector::zeroed(100, layout());
        params.view_mut()[42] = 1.5;
        assert_eq!(params.view()[42], 1.5);
        assert_eq!(params.snapshot()[42], 1.5);
    }

    #[test]
    fn randomized_is_bounded_and_seeded() {
        let layout = layout();
        let a = ParameterVector::randomized(150, layout, &mut ChaCha20Rng::seed_from_u64(7), 0.01);
        let b = ParameterVector::randomized(150, layout, &mut ChaCha20Rng::seed_from_u64(7), 0.01);
        assert_eq!(a.snapshot(), b.snapshot());
        assert!(a.view()[..150].iter().all(|w| w.abs() <= 0.01));
        assert!(a.view()[..150].iter().any(|&w| w != 0.0));
        // Padding stays zeroed.
        assert!(a.view()[150..].iter().all(|&w| w == 0.0));
    }

    #[test]
    fn spans_are_assigned_sequentially() {
        let mut spans = SpanAllocator::new();
        let weights = spans.alloc(12);
        let biases = spans.alloc(4);
        assert_eq!(weights, ParamSpan { offset: 0, len: 12 });
        assert_eq!(biases.range(), 12..16);
        assert_eq!(spans.len(), 16);
    }
}
