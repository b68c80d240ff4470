//! Block layout of the parameter vector.
//!
//! The parameter vector is partitioned into fixed-size blocks, the
//! atomic unit of network transmission. A block datagram carries a
//! 4-byte block index followed by `block_len` native-order `f32`
//! values, and must fit in a single unfragmented UDP datagram.

use std::ops::Range;

use thiserror::Error;

/// The largest UDP payload that fits an Ethernet frame without
/// fragmentation: the 1500-byte MTU minus the IPv4 and UDP headers.
pub const MAX_UDP_PAYLOAD: usize = 1500 - 20 - 8;

/// Length of the block index field at the start of each datagram.
pub const INDEX_LEN: usize = 4;

/// The largest admissible block length, in parameters.
///
/// Chosen so that `INDEX_LEN + MAX_BLOCK_LEN * 4 <= MAX_UDP_PAYLOAD`.
pub const MAX_BLOCK_LEN: usize = MAX_UDP_PAYLOAD / 4 - 1;

#[derive(Debug, Error, PartialEq, Eq)]
/// An invalid block layout configuration.
pub enum BlockLayoutError {
    #[error("block length must be at least 1")]
    Empty,
    #[error("block length {0} exceeds the {max} values that fit an unfragmented datagram", max = MAX_BLOCK_LEN)]
    TooLarge(usize),
}

/// The block partitioning of a parameter vector.
///
/// All nodes of a cluster must agree on the same layout: the datagram
/// size is fixed per cluster, and a received datagram whose value count
/// does not match the local layout is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    block_len: usize,
}

impl BlockLayout {
    /// Creates a layout with the given block length, in parameters.
    ///
    /// # Errors
    /// Fails if a block would not fit in a single unfragmented UDP
    /// datagram, before any resource is opened.
    pub fn new(block_len: usize) -> Result<Self, BlockLayoutError> {
        if block_len == 0 {
            return Err(BlockLayoutError::Empty);
        }
        if block_len > MAX_BLOCK_LEN {
            return Err(BlockLayoutError::TooLarge(block_len));
        }
        Ok(Self { block_len })
    }

    /// The layout that saturates a single datagram.
    pub fn max() -> Self {
        Self {
            block_len: MAX_BLOCK_LEN,
        }
    }

    /// Number of parameters per block.
    pub fn block_len(self) -> usize {
        self.block_len
    }

    /// Size in bytes of one block datagram.
    pub fn datagram_len(self) -> usize {
        INDEX_LEN + self.block_len * 4
    }

    /// Rounds `min_len` up to the next multiple of the block length.
    pub fn padded_len(self, min_len: usize) -> usize {
        match min_len % self.block_len {
            0 => min_len,
            rem => min_len + self.block_len - rem,
        }
    }

    /// Number of blocks of a parameter vector of `params_len` values.
    ///
    /// `params_len` must be a multiple of the block length, which
    /// [`padded_len`] guarantees.
    ///
    /// [`padded_len`]: #method.padded_len
    pub fn blocks(self, params_len: usize) -> usize {
        debug_assert_eq!(params_len % self.block_len, 0);
        params_len / self.block_len
    }

    /// The index range a block covers within the parameter vector.
    pub fn span(self, block: usize) -> Range<usize> {
        let start = block * self.block_len;
        start..start + self.block_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_block_fits_a_datagram() {
        assert_eq!(MAX_BLOCK_LEN, 367);
        let layout = BlockLayout::max();
        assert!(layout.datagram_len() <= MAX_UDP_PAYLOAD);
        // One more value would no longer fit.
        assert!(INDEX_LEN + (MAX_BLOCK_LEN + 1) * 4 > MAX_UDP_PAYLOAD);
    }

    #[test]
    fn rejects_out_of_range_lengths() {
        assert_eq!(BlockLayout::new(0), Err(BlockLayoutError::Empty));
        assert_eq!(
            BlockLayout::new(MAX_BLOCK_LEN + 1),
            Err(BlockLayoutError::TooLarge(MAX_BLOCK_LEN + 1))
        );
        assert!(BlockLayout::new(1).is_ok());
        assert!(BlockLayout::new(MAX_BLOCK_LEN).is_ok());
    }

    #[test]
    fn pads_to_block_multiples() {
        let layout = BlockLayout::new(100).unwrap();
        assert_eq!(layout.padded_len(0), 0);
        assert_eq!(layout.padded_len(1), 100);
        assert_eq!(layout.padded_len(100), 100);
        assert_eq!(layout.padded_len(101), 200);
        assert_eq!(layout.blocks(800), 8);
    }

    #[test]
    fn spans_tile_the_vector() {
        let layout = BlockLayout::new(100).unwrap();
        assert_eq!(layout.span(0), 0..100);
        assert_eq!(layout.span(7), 700..800);
    }
}
