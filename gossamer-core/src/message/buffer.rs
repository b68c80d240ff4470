//! Zero-copy access to block datagrams.

use std::convert::TryInto;
use std::ops::{Range, RangeFrom};

use anyhow::anyhow;

use crate::{block::INDEX_LEN, message::DecodeError};

const INDEX_RANGE: Range<usize> = 0..INDEX_LEN;
const VALUES_RANGE: RangeFrom<usize> = INDEX_LEN..;

/// A wrapper around a buffer that contains a block datagram.
///
/// It provides getters and setters to access the two fields of the
/// datagram safely: the block index and the value section. The same
/// wrapper serves the send path (over a reusable outgoing buffer) and
/// the receive path (over the bytes of an incoming datagram).
///
/// # Examples
/// ## Reading a datagram
///
/// ```rust
/// use gossamer_core::message::BlockBuffer;
///
/// let mut bytes = 5u32.to_ne_bytes().to_vec(); // block index = 5
/// bytes.extend(&1.0f32.to_ne_bytes());
/// bytes.extend(&(-0.25f32).to_ne_bytes());
///
/// let buffer = BlockBuffer::new(&bytes[..]).unwrap();
/// assert_eq!(buffer.index(), 5);
/// assert_eq!(buffer.value_count(), 2);
/// let mut values = [0.0; 2];
/// buffer.read_values(&mut values);
/// assert_eq!(values, [1.0, -0.25]);
/// ```
pub struct BlockBuffer<T> {
    inner: T,
}

impl<T: AsRef<[u8]>> BlockBuffer<T> {
    /// Performs bound checks on `bytes` and returns a new
    /// [`BlockBuffer`].
    ///
    /// # Errors
    /// Fails if the buffer cannot carry an index and at least one
    /// whole `f32` value.
    ///
    /// [`BlockBuffer`]: struct.BlockBuffer.html
    pub fn new(bytes: T) -> Result<Self, DecodeError> {
        let buffer = Self { inner: bytes };
        buffer.check_buffer_length()?;
        Ok(buffer)
    }

    /// Returns a [`BlockBuffer`] without performing any bound checks.
    ///
    /// This means accessing the various fields may panic if the data
    /// is invalid.
    ///
    /// [`BlockBuffer`]: struct.BlockBuffer.html
    pub fn new_unchecked(bytes: T) -> Self {
        Self { inner: bytes }
    }

    /// Performs bound checks to ensure the fields can be accessed
    /// without panicking.
    pub fn check_buffer_length(&self) -> Result<(), DecodeError> {
        let len = self.inner.as_ref().len();
        if len < INDEX_LEN + 4 {
            return Err(anyhow!(
                "invalid buffer length: {} < {}",
                len,
                INDEX_LEN + 4
            ));
        }
        if (len - INDEX_LEN) % 4 != 0 {
            return Err(anyhow!(
                "invalid buffer length: {} value bytes is not a whole number of f32s",
                len - INDEX_LEN
            ));
        }
        Ok(())
    }

    /// Gets the block index field, in native byte order.
    ///
    /// # Panics
    /// May panic if the buffer has not been checked before.
    pub fn index(&self) -> u32 {
        u32::from_ne_bytes(self.inner.as_ref()[INDEX_RANGE].try_into().unwrap())
    }

    /// Number of `f32` values the value section holds.
    pub fn value_count(&self) -> usize {
        (self.inner.as_ref().len() - INDEX_LEN) / 4
    }

    /// Decodes the value section into `dst`.
    ///
    /// # Panics
    /// Panics if `dst.len()` differs from [`value_count`].
    ///
    /// [`value_count`]: #method.value_count
    pub fn read_values(&self, dst: &mut [f32]) {
        let values = &self.inner.as_ref()[VALUES_RANGE];
        assert_eq!(dst.len() * 4, values.len());
        for (v, chunk) in dst.iter_mut().zip(values.chunks_exact(4)) {
            *v = f32::from_ne_bytes(chunk.try_into().unwrap());
        }
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> BlockBuffer<T> {
    /// Sets the block index field, in native byte order.
    ///
    /// # Panics
    /// May panic if the buffer has not been checked before.
    pub fn set_index(&mut self, index: u32) {
        self.inner.as_mut()[INDEX_RANGE].copy_from_slice(&index.to_ne_bytes());
    }

    /// Encodes `src` into the value section.
    ///
    /// # Panics
    /// Panics if `src.len()` differs from [`value_count`].
    ///
    /// [`value_count`]: #method.value_count
    pub fn write_values(&mut self, src: &[f32]) {
        let values = &mut self.inner.as_mut()[VALUES_RANGE];
        assert_eq!(src.len() * 4, values.len());
        for (v, chunk) in src.iter().zip(values.chunks_exact_mut(4)) {
            chunk.copy_from_slice(&v.to_ne_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fields_from_raw_bytes() {
        let mut bytes = 42u32.to_ne_bytes().to_vec();
        bytes.extend(&1.5f32.to_ne_bytes());
        bytes.extend(&(-3.0f32).to_ne_bytes());

        let buffer = BlockBuffer::new(&bytes[..]).unwrap();
        assert_eq!(buffer.index(), 42);
        assert_eq!(buffer.value_count(), 2);
        let mut values = [0.0f32; 2];
        buffer.read_values(&mut values);
        assert_eq!(values, [1.5, -3.0]);
    }

    #[test]
    fn writes_fields_in_place() {
        let mut bytes = vec![0u8; 4 + 8];
        let mut buffer = BlockBuffer::new_unchecked(&mut bytes[..]);
        buffer.set_index(8);
        buffer.write_values(&[0.25, 0.75]);

        let mut expected = 8u32.to_ne_bytes().to_vec();
        expected.extend(&0.25f32.to_ne_bytes());
        expected.extend(&0.75f32.to_ne_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn length_checks_catch_truncated_datagrams() {
        assert!(BlockBuffer::new(&[0u8; 0][..]).is_err());
        assert!(BlockBuffer::new(&[0u8; 7][..]).is_err());
        assert!(BlockBuffer::new(&[0u8; 9][..]).is_err());
        assert!(BlockBuffer::new(&[0u8; 8][..]).is_ok());
    }
}
