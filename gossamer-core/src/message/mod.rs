//! The block datagram codec.
//!
//! Every datagram on the gossip wire has the same shape: a 4-byte
//! block index followed by exactly one block of native-order `f32`
//! values. The values are either the full authoritative block (master
//! to peer) or an elementwise delta against the sender's last-sent
//! snapshot (peer to master); the two directions are distinguished by
//! block ownership alone, so the wire format carries no tag, no
//! sequence number, and no acknowledgment. A lost datagram is simply
//! refreshed on the sender's next gossip cycle.
//!
//! [`BlockBuffer`] gives zero-copy field access over a borrowed
//! datagram, in both directions; [`BlockMessage`] is the owned
//! counterpart used where allocation does not matter.
//!
//! [`BlockBuffer`]: struct.BlockBuffer.html
//! [`BlockMessage`]: struct.BlockMessage.html

mod buffer;

pub use self::buffer::BlockBuffer;

use anyhow::Context;

/// An error that signals a failure when trying to parse a datagram.
pub type DecodeError = anyhow::Error;

/// An owned block datagram.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockMessage {
    /// Index of the block within the parameter vector.
    pub index: u32,
    /// One block of values: authoritative (from a master) or a delta
    /// (towards a master).
    pub values: Vec<f32>,
}

impl BlockMessage {
    /// The length of the buffer for encoding this message.
    pub fn buffer_length(&self) -> usize {
        crate::block::INDEX_LEN + self.values.len() * 4
    }

    /// Serializes the message in the given buffer.
    ///
    /// # Panics
    /// Panics if the buffer is smaller than [`buffer_length`].
    ///
    /// [`buffer_length`]: #method.buffer_length
    pub fn to_bytes<T: AsMut<[u8]>>(&self, buffer: &mut T) {
        let mut writer = BlockBuffer::new_unchecked(buffer.as_mut());
        writer.set_index(self.index);
        writer.write_values(&self.values);
    }

    /// Deserializes a message from the given buffer.
    ///
    /// # Errors
    /// Fails if the buffer is too short to carry an index and at least
    /// one value, or if the value section is not a whole number of
    /// `f32`s.
    pub fn from_bytes<T: AsRef<[u8]>>(buffer: &T) -> Result<Self, DecodeError> {
        let reader = BlockBuffer::new(buffer.as_ref()).context("invalid block message")?;
        let mut values = vec![0.0; reader.value_count()];
        reader.read_values(&mut values);
        Ok(Self {
            index: reader.index(),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn message_bytes(index: u32, values: &[f32]) -> Vec<u8> {
        let mut bytes = index.to_ne_bytes().to_vec();
        for v in values {
            bytes.extend_from_slice(&v.to_ne_bytes());
        }
        bytes
    }

    #[test]
    fn decodes_a_well_formed_datagram() {
        let bytes = message_bytes(7, &[1.0, -2.5, 0.0]);
        let message = BlockMessage::from_bytes(&bytes).unwrap();
        assert_eq!(
            message,
            BlockMessage {
                index: 7,
                values: vec![1.0, -2.5, 0.0],
            }
        );
    }

    #[test]
    fn encodes_to_the_wire_format() {
        let message = BlockMessage {
            index: 3,
            values: vec![0.5, 4.0],
        };
        let mut bytes = vec![0; message.buffer_length()];
        message.to_bytes(&mut bytes);
        assert_eq!(bytes, message_bytes(3, &[0.5, 4.0]));
    }

    #[test]
    fn rejects_short_and_ragged_buffers() {
        // No room for a single value.
        assert!(BlockMessage::from_bytes(&[0u8; 4]).is_err());
        assert!(BlockMessage::from_bytes(&[0u8; 3]).is_err());
        // Value section not a multiple of 4 bytes.
        assert!(BlockMessage::from_bytes(&[0u8; 10]).is_err());
        assert!(BlockMessage::from_bytes(&[0u8; 8]).is_ok());
    }
}
