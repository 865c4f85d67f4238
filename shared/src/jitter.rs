//! Jitter buffer: every input the server has not acknowledged yet, resent in each batch.
//!
//! Loss is repaired through redundancy instead of retransmission tracking. Each outgoing batch
//! carries the entire unacknowledged backlog, and the receiver deduplicates by index.
//!
//! Wire layout (big-endian):
//!
//! ```text
//! u32 count | count × (u32 index | u8 input bitset)
//! ```

use crate::error::MessageError;
use crate::input::{Input, INPUT_SIZE};
use std::collections::VecDeque;

const COUNT_SIZE: usize = 4;
const ENTRY_SIZE: usize = 4 + INPUT_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedInput {
    pub index: u32,
    pub input: Input,
}

/// Oldest-first backlog of unacknowledged inputs with strictly increasing indices.
#[derive(Debug, Clone, Default)]
pub struct InputBuffer {
    entries: VecDeque<IndexedInput>,
    next_index: u32,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an input under the next index and returns that index.
    pub fn append(&mut self, input: Input) -> u32 {
        let index = self.next_index;
        self.entries.push_back(IndexedInput { index, input });
        self.next_index = self.next_index.wrapping_add(1);
        index
    }

    /// Drops every entry with an index up to and including `ack`.
    ///
    /// Entries are stored in increasing index order, so a prefix scan is enough. `ack` does not
    /// need to be present in the buffer.
    pub fn discard_until(&mut self, ack: u32) {
        while self.entries.front().is_some_and(|entry| entry.index <= ack) {
            self.entries.pop_front();
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_batch(self.entries.iter().copied(), self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedInput> {
        self.entries.iter()
    }

    pub fn indices(&self) -> Vec<u32> {
        self.entries.iter().map(|entry| entry.index).collect()
    }

    pub fn inputs(&self) -> Vec<Input> {
        self.entries.iter().map(|entry| entry.input).collect()
    }
}

fn encode_batch(entries: impl Iterator<Item = IndexedInput>, count: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(COUNT_SIZE + count * ENTRY_SIZE);
    bytes.extend_from_slice(&(count as u32).to_be_bytes());
    for entry in entries {
        bytes.extend_from_slice(&entry.index.to_be_bytes());
        bytes.push(entry.input.to_byte());
    }
    bytes
}

/// Decodes a batch produced by [`InputBuffer::encode`]. Trailing bytes are ignored.
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<IndexedInput>, MessageError> {
    if bytes.len() < COUNT_SIZE {
        return Err(MessageError::Truncated {
            what: "input batch header",
            len: bytes.len(),
            needed: COUNT_SIZE,
        });
    }

    let count = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let needed = count
        .checked_mul(ENTRY_SIZE)
        .and_then(|body| body.checked_add(COUNT_SIZE))
        .unwrap_or(usize::MAX);
    if bytes.len() < needed {
        return Err(MessageError::Truncated {
            what: "input batch",
            len: bytes.len(),
            needed,
        });
    }

    let entries = bytes[COUNT_SIZE..needed]
        .chunks_exact(ENTRY_SIZE)
        .map(|chunk| IndexedInput {
            index: u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
            input: Input::from_byte(chunk[4]),
        })
        .collect();

    Ok(entries)
}
