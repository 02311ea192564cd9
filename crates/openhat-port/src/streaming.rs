//! Streaming port buffers.
//!
//! A streaming port carries no value; it moves bytes between a device and
//! the controller. The device side pushes inbound bytes and drains outbound
//! bytes; the controller side reads and writes.

use std::collections::VecDeque;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamingState {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
}

impl StreamingState {
    /// Queue bytes for the device. Returns the number of bytes accepted.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        self.outbound.extend_from_slice(bytes);
        bytes.len()
    }

    /// Number of bytes ready to be read.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inbound.len()
    }

    pub fn read(&mut self) -> Option<u8> {
        self.inbound.pop_front()
    }

    /// Device side: make bytes available to readers.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes);
    }

    /// Device side: take everything written so far.
    pub fn take_outbound(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }
}
