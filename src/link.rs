// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;

use crate::NetError;

/// Frame level access to the Ethernet controller.
pub trait Link {
    /// Queue one complete Ethernet frame for transmission.
    fn transmit(&mut self, frame: &[u8]) -> Result<(), NetError>;

    fn is_data_available(&mut self) -> bool;

    /// Copy the next received frame into `buf`, returning its length or
    /// `None` when nothing is pending. Frames longer than `buf` are
    /// truncated.
    fn receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>, NetError>;

    fn is_link_up(&self) -> bool;
}

/// In-memory link: frames injected by the caller are received by the stack
/// and transmitted frames are captured for inspection.
#[derive(Debug, Clone)]
pub struct MemoryLink {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    link_up: bool,
}

impl Default for MemoryLink {
    fn default() -> Self {
        Self {
            inbound: VecDeque::new(),
            sent: Vec::new(),
            link_up: true,
        }
    }
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&mut self, frame: Vec<u8>) {
        self.inbound.push_back(frame);
    }

    /// Drain every frame transmitted so far.
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.sent)
    }

    pub fn sent(&self) -> &[Vec<u8>] {
        self.sent.as_slice()
    }

    pub fn set_link_up(&mut self, link_up: bool) {
        self.link_up = link_up;
    }
}

impl Link for MemoryLink {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), NetError> {
        log::trace!("Memory link transmit {frame:?}");
        self.sent.push(frame.to_vec());
        Ok(())
    }

    fn is_data_available(&mut self) -> bool {
        !self.inbound.is_empty()
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>, NetError> {
        Ok(self.inbound.pop_front().map(|frame| {
            let len = frame.len().min(buf.len());
            buf[..len].copy_from_slice(&frame[..len]);
            len
        }))
    }

    fn is_link_up(&self) -> bool {
        self.link_up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_link_fifo() {
        let mut link = MemoryLink::new();
        link.inject(vec![1, 2, 3]);
        link.inject(vec![4, 5]);
        let mut buf = [0u8; 2];
        assert!(link.is_data_available());
        assert_eq!(link.receive(&mut buf).unwrap(), Some(2));
        assert_eq!(buf, [1, 2]);
        assert_eq!(link.receive(&mut buf).unwrap(), Some(2));
        assert_eq!(buf, [4, 5]);
        assert_eq!(link.receive(&mut buf).unwrap(), None);

        link.transmit(&[9]).unwrap();
        assert_eq!(link.take_sent(), vec![vec![9]]);
        assert!(link.sent().is_empty());
    }
}
