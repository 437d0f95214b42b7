use crate::{ByteLink, DeviceEnumerator, DeviceIdentity, LinkError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct MockState {
    inbound: VecDeque<u8>,
    written: Vec<Vec<u8>>,
}

/// An in-process serial stream. Clones share the same buffers, so a test can keep a
/// handle for feeding bytes after moving the link into a reader or control loop.
#[derive(Clone, Default)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue bytes as if the device had sent them.
    pub fn feed(&self, bytes: &[u8]) {
        self.state().inbound.extend(bytes.iter().copied());
    }

    /// Frames written so far, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state().written.clone()
    }

    pub fn buffered(&self) -> usize {
        self.state().inbound.len()
    }
}

impl ByteLink for MockLink {
    fn pending(&mut self) -> usize {
        self.state().inbound.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.state().inbound.pop_front()
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut state = self.state();
        if state.inbound.len() < buf.len() {
            return Err(LinkError::ShortRead {
                wanted: buf.len(),
                got: state.inbound.len(),
            });
        }
        for slot in buf.iter_mut() {
            *slot = state.inbound.pop_front().unwrap_or_default();
        }
        Ok(())
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        self.state().written.push(bytes.to_vec());
        Ok(())
    }
}

/// A fixed device list standing in for udev.
pub struct MockEnumerator {
    devices: Vec<DeviceIdentity>,
    fail: bool,
}

impl MockEnumerator {
    pub fn new(devices: Vec<DeviceIdentity>) -> Self {
        Self {
            devices,
            fail: false,
        }
    }

    /// An enumerator whose context cannot be opened.
    pub fn failing() -> Self {
        Self {
            devices: Vec::new(),
            fail: true,
        }
    }
}

impl DeviceEnumerator for MockEnumerator {
    fn enumerate(&self) -> Result<Vec<DeviceIdentity>> {
        if self.fail {
            return Err(LinkError::Io("mock enumeration context unavailable".into()));
        }
        Ok(self.devices.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_drops_everything_pending() {
        let mut link = MockLink::new();
        link.feed(&[0xAA; 1500]);
        assert_eq!(link.flush_input().unwrap(), 1500);
        assert_eq!(link.pending(), 0);
        assert_eq!(link.read_byte(), None);
    }

    #[test]
    fn read_exact_refuses_short_buffers() {
        let mut link = MockLink::new();
        link.feed(b"abc");
        let mut buf = [0u8; 4];
        assert!(matches!(
            link.read_exact(&mut buf),
            Err(LinkError::ShortRead { wanted: 4, got: 3 })
        ));
        assert_eq!(link.pending(), 3);
    }

    #[test]
    fn clones_share_buffers() {
        let handle = MockLink::new();
        let mut link = handle.clone();
        handle.feed(b"$");
        assert_eq!(link.read_byte(), Some(b'$'));
        link.write_frame(b"$S****").unwrap();
        assert_eq!(handle.written(), vec![b"$S****".to_vec()]);
    }
}
