use crate::{Frame, FRAME_LEN, PAYLOAD_LEN, START_BYTE};
use serial_link::{ByteLink, Result};
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReaderState {
    /// No partial frame held.
    Idle,
    /// Dropping bytes until a start byte shows up.
    Seeking,
    /// Start byte consumed, waiting for the payload.
    Collecting,
}

/// Resynchronizing reader for fixed-length `$`-prefixed frames.
///
/// [`FrameReader::poll`] never waits for bytes that are not already buffered. A
/// partially received frame is kept across calls, so the next poll resumes collecting
/// without scanning for another start byte.
#[derive(Debug)]
pub struct FrameReader {
    state: ReaderState,
    buf: [u8; FRAME_LEN],
    noise: u64,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            state: ReaderState::Idle,
            buf: [0u8; FRAME_LEN],
            noise: 0,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Bytes discarded while seeking, since construction.
    pub fn noise_bytes(&self) -> u64 {
        self.noise
    }

    /// Return a fresh frame if one completed with the bytes available right now.
    pub fn poll<L: ByteLink + ?Sized>(&mut self, link: &mut L) -> Result<Option<Frame>> {
        if self.state != ReaderState::Collecting && !self.seek(link) {
            return Ok(None);
        }

        let available = link.pending();
        if available < PAYLOAD_LEN {
            trace!("partial frame: {available}/{PAYLOAD_LEN} payload bytes buffered");
            return Ok(None);
        }

        if let Err(e) = link.read_exact(&mut self.buf[1..]) {
            self.state = ReaderState::Idle;
            return Err(e);
        }
        self.state = ReaderState::Idle;
        Ok(Frame::from_array(self.buf))
    }

    /// Drop bytes up to and including the next start byte. True once one was found.
    fn seek<L: ByteLink + ?Sized>(&mut self, link: &mut L) -> bool {
        let mut dropped = 0u64;
        while link.pending() > 0 {
            self.state = ReaderState::Seeking;
            match link.read_byte() {
                Some(START_BYTE) => {
                    self.buf[0] = START_BYTE;
                    self.state = ReaderState::Collecting;
                    break;
                }
                Some(_) => dropped += 1,
                None => break,
            }
        }
        if dropped > 0 {
            debug!("resync: dropped {dropped} byte(s) before start byte");
            self.noise += dropped;
        }
        self.state == ReaderState::Collecting
    }
}
