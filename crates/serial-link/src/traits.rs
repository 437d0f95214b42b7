use crate::{DeviceIdentity, Result};

/// Byte-level access to an open serial stream.
///
/// Implementations never block in [`ByteLink::pending`] or [`ByteLink::read_byte`].
/// [`ByteLink::read_exact`] may block, so callers only invoke it once
/// [`ByteLink::pending`] has confirmed that enough bytes are buffered.
pub trait ByteLink {
    /// Number of inbound bytes buffered by the driver. A failed probe reads as zero.
    fn pending(&mut self) -> usize;

    /// Read one byte if one is buffered.
    fn read_byte(&mut self) -> Option<u8>;

    /// Fill `buf` completely.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Write an outbound frame in one call.
    fn write_frame(&mut self, bytes: &[u8]) -> Result<()>;

    /// Discard everything currently pending, in chunks bounded by the pending count.
    /// Returns the number of bytes dropped.
    fn flush_input(&mut self) -> Result<usize> {
        let mut scratch = [0u8; 512];
        let mut dropped = 0;
        loop {
            let available = self.pending();
            if available == 0 {
                return Ok(dropped);
            }
            let n = available.min(scratch.len());
            self.read_exact(&mut scratch[..n])?;
            dropped += n;
        }
    }
}

/// Source of TTY device identities (udev on Linux, or a fixed list in tests).
pub trait DeviceEnumerator {
    fn enumerate(&self) -> Result<Vec<DeviceIdentity>>;
}

impl<T: ByteLink + ?Sized> ByteLink for Box<T> {
    fn pending(&mut self) -> usize {
        (**self).pending()
    }

    fn read_byte(&mut self) -> Option<u8> {
        (**self).read_byte()
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact(buf)
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_frame(bytes)
    }

    fn flush_input(&mut self) -> Result<usize> {
        (**self).flush_input()
    }
}
