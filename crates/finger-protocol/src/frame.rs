use core::fmt;

/// Every inbound and outbound frame begins with this byte.
pub const START_BYTE: u8 = b'$';
/// Bytes that follow the start byte in a telemetry frame.
pub const PAYLOAD_LEN: usize = 10;
pub const FRAME_LEN: usize = 1 + PAYLOAD_LEN;

pub const TORQUE_DIGITS: [usize; 3] = [1, 2, 3];
pub const POSITION_DIGITS: [usize; 3] = [6, 7, 8];

/// One complete, start-aligned telemetry frame.
///
/// Layout: `$`, three torque digits, two filler bytes, three position digits, one
/// trailing filler byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    /// `None` unless `bytes` is exactly one frame long and starts with [`START_BYTE`].
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; FRAME_LEN] = bytes.try_into().ok()?;
        Self::from_array(raw)
    }

    pub fn from_array(raw: [u8; FRAME_LEN]) -> Option<Self> {
        if raw[0] == START_BYTE {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    pub fn byte(&self, index: usize) -> u8 {
        self.0[index]
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02X}")?;
            }
        }
        Ok(())
    }
}
