use crate::{EncodeError, START_BYTE};
use core::fmt;
use core::str::FromStr;

/// Payload bytes plus the trailing NUL.
pub const COMMAND_FRAME_LEN: usize = 7;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum VelocityLevel {
    Low,
}

impl VelocityLevel {
    fn code(self) -> u8 {
        match self {
            VelocityLevel::Low => b'S',
        }
    }
}

/// Discrete directive for the actuator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CommandRecord {
    Open,
    Close,
    Stop,
    SetVelocity(VelocityLevel),
}

impl CommandRecord {
    /// Map an external state string ("OPEN", "CLOSE", "STOP") to a command.
    pub fn from_state(state: &str) -> Result<Self, EncodeError> {
        match state.trim() {
            "OPEN" => Ok(CommandRecord::Open),
            "CLOSE" => Ok(CommandRecord::Close),
            "STOP" => Ok(CommandRecord::Stop),
            other => Err(EncodeError::UnknownState(other.to_string())),
        }
    }
}

impl FromStr for CommandRecord {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandRecord::from_state(s)
    }
}

/// Encoded outbound frame: `$`, two mode bytes, `*` filler, NUL.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommandFrame([u8; COMMAND_FRAME_LEN]);

impl CommandFrame {
    /// All seven bytes including the NUL terminator.
    pub fn as_bytes(&self) -> &[u8; COMMAND_FRAME_LEN] {
        &self.0
    }

    /// The six bytes that go on the wire; the terminator is never transmitted.
    pub fn payload(&self) -> &[u8] {
        &self.0[..COMMAND_FRAME_LEN - 1]
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.payload() {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

pub fn encode(cmd: CommandRecord) -> CommandFrame {
    let (first, second) = match cmd {
        CommandRecord::Open => (b'O', b'*'),
        CommandRecord::Close => (b'C', b'*'),
        CommandRecord::Stop => (b'S', b'*'),
        CommandRecord::SetVelocity(level) => (b'V', level.code()),
    };
    CommandFrame([START_BYTE, first, second, b'*', b'*', b'*', 0])
}
