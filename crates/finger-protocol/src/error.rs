use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("byte 0x{byte:02X} at index {index} is not an ASCII digit")]
    NotADigit { index: usize, byte: u8 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("unknown state string: {0:?}")]
    UnknownState(String),
}
