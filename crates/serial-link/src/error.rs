use crate::DeviceRole;
use thiserror::Error;

pub type Result<T, E = LinkError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum LinkError {
    /// The device could not be opened, even after the permission repair attempt.
    #[error("serial device unavailable: {0}")]
    Unavailable(String),
    #[error("failed to configure serial device {path}: {reason}")]
    ConfigFailed { path: String, reason: String },
    #[error("I/O error: {0}")]
    Io(String),
    #[error("short read: wanted {wanted} bytes, got {got}")]
    ShortRead { wanted: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("device enumeration failed: {0}")]
    Enumeration(String),
    #[error("more than one device matches role {role}: {}", .paths.join(", "))]
    Ambiguous { role: DeviceRole, paths: Vec<String> },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("hardware serial {serial} is assigned to both {first} and {second}")]
    DuplicateSerial {
        serial: String,
        first: DeviceRole,
        second: DeviceRole,
    },
    #[error("unknown device role: {0}")]
    UnknownRole(String),
}
