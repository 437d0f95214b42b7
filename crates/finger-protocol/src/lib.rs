//! finger-protocol: framing and codecs for the sixth-finger actuator
//!
//! Inbound telemetry arrives as fixed 11-byte ASCII frames starting with `$`; outbound
//! commands are 6-byte ASCII directives. [`FrameReader`] recovers frame alignment on
//! the raw stream, [`decode`] turns a frame into torque/position, and [`encode`] turns
//! a [`CommandRecord`] into wire bytes.

mod frame;
pub use frame::{Frame, FRAME_LEN, PAYLOAD_LEN, POSITION_DIGITS, START_BYTE, TORQUE_DIGITS};

mod error;
pub use error::{DecodeError, EncodeError};

mod reader;
pub use reader::{FrameReader, ReaderState};

mod decode;
pub use decode::{decode, decode_lossy, TelemetryRecord};

mod encode;
pub use encode::{encode, CommandFrame, CommandRecord, VelocityLevel, COMMAND_FRAME_LEN};
