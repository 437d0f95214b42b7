//! serial-link: role-based discovery and raw serial sessions
//!
//! This crate finds the TTY bound to a logical dongle role (robot, input, feedback) by
//! matching USB hardware serial numbers against a [`RoleTable`], and owns the open,
//! configured descriptor for that device. The default build also enables a `mock`
//! backend so that framing and control code can be exercised without hardware.

mod types;
pub use types::{DeviceIdentity, DeviceRole, RoleTable};

mod error;
pub use error::{ConfigError, DiscoveryError, LinkError, Result};

mod traits;
pub use traits::{ByteLink, DeviceEnumerator};

mod discovery;
pub use discovery::{DeviceDiscovery, SurveyEntry};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockEnumerator, MockLink};

#[cfg(feature = "serial")]
mod session;

#[cfg(feature = "serial")]
pub use session::{SerialSession, SessionOptions, SystemEnumerator, BAUD_RATE};
