use crate::{ByteLink, DeviceEnumerator, DeviceIdentity, LinkError, Result};
use serialport::{
    DataBits, ErrorKind, FlowControl, Parity, SerialPort, SerialPortType, StopBits,
};
use std::io::{self, Read, Write};
use std::process::Command;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The dongle firmware only talks 115200 8N1.
pub const BAUD_RATE: u32 = 115_200;

#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Grant rw on the node via `sudo chmod a+rw` once if the first open fails.
    pub repair_permissions: bool,
    /// Pause before the repair command runs.
    pub repair_delay: Duration,
    /// Upper bound for a single read or write syscall.
    pub io_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            repair_permissions: true,
            repair_delay: Duration::from_secs(1),
            io_timeout: Duration::from_millis(20),
        }
    }
}

/// An open, raw-mode serial descriptor. The port closes when the session drops.
pub struct SerialSession {
    path: String,
    port: Box<dyn SerialPort>,
}

impl SerialSession {
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with(path, &SessionOptions::default())
    }

    pub fn open_with(path: &str, opts: &SessionOptions) -> Result<Self> {
        if path.is_empty() {
            return Err(LinkError::Unavailable("no device path".into()));
        }
        let port = match open_port(path, opts) {
            Ok(port) => port,
            Err(first) if opts.repair_permissions && is_access_error(&first) => {
                warn!("failed to open {path}: {first}; granting rw access and retrying once");
                thread::sleep(opts.repair_delay);
                grant_rw(path);
                open_port(path, opts).map_err(|e| open_error(path, e))?
            }
            Err(e) => return Err(open_error(path, e)),
        };

        let mut session = SerialSession {
            path: path.to_string(),
            port,
        };
        // On failure the port drops here, which closes the descriptor.
        session.configure()?;
        info!("opened {path} at {BAUD_RATE} baud 8N1");
        Ok(session)
    }

    fn configure(&mut self) -> Result<()> {
        let path = self.path.clone();
        let fail = |e: serialport::Error| LinkError::ConfigFailed {
            path: path.clone(),
            reason: e.to_string(),
        };
        self.port.set_baud_rate(BAUD_RATE).map_err(fail)?;
        self.port.set_data_bits(DataBits::Eight).map_err(fail)?;
        self.port.set_parity(Parity::None).map_err(fail)?;
        self.port.set_stop_bits(StopBits::One).map_err(fail)?;
        self.port.set_flow_control(FlowControl::None).map_err(fail)?;
        Ok(())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Release the descriptor.
    pub fn close(self) {
        info!("closing {}", self.path);
    }
}

fn open_port(path: &str, opts: &SessionOptions) -> serialport::Result<Box<dyn SerialPort>> {
    // serialport opens O_RDWR | O_NOCTTY | O_NONBLOCK and puts the line in raw mode
    // with CREAD | CLOCAL set.
    serialport::new(path, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(opts.io_timeout)
        .open()
}

/// Errors a `chmod` can plausibly fix. Anything else came from the termios
/// setup that `open()` performs on an already opened descriptor.
fn is_access_error(e: &serialport::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::NoDevice
            | ErrorKind::Io(io::ErrorKind::PermissionDenied)
            | ErrorKind::Io(io::ErrorKind::NotFound)
    )
}

fn open_error(path: &str, e: serialport::Error) -> LinkError {
    if is_access_error(&e) {
        LinkError::Unavailable(format!("{path}: {e}"))
    } else {
        LinkError::ConfigFailed {
            path: path.to_string(),
            reason: e.to_string(),
        }
    }
}

fn grant_rw(path: &str) {
    match Command::new("sudo").args(["chmod", "a+rw", path]).status() {
        Ok(status) if status.success() => debug!("granted rw on {path}"),
        Ok(status) => warn!("chmod on {path} exited with {status}"),
        Err(e) => warn!("could not run sudo chmod on {path}: {e}"),
    }
}

impl ByteLink for SerialSession {
    fn pending(&mut self) -> usize {
        match self.port.bytes_to_read() {
            Ok(n) => n as usize,
            Err(e) => {
                debug!("pending probe on {} failed: {e}", self.path);
                0
            }
        }
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.pending() == 0 {
            return None;
        }
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            Ok(_) => None,
            Err(e) => {
                debug!("single-byte read on {} failed: {e}", self.path);
                None
            }
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.port
            .read_exact(buf)
            .map_err(|e| LinkError::Io(e.to_string()))
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        self.port
            .write_all(bytes)
            .map_err(|e| LinkError::Io(e.to_string()))
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        debug!("serial port {} released", self.path);
    }
}

/// Enumerates USB serial adapters through the host (libudev on Linux).
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnumerator;

impl DeviceEnumerator for SystemEnumerator {
    fn enumerate(&self) -> Result<Vec<DeviceIdentity>> {
        let ports = serialport::available_ports().map_err(|e| LinkError::Io(e.to_string()))?;
        let mut out = Vec::new();
        for p in ports {
            match p.port_type {
                SerialPortType::UsbPort(usb) => out.push(DeviceIdentity {
                    path: p.port_name,
                    vendor_id: usb.vid,
                    product_id: usb.pid,
                    serial: usb.serial_number,
                }),
                _ => debug!("skipping {} (no usb vendor/product id)", p.port_name),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_is_unavailable_without_repair() {
        let opts = SessionOptions {
            repair_delay: Duration::ZERO,
            ..SessionOptions::default()
        };
        assert!(matches!(
            SerialSession::open_with("", &opts),
            Err(LinkError::Unavailable(_))
        ));
    }

    #[test]
    fn missing_node_is_unavailable() {
        let opts = SessionOptions {
            repair_permissions: false,
            ..SessionOptions::default()
        };
        assert!(matches!(
            SerialSession::open_with("/dev/does-not-exist-haria", &opts),
            Err(LinkError::Unavailable(_))
        ));
    }

    #[test]
    fn only_access_errors_trigger_repair() {
        let err = |kind| serialport::Error::new(kind, "x");
        assert!(is_access_error(&err(ErrorKind::NoDevice)));
        assert!(is_access_error(&err(ErrorKind::Io(io::ErrorKind::PermissionDenied))));
        assert!(is_access_error(&err(ErrorKind::Io(io::ErrorKind::NotFound))));
        assert!(!is_access_error(&err(ErrorKind::Unknown)));
        assert!(!is_access_error(&err(ErrorKind::InvalidInput)));
    }

    #[test]
    fn non_tty_node_fails_configuration_without_repair() {
        // /dev/null opens fine but rejects tcgetattr, so no chmod may run.
        let opts = SessionOptions {
            repair_delay: Duration::from_secs(30),
            ..SessionOptions::default()
        };
        let started = std::time::Instant::now();
        assert!(matches!(
            SerialSession::open_with("/dev/null", &opts),
            Err(LinkError::ConfigFailed { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
