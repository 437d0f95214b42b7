//! UDP stand-in for the message bus: state strings in, telemetry datagrams out.

use anyhow::{Context, Result};
use finger_control::{Freshness, PendingState, TelemetrySink};
use finger_protocol::TelemetryRecord;
use serde::Serialize;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Bind `addr` and forward every datagram, trimmed, into the pending-state slot.
pub async fn listen_states(addr: &str, pending: PendingState) -> Result<JoinHandle<()>> {
    let socket = tokio::net::UdpSocket::bind(addr)
        .await
        .with_context(|| format!("binding state listener on {addr}"))?;
    info!("listening for state commands on {addr}");
    Ok(tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((n, from)) => {
                    let state = String::from_utf8_lossy(&buf[..n]).trim().to_string();
                    debug!("state {state:?} from {from}");
                    if let Some(prev) = pending.publish(state) {
                        debug!("superseded unsent state {prev:?}");
                    }
                }
                Err(e) => warn!("state listener error: {e}"),
            }
        }
    }))
}

/// Sends `"<torque> <position>"` to a fixed UDP target.
pub struct UdpPublisher {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpPublisher {
    pub fn connect(target: &str) -> Result<Self> {
        let target = target
            .to_socket_addrs()
            .with_context(|| format!("resolving publish address {target}"))?
            .next()
            .with_context(|| format!("no address for {target}"))?;
        let local = if target.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(local).context("binding telemetry socket")?;
        Ok(Self { socket, target })
    }

    fn publish(&self, record: &TelemetryRecord) {
        let msg = format!("{} {}", record.torque, record.position);
        if let Err(e) = self.socket.send_to(msg.as_bytes(), self.target) {
            warn!("telemetry send to {} failed: {e}", self.target);
        }
    }
}

#[derive(Serialize)]
struct TelemetryLine<'a> {
    ts: String,
    #[serde(flatten)]
    record: &'a TelemetryRecord,
    freshness: Freshness,
}

/// Fans each record out to the UDP publisher and, optionally, stdout as JSON.
pub struct BridgeSink {
    pub publisher: Option<UdpPublisher>,
    pub print: bool,
}

impl TelemetrySink for BridgeSink {
    fn emit(&mut self, record: &TelemetryRecord, freshness: Freshness) {
        if let Some(p) = &self.publisher {
            p.publish(record);
        }
        if self.print {
            let line = TelemetryLine {
                ts: OffsetDateTime::now_utc()
                    .format(&Rfc3339)
                    .unwrap_or_default(),
                record,
                freshness,
            };
            match serde_json::to_string(&line) {
                Ok(json) => println!("{json}"),
                Err(e) => warn!("telemetry json error: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn publisher_sends_space_separated_values() {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        rx.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let target = rx.local_addr().unwrap().to_string();

        let mut sink = BridgeSink {
            publisher: Some(UdpPublisher::connect(&target).unwrap()),
            print: false,
        };
        sink.emit(
            &TelemetryRecord {
                torque: 123,
                position: 675,
            },
            Freshness::Fresh,
        );

        let mut buf = [0u8; 64];
        let n = rx.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"123 675");
    }

    #[tokio::test]
    async fn listener_overwrites_pending_state() {
        let pending = PendingState::new();
        let probe = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = probe.local_addr().unwrap().to_string();
        drop(probe);

        let task = listen_states(&addr, pending.clone()).await.unwrap();
        let tx = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        tx.send_to(b"OPEN\n", addr.as_str()).await.unwrap();
        tx.send_to(b" CLOSE ", addr.as_str()).await.unwrap();

        let mut got = None;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            got = pending.take().or(got);
            if got.as_deref() == Some("CLOSE") {
                break;
            }
        }
        task.abort();
        assert_eq!(got.as_deref(), Some("CLOSE"));
    }
}
