use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

#[derive(Clone)]
pub struct LinkMetrics {
    pub frames_rx: IntCounter,
    pub commands_tx: IntCounter,
    pub send_errors: IntCounter,
    pub stale_emits: IntCounter,
    pub noise_bytes: IntCounter,
    pub decode_errors: IntCounter,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub link: LinkMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| {
            IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
        };
        let link = LinkMetrics {
            frames_rx: counter("finger_frames_rx", "Complete telemetry frames received")?,
            commands_tx: counter("finger_commands_tx", "Command frames written")?,
            send_errors: counter("finger_send_errors", "Command frames the link refused")?,
            stale_emits: counter(
                "finger_stale_emits",
                "Telemetry records re-emitted from the last valid frame",
            )?,
            noise_bytes: counter(
                "finger_noise_bytes",
                "Bytes discarded while seeking a start byte",
            )?,
            decode_errors: counter(
                "finger_decode_errors",
                "Frames rejected for non-digit bytes in digit positions",
            )?,
        };
        for c in [
            &link.frames_rx,
            &link.commands_tx,
            &link.send_errors,
            &link.stale_emits,
            &link.noise_bytes,
            &link.decode_errors,
        ] {
            let _ = registry.register(Box::new(c.clone()));
        }
        Ok(Self { registry, link })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_text_output() {
        let hub = MetricsHub::new().unwrap();
        hub.link.frames_rx.inc_by(3);
        let text = hub.encode_text();
        assert!(text.contains("finger_frames_rx 3"));
        assert!(text.contains("finger_decode_errors 0"));
    }
}
