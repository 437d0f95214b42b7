use finger_protocol::TelemetryRecord;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Decoded from a frame completed this tick.
    Fresh,
    /// Re-decoded from the last valid frame.
    Stale,
}

/// Receives every telemetry record the loop emits.
pub trait TelemetrySink {
    fn emit(&mut self, record: &TelemetryRecord, freshness: Freshness);
}

impl<F> TelemetrySink for F
where
    F: FnMut(&TelemetryRecord, Freshness),
{
    fn emit(&mut self, record: &TelemetryRecord, freshness: Freshness) {
        (*self)(record, freshness)
    }
}
