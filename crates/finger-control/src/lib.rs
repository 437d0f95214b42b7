//! finger-control: the fixed-rate loop between external state and the actuator
//!
//! Each tick sends at most one pending command, then reads at most one telemetry frame.
//! When no complete frame arrives, the last valid frame is re-emitted so downstream
//! consumers keep receiving values during short read gaps.

mod pending;
pub use pending::PendingState;

mod sink;
pub use sink::{Freshness, TelemetrySink};

mod metrics;
pub use metrics::{LinkMetrics, MetricsHub};

mod control;
pub use control::{
    ControlLoop, LinkState, LoopConfig, TickReport, DEFAULT_RATE_HZ, MIN_RATE_HZ,
};

mod config;
pub use config::{load_config_file, BridgeConfig, BusConfig};
