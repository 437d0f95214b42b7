use crate::{Freshness, LinkMetrics, PendingState, TelemetrySink};
use finger_protocol::{
    decode, decode_lossy, encode, CommandRecord, Frame, FrameReader, TelemetryRecord,
    VelocityLevel,
};
use serial_link::{ByteLink, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tick rate of the dongle host tools.
pub const DEFAULT_RATE_HZ: f64 = 33.33;
/// One tick every 1000 s.
pub const MIN_RATE_HZ: f64 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopConfig {
    pub rate_hz: f64,
    /// Stop re-emitting the last valid frame once it is older than this.
    pub stale_ttl: Option<Duration>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            rate_hz: DEFAULT_RATE_HZ,
            stale_ttl: None,
        }
    }
}

impl LoopConfig {
    /// Tick period. Rates below [`MIN_RATE_HZ`] are clamped to it; non-positive
    /// rates spin without sleeping.
    pub fn period(&self) -> Duration {
        if self.rate_hz > 0.0 {
            Duration::try_from_secs_f64(1.0 / self.rate_hz.max(MIN_RATE_HZ))
                .unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkState {
    /// No frame decoded yet.
    Waiting,
    Live,
    /// The last valid frame outlived the stale TTL.
    Lost,
}

/// What one tick did, mostly for tests and logging.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickReport {
    pub command: Option<CommandRecord>,
    pub emitted: Option<(TelemetryRecord, Freshness)>,
}

/// Fixed-rate orchestrator that exclusively owns the serial link.
pub struct ControlLoop<L> {
    link: L,
    reader: FrameReader,
    pending: PendingState,
    last_valid: Option<Frame>,
    last_fresh_at: Option<Instant>,
    config: LoopConfig,
    link_state: LinkState,
    metrics: Option<LinkMetrics>,
    noise_reported: u64,
}

impl<L: ByteLink> ControlLoop<L> {
    pub fn new(link: L, pending: PendingState, config: LoopConfig) -> Self {
        Self {
            link,
            reader: FrameReader::new(),
            pending,
            last_valid: None,
            last_fresh_at: None,
            config,
            link_state: LinkState::Waiting,
            metrics: None,
            noise_reported: 0,
        }
    }

    pub fn with_metrics(mut self, metrics: LinkMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    pub fn last_valid(&self) -> Option<&Frame> {
        self.last_valid.as_ref()
    }

    /// Drop whatever the dongle sent before we started listening, then select the
    /// low velocity profile.
    pub fn startup(&mut self) -> Result<()> {
        let dropped = self.link.flush_input()?;
        if dropped > 0 {
            debug!("flushed {dropped} stale byte(s) before start");
        }
        self.send(CommandRecord::SetVelocity(VelocityLevel::Low))
    }

    pub fn send(&mut self, cmd: CommandRecord) -> Result<()> {
        let frame = encode(cmd);
        info!("sending {frame} ({cmd:?})");
        self.link.write_frame(frame.payload())?;
        if let Some(m) = &self.metrics {
            m.commands_tx.inc();
        }
        Ok(())
    }

    pub fn tick<S: TelemetrySink + ?Sized>(&mut self, sink: &mut S) -> Result<TickReport> {
        self.tick_at(sink, Instant::now())
    }

    /// One tick: outbound command first, then at most one inbound frame.
    pub fn tick_at<S: TelemetrySink + ?Sized>(
        &mut self,
        sink: &mut S,
        now: Instant,
    ) -> Result<TickReport> {
        let mut report = TickReport::default();

        if let Some(state) = self.pending.take() {
            match CommandRecord::from_state(&state) {
                Ok(cmd) => match self.send(cmd) {
                    Ok(()) => report.command = Some(cmd),
                    Err(e) => {
                        // Telemetry still flows this tick; retry the command on the next one.
                        warn!("failed to send {cmd:?}: {e}");
                        if let Some(m) = &self.metrics {
                            m.send_errors.inc();
                        }
                        self.pending.requeue(state);
                    }
                },
                Err(e) => warn!("{e}; no command sent"),
            }
        }

        let fresh = if self.link.pending() > 0 {
            let polled = self.reader.poll(&mut self.link);
            self.report_noise();
            polled?
        } else {
            None
        };

        if let Some(frame) = fresh {
            if let Some(m) = &self.metrics {
                m.frames_rx.inc();
            }
            match decode(&frame) {
                Ok(record) => {
                    debug!("frame {frame} -> {record:?}");
                    self.last_valid = Some(frame);
                    self.last_fresh_at = Some(now);
                    if self.link_state != LinkState::Live {
                        info!("telemetry live");
                        self.link_state = LinkState::Live;
                    }
                    sink.emit(&record, Freshness::Fresh);
                    report.emitted = Some((record, Freshness::Fresh));
                    return Ok(report);
                }
                Err(e) => {
                    warn!("discarding frame {frame}: {e}");
                    if let Some(m) = &self.metrics {
                        m.decode_errors.inc();
                    }
                }
            }
        }

        let Some(frame) = self.last_valid else {
            return Ok(report);
        };
        if self.stale_expired(now) {
            if self.link_state != LinkState::Lost {
                warn!("no fresh telemetry within stale ttl; link lost");
                self.link_state = LinkState::Lost;
            }
            return Ok(report);
        }
        // Only frames that passed validation are cached.
        let record = decode_lossy(&frame);
        sink.emit(&record, Freshness::Stale);
        if let Some(m) = &self.metrics {
            m.stale_emits.inc();
        }
        report.emitted = Some((record, Freshness::Stale));
        Ok(report)
    }

    fn stale_expired(&self, now: Instant) -> bool {
        match (self.config.stale_ttl, self.last_fresh_at) {
            (Some(ttl), Some(at)) => now.saturating_duration_since(at) > ttl,
            _ => false,
        }
    }

    fn report_noise(&mut self) {
        let total = self.reader.noise_bytes();
        if let Some(m) = &self.metrics {
            m.noise_bytes.inc_by(total - self.noise_reported);
        }
        self.noise_reported = total;
    }

    /// Tick at the configured rate until `shutdown` is raised or `max_ticks` have run.
    /// Returns the number of ticks executed.
    pub fn run<S: TelemetrySink + ?Sized>(
        &mut self,
        sink: &mut S,
        shutdown: &AtomicBool,
        max_ticks: Option<u64>,
    ) -> u64 {
        let period = self.config.period();
        let mut ticks = 0u64;
        info!("control loop running every {period:?}");
        while !shutdown.load(Ordering::Relaxed) {
            if max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }
            let started = Instant::now();
            if let Err(e) = self.tick_at(sink, started) {
                warn!("tick {ticks} failed: {e}");
            }
            ticks += 1;
            if let Some(rest) = period.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
        info!("control loop stopped after {ticks} tick(s)");
        ticks
    }

    /// Give the link back, e.g. to close it explicitly.
    pub fn into_link(self) -> L {
        self.link
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_link::{LinkError, MockLink};

    fn new_loop(config: LoopConfig) -> (ControlLoop<MockLink>, MockLink, PendingState) {
        let link = MockLink::new();
        let pending = PendingState::new();
        let ctl = ControlLoop::new(link.clone(), pending.clone(), config);
        (ctl, link, pending)
    }

    fn discard() -> impl FnMut(&TelemetryRecord, Freshness) {
        |_: &TelemetryRecord, _: Freshness| {}
    }

    #[test]
    fn period_follows_rate() {
        let cfg = LoopConfig::default();
        assert_eq!(cfg.period().as_millis(), 30);
        let zero = LoopConfig {
            rate_hz: 0.0,
            stale_ttl: None,
        };
        assert_eq!(zero.period(), Duration::ZERO);
        let tiny = LoopConfig {
            rate_hz: 1e-20,
            stale_ttl: None,
        };
        assert_eq!(tiny.period(), Duration::from_secs(1000));
    }

    #[test]
    fn startup_flushes_then_selects_low_velocity() {
        let (mut ctl, link, _) = new_loop(LoopConfig::default());
        link.feed(b"leftover$999");
        ctl.startup().unwrap();
        assert_eq!(link.buffered(), 0);
        assert_eq!(link.written(), vec![b"$VS***".to_vec()]);
    }

    #[test]
    fn unknown_state_sends_nothing() {
        let (mut ctl, link, pending) = new_loop(LoopConfig::default());
        pending.publish("WIGGLE");
        let report = ctl.tick(&mut discard()).unwrap();
        assert_eq!(report.command, None);
        assert!(link.written().is_empty());
        assert!(!pending.is_pending());
    }

    #[test]
    fn stale_ttl_marks_link_lost_then_recovers() {
        let (mut ctl, link, _) = new_loop(LoopConfig {
            rate_hz: DEFAULT_RATE_HZ,
            stale_ttl: Some(Duration::from_millis(100)),
        });
        let t0 = Instant::now();
        let mut sink = discard();

        link.feed(b"$010**020*\0");
        assert!(ctl.tick_at(&mut sink, t0).unwrap().emitted.is_some());

        let within = ctl
            .tick_at(&mut sink, t0 + Duration::from_millis(50))
            .unwrap();
        assert_eq!(within.emitted.map(|(_, f)| f), Some(Freshness::Stale));

        let beyond = ctl
            .tick_at(&mut sink, t0 + Duration::from_millis(150))
            .unwrap();
        assert_eq!(beyond.emitted, None);
        assert_eq!(ctl.link_state(), LinkState::Lost);

        link.feed(b"$011**021*\0");
        let back = ctl
            .tick_at(&mut sink, t0 + Duration::from_millis(200))
            .unwrap();
        assert_eq!(back.emitted.map(|(_, f)| f), Some(Freshness::Fresh));
        assert_eq!(ctl.link_state(), LinkState::Live);
    }

    #[test]
    fn metrics_track_traffic() {
        let hub = crate::MetricsHub::new().unwrap();
        let (ctl, link, pending) = new_loop(LoopConfig::default());
        let mut ctl = ctl.with_metrics(hub.link.clone());
        let mut sink = discard();

        pending.publish("OPEN");
        link.feed(b"noise$100**200*\0");
        ctl.tick(&mut sink).unwrap();
        ctl.tick(&mut sink).unwrap();
        link.feed(b"$1x0**200*\0");
        ctl.tick(&mut sink).unwrap();

        assert_eq!(hub.link.commands_tx.get(), 1);
        assert_eq!(hub.link.frames_rx.get(), 2);
        assert_eq!(hub.link.decode_errors.get(), 1);
        assert_eq!(hub.link.noise_bytes.get(), 5);
        assert_eq!(hub.link.stale_emits.get(), 2);
    }

    #[test]
    fn run_stops_after_max_ticks() {
        let (mut ctl, _, _) = new_loop(LoopConfig {
            rate_hz: 1000.0,
            stale_ttl: None,
        });
        let shutdown = AtomicBool::new(false);
        assert_eq!(ctl.run(&mut discard(), &shutdown, Some(3)), 3);
        shutdown.store(true, Ordering::Relaxed);
        assert_eq!(ctl.run(&mut discard(), &shutdown, None), 0);
    }

    #[test]
    fn stale_tick_repeats_previous_telemetry() {
        let (mut ctl, link, _) = new_loop(LoopConfig::default());
        let mut seen: Vec<(TelemetryRecord, Freshness)> = Vec::new();
        let mut sink = |r: &TelemetryRecord, f: Freshness| seen.push((*r, f));

        link.feed(b"$123**675*\0");
        ctl.tick(&mut sink).unwrap();
        // Nothing pending on the next tick.
        ctl.tick(&mut sink).unwrap();
        // A partial frame does not count as fresh either.
        link.feed(b"$9");
        ctl.tick(&mut sink).unwrap();

        let expected = TelemetryRecord {
            torque: 123,
            position: 675,
        };
        assert_eq!(
            seen,
            vec![
                (expected, Freshness::Fresh),
                (expected, Freshness::Stale),
                (expected, Freshness::Stale),
            ]
        );
    }

    #[test]
    fn nothing_is_emitted_before_the_first_frame() {
        let (mut ctl, link, _) = new_loop(LoopConfig::default());
        let mut count = 0;
        let mut sink = |_: &TelemetryRecord, _: Freshness| count += 1;

        ctl.tick(&mut sink).unwrap();
        link.feed(b"junk$12");
        ctl.tick(&mut sink).unwrap();
        assert_eq!(count, 0);
        assert!(ctl.last_valid().is_none());
    }

    #[test]
    fn command_goes_out_before_inbound_frame_is_read() {
        let (mut ctl, link, pending) = new_loop(LoopConfig::default());

        pending.publish("CLOSE");
        link.feed(b"$001**002*\0");
        let report = ctl.tick(&mut discard()).unwrap();

        assert_eq!(report.command, Some(CommandRecord::Close));
        assert_eq!(
            report.emitted.map(|(r, f)| (r.torque, r.position, f)),
            Some((1, 2, Freshness::Fresh))
        );
        assert_eq!(link.written(), vec![b"$C****".to_vec()]);
    }

    #[test]
    fn queued_events_collapse_to_the_latest() {
        let (mut ctl, link, pending) = new_loop(LoopConfig::default());
        let mut sink = discard();

        pending.publish("OPEN");
        pending.publish("STOP");
        pending.publish("CLOSE");
        ctl.tick(&mut sink).unwrap();
        ctl.tick(&mut sink).unwrap();

        assert_eq!(link.written(), vec![b"$C****".to_vec()]);
    }

    #[test]
    fn invalid_fresh_frame_falls_back_to_last_valid() {
        let (mut ctl, link, _) = new_loop(LoopConfig::default());
        let mut seen = Vec::new();
        let mut sink = |r: &TelemetryRecord, f: Freshness| seen.push((r.torque, r.position, f));

        link.feed(b"$500**250*\0");
        ctl.tick(&mut sink).unwrap();
        link.feed(b"$5?0**250*\0");
        ctl.tick(&mut sink).unwrap();

        assert_eq!(
            seen,
            vec![(500, 250, Freshness::Fresh), (500, 250, Freshness::Stale)]
        );
        assert_eq!(
            ctl.last_valid().map(|f| f.to_string()).as_deref(),
            Some("$500**250*\\x00")
        );
    }

    #[test]
    fn split_frame_completes_across_ticks() {
        let (mut ctl, link, _) = new_loop(LoopConfig::default());
        let mut seen = Vec::new();
        let mut sink = |r: &TelemetryRecord, f: Freshness| seen.push((r.torque, r.position, f));

        link.feed(b"$100**100*\0");
        ctl.tick(&mut sink).unwrap();
        link.feed(b"\r\n$42");
        ctl.tick(&mut sink).unwrap();
        link.feed(b"0**777*\0");
        ctl.tick(&mut sink).unwrap();

        assert_eq!(
            seen,
            vec![
                (100, 100, Freshness::Fresh),
                (100, 100, Freshness::Stale),
                (420, 777, Freshness::Fresh),
            ]
        );
    }

    /// Reads like a [`MockLink`] but refuses every write.
    struct ReadOnlyLink(MockLink);

    impl ByteLink for ReadOnlyLink {
        fn pending(&mut self) -> usize {
            self.0.pending()
        }

        fn read_byte(&mut self) -> Option<u8> {
            self.0.read_byte()
        }

        fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
            self.0.read_exact(buf)
        }

        fn write_frame(&mut self, _bytes: &[u8]) -> Result<()> {
            Err(LinkError::Io("EIO".into()))
        }
    }

    #[test]
    fn failed_write_still_reads_telemetry_and_keeps_the_command() {
        let link = MockLink::new();
        let pending = PendingState::new();
        let hub = crate::MetricsHub::new().unwrap();
        let mut ctl = ControlLoop::new(
            ReadOnlyLink(link.clone()),
            pending.clone(),
            LoopConfig::default(),
        )
        .with_metrics(hub.link.clone());
        let mut seen = Vec::new();
        let mut sink = |r: &TelemetryRecord, f: Freshness| seen.push((r.torque, r.position, f));

        link.feed(b"$100**200*\0");
        ctl.tick(&mut sink).unwrap();

        pending.publish("OPEN");
        link.feed(b"$300**400*\0");
        let report = ctl.tick(&mut sink).unwrap();

        assert_eq!(report.command, None);
        assert_eq!(link.buffered(), 0);
        assert_eq!(
            seen,
            vec![(100, 200, Freshness::Fresh), (300, 400, Freshness::Fresh)]
        );
        assert_eq!(pending.take().as_deref(), Some("OPEN"));
        assert_eq!(hub.link.send_errors.get(), 1);
        assert_eq!(hub.link.commands_tx.get(), 0);
    }
}
