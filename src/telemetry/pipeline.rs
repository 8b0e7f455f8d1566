//! Report pipeline: telemetry payloads → resolved entries → day files.
//!
//! ```text
//!   offer() ──▶ [messages: 5] ──consumer──▶ [writing: 64] ──flusher──▶ YYMMDD.txt
//!                  (raw)          registry      (stamped)     fold + append
//!                                 + clock
//! ```
//!
//! Both queues drop on overflow; a full queue is counted and logged but
//! never blocks the serial link.  The consumer is woken on every accepted
//! message and also polls on a fixed fallback interval.  The flusher runs
//! on a fixed-rate schedule and owns the per-device sampling states.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, error, info, warn};

use super::record::{DayRecord, day_file_name};
use super::registry::{DeviceRegistry, MacAddress, parse_mac};
use super::sampling::{ReportEntry, SamplingState};
use crate::app::ports::{ClockPort, FileStore, StorageError, TelemetrySink};
use crate::config::{REPORT_QUEUE_DEPTH, WRITING_QUEUE_DEPTH};
use crate::diagnostics::GatewayStats;
use crate::error::{GatewayError, Result};

// ── Raw telemetry message ─────────────────────────────────────

/// `"AABBCCDDEEFF,<pwm>"` split at the comma, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportMessage {
    pub mac_hex: heapless::String<12>,
    pub pwm_value: heapless::String<4>,
}

impl ReportMessage {
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let text = core::str::from_utf8(payload).map_err(|_| GatewayError::ProtocolViolation)?;
        let (mac, pwm) = text.split_once(',').ok_or(GatewayError::ProtocolViolation)?;
        Ok(Self {
            mac_hex: heapless::String::try_from(mac.trim())
                .map_err(|_| GatewayError::ProtocolViolation)?,
            pwm_value: heapless::String::try_from(pwm.trim())
                .map_err(|_| GatewayError::ProtocolViolation)?,
        })
    }

    pub fn parse(&self) -> Result<(MacAddress, u8)> {
        let mac = parse_mac(&self.mac_hex).ok_or(GatewayError::ProtocolViolation)?;
        let pwm = self
            .pwm_value
            .parse::<u8>()
            .map_err(|_| GatewayError::ProtocolViolation)?;
        Ok((mac, pwm))
    }
}

// ── Pipeline queues + consumer ────────────────────────────────

pub struct ReportPipeline {
    registry: Arc<DeviceRegistry>,
    clock: Arc<dyn ClockPort>,
    stats: Arc<GatewayStats>,
    messages: Channel<CriticalSectionRawMutex, ReportMessage, REPORT_QUEUE_DEPTH>,
    writing: Channel<CriticalSectionRawMutex, ReportEntry, WRITING_QUEUE_DEPTH>,
    consumer: OnceLock<Thread>,
}

impl ReportPipeline {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        clock: Arc<dyn ClockPort>,
        stats: Arc<GatewayStats>,
    ) -> Self {
        Self {
            registry,
            clock,
            stats,
            messages: Channel::new(),
            writing: Channel::new(),
            consumer: OnceLock::new(),
        }
    }

    /// Non-blocking push onto the raw message queue.
    pub fn push_message(&self, message: ReportMessage) -> Result<()> {
        if self.messages.try_send(message).is_err() {
            self.stats.record_telemetry_dropped();
            error!("Report: message queue full, telemetry dropped");
            return Err(GatewayError::QueueFull);
        }
        self.stats.record_telemetry_accepted();
        if let Some(consumer) = self.consumer.get() {
            consumer.unpark();
        }
        Ok(())
    }

    pub fn pending_messages(&self) -> usize {
        self.messages.len()
    }

    pub fn pending_entries(&self) -> usize {
        self.writing.len()
    }

    /// Consumer body: resolve every queued message into a stamped entry.
    /// Returns how many entries reached the writing queue.
    pub fn drain_messages(&self) -> usize {
        let mut forwarded = 0;
        while let Ok(message) = self.messages.try_receive() {
            match self.resolve(&message) {
                Ok(entry) => {
                    if self.writing.try_send(entry).is_ok() {
                        forwarded += 1;
                    } else {
                        self.stats.record_telemetry_dropped();
                        error!("Report: writing queue full, entry for id {} dropped", entry.device.id);
                    }
                }
                Err(GatewayError::UnknownDevice) => {
                    self.stats.record_unknown_device();
                    warn!("Report: unregistered device {}, message dropped", message.mac_hex);
                }
                Err(e) => {
                    self.stats.record_protocol_violation();
                    warn!("Report: unreadable message {:?} ({})", message, e);
                }
            }
        }
        forwarded
    }

    fn resolve(&self, message: &ReportMessage) -> Result<ReportEntry> {
        let (mac, pwm) = message.parse()?;
        let device = self.registry.lookup(&mac).ok_or(GatewayError::UnknownDevice)?;
        Ok(ReportEntry {
            device,
            pwm,
            timestamp: self.clock.now(),
        })
    }

    /// Hand every queued entry to `f`; returns the count.
    pub fn drain_entries(&self, mut f: impl FnMut(ReportEntry)) -> usize {
        let mut count = 0;
        while let Ok(entry) = self.writing.try_receive() {
            f(entry);
            count += 1;
        }
        count
    }

    /// Consumer task loop.  Wakes on every accepted message or after `poll`.
    pub fn run_consumer(&self, poll: Duration, shutdown: &AtomicBool) {
        if self.consumer.set(thread::current()).is_err() {
            warn!("Report: consumer already running");
            return;
        }
        info!("Report: consumer started (poll {:?})", poll);
        while !shutdown.load(Ordering::Acquire) {
            let forwarded = self.drain_messages();
            if forwarded > 0 {
                debug!("Report: {} entries queued for writing", forwarded);
            }
            thread::park_timeout(poll);
        }
    }
}

impl TelemetrySink for ReportPipeline {
    fn offer(&self, payload: &[u8]) -> Result<()> {
        let message = ReportMessage::from_payload(payload).inspect_err(|_| {
            self.stats.record_protocol_violation();
            warn!("Report: malformed telemetry payload ({} bytes)", payload.len());
        })?;
        self.push_message(message)
    }
}

// ── Flusher ───────────────────────────────────────────────────

/// Owns the sampling states and appends dirty ones to the day file.
pub struct ReportFlusher {
    pipeline: Arc<ReportPipeline>,
    store: Arc<dyn FileStore>,
    clock: Arc<dyn ClockPort>,
    stats: Arc<GatewayStats>,
    states: BTreeMap<u8, SamplingState>,
}

impl ReportFlusher {
    pub fn new(
        pipeline: Arc<ReportPipeline>,
        store: Arc<dyn FileStore>,
        clock: Arc<dyn ClockPort>,
        stats: Arc<GatewayStats>,
    ) -> Self {
        Self {
            pipeline,
            store,
            clock,
            stats,
            states: BTreeMap::new(),
        }
    }

    pub fn state(&self, id: u8) -> Option<&SamplingState> {
        self.states.get(&id)
    }

    /// Fold queued entries and append a record per dirty device.
    /// Returns the number of records written.  Records that fail to write
    /// stay dirty and go out with the next flush; a partly written record
    /// is cut from the file so later records stay aligned.
    pub fn flush(&mut self) -> core::result::Result<usize, StorageError> {
        let states = &mut self.states;
        let drained = self.pipeline.drain_entries(|entry| {
            states
                .entry(entry.device.id)
                .and_modify(|s| s.fold(&entry))
                .or_insert_with(|| SamplingState::first(&entry));
        });
        if !self.states.values().any(|s| s.dirty) {
            return Ok(0);
        }

        let name = day_file_name(self.clock.now());
        let mut file = self.store.open_append(&name)?;
        let mut len = match self.store.size(&name) {
            Ok(len) => len,
            Err(StorageError::NotFound) => 0,
            Err(e) => return Err(e),
        };
        let mut written = 0;
        for state in self.states.values_mut().filter(|s| s.dirty) {
            let record = DayRecord::from_state(state).encode();
            if let Err(e) = file.write_all(&record).and_then(|()| file.flush()) {
                error!("Report: write to {} failed: {}", name, e);
                drop(file);
                if let Err(e) = self.store.truncate(&name, len) {
                    error!("Report: could not cut torn record from {}: {}", name, e);
                }
                self.stats.record_records_written(written as u32);
                return Err(StorageError::IoError);
            }
            len += record.len() as u64;
            state.dirty = false;
            written += 1;
        }

        self.stats.record_records_written(written as u32);
        debug!("Report: {} entries folded, {} records appended to {}", drained, written, name);
        Ok(written)
    }

    /// Fixed-rate flush loop.  Deadlines advance by exactly one period so
    /// flush time does not accumulate as drift; missed periods are skipped.
    pub fn run(&mut self, period: Duration, shutdown: &AtomicBool) {
        info!("Report: flusher started (period {:?})", period);
        let mut next = Instant::now() + period;
        while !shutdown.load(Ordering::Acquire) {
            thread::sleep(next.saturating_duration_since(Instant::now()));
            if let Err(e) = self.flush() {
                error!("Report: flush failed: {}", e);
            }
            next += period;
            let now = Instant::now();
            while next <= now {
                warn!("Report: flush period overrun");
                next += period;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::ClockError;
    use crate::telemetry::registry::LuminaireModel;
    use std::sync::atomic::AtomicU32;

    struct FixedClock(AtomicU32);

    impl ClockPort for FixedClock {
        fn now(&self) -> u32 {
            self.0.load(Ordering::Relaxed)
        }

        fn set(&self, unix_seconds: u32) -> core::result::Result<(), ClockError> {
            self.0.store(unix_seconds, Ordering::Relaxed);
            Ok(())
        }
    }

    fn pipeline() -> (Arc<ReportPipeline>, Arc<GatewayStats>) {
        let registry = Arc::new(DeviceRegistry::new());
        registry
            .register([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF], 2, LuminaireModel::Lum17k)
            .unwrap();
        let stats = Arc::new(GatewayStats::new());
        let clock = Arc::new(FixedClock(AtomicU32::new(1_700_000_000)));
        (Arc::new(ReportPipeline::new(registry, clock, stats.clone())), stats)
    }

    #[test]
    fn payload_split() {
        let msg = ReportMessage::from_payload(b"AABBCCDDEEFF,87").unwrap();
        assert_eq!(msg.mac_hex.as_str(), "AABBCCDDEEFF");
        assert_eq!(msg.parse().unwrap(), ([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF], 87));
    }

    #[test]
    fn payload_without_comma_is_violation() {
        assert_eq!(
            ReportMessage::from_payload(b"AABBCCDDEEFF87"),
            Err(GatewayError::ProtocolViolation)
        );
        assert_eq!(
            ReportMessage::from_payload(b"AABBCCDDEEFF00,1"),
            Err(GatewayError::ProtocolViolation)
        );
    }

    #[test]
    fn sixth_message_is_rejected() {
        let (p, stats) = pipeline();
        for _ in 0..REPORT_QUEUE_DEPTH {
            p.offer(b"AABBCCDDEEFF,10").unwrap();
        }
        assert_eq!(p.offer(b"AABBCCDDEEFF,10"), Err(GatewayError::QueueFull));
        assert_eq!(p.pending_messages(), REPORT_QUEUE_DEPTH);
        assert_eq!(stats.snapshot().telemetry_dropped, 1);
    }

    #[test]
    fn unknown_device_is_dropped_and_counted() {
        let (p, stats) = pipeline();
        p.offer(b"000000000001,10").unwrap();
        p.offer(b"AABBCCDDEEFF,10").unwrap();
        assert_eq!(p.drain_messages(), 1);
        assert_eq!(stats.snapshot().unknown_devices, 1);
        assert_eq!(p.pending_entries(), 1);
    }

    #[test]
    fn bad_pwm_is_a_violation() {
        let (p, stats) = pipeline();
        p.offer(b"AABBCCDDEEFF,300").unwrap();
        assert_eq!(p.drain_messages(), 0);
        assert_eq!(stats.snapshot().protocol_violations, 1);
    }

    #[test]
    fn entries_are_stamped_with_clock() {
        let (p, _) = pipeline();
        p.offer(b"AABBCCDDEEFF,42").unwrap();
        p.drain_messages();
        let mut seen = Vec::new();
        p.drain_entries(|e| seen.push(e));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].pwm, 42);
        assert_eq!(seen[0].timestamp, 1_700_000_000);
        assert_eq!(seen[0].device.unit_count, 2);
    }
}
