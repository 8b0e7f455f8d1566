//! Telemetry intake task.
//!
//! Outside a bridged request the mesh still pushes `#` telemetry frames.
//! This task grabs the link with a short bounded wait, reads at most one
//! frame, releases the link and forwards telemetry to the report pipeline.
//! While a request holds the link the intake simply loses the race; the
//! relay forwards telemetry itself in that window.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{info, warn};

use crate::app::ports::TelemetrySink;
use crate::config::GatewayConfig;
use crate::diagnostics::GatewayStats;
use crate::link::{Frame, FrameContext, SerialLink, Transport, Wait};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// The link was held by someone else.
    Busy,
    /// Nothing was waiting on the link.
    Idle,
    Forwarded,
    /// A frame was read but not forwarded (non-telemetry, malformed, queue full).
    Dropped,
}

pub struct TelemetryIntake<T> {
    link: Arc<SerialLink<T>>,
    sink: Arc<dyn TelemetrySink>,
    stats: Arc<GatewayStats>,
    lock_wait: Duration,
    read_timeout: Duration,
    idle: Duration,
}

impl<T: Transport> TelemetryIntake<T> {
    pub fn new(
        link: Arc<SerialLink<T>>,
        sink: Arc<dyn TelemetrySink>,
        stats: Arc<GatewayStats>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            link,
            sink,
            stats,
            lock_wait: config.intake_lock_wait(),
            read_timeout: config.intake_read_timeout(),
            idle: config.intake_idle(),
        }
    }

    pub fn poll_once(&self) -> IntakeOutcome {
        let Ok(mut session) = self.link.acquire(Wait::Bounded(self.lock_wait)) else {
            return IntakeOutcome::Busy;
        };
        if !session.has_pending() {
            return IntakeOutcome::Idle;
        }
        let line = match session.read_frame(self.read_timeout) {
            Ok(Some(line)) => line,
            Ok(None) => return IntakeOutcome::Idle,
            Err(e) => {
                warn!("Intake: read failed: {}", e);
                return IntakeOutcome::Dropped;
            }
        };
        drop(session);

        match Frame::classify(&line, FrameContext::Reply) {
            Frame::Telemetry { payload } => match self.sink.offer(payload) {
                Ok(()) => IntakeOutcome::Forwarded,
                Err(_) => IntakeOutcome::Dropped,
            },
            other => {
                self.stats.record_protocol_violation();
                warn!("Intake: unexpected {:?} outside a request, discarded", other);
                IntakeOutcome::Dropped
            }
        }
    }

    /// Task loop.  Back-to-back frames are read without sleeping.
    pub fn run(&self, shutdown: &AtomicBool) {
        info!("Intake: started");
        while !shutdown.load(Ordering::Acquire) {
            match self.poll_once() {
                IntakeOutcome::Forwarded | IntakeOutcome::Dropped => {}
                IntakeOutcome::Busy | IntakeOutcome::Idle => thread::sleep(self.idle),
            }
        }
    }
}
