//! Mesh status watcher.
//!
//! Every period, while no bridged request is in flight, the gateway asks
//! the mesh root for its uplink status (`9031,;`).  After the ack the root
//! sends one more line, `<status>,<ssid>,<password>`.  When the reported
//! status or credentials change the access point is restarted so phones
//! reconnect with the mesh's current settings, except while the mesh is
//! still unconfigured (not connected on the bootstrap SSID).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::app::ports::{TelemetrySink, WifiMode, WifiPort};
use crate::bridge::RequestBridge;
use crate::config::{GatewayConfig, MESH_BOOTSTRAP_SSID};
use crate::error::{GatewayError, Result};
use crate::link::{AckOutcome, Deadline, Frame, FrameContext, SerialLink, Transport, Wait};

pub const STATUS_QUERY: &[u8] = b"9031,;";
/// Mode the radio is restarted in after a mesh change.
const RESTART_MODE: WifiMode = WifiMode::Ap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkStatus {
    NotConnected,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshReport {
    pub status: UplinkStatus,
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

impl MeshReport {
    /// Exactly three comma-separated fields.
    pub fn parse(line: &[u8]) -> Result<Self> {
        let text = core::str::from_utf8(line).map_err(|_| GatewayError::ProtocolViolation)?;
        let mut fields = text.split(',');
        let (Some(status), Some(ssid), Some(password), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(GatewayError::ProtocolViolation);
        };
        let status = match status.trim() {
            "0" => UplinkStatus::NotConnected,
            "1" => UplinkStatus::Connected,
            _ => return Err(GatewayError::ProtocolViolation),
        };
        Ok(Self {
            status,
            ssid: heapless::String::try_from(ssid).map_err(|_| GatewayError::ProtocolViolation)?,
            password: heapless::String::try_from(password)
                .map_err(|_| GatewayError::ProtocolViolation)?,
        })
    }

    fn is_unconfigured(&self) -> bool {
        self.status == UplinkStatus::NotConnected && self.ssid.as_str() == MESH_BOOTSTRAP_SSID
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchDecision {
    Unchanged,
    /// Changed, but the mesh is unconfigured; remembered only.
    Recorded,
    Restart,
}

/// Last report seen; a password change counts as a credential change.
#[derive(Debug, Default)]
pub struct WatchState {
    last: Option<MeshReport>,
}

impl WatchState {
    pub fn update(&mut self, report: MeshReport) -> WatchDecision {
        if self.last.as_ref() == Some(&report) {
            return WatchDecision::Unchanged;
        }
        let decision = if report.is_unconfigured() {
            WatchDecision::Recorded
        } else {
            WatchDecision::Restart
        };
        self.last = Some(report);
        decision
    }

    pub fn last(&self) -> Option<&MeshReport> {
        self.last.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// A bridged request is in flight; the check was skipped.
    BridgeActive,
    LinkBusy,
    /// The mesh did not acknowledge or did not report.
    NoReport,
    Checked(WatchDecision),
}

pub struct MeshWatch<T> {
    link: Arc<SerialLink<T>>,
    bridge: Arc<RequestBridge<T>>,
    wifi: Arc<Mutex<dyn WifiPort>>,
    telemetry: Arc<dyn TelemetrySink>,
    state: WatchState,
    lock_wait: Duration,
    ack_timeout: Duration,
}

impl<T: Transport + Send + 'static> MeshWatch<T> {
    pub fn new(
        link: Arc<SerialLink<T>>,
        bridge: Arc<RequestBridge<T>>,
        wifi: Arc<Mutex<dyn WifiPort>>,
        telemetry: Arc<dyn TelemetrySink>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            link,
            bridge,
            wifi,
            telemetry,
            state: WatchState::default(),
            lock_wait: config.request_lock_wait(),
            ack_timeout: config.ack_timeout(),
        }
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    pub fn check_once(&mut self) -> WatchOutcome {
        if !self.bridge.is_idle() {
            return WatchOutcome::BridgeActive;
        }
        let report = match self.query() {
            Ok(Some(report)) => report,
            Ok(None) => return WatchOutcome::NoReport,
            Err(GatewayError::TransportBusy) => return WatchOutcome::LinkBusy,
            Err(e) => {
                warn!("MeshWatch: status query failed: {}", e);
                return WatchOutcome::NoReport;
            }
        };

        let decision = self.state.update(report);
        match decision {
            WatchDecision::Unchanged => debug!("MeshWatch: no change"),
            WatchDecision::Recorded => info!("MeshWatch: mesh unconfigured, waiting"),
            WatchDecision::Restart => {
                info!("MeshWatch: mesh settings changed, restarting Wi-Fi");
                if let Err(e) = self.wifi.lock().restart(RESTART_MODE) {
                    error!("MeshWatch: Wi-Fi restart failed: {}", e);
                }
            }
        }
        WatchOutcome::Checked(decision)
    }

    /// Send the status query and read the report line under one session.
    fn query(&self) -> Result<Option<MeshReport>> {
        let mut session = self.link.acquire(Wait::Bounded(self.lock_wait))?;
        session.send(STATUS_QUERY)?;
        match session.wait_for_ack(self.ack_timeout, self.telemetry.as_ref())? {
            AckOutcome::Ok(_) => {}
            AckOutcome::NotOk(_) | AckOutcome::Timeout => return Ok(None),
        }

        let deadline = Deadline::after(self.ack_timeout);
        loop {
            let Some(line) = session.read_frame(deadline.remaining())? else {
                return Ok(None);
            };
            match Frame::classify(&line, FrameContext::Reply) {
                Frame::Telemetry { payload } => {
                    let _ = self.telemetry.offer(payload);
                }
                _ => return MeshReport::parse(&line).map(Some),
            }
        }
    }

    /// Fixed-rate task loop.
    pub fn run(&mut self, period: Duration, shutdown: &AtomicBool) {
        info!("MeshWatch: started (period {:?})", period);
        let mut next = Instant::now() + period;
        while !shutdown.load(Ordering::Acquire) {
            thread::sleep(next.saturating_duration_since(Instant::now()));
            let outcome = self.check_once();
            debug!("MeshWatch: {:?}", outcome);
            next = (next + period).max(Instant::now());
        }
    }
}
