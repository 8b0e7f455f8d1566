//! Mock adapters for integration tests.
//!
//! Every mock keeps its state behind an `Arc` so the test can hold one
//! handle while the gateway core owns another.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use meshbridge::app::ports::{
    ApSettings, ClockError, ClockPort, FileStore, Ipv4Settings, MAX_SCAN_ENTRIES, ScanEntry,
    StaSettings, StorageError, WifiError, WifiMode, WifiPort,
};
use meshbridge::link::Transport;

// ── MockTransport ─────────────────────────────────────────────

#[derive(Default)]
struct Wire {
    /// Released onto `inbound`, one per flushed write.
    responses: VecDeque<Vec<u8>>,
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    flushes: usize,
}

/// Scripted mesh root: each flushed command releases the next queued
/// response.  Unsolicited traffic is injected with [`MockTransport::inject`].
#[derive(Clone, Default)]
pub struct MockTransport {
    wire: Arc<Mutex<Wire>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, bytes: &[u8]) {
        self.wire.lock().unwrap().responses.push_back(bytes.to_vec());
    }

    pub fn inject(&self, bytes: &[u8]) {
        self.wire.lock().unwrap().inbound.extend(bytes.iter().copied());
    }

    pub fn written(&self) -> Vec<u8> {
        self.wire.lock().unwrap().written.clone()
    }

    /// Number of commands put on the wire.
    pub fn commands_sent(&self) -> usize {
        self.wire.lock().unwrap().flushes
    }
}

impl Transport for MockTransport {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let mut wire = self.wire.lock().unwrap();
        let n = buf.len().min(wire.inbound.len());
        for slot in buf.iter_mut().take(n) {
            *slot = wire.inbound.pop_front().unwrap_or_default();
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        self.wire.lock().unwrap().written.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        let mut wire = self.wire.lock().unwrap();
        wire.flushes += 1;
        if let Some(next) = wire.responses.pop_front() {
            wire.inbound.extend(next);
        }
        Ok(())
    }

    fn available(&self) -> bool {
        !self.wire.lock().unwrap().inbound.is_empty()
    }
}

// ── ManualClock ───────────────────────────────────────────────

const EPOCH_2020: u32 = 1_577_836_800;

pub struct ManualClock {
    now: AtomicU32,
}

impl ManualClock {
    pub fn at(unix_seconds: u32) -> Self {
        Self {
            now: AtomicU32::new(unix_seconds),
        }
    }

    pub fn advance(&self, secs: u32) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl ClockPort for ManualClock {
    fn now(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }

    fn set(&self, unix_seconds: u32) -> Result<(), ClockError> {
        if unix_seconds < EPOCH_2020 {
            return Err(ClockError::Implausible);
        }
        self.now.store(unix_seconds, Ordering::SeqCst);
        Ok(())
    }
}

// ── MemFileStore ──────────────────────────────────────────────

type Files = Arc<Mutex<HashMap<String, Vec<u8>>>>;

#[derive(Clone, Default)]
pub struct MemFileStore {
    files: Files,
}

impl MemFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(name).cloned()
    }

    pub fn put(&self, name: &str, bytes: &[u8]) {
        self.files.lock().unwrap().insert(name.to_owned(), bytes.to_vec());
    }
}

struct MemAppender {
    files: Files,
    name: String,
}

impl Write for MemAppender {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.files
            .lock()
            .unwrap()
            .entry(self.name.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl FileStore for MemFileStore {
    fn open_append(&self, name: &str) -> Result<Box<dyn Write + Send>, StorageError> {
        self.files.lock().unwrap().entry(name.to_owned()).or_default();
        Ok(Box::new(MemAppender {
            files: self.files.clone(),
            name: name.to_owned(),
        }))
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        self.contents(name).ok_or(StorageError::NotFound)
    }

    fn size(&self, name: &str) -> Result<u64, StorageError> {
        self.contents(name).map(|b| b.len() as u64).ok_or(StorageError::NotFound)
    }

    fn truncate(&self, name: &str, len: u64) -> Result<(), StorageError> {
        let mut files = self.files.lock().unwrap();
        let bytes = files.get_mut(name).ok_or(StorageError::NotFound)?;
        bytes.truncate(len as usize);
        Ok(())
    }
}

/// Like [`MemFileStore`], but the next write stores a few bytes and then
/// fails, as a card pulled mid-write would.
#[derive(Clone, Default)]
pub struct FlakyFileStore {
    inner: MemFileStore,
    fail_next: Arc<AtomicBool>,
}

impl FlakyFileStore {
    pub fn new(inner: MemFileStore) -> Self {
        Self {
            inner,
            fail_next: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_next_write(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

struct FlakyAppender {
    inner: MemAppender,
    fail_next: Arc<AtomicBool>,
}

impl Write for FlakyAppender {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            self.inner.write(&buf[..buf.len().min(3)])?;
            return Err(std::io::Error::other("card removed"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl FileStore for FlakyFileStore {
    fn open_append(&self, name: &str) -> Result<Box<dyn Write + Send>, StorageError> {
        self.inner.files.lock().unwrap().entry(name.to_owned()).or_default();
        Ok(Box::new(FlakyAppender {
            inner: MemAppender {
                files: self.inner.files.clone(),
                name: name.to_owned(),
            },
            fail_next: self.fail_next.clone(),
        }))
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.read(name)
    }

    fn size(&self, name: &str) -> Result<u64, StorageError> {
        self.inner.size(name)
    }

    fn truncate(&self, name: &str, len: u64) -> Result<(), StorageError> {
        self.inner.truncate(name, len)
    }
}

// ── MockWifi ──────────────────────────────────────────────────

/// Records every radio restart.
pub struct MockWifi {
    pub mode: WifiMode,
    pub ap: ApSettings,
    pub sta: StaSettings,
    pub restarts: Vec<WifiMode>,
    pub networks: Vec<(&'static str, i8)>,
}

impl MockWifi {
    pub fn new() -> Self {
        let mut ap = ApSettings {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
        };
        let _ = ap.ssid.push_str("Gateway");
        let _ = ap.password.push_str("password1");
        Self {
            mode: WifiMode::Ap,
            ap,
            sta: StaSettings::default(),
            restarts: Vec::new(),
            networks: vec![("Site", -40), ("Yard", -72)],
        }
    }
}

impl Default for MockWifi {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiPort for MockWifi {
    fn mode(&self) -> WifiMode {
        self.mode
    }

    fn restart(&mut self, mode: WifiMode) -> Result<(), WifiError> {
        self.mode = mode;
        self.restarts.push(mode);
        Ok(())
    }

    fn ap_settings(&self) -> ApSettings {
        self.ap.clone()
    }

    fn set_ap_settings(&mut self, ssid: &str, password: &str) -> Result<(), WifiError> {
        if ssid.is_empty() {
            return Err(WifiError::InvalidSsid);
        }
        self.ap.ssid = heapless::String::try_from(ssid).map_err(|_| WifiError::InvalidSsid)?;
        self.ap.password =
            heapless::String::try_from(password).map_err(|_| WifiError::InvalidPassword)?;
        Ok(())
    }

    fn sta_settings(&self) -> StaSettings {
        self.sta.clone()
    }

    fn set_sta_credentials(&mut self, ssid: &str, password: &str) -> Result<(), WifiError> {
        self.sta.ssid = heapless::String::try_from(ssid).map_err(|_| WifiError::InvalidSsid)?;
        self.sta.password =
            heapless::String::try_from(password).map_err(|_| WifiError::InvalidPassword)?;
        Ok(())
    }

    fn set_sta_ipv4(&mut self, ipv4: Option<Ipv4Settings>) -> Result<(), WifiError> {
        self.sta.ipv4 = ipv4;
        Ok(())
    }

    fn ipv4_info(&self) -> Ipv4Settings {
        self.sta.ipv4.unwrap_or_default()
    }

    fn scan(&mut self) -> Result<heapless::Vec<ScanEntry, MAX_SCAN_ENTRIES>, WifiError> {
        let mut entries = heapless::Vec::new();
        for (name, rssi) in &self.networks {
            let entry = ScanEntry {
                ssid: heapless::String::try_from(*name).map_err(|_| WifiError::ScanFailed)?,
                rssi: *rssi,
            };
            if entries.push(entry).is_err() {
                break;
            }
        }
        Ok(entries)
    }
}
