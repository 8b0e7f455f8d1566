//! Mesh gateway firmware entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  UartTransport   WifiAdapter   NvsAdapter   SdCard   SystemClock│
//! │  (Transport)     (WifiPort)    (Config+NVS) (Files)  (ClockPort)│
//! │  http_server ──▶ Routes                                        │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  SerialLink ◀── RequestBridge · TelemetryIntake · MeshWatch    │
//! │  Dispatcher (direct commands) · ReportPipeline · ReportFlusher │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use log::{error, info, warn};
use parking_lot::Mutex;

use meshbridge::adapters::clock::SystemClock;
use meshbridge::adapters::http_server;
use meshbridge::adapters::nvs::NvsAdapter;
use meshbridge::adapters::sd_card::{self, SdCard};
use meshbridge::adapters::uart::UartTransport;
use meshbridge::adapters::wifi::WifiAdapter;
use meshbridge::app::ports::{ClockPort, ConfigPort, FileStore, StoragePort, TelemetrySink, WifiPort};
use meshbridge::bridge::RequestBridge;
use meshbridge::config::{FIRMWARE_VERSION, GatewayConfig};
use meshbridge::diagnostics::{GatewayStats, HeapInfo, health_line};
use meshbridge::direct::Dispatcher;
use meshbridge::http::Routes;
use meshbridge::link::SerialLink;
use meshbridge::mesh_watch::MeshWatch;
use meshbridge::tasks::{Core, priority, spawn_on_core};
use meshbridge::telemetry::{DeviceRegistry, ReportFlusher, ReportPipeline, ReportQuery, TelemetryIntake};

/// Never set in production; the tasks run for the life of the device.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

const HEALTH_PERIOD: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Mesh gateway v{}                 ║", FIRMWARE_VERSION);
    info!("╚══════════════════════════════════════╝");

    // ── 2. Config, registry ───────────────────────────────────
    let nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {}", e))?;
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            GatewayConfig::default()
        }
    };
    let storage: Arc<Mutex<dyn StoragePort + Send>> = Arc::new(Mutex::new(nvs));
    let registry = Arc::new(DeviceRegistry::load(&*storage.lock()));
    info!("Registry: {} devices", registry.len());
    let stats = Arc::new(GatewayStats::new());

    // ── 3. Peripherals ────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    let uart = UartTransport::new(peripherals.uart2, pins.gpio17, pins.gpio16, config.uart_baud)
        .context("UART2 init")?;
    let link = Arc::new(SerialLink::new(uart, config.segment_gap()));

    let sysloop = EspSystemEventLoop::take()?;
    let driver = BlockingWifi::wrap(EspWifi::new(peripherals.modem, sysloop.clone(), None)?, sysloop)?;
    let mut wifi = WifiAdapter::new(driver, storage.clone());
    if let Err(e) = wifi.start() {
        error!("WiFi: start failed: {}", e);
    }
    let wifi: Arc<Mutex<dyn WifiPort>> = Arc::new(Mutex::new(wifi));

    // Reports are lost without a card, the bridge still works.
    let _sd_mount = match sd_card::mount(
        peripherals.spi3,
        pins.gpio14,
        pins.gpio15,
        pins.gpio4,
        pins.gpio13,
        &config.sd_mount_point,
    ) {
        Ok(mount) => Some(mount),
        Err(e) => {
            error!("SD: mount failed ({}), day files unavailable", e);
            None
        }
    };
    let files: Arc<dyn FileStore> = Arc::new(SdCard::new(config.sd_mount_point.as_str()));
    let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());

    // ── 4. Core services ──────────────────────────────────────
    let pipeline = Arc::new(ReportPipeline::new(registry.clone(), clock.clone(), stats.clone()));
    let telemetry: Arc<dyn TelemetrySink> = pipeline.clone();
    let bridge = Arc::new(RequestBridge::new(link.clone(), telemetry.clone(), stats.clone(), &config));
    let dispatcher = Arc::new(Dispatcher::new(wifi.clone(), clock.clone(), registry, storage));
    let reports = Arc::new(ReportQuery::new(files.clone(), config.flush_period().as_secs()));
    let routes = Arc::new(Routes::new(bridge.clone(), dispatcher, reports, stats.clone()));

    // ── 5. Tasks ──────────────────────────────────────────────
    {
        let pipeline = pipeline.clone();
        let poll = config.consumer_poll();
        spawn_on_core(Core::App, priority::REPORT_CONSUMER, 4, "report_consume\0", move || {
            pipeline.run_consumer(poll, &SHUTDOWN);
        })
        .context("spawn report consumer")?;
    }
    {
        let mut flusher = ReportFlusher::new(pipeline, files, clock, stats.clone());
        let period = config.flush_period();
        spawn_on_core(Core::App, priority::REPORT_FLUSH, 6, "report_flush\0", move || {
            flusher.run(period, &SHUTDOWN);
        })
        .context("spawn report flusher")?;
    }
    {
        let intake = TelemetryIntake::new(link.clone(), telemetry.clone(), stats.clone(), &config);
        spawn_on_core(Core::App, priority::INTAKE, 4, "intake\0", move || {
            intake.run(&SHUTDOWN);
        })
        .context("spawn telemetry intake")?;
    }
    {
        let mut watch = MeshWatch::new(link, bridge, wifi, telemetry, &config);
        let period = config.mesh_watch_period();
        spawn_on_core(Core::Pro, priority::MESH_WATCH, 4, "mesh_watch\0", move || {
            watch.run(period, &SHUTDOWN);
        })
        .context("spawn mesh watch")?;
    }

    // ── 6. HTTP surface ───────────────────────────────────────
    let _server = http_server::start(routes, config.http_port)?;
    info!("System ready.");

    // ── 7. Health loop ────────────────────────────────────────
    loop {
        std::thread::sleep(HEALTH_PERIOD);
        info!("Health: {}", health_line(&stats.snapshot(), &HeapInfo::collect()));
    }
}
