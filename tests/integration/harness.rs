//! A complete gateway core wired to mock adapters.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use meshbridge::adapters::nvs::NvsAdapter;
use meshbridge::app::ports::{ClockPort, FileStore, StoragePort, TelemetrySink, WifiPort};
use meshbridge::bridge::RequestBridge;
use meshbridge::config::GatewayConfig;
use meshbridge::diagnostics::GatewayStats;
use meshbridge::direct::Dispatcher;
use meshbridge::http::Routes;
use meshbridge::link::SerialLink;
use meshbridge::mesh_watch::MeshWatch;
use meshbridge::telemetry::{DeviceRegistry, ReportFlusher, ReportPipeline, ReportQuery, TelemetryIntake};

use crate::mock_ports::{ManualClock, MemFileStore, MockTransport, MockWifi};

/// 2024-01-05 10:00:00 UTC
pub const T0: u32 = 1_704_448_800;

pub fn fast_config() -> GatewayConfig {
    GatewayConfig {
        ack_timeout_ms: 100,
        request_lock_wait_ms: 50,
        relay_budget_ms: 300,
        segment_gap_ms: 0,
        intake_lock_wait_ms: 10,
        intake_read_timeout_ms: 20,
        ..GatewayConfig::default()
    }
}

pub struct Harness {
    pub config: GatewayConfig,
    pub transport: MockTransport,
    pub link: Arc<SerialLink<MockTransport>>,
    pub stats: Arc<GatewayStats>,
    pub clock: Arc<ManualClock>,
    pub files: MemFileStore,
    pub wifi: Arc<Mutex<MockWifi>>,
    pub storage: Arc<Mutex<dyn StoragePort + Send>>,
    pub registry: Arc<DeviceRegistry>,
    pub pipeline: Arc<ReportPipeline>,
    pub bridge: Arc<RequestBridge<MockTransport>>,
    pub routes: Routes<MockTransport>,
}

impl Harness {
    pub fn new() -> Self {
        let config = fast_config();
        let transport = MockTransport::new();
        let link = Arc::new(SerialLink::new(transport.clone(), config.segment_gap()));
        let stats = Arc::new(GatewayStats::new());
        let clock = Arc::new(ManualClock::at(T0));
        let files = MemFileStore::new();
        let wifi = Arc::new(Mutex::new(MockWifi::new()));
        let storage: Arc<Mutex<dyn StoragePort + Send>> =
            Arc::new(Mutex::new(NvsAdapter::new().unwrap()));
        let registry = Arc::new(DeviceRegistry::new());

        let clock_port: Arc<dyn ClockPort> = clock.clone();
        let file_store: Arc<dyn FileStore> = Arc::new(files.clone());
        let wifi_port: Arc<Mutex<dyn WifiPort>> = wifi.clone();

        let pipeline = Arc::new(ReportPipeline::new(registry.clone(), clock_port.clone(), stats.clone()));
        let telemetry: Arc<dyn TelemetrySink> = pipeline.clone();
        let bridge = Arc::new(RequestBridge::new(link.clone(), telemetry, stats.clone(), &config));
        let dispatcher = Arc::new(Dispatcher::new(
            wifi_port,
            clock_port,
            registry.clone(),
            storage.clone(),
        ));
        let reports = Arc::new(ReportQuery::new(file_store, config.flush_period().as_secs()));
        let routes = Routes::new(bridge.clone(), dispatcher, reports, stats.clone());

        Self {
            config,
            transport,
            link,
            stats,
            clock,
            files,
            wifi,
            storage,
            registry,
            pipeline,
            bridge,
            routes,
        }
    }

    pub fn intake(&self) -> TelemetryIntake<MockTransport> {
        TelemetryIntake::new(self.link.clone(), self.pipeline.clone(), self.stats.clone(), &self.config)
    }

    pub fn flusher(&self) -> ReportFlusher {
        ReportFlusher::new(
            self.pipeline.clone(),
            Arc::new(self.files.clone()),
            self.clock.clone(),
            self.stats.clone(),
        )
    }

    pub fn mesh_watch(&self) -> MeshWatch<MockTransport> {
        MeshWatch::new(
            self.link.clone(),
            self.bridge.clone(),
            self.wifi.clone(),
            self.pipeline.clone(),
            &self.config,
        )
    }
}
