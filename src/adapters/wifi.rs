//! Wi-Fi soft-AP / AP+STA adapter.
//!
//! Implements [`WifiPort`].  The gateway always runs its own access point
//! (the phones talk to `/out`, `/direct`, ...); in AP+STA mode it also
//! joins a site network as a station.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `BlockingWifi<EspWifi>` from `esp_idf_svc`.
//! - **all other targets**: in-memory simulation for host-side tests.
//!
//! Mode, AP and STA settings are persisted to NVS (`wifi`/`settings`)
//! after every change and restored at construction.

use std::sync::Arc;

use log::{error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::utils::is_printable_ascii;
use crate::app::ports::{
    ApSettings, Ipv4Settings, MAX_SCAN_ENTRIES, ScanEntry, StaSettings, StorageError, StoragePort,
    WifiError, WifiMode, WifiPort,
};
use crate::config::{DEFAULT_AP_PASSWORD, DEFAULT_AP_SSID};

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi,
};

const SETTINGS_NAMESPACE: &str = "wifi";
const SETTINGS_KEY: &str = "settings";
const SETTINGS_BLOB_MAX: usize = 256;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn validate_ssid(ssid: &str) -> Result<(), WifiError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(WifiError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), WifiError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(WifiError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Persisted settings
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiSettings {
    pub mode: WifiMode,
    pub ap: ApSettings,
    pub sta: StaSettings,
}

impl Default for WifiSettings {
    fn default() -> Self {
        let mut ap = ApSettings {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
        };
        let _ = ap.ssid.push_str(DEFAULT_AP_SSID);
        let _ = ap.password.push_str(DEFAULT_AP_PASSWORD);
        Self {
            mode: WifiMode::Ap,
            ap,
            sta: StaSettings::default(),
        }
    }
}

fn validate_ipv4(ipv4: Option<&Ipv4Settings>) -> Result<(), WifiError> {
    match ipv4 {
        Some(settings) if settings.ip == [0; 4] || settings.mask == [0; 4] => {
            Err(WifiError::InvalidAddress)
        }
        _ => Ok(()),
    }
}

impl WifiSettings {
    /// Same rules the setters apply; an empty STA SSID means no station.
    fn validate(&self) -> Result<(), WifiError> {
        validate_ssid(&self.ap.ssid)?;
        validate_password(&self.ap.password)?;
        if !self.sta.ssid.is_empty() {
            validate_ssid(&self.sta.ssid)?;
        }
        validate_password(&self.sta.password)?;
        validate_ipv4(self.sta.ipv4.as_ref())
    }

    fn load(storage: &dyn StoragePort) -> Self {
        let mut buf = [0u8; SETTINGS_BLOB_MAX];
        match storage.read(SETTINGS_NAMESPACE, SETTINGS_KEY, &mut buf) {
            Ok(len) => match postcard::from_bytes::<Self>(&buf[..len]) {
                Ok(settings) => match settings.validate() {
                    Ok(()) => settings,
                    Err(e) => {
                        warn!("WiFi: stored settings rejected ({}), using defaults", e);
                        Self::default()
                    }
                },
                Err(_) => {
                    warn!("WiFi: stored settings corrupted, using defaults");
                    Self::default()
                }
            },
            Err(StorageError::NotFound) => Self::default(),
            Err(e) => {
                warn!("WiFi: settings read failed ({}), using defaults", e);
                Self::default()
            }
        }
    }

    fn save(&self, storage: &mut dyn StoragePort) -> Result<(), StorageError> {
        let bytes = postcard::to_allocvec(self).map_err(|_| StorageError::IoError)?;
        storage.write(SETTINGS_NAMESPACE, SETTINGS_KEY, &bytes)
    }
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    settings: WifiSettings,
    storage: Arc<Mutex<dyn StoragePort + Send>>,
    #[cfg(target_os = "espidf")]
    driver: BlockingWifi<EspWifi<'static>>,
    /// Simulation: number of radio restarts, for tests.
    #[cfg(not(target_os = "espidf"))]
    restarts: u32,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(driver: BlockingWifi<EspWifi<'static>>, storage: Arc<Mutex<dyn StoragePort + Send>>) -> Self {
        let settings = WifiSettings::load(&*storage.lock());
        Self {
            settings,
            storage,
            driver,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(storage: Arc<Mutex<dyn StoragePort + Send>>) -> Self {
        let settings = WifiSettings::load(&*storage.lock());
        Self {
            settings,
            storage,
            restarts: 0,
        }
    }

    pub fn settings(&self) -> &WifiSettings {
        &self.settings
    }

    /// Bring the radio up in the persisted mode.
    pub fn start(&mut self) -> Result<(), WifiError> {
        let mode = self.settings.mode;
        self.restart(mode)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    fn persist(&self) {
        if let Err(e) = self.settings.save(&mut *self.storage.lock()) {
            error!("WiFi: settings not persisted: {}", e);
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_restart(&mut self, mode: WifiMode) -> Result<(), WifiError> {
        let ap = AccessPointConfiguration {
            ssid: self.settings.ap.ssid.as_str().try_into().map_err(|_| WifiError::InvalidSsid)?,
            password: self
                .settings
                .ap
                .password
                .as_str()
                .try_into()
                .map_err(|_| WifiError::InvalidPassword)?,
            auth_method: if self.settings.ap.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            channel: 1,
            ..Default::default()
        };
        let config = match mode {
            WifiMode::Ap => Configuration::AccessPoint(ap),
            WifiMode::ApSta => Configuration::Mixed(
                ClientConfiguration {
                    ssid: self.settings.sta.ssid.as_str().try_into().map_err(|_| WifiError::InvalidSsid)?,
                    password: self
                        .settings
                        .sta
                        .password
                        .as_str()
                        .try_into()
                        .map_err(|_| WifiError::InvalidPassword)?,
                    auth_method: if self.settings.sta.password.is_empty() {
                        AuthMethod::None
                    } else {
                        AuthMethod::WPAWPA2Personal
                    },
                    ..Default::default()
                },
                ap,
            ),
        };

        let failed = |e: esp_idf_svc::sys::EspError| {
            error!("WiFi: restart failed: {}", e);
            WifiError::RestartFailed
        };
        let _ = self.driver.stop();
        self.apply_sta_netif()?;
        self.driver.set_configuration(&config).map_err(failed)?;
        self.driver.start().map_err(failed)?;
        if mode == WifiMode::ApSta && !self.settings.sta.ssid.is_empty() {
            // The AP stays up even if the site network is unreachable.
            if let Err(e) = self.driver.connect() {
                warn!("WiFi: STA connect to '{}' failed: {}", self.settings.sta.ssid, e);
            }
        }
        Ok(())
    }

    /// Swap in a station netif carrying the stored static address, or a
    /// DHCP one.
    #[cfg(target_os = "espidf")]
    fn apply_sta_netif(&mut self) -> Result<(), WifiError> {
        use esp_idf_svc::ipv4::{
            ClientConfiguration as IpClientConfiguration, ClientSettings as IpClientSettings,
            Configuration as IpConfiguration, Mask, Subnet,
        };
        use esp_idf_svc::netif::{EspNetif, NetifConfiguration};
        use std::net::Ipv4Addr;

        let mut conf = NetifConfiguration::wifi_default_client();
        if let Some(ipv4) = self.settings.sta.ipv4 {
            let mask = Mask::try_from(Ipv4Addr::from(ipv4.mask)).map_err(|_| WifiError::InvalidAddress)?;
            let dns = |octets: [u8; 4]| (octets != [0; 4]).then(|| Ipv4Addr::from(octets));
            conf.ip_configuration = Some(IpConfiguration::Client(IpClientConfiguration::Fixed(
                IpClientSettings {
                    ip: Ipv4Addr::from(ipv4.ip),
                    subnet: Subnet {
                        gateway: Ipv4Addr::from(ipv4.gateway),
                        mask,
                    },
                    dns: dns(ipv4.dns1),
                    secondary_dns: dns(ipv4.dns2),
                },
            )));
        }
        let netif = EspNetif::new_with_conf(&conf).map_err(|e| {
            error!("WiFi: STA netif setup failed: {}", e);
            WifiError::InvalidAddress
        })?;
        self.driver.wifi_mut().swap_netif_sta(netif).map_err(|e| {
            error!("WiFi: STA netif swap failed: {}", e);
            WifiError::RestartFailed
        })?;
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_restart(&mut self, mode: WifiMode) -> Result<(), WifiError> {
        self.restarts = self.restarts.wrapping_add(1);
        info!("WiFi(sim): radio restarted in {:?} (restart {})", mode, self.restarts);
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// WifiPort
// ───────────────────────────────────────────────────────────────

impl WifiPort for WifiAdapter {
    fn mode(&self) -> WifiMode {
        self.settings.mode
    }

    fn restart(&mut self, mode: WifiMode) -> Result<(), WifiError> {
        info!("WiFi: restarting in {:?} (AP '{}')", mode, self.settings.ap.ssid);
        self.platform_restart(mode)?;
        if self.settings.mode != mode {
            self.settings.mode = mode;
            self.persist();
        }
        Ok(())
    }

    fn ap_settings(&self) -> ApSettings {
        self.settings.ap.clone()
    }

    fn set_ap_settings(&mut self, ssid: &str, password: &str) -> Result<(), WifiError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.settings.ap.ssid.clear();
        self.settings.ap.ssid.push_str(ssid).map_err(|_| WifiError::InvalidSsid)?;
        self.settings.ap.password.clear();
        self.settings
            .ap
            .password
            .push_str(password)
            .map_err(|_| WifiError::InvalidPassword)?;
        self.persist();
        info!("WiFi: AP settings updated (SSID='{}')", ssid);
        Ok(())
    }

    fn sta_settings(&self) -> StaSettings {
        self.settings.sta.clone()
    }

    /// An empty SSID clears the station configuration.
    fn set_sta_credentials(&mut self, ssid: &str, password: &str) -> Result<(), WifiError> {
        if !ssid.is_empty() {
            validate_ssid(ssid)?;
        }
        validate_password(password)?;
        self.settings.sta.ssid.clear();
        self.settings.sta.ssid.push_str(ssid).map_err(|_| WifiError::InvalidSsid)?;
        self.settings.sta.password.clear();
        self.settings
            .sta
            .password
            .push_str(password)
            .map_err(|_| WifiError::InvalidPassword)?;
        self.persist();
        info!("WiFi: STA credentials updated (SSID='{}')", ssid);
        Ok(())
    }

    fn set_sta_ipv4(&mut self, ipv4: Option<Ipv4Settings>) -> Result<(), WifiError> {
        validate_ipv4(ipv4.as_ref())?;
        self.settings.sta.ipv4 = ipv4;
        self.persist();
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn ipv4_info(&self) -> Ipv4Settings {
        match self.driver.wifi().sta_netif().get_ip_info() {
            Ok(info) => {
                let bits = u32::from(info.subnet.mask.0);
                let mask = u32::MAX.checked_shl(32 - bits).unwrap_or(0);
                Ipv4Settings {
                    ip: info.ip.octets(),
                    mask: mask.to_be_bytes(),
                    gateway: info.subnet.gateway.octets(),
                    dns1: info.dns.map(|a| a.octets()).unwrap_or_default(),
                    dns2: info.secondary_dns.map(|a| a.octets()).unwrap_or_default(),
                }
            }
            Err(e) => {
                warn!("WiFi: STA address query failed: {}", e);
                Ipv4Settings::default()
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn ipv4_info(&self) -> Ipv4Settings {
        self.settings.sta.ipv4.unwrap_or_default()
    }

    #[cfg(target_os = "espidf")]
    fn scan(&mut self) -> Result<heapless::Vec<ScanEntry, MAX_SCAN_ENTRIES>, WifiError> {
        let found = self.driver.scan().map_err(|e| {
            error!("WiFi: scan failed: {}", e);
            WifiError::ScanFailed
        })?;
        let mut entries = heapless::Vec::new();
        for ap in found.iter().take(MAX_SCAN_ENTRIES) {
            let mut ssid = heapless::String::new();
            let _ = ssid.push_str(ap.ssid.as_str());
            let _ = entries.push(ScanEntry {
                ssid,
                rssi: ap.signal_strength,
            });
        }
        Ok(entries)
    }

    #[cfg(not(target_os = "espidf"))]
    fn scan(&mut self) -> Result<heapless::Vec<ScanEntry, MAX_SCAN_ENTRIES>, WifiError> {
        let mut entries = heapless::Vec::new();
        for (name, rssi) in [("Wetzel-Site", -48), ("Warehouse-2G", -71)] {
            let mut ssid = heapless::String::new();
            let _ = ssid.push_str(name);
            let _ = entries.push(ScanEntry { ssid, rssi });
        }
        Ok(entries)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
