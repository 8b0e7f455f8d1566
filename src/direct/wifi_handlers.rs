//! Wi-Fi direct commands (codes 1–6).

use log::{info, warn};

use super::{Content, Tokens};
use crate::app::ports::{Ipv4Settings, MAX_SCAN_ENTRIES, WifiError, WifiMode, WifiPort};
use crate::error::{GatewayError, Result};

/// STA config field that stands for "empty".
const EMPTY_FIELD: &str = "#";

fn wifi_failed(e: WifiError) -> GatewayError {
    warn!("Direct: Wi-Fi port error: {}", e);
    GatewayError::InvalidArgument("wifi")
}

/// `1,<0|1>,;`
pub fn mode_change(wifi: &mut dyn WifiPort, tokens: &mut Tokens<'_>) -> Result<Content> {
    let mode = match tokens.arg()? {
        "0" => WifiMode::Ap,
        "1" => WifiMode::ApSta,
        _ => return Err(GatewayError::InvalidArgument("mode")),
    };
    tokens.end()?;
    wifi.restart(mode).map_err(wifi_failed)?;
    Ok(Content::empty())
}

/// `2,<ssid>,<password>,;`
pub fn ap_config(wifi: &mut dyn WifiPort, tokens: &mut Tokens<'_>) -> Result<Content> {
    let ssid = tokens.arg()?;
    let password = tokens.arg()?;
    tokens.end()?;
    wifi.set_ap_settings(ssid, password).map_err(wifi_failed)?;
    info!("Direct: AP now '{}'", ssid);
    let mode = wifi.mode();
    wifi.restart(mode).map_err(wifi_failed)?;
    Ok(Content::empty())
}

/// `3,<ssid>,<password>,<ip>,<mask>,<gw>,<dns1>,<dns2>,;`
///
/// Any field may be `#` (empty).  Empty addresses select DHCP.  A bad
/// address is logged and skipped; the credentials still apply.
pub fn sta_config(wifi: &mut dyn WifiPort, tokens: &mut Tokens<'_>) -> Result<Content> {
    let mut fields = [""; 7];
    for field in fields.iter_mut() {
        let token = tokens.arg()?;
        *field = if token == EMPTY_FIELD { "" } else { token };
    }
    tokens.end()?;

    let [ssid, password, ip, mask, gateway, dns1, dns2] = fields;
    wifi.set_sta_credentials(ssid, password).map_err(wifi_failed)?;

    match parse_ipv4_settings(ip, mask, gateway, dns1, dns2) {
        Ok(ipv4) => {
            if let Err(e) = wifi.set_sta_ipv4(ipv4) {
                warn!("Direct: STA address config rejected ({}), keeping credentials", e);
            }
        }
        Err(e) => warn!("Direct: STA address config invalid ({}), keeping credentials", e),
    }

    let mode = wifi.mode();
    wifi.restart(mode).map_err(wifi_failed)?;
    Ok(Content::empty())
}

/// `4,;` → `<ssid>,<rssi>,` per network.  A full scan table is marked
/// incomplete.
pub fn ssid_list(wifi: &mut dyn WifiPort, tokens: &mut Tokens<'_>) -> Result<Content> {
    tokens.end()?;
    let networks = wifi.scan().map_err(wifi_failed)?;
    let mut text = String::new();
    for entry in &networks {
        text.push_str(&format!("{},{},", entry.ssid, entry.rssi));
    }
    Ok(Content {
        text,
        more: networks.len() >= MAX_SCAN_ENTRIES,
    })
}

/// `5,<ssid>,<password>,;` succeeds iff both match the AP settings.
pub fn validate_ap(wifi: &dyn WifiPort, tokens: &mut Tokens<'_>) -> Result<Content> {
    let ssid = tokens.arg()?;
    let password = tokens.arg()?;
    tokens.end()?;

    let ap = wifi.ap_settings();
    if ssid != ap.ssid.as_str() {
        info!("Direct: AP validation failed, wrong SSID");
        return Err(GatewayError::InvalidArgument("ssid"));
    }
    if password != ap.password.as_str() {
        info!("Direct: AP validation failed, wrong password");
        return Err(GatewayError::InvalidArgument("password"));
    }
    Ok(Content::empty())
}

/// `6` → `mode,ap_ssid,sta_ssid,ip,mask,gw,dns1,dns2,`
pub fn interface_info(wifi: &dyn WifiPort) -> Content {
    let ap = wifi.ap_settings();
    let sta = wifi.sta_settings();
    let ip = wifi.ipv4_info();

    let mut text = String::new();
    text.push_str(&format!("{},{},{},", wifi.mode().code(), ap.ssid, sta.ssid));
    for addr in [ip.ip, ip.mask, ip.gateway, ip.dns1, ip.dns2] {
        text.push_str(&format!("{},", format_ipv4(addr)));
    }
    Content::text(text)
}

/// All five empty → DHCP.  Otherwise ip, mask and gateway are required;
/// empty DNS fields stay `0.0.0.0`.
pub fn parse_ipv4_settings(
    ip: &str,
    mask: &str,
    gateway: &str,
    dns1: &str,
    dns2: &str,
) -> core::result::Result<Option<Ipv4Settings>, WifiError> {
    if [ip, mask, gateway, dns1, dns2].iter().all(|f| f.is_empty()) {
        return Ok(None);
    }
    let optional = |text: &str| {
        if text.is_empty() {
            Ok([0; 4])
        } else {
            parse_ipv4(text)
        }
    };
    Ok(Some(Ipv4Settings {
        ip: parse_ipv4(ip)?,
        mask: parse_ipv4(mask)?,
        gateway: parse_ipv4(gateway)?,
        dns1: optional(dns1)?,
        dns2: optional(dns2)?,
    }))
}

pub fn parse_ipv4(text: &str) -> core::result::Result<[u8; 4], WifiError> {
    text.parse::<std::net::Ipv4Addr>()
        .map(|addr| addr.octets())
        .map_err(|_| WifiError::InvalidAddress)
}

pub fn format_ipv4(octets: [u8; 4]) -> std::net::Ipv4Addr {
    std::net::Ipv4Addr::from(octets)
}
