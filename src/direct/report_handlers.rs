//! Clock and report direct commands (codes 7 and 8).

use log::{error, info};

use super::{Content, Tokens};
use crate::app::ports::{ClockPort, StoragePort};
use crate::error::{GatewayError, Result};
use crate::telemetry::registry::{DeviceRegistry, LuminaireModel, parse_mac};

/// `7,<unix_seconds>,;`
pub fn rtc_update(clock: &dyn ClockPort, tokens: &mut Tokens<'_>) -> Result<Content> {
    let unix_seconds = tokens
        .arg()?
        .parse::<u32>()
        .map_err(|_| GatewayError::InvalidArgument("unix time"))?;
    tokens.end()?;
    clock.set(unix_seconds).map_err(|e| {
        error!("Direct: clock update to {} refused: {}", unix_seconds, e);
        GatewayError::InvalidArgument("unix time")
    })?;
    info!("Direct: clock set to {}", unix_seconds);
    Ok(Content::empty())
}

/// `8,<MAC 12 hex>,<unit_count>,<model>,;` registers a report device and
/// persists the registry.
pub fn report_config(
    registry: &DeviceRegistry,
    storage: &mut dyn StoragePort,
    tokens: &mut Tokens<'_>,
) -> Result<Content> {
    let mac = parse_mac(tokens.arg()?).ok_or(GatewayError::InvalidArgument("mac"))?;
    let unit_count = tokens
        .arg()?
        .parse::<u8>()
        .map_err(|_| GatewayError::InvalidArgument("unit count"))?;
    let model = tokens
        .arg()?
        .parse::<u8>()
        .ok()
        .and_then(LuminaireModel::from_code)
        .ok_or(GatewayError::InvalidArgument("model"))?;
    tokens.end()?;

    registry.register(mac, unit_count, model)?;
    // The in-memory registration stands even if flash is unavailable.
    if let Err(e) = registry.save(storage) {
        error!("Direct: registry not persisted: {}", e);
    }
    Ok(Content::empty())
}
