//! Direct commands: `/direct?text=<code>,<payload>`.
//!
//! | code | command                 | handler                            |
//! |------|-------------------------|------------------------------------|
//! | 1    | Wi-Fi mode change       | [`wifi_handlers::mode_change`]     |
//! | 2    | AP config               | [`wifi_handlers::ap_config`]       |
//! | 3    | STA config              | [`wifi_handlers::sta_config`]      |
//! | 4    | SSID list               | [`wifi_handlers::ssid_list`]       |
//! | 5    | validate AP credentials | [`wifi_handlers::validate_ap`]     |
//! | 6    | interface info          | [`wifi_handlers::interface_info`]  |
//! | 7    | RTC update              | [`report_handlers::rtc_update`]    |
//! | 8    | report config           | [`report_handlers::report_config`] |
//!
//! Every reply uses the same envelope: `009,OK,<content>;` (or `007,OK,`
//! when the content is incomplete) with status 200, `009,NOK,;` with
//! status 500.

pub mod report_handlers;
pub mod wifi_handlers;

use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;

use crate::app::ports::{ClockPort, StoragePort, WifiPort};
use crate::error::{GatewayError, Result};
use crate::telemetry::DeviceRegistry;

const FINAL_OK: &str = "009,OK,";
const MULTI_OK: &str = "007,OK,";
const FINAL_NOK: &str = "009,NOK,";
const END_OF_MESSAGE: &str = ";";

pub const STATUS_OK: u16 = 200;
pub const STATUS_FAIL: u16 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DirectCode {
    WifiMode = 1,
    ApConfig = 2,
    StaConfig = 3,
    SsidList = 4,
    ValidateAp = 5,
    InterfaceInfo = 6,
    RtcUpdate = 7,
    ReportConfig = 8,
}

impl DirectCode {
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::WifiMode),
            2 => Some(Self::ApConfig),
            3 => Some(Self::StaConfig),
            4 => Some(Self::SsidList),
            5 => Some(Self::ValidateAp),
            6 => Some(Self::InterfaceInfo),
            7 => Some(Self::RtcUpdate),
            8 => Some(Self::ReportConfig),
            _ => None,
        }
    }
}

/// What a successful handler puts between the marker and the terminator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Content {
    pub text: String,
    /// The content is incomplete (`007` marker).
    pub more: bool,
}

impl Content {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn text(text: String) -> Self {
        Self { text, more: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectReply {
    pub status: u16,
    pub body: String,
}

impl DirectReply {
    pub fn from_result(result: Result<Content>) -> Self {
        match result {
            Ok(content) => {
                let marker = if content.more { MULTI_OK } else { FINAL_OK };
                Self {
                    status: STATUS_OK,
                    body: format!("{marker}{}{END_OF_MESSAGE}", content.text),
                }
            }
            Err(_) => Self {
                status: STATUS_FAIL,
                body: format!("{FINAL_NOK}{END_OF_MESSAGE}"),
            },
        }
    }
}

/// Payload tokens: split on `,`, empty tokens skipped.
pub struct Tokens<'a> {
    inner: core::str::Split<'a, char>,
}

impl<'a> Tokens<'a> {
    pub fn new(payload: &'a str) -> Self {
        Self {
            inner: payload.split(','),
        }
    }

    /// Next argument; a missing token or an early `;` is an error.
    pub fn arg(&mut self) -> Result<&'a str> {
        match self.next() {
            Some(";") | None => Err(GatewayError::InvalidArgument("missing argument")),
            Some(token) => Ok(token),
        }
    }

    /// The terminator must come next.
    pub fn end(&mut self) -> Result<()> {
        match self.next() {
            Some(";") => Ok(()),
            _ => Err(GatewayError::InvalidArgument("expected terminator")),
        }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        self.inner.find(|token| !token.is_empty())
    }
}

pub struct Dispatcher {
    wifi: Arc<Mutex<dyn WifiPort>>,
    clock: Arc<dyn ClockPort>,
    registry: Arc<DeviceRegistry>,
    storage: Arc<Mutex<dyn StoragePort + Send>>,
}

impl Dispatcher {
    pub fn new(
        wifi: Arc<Mutex<dyn WifiPort>>,
        clock: Arc<dyn ClockPort>,
        registry: Arc<DeviceRegistry>,
        storage: Arc<Mutex<dyn StoragePort + Send>>,
    ) -> Self {
        Self {
            wifi,
            clock,
            registry,
            storage,
        }
    }

    /// Split `"<code>,<payload>"` and dispatch.
    pub fn handle(&self, text: &str) -> DirectReply {
        let (code, payload) = text.split_once(',').unwrap_or((text, ""));
        match code.trim().parse::<u8>() {
            Ok(code) => self.dispatch(code, payload),
            Err(_) => {
                warn!("Direct: invalid code in {:?}", text);
                DirectReply::from_result(Err(GatewayError::InvalidArgument("code")))
            }
        }
    }

    pub fn dispatch(&self, code: u8, payload: &str) -> DirectReply {
        let Some(command) = DirectCode::from_u8(code) else {
            warn!("Direct: unknown code {}", code);
            return DirectReply::from_result(Err(GatewayError::InvalidArgument("code")));
        };

        let mut tokens = Tokens::new(payload);
        let result = match command {
            DirectCode::WifiMode => wifi_handlers::mode_change(&mut *self.wifi.lock(), &mut tokens),
            DirectCode::ApConfig => wifi_handlers::ap_config(&mut *self.wifi.lock(), &mut tokens),
            DirectCode::StaConfig => wifi_handlers::sta_config(&mut *self.wifi.lock(), &mut tokens),
            DirectCode::SsidList => wifi_handlers::ssid_list(&mut *self.wifi.lock(), &mut tokens),
            DirectCode::ValidateAp => wifi_handlers::validate_ap(&*self.wifi.lock(), &mut tokens),
            DirectCode::InterfaceInfo => Ok(wifi_handlers::interface_info(&*self.wifi.lock())),
            DirectCode::RtcUpdate => report_handlers::rtc_update(self.clock.as_ref(), &mut tokens),
            DirectCode::ReportConfig => report_handlers::report_config(
                &self.registry,
                &mut *self.storage.lock(),
                &mut tokens,
            ),
        };

        match &result {
            Ok(_) => info!("Direct: {:?} ok", command),
            Err(e) => warn!("Direct: {:?} failed: {}", command, e),
        }
        DirectReply::from_result(result)
    }
}
