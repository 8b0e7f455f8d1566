//! Wall-clock adapter.
//!
//! Implements [`ClockPort`] for stamping report entries and naming day
//! files.  The mesh app sets the time through direct command 7.
//!
//! - **`target_os = "espidf"`**: `gettimeofday` / `settimeofday` on the
//!   system RTC.
//! - **`not(target_os = "espidf")`**: `SystemTime` plus an offset, so a set
//!   time is visible to the host tests without touching the host clock.

use log::info;

use crate::app::ports::{ClockError, ClockPort};

/// Anything earlier is an unsynchronised clock (2020-01-01T00:00:00Z).
pub const EPOCH_2020: u32 = 1_577_836_800;

pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    offset_secs: std::sync::atomic::AtomicI64,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            offset_secs: std::sync::atomic::AtomicI64::new(0),
        }
    }

    /// `true` once the clock has been set to a plausible date.
    pub fn is_synchronised(&self) -> bool {
        self.now() >= EPOCH_2020
    }

    #[cfg(not(target_os = "espidf"))]
    fn host_now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

impl ClockPort for SystemClock {
    #[cfg(target_os = "espidf")]
    fn now(&self) -> u32 {
        let mut tv = esp_idf_svc::sys::timeval { tv_sec: 0, tv_usec: 0 };
        // SAFETY: `tv` is a valid out-pointer; the timezone argument may be null.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return 0;
        }
        tv.tv_sec.clamp(0, i64::from(u32::MAX)) as u32
    }

    #[cfg(not(target_os = "espidf"))]
    fn now(&self) -> u32 {
        let offset = self.offset_secs.load(std::sync::atomic::Ordering::Relaxed);
        (Self::host_now() + offset).clamp(0, i64::from(u32::MAX)) as u32
    }

    fn set(&self, unix_seconds: u32) -> Result<(), ClockError> {
        if unix_seconds < EPOCH_2020 {
            return Err(ClockError::Implausible);
        }

        #[cfg(target_os = "espidf")]
        {
            let tv = esp_idf_svc::sys::timeval {
                tv_sec: unix_seconds.into(),
                tv_usec: 0,
            };
            // SAFETY: `tv` is fully initialised; the timezone argument may be null.
            if unsafe { esp_idf_svc::sys::settimeofday(&tv, core::ptr::null()) } != 0 {
                return Err(ClockError::SetFailed);
            }
        }

        #[cfg(not(target_os = "espidf"))]
        self.offset_secs.store(
            i64::from(unix_seconds) - Self::host_now(),
            std::sync::atomic::Ordering::Relaxed,
        );

        info!("Clock: set to {}", unix_seconds);
        Ok(())
    }
}
