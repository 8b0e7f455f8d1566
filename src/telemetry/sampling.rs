//! Per-device running PWM average between flushes.
//!
//! Each device keeps the last two samples and an accumulation window
//! `[t_0, t_i]`.  Folding a new sample moves the window end and recomputes
//! the average with [`weighted_average`].  After a flush clears `dirty`, the
//! next sample opens a new window starting at the previous sample.

use log::warn;

use super::registry::DeviceRecord;

/// A telemetry sample resolved against the registry and stamped with the
/// wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportEntry {
    pub device: DeviceRecord,
    pub pwm: u8,
    pub timestamp: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingState {
    pub id: u8,
    pub unit_count: u8,
    pub model: u8,
    /// Average at the end of the previous fold.
    pub last_avg: u8,
    pub avg: u8,
    pub pwm_i: u8,
    pub pwm_i_1: u8,
    pub t_i: u32,
    pub t_i_1: u32,
    /// Start of the accumulation window.
    pub t_0: u32,
    /// Folded since the last flush.
    pub dirty: bool,
}

impl SamplingState {
    /// State for the first sample ever seen from a device.
    pub fn first(entry: &ReportEntry) -> Self {
        Self {
            id: entry.device.id,
            unit_count: entry.device.unit_count,
            model: entry.device.model.code(),
            last_avg: entry.pwm,
            avg: entry.pwm,
            pwm_i: entry.pwm,
            pwm_i_1: entry.pwm,
            t_i: entry.timestamp,
            t_i_1: entry.timestamp,
            t_0: entry.timestamp,
            dirty: true,
        }
    }

    pub fn fold(&mut self, entry: &ReportEntry) {
        if self.dirty {
            self.last_avg = self.avg;
        } else {
            // First sample after a flush: the window restarts at the
            // previous sample and the registry data is refreshed.
            self.unit_count = entry.device.unit_count;
            self.model = entry.device.model.code();
            self.t_0 = self.t_i;
            self.last_avg = self.pwm_i;
        }

        self.pwm_i_1 = self.pwm_i;
        self.t_i_1 = self.t_i;
        self.pwm_i = entry.pwm;
        self.t_i = entry.timestamp;
        self.dirty = true;

        self.avg = weighted_average(
            self.last_avg,
            self.t_0,
            self.t_i_1,
            self.pwm_i_1,
            self.t_i,
            self.pwm_i,
        );
    }
}

/// Running average over `[t_0, t_i]`:
///
/// ```text
/// avg = (last_avg*(t_{i-1}-t_0) + ((3*pwm_{i-1} - pwm_i)/2)*(t_{i-1}-t_i)) / (t_i - t_0)
/// ```
///
/// The 3:1 weighting and the 32-bit unsigned wraparound of the
/// intermediate terms are part of the stored report format; existing day
/// files were produced with exactly this arithmetic, so it must not be
/// rewritten in wider or signed types.  Returns 0 when the window is empty.
pub fn weighted_average(
    last_avg: u8,
    t_0: u32,
    t_prev: u32,
    pwm_prev: u8,
    t_i: u32,
    pwm_i: u8,
) -> u8 {
    if t_i == t_0 {
        warn!("Sampling: empty averaging window at t={}", t_i);
        return 0;
    }
    let held = u32::from(last_avg).wrapping_mul(t_prev.wrapping_sub(t_0));
    let step = (3 * i32::from(pwm_prev) - i32::from(pwm_i)) / 2;
    let ramp = (step as u32).wrapping_mul(t_prev.wrapping_sub(t_i));
    (held.wrapping_add(ramp) / t_i.wrapping_sub(t_0)) as u8
}
