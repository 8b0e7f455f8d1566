//! Day-file record layout.
//!
//! One file per calendar day, named `YYMMDD.txt`, holding fixed 8-byte
//! records appended at every flush:
//!
//! ```text
//!   byte 0      id
//!   byte 1      unit_count
//!   byte 2      model
//!   byte 3      avg_pwm
//!   bytes 4..8  unix seconds, little-endian
//! ```

use chrono::{DateTime, Datelike, NaiveDate};

use super::sampling::SamplingState;

pub const RECORD_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRecord {
    pub id: u8,
    pub unit_count: u8,
    pub model: u8,
    pub avg_pwm: u8,
    pub unix_seconds: u32,
}

impl DayRecord {
    /// Record for a flushed sampling state, stamped with its window start.
    pub fn from_state(state: &SamplingState) -> Self {
        Self {
            id: state.id,
            unit_count: state.unit_count,
            model: state.model,
            avg_pwm: state.avg,
            unix_seconds: state.t_0,
        }
    }

    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let t = self.unix_seconds.to_le_bytes();
        [self.id, self.unit_count, self.model, self.avg_pwm, t[0], t[1], t[2], t[3]]
    }

    pub fn decode(bytes: &[u8; RECORD_LEN]) -> Self {
        Self {
            id: bytes[0],
            unit_count: bytes[1],
            model: bytes[2],
            avg_pwm: bytes[3],
            unix_seconds: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

/// Every complete record in a day file; a torn trailing record is ignored.
pub fn decode_all(bytes: &[u8]) -> impl Iterator<Item = DayRecord> + '_ {
    bytes.chunks_exact(RECORD_LEN).map(|chunk| {
        let mut raw = [0u8; RECORD_LEN];
        raw.copy_from_slice(chunk);
        DayRecord::decode(&raw)
    })
}

/// File name for the day containing `unix_seconds` (UTC).
pub fn day_file_name(unix_seconds: u32) -> heapless::String<16> {
    let date = DateTime::from_timestamp(i64::from(unix_seconds), 0)
        .map(|dt| dt.date_naive())
        .unwrap_or(NaiveDate::MIN);
    file_name_for(date)
}

pub fn file_name_for(date: NaiveDate) -> heapless::String<16> {
    let mut name = heapless::String::new();
    // "YYMMDD.txt" always fits.
    core::fmt::Write::write_fmt(
        &mut name,
        format_args!(
            "{:02}{:02}{:02}.txt",
            date.year().rem_euclid(100),
            date.month(),
            date.day()
        ),
    )
    .ok();
    name
}
