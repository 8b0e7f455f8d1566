//! Historical energy reports over the day files.
//!
//! | request                  | buckets                 |
//! |--------------------------|-------------------------|
//! | `day` + `month` + `year` | 24 hours of that day    |
//! | `month` + `year`         | every day of that month |
//! | `year`                   | 12 months               |
//!
//! Each record stands for one flush period at `avg_pwm` percent of the
//! model's rated power times the number of units.  Buckets are reported in
//! whole watt-hours as `"<index>:<wh>,"` pairs closed by `;`.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use log::warn;

use super::record::{decode_all, file_name_for};
use super::registry::LuminaireModel;
use crate::app::ports::{FileStore, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportRequest {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
    Year(i32),
}

impl ReportRequest {
    /// Zero `day`/`month` mean "not given".
    pub fn from_fields(day: u32, month: u32, year: i32) -> Option<Self> {
        match (day, month) {
            (0, 0) => (2000..=2099).contains(&year).then_some(Self::Year(year)),
            (0, m) => NaiveDate::from_ymd_opt(year, m, 1)
                .filter(|_| (2000..=2099).contains(&year))
                .map(|_| Self::Month { year, month: m }),
            (d, m) => NaiveDate::from_ymd_opt(year, m, d)
                .filter(|_| (2000..=2099).contains(&year))
                .map(Self::Day),
        }
    }
}

pub struct ReportQuery {
    store: Arc<dyn FileStore>,
    record_secs: u64,
}

impl ReportQuery {
    /// `record_secs` is the flush period each record covers.
    pub fn new(store: Arc<dyn FileStore>, record_secs: u64) -> Self {
        Self { store, record_secs }
    }

    pub fn run(&self, request: ReportRequest) -> Result<String, StorageError> {
        let buckets: Vec<(u32, u64)> = match request {
            ReportRequest::Day(date) => self
                .hourly_watt_seconds(date)?
                .iter()
                .enumerate()
                .map(|(hour, ws)| (hour as u32, *ws))
                .collect(),
            ReportRequest::Month { year, month } => {
                let mut days = Vec::with_capacity(31);
                for date in days_of_month(year, month) {
                    let total = self.hourly_watt_seconds(date)?.iter().sum::<u64>();
                    days.push((date.day(), total));
                }
                days
            }
            ReportRequest::Year(year) => {
                let mut months = Vec::with_capacity(12);
                for month in 1..=12 {
                    let mut total = 0;
                    for date in days_of_month(year, month) {
                        total += self.hourly_watt_seconds(date)?.iter().sum::<u64>();
                    }
                    months.push((month, total));
                }
                months
            }
        };

        let mut body = String::new();
        for (index, ws) in buckets {
            body.push_str(&format!("{}:{},", index, ws / 3600));
        }
        body.push(';');
        Ok(body)
    }

    /// Energy per hour of `date` in watt-seconds.  A missing file is a day
    /// without data.
    fn hourly_watt_seconds(&self, date: NaiveDate) -> Result<[u64; 24], StorageError> {
        let mut hours = [0u64; 24];
        let bytes = match self.store.read(&file_name_for(date)) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound) => return Ok(hours),
            Err(e) => return Err(e),
        };

        for record in decode_all(&bytes) {
            let Some(model) = LuminaireModel::from_code(record.model) else {
                warn!("Query: record for id {} has unknown model {}", record.id, record.model);
                continue;
            };
            let Some(stamp) = DateTime::from_timestamp(i64::from(record.unix_seconds), 0) else {
                continue;
            };
            let watts = u64::from(record.avg_pwm) * u64::from(model.watts()) * u64::from(record.unit_count) / 100;
            hours[stamp.hour() as usize] += watts * self.record_secs;
        }
        Ok(hours)
    }
}

fn days_of_month(year: i32, month: u32) -> impl Iterator<Item = NaiveDate> {
    (1..=31).map_while(move |day| NaiveDate::from_ymd_opt(year, month, day))
}
