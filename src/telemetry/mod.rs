//! Telemetry path: intake from the serial link, device registry, report
//! pipeline, day-file records and historical queries.

pub mod intake;
pub mod pipeline;
pub mod query;
pub mod record;
pub mod registry;
pub mod sampling;

pub use intake::{IntakeOutcome, TelemetryIntake};
pub use pipeline::{ReportFlusher, ReportMessage, ReportPipeline};
pub use query::{ReportQuery, ReportRequest};
pub use record::{DayRecord, RECORD_LEN, day_file_name};
pub use registry::{DeviceRecord, DeviceRegistry, LuminaireModel, MacAddress};
pub use sampling::{ReportEntry, SamplingState, weighted_average};
