//! Telemetry intake → report pipeline → day files → `/report`.

use meshbridge::error::GatewayError;
use meshbridge::telemetry::record::decode_all;
use meshbridge::telemetry::{IntakeOutcome, LuminaireModel, RECORD_LEN, day_file_name};

use std::sync::Arc;

use meshbridge::app::ports::StorageError;
use meshbridge::telemetry::ReportFlusher;

use crate::harness::{Harness, T0};
use crate::mock_ports::FlakyFileStore;

const MAC: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];

fn registered() -> Harness {
    let h = Harness::new();
    h.registry.register(MAC, 2, LuminaireModel::Lum23k).unwrap();
    h
}

#[test]
fn telemetry_lands_in_the_day_file() {
    let h = registered();
    h.transport.inject(b"#r01AABBCCDDEEFF,50;");

    assert_eq!(h.intake().poll_once(), IntakeOutcome::Forwarded);
    assert_eq!(h.pipeline.drain_messages(), 1);

    let mut flusher = h.flusher();
    assert_eq!(flusher.flush(), Ok(1));

    let bytes = h.files.contents(&day_file_name(T0)).unwrap();
    assert_eq!(bytes.len(), RECORD_LEN);
    let record = decode_all(&bytes).next().unwrap();
    assert_eq!(record.id, 0);
    assert_eq!(record.unit_count, 2);
    assert_eq!(record.model, LuminaireModel::Lum23k.code());
    assert_eq!(record.avg_pwm, 50);
    assert_eq!(record.unix_seconds, T0);
    assert_eq!(h.stats.snapshot().records_written, 1);
}

#[test]
fn clean_states_are_not_written_again() {
    let h = registered();
    h.transport.inject(b"#r01AABBCCDDEEFF,50;");
    h.intake().poll_once();
    h.pipeline.drain_messages();

    let mut flusher = h.flusher();
    flusher.flush().unwrap();
    assert_eq!(flusher.flush(), Ok(0));
    assert_eq!(h.files.contents(&day_file_name(T0)).unwrap().len(), RECORD_LEN);
}

#[test]
fn second_sample_averages_over_the_window() {
    let h = registered();
    let mut flusher = h.flusher();

    h.transport.inject(b"#r01AABBCCDDEEFF,20;");
    h.intake().poll_once();
    h.pipeline.drain_messages();
    flusher.flush().unwrap();

    h.clock.advance(60);
    h.transport.inject(b"#r01AABBCCDDEEFF,80;");
    h.intake().poll_once();
    h.pipeline.drain_messages();
    assert_eq!(flusher.flush(), Ok(1));

    let state = flusher.state(0).unwrap();
    assert!(!state.dirty);
    assert_eq!(state.t_i, T0 + 60);
}

#[test]
fn failed_write_is_cut_and_retried_without_new_telemetry() {
    let h = registered();
    let store = FlakyFileStore::new(h.files.clone());
    let mut flusher = ReportFlusher::new(
        h.pipeline.clone(),
        Arc::new(store.clone()),
        h.clock.clone(),
        h.stats.clone(),
    );
    let name = day_file_name(T0);

    h.transport.inject(b"#r01AABBCCDDEEFF,20;");
    h.intake().poll_once();
    h.pipeline.drain_messages();
    assert_eq!(flusher.flush(), Ok(1));

    h.clock.advance(60);
    h.transport.inject(b"#r01AABBCCDDEEFF,40;");
    h.intake().poll_once();
    h.pipeline.drain_messages();
    store.fail_next_write();
    assert_eq!(flusher.flush(), Err(StorageError::IoError));
    // The torn tail is gone; the first record is intact.
    assert_eq!(h.files.contents(&name).unwrap().len(), RECORD_LEN);
    assert!(flusher.state(0).unwrap().dirty);

    // Nothing new arrived, the dirty state still goes out.
    assert_eq!(flusher.flush(), Ok(1));
    let bytes = h.files.contents(&name).unwrap();
    assert_eq!(bytes.len(), 2 * RECORD_LEN);
    let records: Vec<_> = decode_all(&bytes).collect();
    assert_eq!(records[0].avg_pwm, 20);
    assert_eq!(records[1].unix_seconds, T0);
    assert_eq!(flusher.flush(), Ok(0));
    assert_eq!(h.stats.snapshot().records_written, 2);
}

#[test]
fn unknown_device_is_counted_and_dropped() {
    let h = Harness::new();
    h.transport.inject(b"#r01010203040506,50;");

    assert_eq!(h.intake().poll_once(), IntakeOutcome::Forwarded);
    assert_eq!(h.pipeline.drain_messages(), 0);
    assert_eq!(h.stats.snapshot().unknown_devices, 1);
}

#[test]
fn non_telemetry_outside_a_request_is_discarded() {
    let h = Harness::new();
    h.transport.inject(b"009,stray;");
    assert_eq!(h.intake().poll_once(), IntakeOutcome::Dropped);
    assert_eq!(h.stats.snapshot().protocol_violations, 1);
    assert_eq!(h.intake().poll_once(), IntakeOutcome::Idle);
}

#[test]
fn message_queue_overflow_drops() {
    let h = registered();
    for _ in 0..5 {
        h.transport.inject(b"#r01AABBCCDDEEFF,50;");
        assert_eq!(h.intake().poll_once(), IntakeOutcome::Forwarded);
    }
    h.transport.inject(b"#r01AABBCCDDEEFF,50;");
    assert_eq!(h.intake().poll_once(), IntakeOutcome::Dropped);
    assert_eq!(h.stats.snapshot().telemetry_dropped, 1);
    assert_eq!(h.pipeline.pending_messages(), 5);
}

#[test]
fn offer_rejects_payload_without_separator() {
    use meshbridge::app::ports::TelemetrySink;
    let h = Harness::new();
    assert_eq!(h.pipeline.offer(b"AABBCCDDEEFF"), Err(GatewayError::ProtocolViolation));
}

#[test]
fn report_sums_energy_per_hour() {
    let h = registered();
    h.transport.inject(b"#r01AABBCCDDEEFF,50;");
    h.intake().poll_once();
    h.pipeline.drain_messages();
    h.flusher().flush().unwrap();

    // 50 % of 2 x 160 W for one 60 s flush period = 9600 Ws = 2 Wh.
    let reply = h.routes.report("day=5&month=1&year=2024");
    assert_eq!(reply.status, 200);
    let body = String::from_utf8(reply.body).unwrap();
    assert!(body.starts_with("0:0,"));
    assert!(body.contains(",10:2,"));
    assert!(body.ends_with("23:0,;"));

    let month = String::from_utf8(h.routes.report("month=1&year=2024").body).unwrap();
    assert!(month.contains(",5:2,"));
    assert!(month.ends_with("31:0,;"));

    let year = String::from_utf8(h.routes.report("year=2024").body).unwrap();
    assert!(year.starts_with("1:2,"));
}

#[test]
fn report_without_year_is_invalid() {
    let h = Harness::new();
    let reply = h.routes.report("month=1");
    assert_eq!(reply.status, 400);
    assert_eq!(reply.body, b"Invalid");
}
