//! Periodic mesh status check against the scripted root node.

use meshbridge::app::ports::WifiMode;
use meshbridge::link::Wait;
use meshbridge::mesh_watch::{WatchDecision, WatchOutcome};

use crate::harness::Harness;

#[test]
fn changed_report_restarts_the_access_point() {
    let h = Harness::new();
    let mut watch = h.mesh_watch();
    h.transport.respond(b"ok,;1,plant,secret;");

    assert_eq!(watch.check_once(), WatchOutcome::Checked(WatchDecision::Restart));
    assert_eq!(h.transport.written(), b"9031,;");
    assert_eq!(h.wifi.lock().restarts, vec![WifiMode::Ap]);
}

#[test]
fn unchanged_report_does_nothing() {
    let h = Harness::new();
    let mut watch = h.mesh_watch();
    h.transport.respond(b"ok,;1,plant,secret;");
    h.transport.respond(b"ok,;1,plant,secret;");

    watch.check_once();
    assert_eq!(watch.check_once(), WatchOutcome::Checked(WatchDecision::Unchanged));
    assert_eq!(h.wifi.lock().restarts.len(), 1);
}

#[test]
fn unconfigured_mesh_is_recorded_only() {
    let h = Harness::new();
    let mut watch = h.mesh_watch();
    h.transport.respond(b"ok,;0,123456,none;");

    assert_eq!(watch.check_once(), WatchOutcome::Checked(WatchDecision::Recorded));
    assert!(h.wifi.lock().restarts.is_empty());
}

#[test]
fn telemetry_between_ack_and_report_is_forwarded() {
    let h = Harness::new();
    let mut watch = h.mesh_watch();
    h.transport.respond(b"ok,;#r01AABBCCDDEEFF,10;1,plant,secret;");

    assert_eq!(watch.check_once(), WatchOutcome::Checked(WatchDecision::Restart));
    assert_eq!(h.pipeline.pending_messages(), 1);
}

#[test]
fn skipped_while_a_request_is_in_flight() {
    let h = Harness::new();
    let mut watch = h.mesh_watch();
    h.transport.respond(b"ok,;008,partial;");
    assert_eq!(h.routes.out("text=x%3B").status, 200);

    assert_eq!(watch.check_once(), WatchOutcome::BridgeActive);
    assert_eq!(h.transport.commands_sent(), 1);
}

#[test]
fn held_link_is_reported_busy() {
    let h = Harness::new();
    let mut watch = h.mesh_watch();
    let _session = h.link.acquire(Wait::Forever).unwrap();
    assert_eq!(watch.check_once(), WatchOutcome::LinkBusy);
}

#[test]
fn silent_mesh_gives_no_report() {
    let h = Harness::new();
    let mut watch = h.mesh_watch();
    assert_eq!(watch.check_once(), WatchOutcome::NoReport);
    assert!(watch.state().last().is_none());
}
