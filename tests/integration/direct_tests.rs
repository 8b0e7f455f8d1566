//! `/direct` commands through the dispatcher into the mock ports.

use meshbridge::app::ports::{ClockPort, WifiMode};
use meshbridge::telemetry::DeviceRegistry;

use crate::harness::{Harness, T0};

fn direct(h: &Harness, text: &str) -> (u16, String) {
    let reply = h.routes.direct(&format!("text={}", text));
    (reply.status, String::from_utf8(reply.body).unwrap())
}

#[test]
fn mode_change_restarts_the_radio() {
    let h = Harness::new();
    assert_eq!(direct(&h, "1%2C1%2C%3B"), (200, "009,OK,;".into()));
    assert_eq!(h.wifi.lock().restarts, vec![WifiMode::ApSta]);
}

#[test]
fn encoded_space_terminates_the_command() {
    let h = Harness::new();
    assert_eq!(direct(&h, "1%2C0%2C%20").0, 200);
    assert_eq!(h.wifi.lock().mode, WifiMode::Ap);
}

#[test]
fn ap_config_then_validate() {
    let h = Harness::new();
    assert_eq!(direct(&h, "2,Hall,hallpass1,;").0, 200);
    assert_eq!(h.wifi.lock().ap.ssid.as_str(), "Hall");

    assert_eq!(direct(&h, "5,Hall,hallpass1,;"), (200, "009,OK,;".into()));
    assert_eq!(direct(&h, "5,Hall,wrong,;"), (500, "009,NOK,;".into()));
    assert_eq!(direct(&h, "5,Other,hallpass1,;").0, 500);
}

#[test]
fn sta_config_with_empty_markers_selects_dhcp() {
    let h = Harness::new();
    assert_eq!(direct(&h, "3,Site,sitepass1,#,#,#,#,#,;").0, 200);
    let wifi = h.wifi.lock();
    assert_eq!(wifi.sta.ssid.as_str(), "Site");
    assert_eq!(wifi.sta.ipv4, None);
    assert_eq!(wifi.restarts.len(), 1);
}

#[test]
fn sta_config_with_static_address() {
    let h = Harness::new();
    let text = "3,Site,sitepass1,10.0.0.20,255.255.255.0,10.0.0.1,8.8.8.8,#,;";
    assert_eq!(direct(&h, text).0, 200);
    let ipv4 = h.wifi.lock().sta.ipv4.unwrap();
    assert_eq!(ipv4.ip, [10, 0, 0, 20]);
    assert_eq!(ipv4.dns1, [8, 8, 8, 8]);
    assert_eq!(ipv4.dns2, [0, 0, 0, 0]);
}

#[test]
fn ssid_list_reports_scan() {
    let h = Harness::new();
    assert_eq!(direct(&h, "4,;"), (200, "009,OK,Site,-40,Yard,-72,;".into()));
}

#[test]
fn full_scan_table_is_marked_incomplete() {
    let h = Harness::new();
    h.wifi.lock().networks = vec![("Net", -50); 20];
    let (status, body) = direct(&h, "4,;");
    assert_eq!(status, 200);
    assert!(body.starts_with("007,OK,Net,-50,"));
}

#[test]
fn interface_info_lists_addresses() {
    let h = Harness::new();
    assert_eq!(
        direct(&h, "6"),
        (
            200,
            "009,OK,2,Gateway,,0.0.0.0,0.0.0.0,0.0.0.0,0.0.0.0,0.0.0.0,;".into()
        )
    );
}

#[test]
fn rtc_update_sets_the_clock() {
    let h = Harness::new();
    let later = T0 + 3600;
    assert_eq!(direct(&h, &format!("7,{},;", later)).0, 200);
    assert_eq!(h.clock.now(), later);

    assert_eq!(direct(&h, "7,5,;").0, 500);
    assert_eq!(h.clock.now(), later);
}

#[test]
fn report_config_registers_and_persists() {
    let h = Harness::new();
    assert_eq!(direct(&h, "8,AABBCCDDEEFF,3,2,;"), (200, "009,OK,;".into()));
    assert_eq!(h.registry.len(), 1);

    // Same MAC again is refused.
    assert_eq!(direct(&h, "8,AABBCCDDEEFF,3,2,;").0, 500);

    let restored = DeviceRegistry::load(&*h.storage.lock());
    assert_eq!(restored.len(), 1);
    let record = restored.snapshot()[0];
    assert_eq!(record.id, 0);
    assert_eq!(record.unit_count, 3);
}

#[test]
fn report_config_rejects_bad_fields() {
    let h = Harness::new();
    assert_eq!(direct(&h, "8,AABBCC,3,2,;").0, 500);
    assert_eq!(direct(&h, "8,AABBCCDDEEFF,3,9,;").0, 500);
    assert_eq!(direct(&h, "8,AABBCCDDEEFF,3,;").0, 500);
    assert!(h.registry.is_empty());
}

#[test]
fn unknown_code_is_nok() {
    let h = Harness::new();
    assert_eq!(direct(&h, "42,;"), (500, "009,NOK,;".into()));
    assert_eq!(direct(&h, "x,;").0, 500);
}
