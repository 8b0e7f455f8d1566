//! Fuzz target: `/direct` and `/report` query handling.
//!
//! URL-decodes arbitrary query text and runs it through the token
//! splitter, the mesh status parser and the report argument parser.
//! None of them may panic.
//!
//! cargo fuzz run fuzz_direct_command

#![no_main]

use libfuzzer_sys::fuzz_target;
use meshbridge::direct::Tokens;
use meshbridge::http::{parse_report_request, query_param, url_decode};
use meshbridge::mesh_watch::MeshReport;

fuzz_target!(|data: &[u8]| {
    let Ok(query) = core::str::from_utf8(data) else {
        return;
    };
    let _ = parse_report_request(query);
    if let Some(text) = query_param(query, "text").map(url_decode) {
        let (_, payload) = text.split_once(',').unwrap_or((&text, ""));
        let mut tokens = Tokens::new(payload);
        while tokens.arg().is_ok() {}
        let _ = tokens.end();
        let _ = MeshReport::parse(text.as_bytes());
    }
});
