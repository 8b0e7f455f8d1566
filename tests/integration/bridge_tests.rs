//! `/out` and `/ans` against a scripted mesh root.

use std::time::Duration;

use meshbridge::bridge::PollOutcome;
use meshbridge::link::Wait;
use meshbridge::telemetry::LuminaireModel;

use crate::harness::Harness;

fn drain(h: &Harness) -> (PollOutcome, Vec<Vec<u8>>) {
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    let outcome = h.routes.ans(&mut chunks).unwrap();
    (outcome, chunks)
}

#[test]
fn out_then_ans_relays_the_reply_stream() {
    let h = Harness::new();
    h.transport.respond(b"ok,;008,first;009,last;");

    let reply = h.routes.out("text=1%2C2%20");
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, b"ok,;");
    assert_eq!(h.transport.written(), b"1,2;");

    let (outcome, chunks) = drain(&h);
    assert_eq!(outcome, PollOutcome::Drained { chunks: 2, timed_out: false });
    assert_eq!(
        chunks,
        vec![b"008,first;".to_vec(), b"009,last;".to_vec(), Vec::new()]
    );
    assert!(h.bridge.is_idle());
}

#[test]
fn ans_without_request_ends_immediately() {
    let h = Harness::new();
    let (outcome, chunks) = drain(&h);
    assert_eq!(outcome, PollOutcome::NothingPending);
    assert_eq!(chunks, vec![Vec::<u8>::new()]);
}

#[test]
fn pending_request_answers_ok_without_touching_the_link() {
    let h = Harness::new();
    // No final part: the relay runs until its budget is spent.
    h.transport.respond(b"ok,;008,partial;");

    assert_eq!(h.routes.out("text=a%3B").status, 200);
    let second = h.routes.out("text=b%3B");
    assert_eq!(second.status, 200);
    assert_eq!(second.body, b"OK");
    assert_eq!(h.transport.commands_sent(), 1);

    let (outcome, chunks) = drain(&h);
    assert_eq!(outcome, PollOutcome::Drained { chunks: 1, timed_out: true });
    assert_eq!(chunks.first().map(Vec::as_slice), Some(&b"008,partial;"[..]));
    assert!(h.bridge.is_idle());
}

#[test]
fn refused_command_is_not_fine() {
    let h = Harness::new();
    h.transport.respond(b"nok,busy;");
    let reply = h.routes.out("text=x%3B");
    assert_eq!(reply.status, 500);
    assert_eq!(reply.body, b"Not fine");
    assert!(h.bridge.is_idle());
}

#[test]
fn silent_mesh_is_a_timeout() {
    let h = Harness::new();
    let reply = h.routes.out("text=x%3B");
    assert_eq!(reply.status, 504);
    assert_eq!(reply.body, b"Timeout");
    assert_eq!(h.stats.snapshot().ack_timeouts, 1);
}

#[test]
fn held_link_is_busy() {
    let h = Harness::new();
    let _session = h.link.acquire(Wait::Forever).unwrap();
    let reply = h.routes.out("text=x%3B");
    assert_eq!(reply.status, 503);
    assert_eq!(reply.body, b"Busy");
    assert_eq!(h.transport.commands_sent(), 0);
}

#[test]
fn missing_text_is_invalid() {
    let h = Harness::new();
    assert_eq!(h.routes.out("other=1").status, 400);
}

#[test]
fn telemetry_before_the_ack_reaches_the_pipeline() {
    let h = Harness::new();
    h.registry
        .register([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF], 1, LuminaireModel::Lum17k)
        .unwrap();
    h.transport.respond(b"#r01AABBCCDDEEFF,40;ok,;009,done;");

    assert_eq!(h.routes.out("text=x%3B").status, 200);
    let (_, chunks) = drain(&h);
    assert_eq!(chunks, vec![b"009,done;".to_vec(), Vec::new()]);
    assert_eq!(h.pipeline.pending_messages(), 1);
}

#[test]
fn next_request_after_completion_is_accepted() {
    let h = Harness::new();
    h.transport.respond(b"ok,;009,one;");
    h.transport.respond(b"ok,;009,two;");

    assert_eq!(h.routes.out("text=a%3B").status, 200);
    drain(&h);
    std::thread::sleep(Duration::from_millis(10));
    assert_eq!(h.routes.out("text=b%3B").status, 200);
    let (_, chunks) = drain(&h);
    assert_eq!(chunks.first().map(Vec::as_slice), Some(&b"009,two;"[..]));
}

fn long_reply(parts: usize) -> Vec<u8> {
    let mut script = b"ok,;".to_vec();
    for i in 0..parts {
        script.extend_from_slice(format!("008,part{i};").as_bytes());
    }
    script.extend_from_slice(b"009,end;");
    script
}

#[test]
fn long_reply_survives_a_late_ans() {
    let h = Harness::new();
    h.transport.respond(&long_reply(20));

    assert_eq!(h.routes.out("text=x%3B").status, 200);
    std::thread::sleep(Duration::from_millis(250));

    let (outcome, chunks) = drain(&h);
    assert_eq!(outcome, PollOutcome::Drained { chunks: 21, timed_out: false });
    assert_eq!(chunks.first().map(Vec::as_slice), Some(&b"008,part0;"[..]));
    assert_eq!(chunks[19], b"008,part19;");
    assert_eq!(chunks[20], b"009,end;");
    assert!(chunks[21].is_empty());
}

#[test]
fn overflowing_reply_is_reported_as_cut() {
    let h = Harness::new();
    h.transport.respond(&long_reply(45));

    assert_eq!(h.routes.out("text=x%3B").status, 200);
    // Nobody drains until the relay budget is spent.
    std::thread::sleep(Duration::from_millis(450));

    let (outcome, chunks) = drain(&h);
    assert_eq!(outcome, PollOutcome::Drained { chunks: 40, timed_out: true });
    assert!(!chunks.iter().any(|c| c.as_slice() == b"009,end;"));
    assert!(h.bridge.is_idle());
}

#[test]
fn only_reply_codes_reach_ans() {
    let h = Harness::new();
    h.transport.respond(b"ok,;123,odd;abc;008,keep;009,end;");

    assert_eq!(h.routes.out("text=x%3B").status, 200);
    let (outcome, chunks) = drain(&h);
    assert_eq!(outcome, PollOutcome::Drained { chunks: 2, timed_out: false });
    assert_eq!(
        chunks,
        vec![b"008,keep;".to_vec(), b"009,end;".to_vec(), Vec::new()]
    );
    assert_eq!(h.stats.snapshot().protocol_violations, 2);
}
