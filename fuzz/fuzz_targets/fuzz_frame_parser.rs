//! Fuzz target: serial framing and frame classification.
//!
//! Feeds arbitrary bytes through a `SerialLink`, one read per fuzz byte
//! boundary, and classifies every frame that comes out.  Frames must stay
//! within the frame limit and never carry the terminator.
//!
//! cargo fuzz run fuzz_frame_parser

#![no_main]

use std::collections::VecDeque;
use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use meshbridge::config::MAX_FRAME_LEN;
use meshbridge::link::{Frame, FrameContext, SerialLink, Transport, Wait};

struct Bytes(VecDeque<u8>);

impl Transport for Bytes {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        // Odd-sized reads so frames straddle read boundaries.
        let n = buf.len().min(7).min(self.0.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.0.pop_front().unwrap_or_default();
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn available(&self) -> bool {
        !self.0.is_empty()
    }
}

fuzz_target!(|data: &[u8]| {
    let link = SerialLink::new(Bytes(data.iter().copied().collect()), Duration::ZERO);
    let Ok(mut session) = link.acquire(Wait::Forever) else {
        return;
    };
    while let Ok(Some(frame)) = session.read_frame(Duration::ZERO) {
        assert!(frame.len() <= MAX_FRAME_LEN, "frame exceeds MAX_FRAME_LEN");
        assert!(!frame.contains(&b';'), "terminator leaked into frame");
        let _ = Frame::classify(&frame, FrameContext::Ack);
        let _ = Frame::classify(&frame, FrameContext::Reply);
    }
});
