//! HTTP surface, independent of the server implementation.
//!
//! | route     | handler               | response                              |
//! |-----------|-----------------------|---------------------------------------|
//! | `/out`    | [`Routes::out`]       | ack line, or an error label           |
//! | `/ans`    | [`Routes::ans`]       | chunked reply parts, empty chunk last |
//! | `/direct` | [`Routes::direct`]    | `009,OK,…;` envelope                  |
//! | `/report` | [`Routes::report`]    | `<index>:<wh>,…;`                     |
//! | `/echo`   | [`Routes::echo`]      | the request body                      |
//!
//! Handlers take the raw query string; the ESP-IDF server in
//! [`crate::adapters::http_server`] only moves bytes.

use std::sync::Arc;

use log::{info, warn};

use crate::bridge::{ChunkSink, InitiateOutcome, PollOutcome, RequestBridge};
use crate::diagnostics::GatewayStats;
use crate::direct::Dispatcher;
use crate::error::Result;
use crate::link::Transport;
use crate::telemetry::query::{ReportQuery, ReportRequest};

pub const CONTENT_TYPE: &str = "text/plain; charset=utf-16";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    fn invalid() -> Self {
        Self::new(400, "Invalid")
    }
}

pub struct Routes<T> {
    bridge: Arc<RequestBridge<T>>,
    dispatcher: Arc<Dispatcher>,
    reports: Arc<ReportQuery>,
    stats: Arc<GatewayStats>,
}

impl<T: Transport + Send + 'static> Routes<T> {
    pub fn new(
        bridge: Arc<RequestBridge<T>>,
        dispatcher: Arc<Dispatcher>,
        reports: Arc<ReportQuery>,
        stats: Arc<GatewayStats>,
    ) -> Self {
        Self {
            bridge,
            dispatcher,
            reports,
            stats,
        }
    }

    /// `GET /out?text=<command>`
    pub fn out(&self, query: &str) -> HttpReply {
        self.stats.record_http_request();
        let Some(text) = query_param(query, "text").map(url_decode) else {
            return HttpReply::invalid();
        };
        info!("Http: /out {:?}", text);

        match self.bridge.initiate(&text) {
            InitiateOutcome::Accepted(line) => {
                let mut body = line.to_vec();
                body.push(b';');
                HttpReply::new(200, body)
            }
            InitiateOutcome::AlreadyPending => HttpReply::new(200, "OK"),
            InitiateOutcome::Rejected(_) => HttpReply::new(500, "Not fine"),
            InitiateOutcome::TimedOut => HttpReply::new(504, "Timeout"),
            InitiateOutcome::Busy => HttpReply::new(503, "Busy"),
            InitiateOutcome::Failed(e) => {
                warn!("Http: /out failed: {}", e);
                HttpReply::new(500, "Unexpected error")
            }
        }
    }

    /// `GET /ans`: status 200, body streamed into `sink`.
    pub fn ans(&self, sink: &mut dyn ChunkSink) -> Result<PollOutcome> {
        self.stats.record_http_request();
        let outcome = self.bridge.poll(sink)?;
        if outcome == PollOutcome::NothingPending {
            sink.send_chunk(&[])?;
        }
        Ok(outcome)
    }

    /// `GET /direct?text=<code>,<payload>`
    pub fn direct(&self, query: &str) -> HttpReply {
        self.stats.record_http_request();
        let Some(text) = query_param(query, "text").map(url_decode) else {
            return HttpReply::invalid();
        };
        info!("Http: /direct {:?}", text);
        let reply = self.dispatcher.handle(&text);
        HttpReply::new(reply.status, reply.body)
    }

    /// `GET /report?[day=DD&][month=MM&]year=YYYY`
    pub fn report(&self, query: &str) -> HttpReply {
        self.stats.record_http_request();
        let Some(request) = parse_report_request(query) else {
            return HttpReply::invalid();
        };
        match self.reports.run(request) {
            Ok(body) => HttpReply::new(200, body),
            Err(e) => {
                warn!("Http: /report {:?} failed: {}", request, e);
                HttpReply::new(500, "Not fine")
            }
        }
    }

    /// `/echo`: the body if any, else the `text` argument.
    pub fn echo(&self, query: &str, body: &[u8]) -> HttpReply {
        self.stats.record_http_request();
        if !body.is_empty() {
            return HttpReply::new(200, body);
        }
        let text = query_param(query, "text").map(url_decode).unwrap_or_default();
        HttpReply::new(200, text)
    }
}

/// Missing `day`/`month` mean zero; `year` is required.
pub fn parse_report_request(query: &str) -> Option<ReportRequest> {
    let number = |key: &str| -> Option<u32> {
        match query_param(query, key) {
            Some(value) => value.parse().ok(),
            None => Some(0),
        }
    };
    let year = query_param(query, "year")?.parse::<i32>().ok()?;
    ReportRequest::from_fields(number("day")?, number("month")?, year)
}

/// Raw value of `key` in `a=1&b=2`.
pub fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

/// Decode the escapes the mesh apps send.  `%20` maps to `;`, which the
/// apps rely on to terminate commands.
pub fn url_decode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(c) = rest.chars().next() {
        if c == '%' {
            if let Some(decoded) = rest.get(1..3).and_then(decode_escape) {
                out.push(decoded);
                rest = &rest[3..];
                continue;
            }
        }
        out.push(if c == '+' { ' ' } else { c });
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn decode_escape(hex: &str) -> Option<char> {
    const TABLE: [(&str, char); 7] = [
        ("2C", ','),
        ("3B", ';'),
        ("20", ';'),
        ("7B", '{'),
        ("22", '"'),
        ("3A", ':'),
        ("7D", '}'),
    ];
    TABLE
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(hex))
        .map(|(_, c)| *c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_lookup() {
        assert_eq!(query_param("text=abc&x=1", "text"), Some("abc"));
        assert_eq!(query_param("?x=1&text=", "text"), Some(""));
        assert_eq!(query_param("x=1", "text"), None);
    }

    #[test]
    fn decodes_known_escapes() {
        assert_eq!(url_decode("1%2C0%2C%3B"), "1,0,;");
        assert_eq!(url_decode("a%20b"), "a;b");
        assert_eq!(url_decode("%7B%22k%22%3A1%7D"), "{\"k\":1}");
        assert_eq!(url_decode("hello+world"), "hello world");
    }

    #[test]
    fn unknown_escapes_pass_through() {
        assert_eq!(url_decode("%41%2"), "%41%2");
        assert_eq!(url_decode("100%"), "100%");
    }

    #[test]
    fn report_request_from_query() {
        assert_eq!(parse_report_request("year=2024"), Some(ReportRequest::Year(2024)));
        assert_eq!(
            parse_report_request("month=3&year=2024"),
            Some(ReportRequest::Month { year: 2024, month: 3 })
        );
        assert!(matches!(
            parse_report_request("day=5&month=3&year=2024"),
            Some(ReportRequest::Day(_))
        ));
        assert_eq!(parse_report_request("month=3"), None);
        assert_eq!(parse_report_request("day=x&year=2024"), None);
    }
}
