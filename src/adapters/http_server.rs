//! ESP-IDF HTTP server wiring for [`Routes`].
//!
//! Only moves bytes: the query string goes in, status and body come out.
//! `/ans` is sent with chunked transfer encoding, one HTTP chunk per
//! relayed reply part.

use std::sync::Arc;

use anyhow::Context;
use esp_idf_svc::http::Headers;
use esp_idf_svc::http::Method;
use esp_idf_svc::http::server::{Configuration, EspHttpConnection, EspHttpServer, Request};
use esp_idf_svc::io::{Read, Write};
use log::{info, warn};

use crate::bridge::ChunkSink;
use crate::error::{GatewayError, Result};
use crate::http::{CONTENT_TYPE, HttpReply, Routes};
use crate::link::Transport;

const SERVER_STACK: usize = 24 * 1024;
const MAX_OPEN_SOCKETS: usize = 2;
/// Largest `/echo` body read back.
const MAX_ECHO_BODY: usize = 2048;

type HttpRequest<'r, 'c> = Request<&'r mut EspHttpConnection<'c>>;

fn query_of<'a>(uri: &'a str) -> &'a str {
    uri.split_once('?').map_or("", |(_, q)| q)
}

fn respond(req: HttpRequest<'_, '_>, reply: &HttpReply) -> anyhow::Result<()> {
    req.into_response(reply.status, None, &[("Content-Type", CONTENT_TYPE)])?
        .write_all(&reply.body)?;
    Ok(())
}

/// Forwards reply parts as HTTP chunks.  The empty end-of-stream chunk is
/// left to the server, which terminates the response when the handler
/// returns.
struct ResponseSink<W> {
    out: W,
}

impl<W: Write> ChunkSink for ResponseSink<W> {
    fn send_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if chunk.is_empty() {
            return self.out.flush().map_err(|_| GatewayError::Transport);
        }
        self.out.write_all(chunk).map_err(|e| {
            warn!("Http: chunk write failed: {:?}", e);
            GatewayError::Transport
        })
    }
}

/// Start the server and register every route.  Dropping the returned
/// server stops it.
pub fn start<T: Transport + Send + 'static>(
    routes: Arc<Routes<T>>,
    port: u16,
) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = Configuration {
        http_port: port,
        stack_size: SERVER_STACK,
        max_open_sockets: MAX_OPEN_SOCKETS,
        lru_purge_enable: true,
        ..Default::default()
    };
    let mut server = EspHttpServer::new(&conf).context("http server start")?;

    {
        let routes = routes.clone();
        server.fn_handler::<anyhow::Error, _>("/out", Method::Get, move |req| {
            let reply = routes.out(query_of(req.uri()));
            respond(req, &reply)
        })?;
    }

    {
        let routes = routes.clone();
        server.fn_handler::<anyhow::Error, _>("/ans", Method::Get, move |req| {
            let response = req.into_response(200, None, &[("Content-Type", CONTENT_TYPE)])?;
            let mut sink = ResponseSink { out: response };
            if let Err(e) = routes.ans(&mut sink) {
                warn!("Http: /ans stream cut short: {}", e);
            }
            Ok(())
        })?;
    }

    {
        let routes = routes.clone();
        server.fn_handler::<anyhow::Error, _>("/direct", Method::Get, move |req| {
            let reply = routes.direct(query_of(req.uri()));
            respond(req, &reply)
        })?;
    }

    {
        let routes = routes.clone();
        server.fn_handler::<anyhow::Error, _>("/report", Method::Get, move |req| {
            let reply = routes.report(query_of(req.uri()));
            respond(req, &reply)
        })?;
    }

    for method in [Method::Get, Method::Post] {
        let routes = routes.clone();
        server.fn_handler::<anyhow::Error, _>("/echo", method, move |mut req| {
            let query = query_of(req.uri()).to_owned();
            let len = (req.content_len().unwrap_or(0) as usize).min(MAX_ECHO_BODY);
            let mut body = vec![0u8; len];
            if len > 0 {
                req.read_exact(&mut body)?;
            }
            let reply = routes.echo(&query, &body);
            respond(req, &reply)
        })?;
    }

    info!("Http: server listening on port {}", port);
    Ok(server)
}
