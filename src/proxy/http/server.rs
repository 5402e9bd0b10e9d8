use std::net::SocketAddr;
use std::time::Instant;

use anyhow::Result;
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::logging::AccessLogBuilder;
use crate::proxy::{
    AppContext, connect,
    request::{TargetAddr, select_target},
    response::AckResponse,
};

use super::codec::{ParsedRequest, ReadOutcome, RequestError, read_request};
use super::forward::forward_request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMode {
    Forward,
    Tunnel,
}

impl ProxyMode {
    pub fn for_request(request: &ParsedRequest) -> Self {
        if request.is_connect() {
            ProxyMode::Tunnel
        } else {
            ProxyMode::Forward
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProxyMode::Forward => "forward",
            ProxyMode::Tunnel => "tunnel",
        }
    }
}

/// Serves one client connection: reads a single request and either forwards
/// it or opens a tunnel for it. The connection is closed when this returns.
pub async fn handle_http<S>(mut stream: S, peer: SocketAddr, app: AppContext) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let start = Instant::now();
    let settings = &app.settings;

    let ReadOutcome { request, leftover } =
        match read_request(&mut stream, settings.read_limits()).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                debug!(peer = %peer, "client closed without sending a request");
                return Ok(());
            }
            Err(err) => {
                reject_unframed(&mut stream, peer, &err, start).await;
                return Ok(());
            }
        };

    let mode = ProxyMode::for_request(&request);
    let default_port = match mode {
        ProxyMode::Forward => settings.forward_default_port,
        ProxyMode::Tunnel => settings.connect_default_port,
    };
    let access_log = AccessLogBuilder::new(peer)
        .method(request.method.as_str())
        .mode(mode.as_str())
        .target(request.target.clone());

    let target = match select_target(&request, default_port) {
        Ok(target) => target,
        Err(err) => {
            let reason = format!("{err:#}");
            warn!(peer = %peer, error = %reason, "cannot determine request target");
            let written = send_bad_request(&mut stream, peer).await;
            access_log
                .host(request.host().unwrap_or(""))
                .status(StatusCode::BAD_REQUEST)
                .bytes(0, written)
                .elapsed(start.elapsed())
                .error_reason(reason)
                .log();
            return Ok(());
        }
    };
    let access_log = access_log.host(target.to_string());
    debug!(peer = %peer, mode = mode.as_str(), target = %target, "dispatching request");

    match mode {
        ProxyMode::Tunnel => {
            tunnel(stream, peer, &target, &leftover, &app, access_log, start).await
        }
        ProxyMode::Forward => {
            if !leftover.is_empty() {
                debug!(
                    peer = %peer,
                    bytes = leftover.len(),
                    "discarding bytes sent after the request"
                );
            }
            forward(&mut stream, &request, &target, &app, access_log, start).await
        }
    }
}

async fn forward<S>(
    stream: &mut S,
    request: &ParsedRequest,
    target: &TargetAddr,
    app: &AppContext,
    access_log: AccessLogBuilder,
    start: Instant,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match forward_request(stream, request, target, app.settings.relay_buffer_size).await {
        Ok(stats) => {
            access_log
                .upstream_addr(stats.upstream_addr.to_string())
                .bytes(stats.bytes_to_upstream, stats.bytes_to_client)
                .elapsed(start.elapsed())
                .log();
            Ok(())
        }
        Err(err) => {
            access_log
                .elapsed(start.elapsed())
                .error_reason(format!("{err:#}"))
                .log();
            Err(err)
        }
    }
}

async fn tunnel<S>(
    stream: S,
    peer: SocketAddr,
    target: &TargetAddr,
    early_bytes: &[u8],
    app: &AppContext,
    access_log: AccessLogBuilder,
    start: Instant,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    match connect::handle_connect(stream, target, early_bytes, app.settings.relay_buffer_size).await
    {
        Ok(stats) => {
            debug!(peer = %peer, upstream = %stats.upstream_addr, "tunnel closed");
            access_log
                .status(StatusCode::OK)
                .upstream_addr(stats.upstream_addr.to_string())
                .bytes(stats.bytes_from_client, stats.bytes_to_client)
                .elapsed(start.elapsed())
                .log();
            Ok(())
        }
        Err(err) => {
            access_log
                .elapsed(start.elapsed())
                .error_reason(format!("{err:#}"))
                .log();
            Err(err)
        }
    }
}

/// Handles a request that could not be framed: logs it and, when the client
/// can read one, sends a `400` before the connection is closed.
async fn reject_unframed<S>(stream: &mut S, peer: SocketAddr, err: &RequestError, start: Instant)
where
    S: AsyncWrite + Unpin,
{
    match err {
        RequestError::Io(io_err) => {
            debug!(peer = %peer, error = %io_err, "failed reading request from client");
            return;
        }
        RequestError::IncompleteHead => {
            debug!(peer = %peer, "client closed before finishing the request header section");
            return;
        }
        _ => warn!(peer = %peer, error = %err, "rejecting malformed request"),
    }

    let mut access_log = AccessLogBuilder::new(peer)
        .elapsed(start.elapsed())
        .error_reason(err.to_string());
    if err.should_reply() {
        let written = send_bad_request(stream, peer).await;
        access_log = access_log
            .status(StatusCode::BAD_REQUEST)
            .bytes(0, written);
    }
    access_log.log();
}

async fn send_bad_request<S>(stream: &mut S, peer: SocketAddr) -> u64
where
    S: AsyncWrite + Unpin,
{
    let written = match AckResponse::bad_request().write_to(stream).await {
        Ok(written) => written,
        Err(err) => {
            debug!(peer = %peer, error = ?err, "failed to send 400 response");
            0
        }
    };
    if let Err(err) = stream.shutdown().await {
        debug!(peer = %peer, error = %err, "failed to shut down client stream");
    }
    written
}
