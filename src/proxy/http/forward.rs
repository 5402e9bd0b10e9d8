use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::proxy::request::TargetAddr;
use crate::proxy::upstream;

use super::ParsedRequest;
use super::body::relay_until_close;

#[derive(Debug, Clone, Copy)]
pub struct ForwardStats {
    pub upstream_addr: SocketAddr,
    pub bytes_to_upstream: u64,
    pub bytes_to_client: u64,
}

/// Serializes `request` for the upstream: the request line as received,
/// every header in received order, `Content-Length` when the client sent none,
/// the blank line and the body.
pub fn encode_forward_request(request: &ParsedRequest) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(512 + request.body.len());
    buffer.extend_from_slice(
        format!(
            "{} {} {}\r\n",
            request.method, request.target, request.version
        )
        .as_bytes(),
    );

    for header in &request.headers {
        buffer.extend_from_slice(header.name.as_bytes());
        buffer.extend_from_slice(b": ");
        buffer.extend_from_slice(header.value.as_bytes());
        buffer.extend_from_slice(b"\r\n");
    }

    if !request.headers.contains("content-length") {
        buffer.extend_from_slice(b"Content-Length: ");
        buffer.extend_from_slice(request.body.len().to_string().as_bytes());
        buffer.extend_from_slice(b"\r\n");
    }

    buffer.extend_from_slice(b"\r\n");
    buffer.extend_from_slice(&request.body);
    buffer
}

/// Sends `request` once to `target` and streams the upstream response back to
/// `client` until the upstream closes. Both streams are shut down afterwards.
pub async fn forward_request<C>(
    client: &mut C,
    request: &ParsedRequest,
    target: &TargetAddr,
    relay_buffer_size: usize,
) -> Result<ForwardStats>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    let (mut upstream_stream, upstream_addr) = upstream::connect(target).await?;

    let encoded = encode_forward_request(request);
    upstream_stream
        .write_all(&encoded)
        .await
        .with_context(|| format!("failed to send request to {target}"))?;
    upstream_stream
        .flush()
        .await
        .with_context(|| format!("failed to flush request to {target}"))?;

    let relayed = relay_until_close(&mut upstream_stream, client, relay_buffer_size)
        .await
        .with_context(|| format!("relaying response from {target} failed"));

    if let Err(err) = upstream_stream.shutdown().await {
        debug!(upstream = %upstream_addr, error = %err, "failed to shut down upstream stream");
    }
    if let Err(err) = client.shutdown().await {
        debug!(error = %err, "failed to shut down client stream after forward");
    }

    Ok(ForwardStats {
        upstream_addr,
        bytes_to_upstream: encoded.len() as u64,
        bytes_to_client: relayed?,
    })
}
