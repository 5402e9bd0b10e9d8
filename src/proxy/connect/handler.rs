use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::proxy::{request::TargetAddr, response::AckResponse, upstream};

use super::splice::{SpliceStats, splice};

#[derive(Debug, Clone, Copy)]
pub struct TunnelStats {
    pub upstream_addr: SocketAddr,
    /// Bytes the client sent into the tunnel, early bytes included.
    pub bytes_from_client: u64,
    /// Bytes written to the client, acknowledgement included.
    pub bytes_to_client: u64,
}

/// Opens the tunnel for an accepted CONNECT request: dials `target`,
/// acknowledges to the client, hands over any bytes the client already sent
/// past the request, then relays in both directions until either side ends.
pub async fn handle_connect<S>(
    mut client: S,
    target: &TargetAddr,
    early_bytes: &[u8],
    relay_buffer_size: usize,
) -> Result<TunnelStats>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut upstream_stream, upstream_addr) = upstream::connect(target).await?;

    let ack_bytes = AckResponse::connect_established()
        .write_to(&mut client)
        .await
        .context("failed to acknowledge CONNECT")?;

    if !early_bytes.is_empty() {
        debug!(
            upstream = %upstream_addr,
            bytes = early_bytes.len(),
            "forwarding bytes received before the tunnel opened"
        );
        upstream_stream
            .write_all(early_bytes)
            .await
            .with_context(|| format!("failed to send early tunnel bytes to {target}"))?;
    }

    let SpliceStats {
        client_to_upstream,
        upstream_to_client,
    } = splice(client, upstream_stream, relay_buffer_size).await;

    Ok(TunnelStats {
        upstream_addr,
        bytes_from_client: early_bytes.len() as u64 + client_to_upstream,
        bytes_to_client: ack_bytes + upstream_to_client,
    })
}
