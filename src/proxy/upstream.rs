use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpStream;
use tracing::debug;

use crate::proxy::request::TargetAddr;

/// Opens a TCP connection to `target`, resolving its host name through the
/// system resolver and trying each returned address in turn.
pub async fn connect(target: &TargetAddr) -> Result<(TcpStream, SocketAddr)> {
    let stream = TcpStream::connect(target.to_addr())
        .await
        .with_context(|| format!("failed to connect to {target}"))?;
    let addr = stream
        .peer_addr()
        .with_context(|| format!("connected to {target} but peer address is unavailable"))?;
    if let Err(err) = stream.set_nodelay(true) {
        debug!(
            host = %addr.ip(),
            port = addr.port(),
            error = %err,
            "failed to set TCP_NODELAY on upstream stream"
        );
    }
    debug!(host = %addr.ip(), port = addr.port(), "connected to upstream");
    Ok((stream, addr))
}
