use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpliceStats {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
}

#[derive(Debug)]
enum PumpEnd {
    Eof,
    Cancelled,
    ReadFailed(io::Error),
    WriteFailed(io::Error),
}

/// Relays bytes between `client` and `upstream` until one direction ends.
///
/// The upstream to client direction runs on its own task. Whichever pump
/// finishes first cancels the other; each pump shuts down and drops the write
/// half it owns, so both streams are closed once this returns.
pub async fn splice<C, U>(client: C, upstream: U, buffer_size: usize) -> SpliceStats
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    U: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_reader, client_writer) = tokio::io::split(client);
    let (upstream_reader, upstream_writer) = tokio::io::split(upstream);
    let cancel = CancellationToken::new();

    let reverse = tokio::spawn(pump(
        upstream_reader,
        client_writer,
        buffer_size,
        cancel.clone(),
        "upstream->client",
    ));
    let forward = pump(
        client_reader,
        upstream_writer,
        buffer_size,
        cancel.clone(),
        "client->upstream",
    )
    .await;

    let upstream_to_client = match reverse.await {
        Ok(transferred) => transferred,
        Err(err) => {
            debug!(error = %err, "tunnel pump task failed");
            0
        }
    };
    SpliceStats {
        client_to_upstream: forward,
        upstream_to_client,
    }
}

async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    buffer_size: usize,
    cancel: CancellationToken,
    direction: &'static str,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut transferred = 0u64;
    let end = loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break PumpEnd::Cancelled,
            read = reader.read(&mut buffer) => read,
        };
        let read = match read {
            Ok(0) => break PumpEnd::Eof,
            Ok(read) => read,
            Err(err) => break PumpEnd::ReadFailed(err),
        };
        let written = tokio::select! {
            _ = cancel.cancelled() => break PumpEnd::Cancelled,
            written = writer.write_all(&buffer[..read]) => written,
        };
        if let Err(err) = written {
            break PumpEnd::WriteFailed(err);
        }
        transferred = transferred.saturating_add(read as u64);
    };

    cancel.cancel();
    if let Err(err) = writer.shutdown().await {
        trace!(direction, error = %err, "shutdown after tunnel pump failed");
    }
    match &end {
        PumpEnd::ReadFailed(err) | PumpEnd::WriteFailed(err) => {
            debug!(direction, transferred, error = %err, "tunnel pump stopped on error");
        }
        PumpEnd::Eof | PumpEnd::Cancelled => {
            trace!(direction, transferred, end = ?end, "tunnel pump finished");
        }
    }
    transferred
}
