use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Result of reading a `Content-Length` framed body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBody {
    /// Body bytes handed to the sink, never more than the declared length.
    pub delivered: u64,
    /// How many of the prefetched bytes belonged to the body.
    pub prefetched_used: usize,
}

/// Delivers exactly `declared` body bytes to `sink`, starting with bytes that
/// were already read together with the header section.
///
/// Reads from `reader` never ask for more than what remains, so nothing past
/// the body is consumed from the socket. If the peer closes early the bytes
/// seen so far are kept and no error is raised.
pub async fn read_fixed_body<R, F>(
    reader: &mut R,
    prefetched: &[u8],
    declared: u64,
    buffer: &mut [u8],
    mut sink: F,
) -> io::Result<FixedBody>
where
    R: AsyncRead + Unpin,
    F: FnMut(&[u8]),
{
    let prefetched_used = usize::try_from(declared)
        .unwrap_or(usize::MAX)
        .min(prefetched.len());
    if prefetched_used > 0 {
        sink(&prefetched[..prefetched_used]);
    }
    let mut delivered = prefetched_used as u64;

    while delivered < declared && !buffer.is_empty() {
        let remaining = declared - delivered;
        let to_read = usize::try_from(remaining)
            .unwrap_or(usize::MAX)
            .min(buffer.len());
        let read = reader.read(&mut buffer[..to_read]).await?;
        if read == 0 {
            break;
        }
        sink(&buffer[..read]);
        delivered += read as u64;
    }

    Ok(FixedBody {
        delivered,
        prefetched_used,
    })
}

/// Copies `reader` to `writer` chunk by chunk until `reader` reaches EOF.
pub async fn relay_until_close<R, W>(
    reader: &mut R,
    writer: &mut W,
    chunk: usize,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    let mut buffer = vec![0u8; chunk.max(1)];
    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read]).await?;
        total = total.saturating_add(read as u64);
    }
    writer.flush().await?;
    Ok(total)
}
