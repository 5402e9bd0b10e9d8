use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{read_http_response, read_until_double_crlf};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ProxyClient {
    stream: TcpStream,
}

impl ProxyClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Ok(Self {
            stream: TcpStream::connect(addr).await?,
        })
    }

    pub async fn send(&mut self, request: impl AsRef<[u8]>) -> Result<()> {
        self.stream.write_all(request.as_ref()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Everything the proxy sends until it closes the connection.
    pub async fn read_response(&mut self) -> Result<String> {
        Ok(timeout(READ_TIMEOUT, read_http_response(&mut self.stream)).await??)
    }

    pub async fn read_headers(&mut self) -> Result<String> {
        Ok(timeout(READ_TIMEOUT, read_until_double_crlf(&mut self.stream)).await??)
    }

    pub async fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        timeout(READ_TIMEOUT, self.stream.read_exact(&mut buf)).await??;
        Ok(buf)
    }

    pub async fn shutdown(mut self) {
        self.stream.shutdown().await.ok();
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}
