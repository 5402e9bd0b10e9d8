use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::read_until_double_crlf;

/// A request as the upstream saw it on the wire.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub head: String,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or("")
    }

    pub fn header_lines(&self) -> Vec<&str> {
        self.head
            .split("\r\n")
            .skip(1)
            .filter(|line| !line.is_empty())
            .collect()
    }
}

#[derive(Clone)]
enum UpstreamBehavior {
    Close,
    Echo,
    /// Sends `banner` as soon as a client connects, then echoes.
    Banner { banner: Arc<Vec<u8>> },
    HttpResponse { response: Arc<Vec<u8>> },
    Capture {
        response: Arc<Vec<u8>>,
        tx: mpsc::UnboundedSender<CapturedRequest>,
    },
}

pub struct TestUpstream {
    addr: SocketAddr,
    handle: JoinHandle<()>,
    captured: Option<mpsc::UnboundedReceiver<CapturedRequest>>,
}

impl TestUpstream {
    pub async fn close() -> Result<Self> {
        Self::spawn(UpstreamBehavior::Close, None).await
    }

    pub async fn echo() -> Result<Self> {
        Self::spawn(UpstreamBehavior::Echo, None).await
    }

    pub async fn banner(banner: impl Into<Vec<u8>>) -> Result<Self> {
        Self::spawn(
            UpstreamBehavior::Banner {
                banner: Arc::new(banner.into()),
            },
            None,
        )
        .await
    }

    pub async fn http_response(response: impl Into<Vec<u8>>) -> Result<Self> {
        Self::spawn(
            UpstreamBehavior::HttpResponse {
                response: Arc::new(response.into()),
            },
            None,
        )
        .await
    }

    pub async fn http_ok(body: &str) -> Result<Self> {
        Self::http_response(ok_response(body)).await
    }

    /// Records each request (head plus `Content-Length` body) and answers
    /// with a `200` carrying `body`.
    pub async fn capture(body: &str) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::spawn(
            UpstreamBehavior::Capture {
                response: Arc::new(ok_response(body)),
                tx,
            },
            Some(rx),
        )
        .await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn next_request(&mut self) -> Result<CapturedRequest> {
        let rx = self
            .captured
            .as_mut()
            .ok_or_else(|| anyhow!("upstream does not capture requests"))?;
        rx.recv()
            .await
            .ok_or_else(|| anyhow!("upstream stopped before a request arrived"))
    }

    async fn spawn(
        behavior: UpstreamBehavior,
        captured: Option<mpsc::UnboundedReceiver<CapturedRequest>>,
    ) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(&mut stream, behavior).await;
                });
            }
        });
        Ok(Self {
            addr,
            handle,
            captured,
        })
    }
}

impl Drop for TestUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn ok_response(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
    .into_bytes()
}

fn content_length(head: &str) -> usize {
    head.split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

async fn echo(stream: &mut TcpStream) {
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if stream.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

async fn handle_connection(stream: &mut TcpStream, behavior: UpstreamBehavior) -> Result<()> {
    match behavior {
        UpstreamBehavior::Close => {
            stream.shutdown().await.ok();
        }
        UpstreamBehavior::Echo => echo(stream).await,
        UpstreamBehavior::Banner { banner } => {
            stream.write_all(&banner).await?;
            echo(stream).await;
        }
        UpstreamBehavior::HttpResponse { response } => {
            let head = read_until_double_crlf(stream).await?;
            let mut body = vec![0u8; content_length(&head)];
            stream.read_exact(&mut body).await?;
            let _ = stream.write_all(&response).await;
            stream.shutdown().await.ok();
        }
        UpstreamBehavior::Capture { response, tx } => {
            let head = read_until_double_crlf(stream).await?;
            let mut body = vec![0u8; content_length(&head)];
            let read = read_up_to(stream, &mut body).await?;
            body.truncate(read);
            let _ = tx.send(CapturedRequest { head, body });
            let _ = stream.write_all(&response).await;
            stream.shutdown().await.ok();
        }
    }
    Ok(())
}

/// Fills `buf` unless the peer closes first; returns how much was read.
async fn read_up_to(stream: &mut TcpStream, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
