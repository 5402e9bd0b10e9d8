use anyhow::{Context, Result};
use http::StatusCode;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::proxy::http::HeaderList;

/// A response the proxy produces itself: the CONNECT acknowledgement and the
/// reply to a request that could not be framed.
#[derive(Debug, Clone)]
pub struct AckResponse {
    pub status: StatusCode,
    pub reason: Option<String>,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

impl AckResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            headers: HeaderList::new(),
            body: Vec::new(),
        }
    }

    pub fn connect_established() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Serializes the status line, headers in insertion order, a
    /// `Content-Length` if none was set, the blank line and the body.
    pub fn encode(&self) -> Vec<u8> {
        let reason = self
            .reason
            .as_deref()
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| self.status.canonical_reason().unwrap_or("Unknown"));
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(format!("HTTP/1.1 {} {reason}\r\n", self.status.as_u16()).as_bytes());
        for header in &self.headers {
            out.extend_from_slice(format!("{}: {}\r\n", header.name, header.value).as_bytes());
        }
        if !self.headers.contains("content-length") {
            out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    /// Writes and flushes the whole response. Returns the bytes written.
    pub async fn write_to<S>(&self, stream: &mut S) -> Result<u64>
    where
        S: AsyncWrite + Unpin,
    {
        let bytes = self.encode();
        stream
            .write_all(&bytes)
            .await
            .with_context(|| format!("writing {} response", self.status.as_u16()))?;
        stream.flush().await.context("flushing response")?;
        Ok(bytes.len() as u64)
    }
}
