use std::fmt;

use anyhow::{Context, Result, anyhow, bail};
use http::Uri;

use crate::proxy::http::ParsedRequest;

/// Where a proxied request is dialed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddr {
    pub host: String,
    pub port: u16,
}

impl TargetAddr {
    /// `host:port` suitable for `TcpStream::connect`, with IPv6 literals
    /// bracketed.
    pub fn to_addr(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Picks the dial target for `request`: the `Host` header, or the authority of
/// the request target when no `Host` header was sent. `default_port` applies
/// when the chosen value carries no port.
pub fn select_target(request: &ParsedRequest, default_port: u16) -> Result<TargetAddr> {
    if let Some(host) = request.host() {
        return parse_host_port(host, default_port)
            .with_context(|| format!("invalid Host header '{host}'"));
    }
    let authority = request
        .uri
        .authority()
        .ok_or_else(|| anyhow!("request has no Host header and no authority in its target"))?;
    parse_host_port(authority.as_str(), default_port)
        .with_context(|| format!("invalid request target authority '{authority}'"))
}

/// Parses a Host header style `host[:port]` value.
pub fn parse_host_port(value: &str, default_port: u16) -> Result<TargetAddr> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("empty host");
    }
    if trimmed.chars().any(|c| c.is_whitespace()) {
        bail!("authority must not contain whitespace");
    }
    if trimmed.contains('@') {
        bail!("authority must not contain userinfo");
    }
    if trimmed.contains('/')
        || trimmed.contains('?')
        || trimmed.contains('#')
        || trimmed.contains('\\')
    {
        bail!("authority must not contain path or query");
    }
    let uri: Uri = format!("http://{trimmed}")
        .parse()
        .with_context(|| format!("invalid authority '{trimmed}'"))?;
    let host = uri
        .host()
        .ok_or_else(|| anyhow!("authority missing hostname"))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_ascii_lowercase();
    if host.is_empty() {
        bail!("authority missing hostname");
    }
    Ok(TargetAddr {
        host,
        port: uri.port_u16().unwrap_or(default_port),
    })
}
