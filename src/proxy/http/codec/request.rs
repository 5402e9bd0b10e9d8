use std::io;

use http::{Method, Uri};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use super::headers::{HeaderLineError, HeaderList};
use super::window::{TerminatorWindow, WINDOW_LEN};
use crate::proxy::http::body::read_fixed_body;

/// TLS record content type for a handshake, the first byte of a ClientHello.
const TLS_HANDSHAKE_RECORD: u8 = 0x16;

const INITIAL_BODY_CAPACITY: u64 = 64 * 1024;

pub const ACCEPTED_METHODS: [Method; 9] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::CONNECT,
    Method::OPTIONS,
    Method::TRACE,
];

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("client appears to be sending a TLS handshake to a plaintext HTTP port")]
    TlsOnPlaintextPort,
    #[error("unrecognized request: first byte {byte:#04x} cannot start a request line")]
    UnrecognizedRequest { byte: u8 },
    #[error("malformed request line {line:?}: expected method, target and version")]
    MalformedRequestLine { line: String },
    #[error("unsupported HTTP method '{method}'")]
    InvalidMethod { method: String },
    #[error("invalid request target '{target}'")]
    InvalidTarget {
        target: String,
        #[source]
        source: http::uri::InvalidUri,
    },
    #[error(transparent)]
    InvalidHeader(#[from] HeaderLineError),
    #[error("invalid Content-Length '{value}'")]
    InvalidContentLength { value: String },
    #[error("conflicting Content-Length values {first} and {second}")]
    ConflictingContentLength { first: u64, second: u64 },
    #[error("request header section exceeds configured limit of {limit} bytes")]
    HeaderTooLarge { limit: usize },
    #[error("declared request body of {declared} bytes exceeds configured limit of {limit} bytes")]
    BodyTooLarge { declared: u64, limit: u64 },
    #[error("request head contained invalid UTF-8")]
    InvalidEncoding,
    #[error("connection closed before end of request header section")]
    IncompleteHead,
    #[error("failed reading request from client")]
    Io(#[from] io::Error),
}

impl RequestError {
    /// Whether a plaintext `400 Bad Request` is worth sending back. A client
    /// speaking TLS cannot read it and a failed socket cannot carry it.
    pub fn should_reply(&self) -> bool {
        !matches!(
            self,
            RequestError::TlsOnPlaintextPort | RequestError::IncompleteHead | RequestError::Io(_)
        )
    }
}

/// A fully framed request: start line, headers and the body bytes read for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: Method,
    /// Request target exactly as received.
    pub target: String,
    pub uri: Uri,
    /// Protocol token from the request line, passed through unvalidated.
    pub version: String,
    pub headers: HeaderList,
    pub declared_body_length: u64,
    pub body: Vec<u8>,
}

impl ParsedRequest {
    pub fn is_connect(&self) -> bool {
        self.method == Method::CONNECT
    }

    pub fn host(&self) -> Option<&str> {
        self.headers.host()
    }
}

/// A request plus any bytes that arrived with it but belong to whatever the
/// client sends next (tunnel payload after CONNECT).
#[derive(Debug)]
pub struct ReadOutcome {
    pub request: ParsedRequest,
    pub leftover: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct ReadLimits {
    pub max_header_size: usize,
    pub max_body_size: u64,
    pub read_chunk: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    RequestLine,
    Headers,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    NeedMore,
    /// The header block ended after `consumed` bytes of the last chunk.
    HeadComplete { consumed: usize },
}

struct RequestLine {
    method: Method,
    target: String,
    uri: Uri,
    version: String,
}

/// Sans-I/O request head parser. Bytes may be fed in chunks of any size; only
/// the current line and a four byte trailing window are retained between
/// calls.
pub(crate) struct RequestParser {
    state: ParseState,
    window: TerminatorWindow,
    line: Vec<u8>,
    // how many of the window's bytes belong to the line being assembled
    line_tail: usize,
    head_bytes: usize,
    max_head_bytes: usize,
    request_line: Option<RequestLine>,
    headers: HeaderList,
    content_length: Option<u64>,
}

impl RequestParser {
    pub fn new(max_head_bytes: usize) -> Self {
        Self {
            state: ParseState::RequestLine,
            window: TerminatorWindow::new(),
            line: Vec::new(),
            line_tail: 0,
            head_bytes: 0,
            max_head_bytes,
            request_line: None,
            headers: HeaderList::new(),
            content_length: None,
        }
    }

    pub fn has_started(&self) -> bool {
        self.head_bytes > 0
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Result<Progress, RequestError> {
        if self.state == ParseState::Done {
            return Ok(Progress::HeadComplete { consumed: 0 });
        }
        if !self.has_started()
            && let Some(&first) = chunk.first()
        {
            check_first_byte(first)?;
        }

        for (idx, &byte) in chunk.iter().enumerate() {
            self.head_bytes += 1;
            if self.head_bytes > self.max_head_bytes {
                return Err(RequestError::HeaderTooLarge {
                    limit: self.max_head_bytes,
                });
            }
            self.push_byte(byte);
            if !self.window.ends_line() {
                continue;
            }

            let line = self.take_line();
            match self.state {
                ParseState::RequestLine => {
                    self.request_line = Some(parse_request_line(&line)?);
                    self.state = ParseState::Headers;
                }
                ParseState::Headers if self.window.ends_header_block() => {
                    self.state = ParseState::Done;
                    return Ok(Progress::HeadComplete { consumed: idx + 1 });
                }
                ParseState::Headers => self.parse_header_line(&line)?,
                ParseState::Done => unreachable!("parser fed after completion"),
            }
        }
        Ok(Progress::NeedMore)
    }

    fn push_byte(&mut self, byte: u8) {
        let owned = self.line_tail;
        if let Some(evicted) = self.window.push(byte)
            && owned == WINDOW_LEN
        {
            self.line.push(evicted);
        }
        self.line_tail = (owned + 1).min(WINDOW_LEN);
    }

    /// Assembles the finished line from the spilled bytes and the part still
    /// held by the window, minus the CRLF.
    fn take_line(&mut self) -> Vec<u8> {
        let mut line = std::mem::take(&mut self.line);
        line.extend_from_slice(self.window.tail(self.line_tail));
        line.truncate(line.len().saturating_sub(2));
        self.line_tail = 0;
        line
    }

    fn parse_header_line(&mut self, raw: &[u8]) -> Result<(), RequestError> {
        let text = std::str::from_utf8(raw).map_err(|_| RequestError::InvalidEncoding)?;
        let header = self.headers.push_line(text.trim())?;
        if !header.is("content-length") {
            return Ok(());
        }
        let length = header
            .value
            .parse::<u64>()
            .map_err(|_| RequestError::InvalidContentLength {
                value: header.value.clone(),
            })?;
        match self.content_length {
            Some(first) if first != length => Err(RequestError::ConflictingContentLength {
                first,
                second: length,
            }),
            _ => {
                self.content_length = Some(length);
                Ok(())
            }
        }
    }

    /// Consumes a parser that reported [`Progress::HeadComplete`].
    pub fn finish(self) -> Result<ParsedRequest, RequestError> {
        let Some(line) = self.request_line.filter(|_| self.state == ParseState::Done) else {
            return Err(RequestError::IncompleteHead);
        };
        Ok(ParsedRequest {
            method: line.method,
            target: line.target,
            uri: line.uri,
            version: line.version,
            headers: self.headers,
            declared_body_length: self.content_length.unwrap_or(0),
            body: Vec::new(),
        })
    }
}

fn check_first_byte(byte: u8) -> Result<(), RequestError> {
    if byte.is_ascii_alphabetic() {
        Ok(())
    } else if byte == TLS_HANDSHAKE_RECORD {
        Err(RequestError::TlsOnPlaintextPort)
    } else {
        Err(RequestError::UnrecognizedRequest { byte })
    }
}

fn parse_request_line(raw: &[u8]) -> Result<RequestLine, RequestError> {
    let text = std::str::from_utf8(raw).map_err(|_| RequestError::InvalidEncoding)?;
    let malformed = || RequestError::MalformedRequestLine {
        line: text.to_string(),
    };
    let mut parts = text.split_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };

    let method = ACCEPTED_METHODS
        .iter()
        .find(|accepted| accepted.as_str() == method)
        .cloned()
        .ok_or_else(|| RequestError::InvalidMethod {
            method: method.to_string(),
        })?;
    let uri = target
        .parse::<Uri>()
        .map_err(|source| RequestError::InvalidTarget {
            target: target.to_string(),
            source,
        })?;

    Ok(RequestLine {
        method,
        target: target.to_string(),
        uri,
        version: version.to_string(),
    })
}

/// Reads one request from `reader`: the head through the parser, then the
/// declared body.
///
/// Returns `Ok(None)` when the peer closes before sending anything. A body
/// cut short by the peer closing is returned as-is.
pub async fn read_request<S>(
    reader: &mut S,
    limits: ReadLimits,
) -> Result<Option<ReadOutcome>, RequestError>
where
    S: AsyncRead + Unpin,
{
    let mut parser = RequestParser::new(limits.max_header_size);
    let mut buffer = vec![0u8; limits.read_chunk.max(1)];

    let (filled, consumed) = loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            if parser.has_started() {
                return Err(RequestError::IncompleteHead);
            }
            return Ok(None);
        }
        if let Progress::HeadComplete { consumed } = parser.feed(&buffer[..read])? {
            break (read, consumed);
        }
    };

    let mut request = parser.finish()?;
    let declared = request.declared_body_length;
    if declared > limits.max_body_size {
        return Err(RequestError::BodyTooLarge {
            declared,
            limit: limits.max_body_size,
        });
    }

    let prefetched = buffer[consumed..filled].to_vec();
    let mut body = Vec::with_capacity(declared.min(INITIAL_BODY_CAPACITY) as usize);
    let outcome = read_fixed_body(reader, &prefetched, declared, &mut buffer, |chunk| {
        body.extend_from_slice(chunk)
    })
    .await?;
    if outcome.delivered < declared {
        trace!(
            declared,
            delivered = outcome.delivered,
            "client closed before end of request body"
        );
    }
    request.body = body;

    Ok(Some(ReadOutcome {
        request,
        leftover: prefetched[outcome.prefetched_used..].to_vec(),
    }))
}
