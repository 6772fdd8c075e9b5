//! Request snapshot and HTTP/1 request decoding.
//!
//! # Responsibilities
//! - Read exactly one request (head + fully buffered body) from a buffered stream
//! - Enforce head and body size limits
//! - Derive keep-alive and upgrade intent from the headers
//!
//! # Design Decisions
//! - Bodies are buffered whole; chunked bodies are decoded and trailers discarded
//! - A clean EOF before the first byte is not an error (`Ok(None)`)
//! - Any decode failure ends the connection without a response

use bytes::{Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING, UPGRADE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Version};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::config::LimitsConfig;

/// Upper bound for a chunk-size or trailer line.
const MAX_CHUNK_LINE: usize = 4096;

/// Errors raised while decoding a request from the wire.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed mid-request")]
    UnexpectedEof,
    #[error("request head exceeds limit")]
    HeadTooLarge,
    #[error("request body exceeds limit")]
    BodyTooLarge,
    #[error("unsupported HTTP version {0}")]
    UnsupportedVersion(String),
    #[error("malformed {0}")]
    Malformed(&'static str),
}

/// Immutable snapshot of one inbound request.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    target: String,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl Request {
    /// Build a request by hand, mostly useful in tests and embedding code.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The raw request target, exactly as received.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// First value of a header as text, if present and valid UTF-8.
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Lower-cased tokens of every `Connection` header.
    fn connection_tokens(&self) -> Vec<String> {
        self.headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Whether the client expects the connection to stay open after the response.
    pub fn keep_alive(&self) -> bool {
        let tokens = self.connection_tokens();
        if self.version == Version::HTTP_10 {
            tokens.iter().any(|t| t == "keep-alive")
        } else {
            !tokens.iter().any(|t| t == "close")
        }
    }

    /// Whether this request asks to switch the connection to the WebSocket protocol.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.version == Version::HTTP_11
            && self.method == Method::GET
            && self.connection_tokens().iter().any(|t| t == "upgrade")
            && self
                .header(&UPGRADE)
                .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
                .unwrap_or(false)
    }
}

/// Read one CRLF (or LF) terminated line, charging its length against `remaining`.
///
/// Returns `Ok(None)` on EOF before any byte of the line.
async fn read_line<R>(reader: &mut R, remaining: &mut usize) -> Result<Option<Vec<u8>>, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = (&mut *reader)
        .take(*remaining as u64 + 1)
        .read_until(b'\n', &mut line)
        .await?;
    if n == 0 {
        return Ok(None);
    }
    if n > *remaining {
        return Err(CodecError::HeadTooLarge);
    }
    *remaining -= n;
    if line.pop() != Some(b'\n') {
        return Err(CodecError::UnexpectedEof);
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(line))
}

fn parse_version(text: &str) -> Result<Version, CodecError> {
    match text {
        "HTTP/1.1" => Ok(Version::HTTP_11),
        "HTTP/1.0" => Ok(Version::HTTP_10),
        other => Err(CodecError::UnsupportedVersion(other.to_string())),
    }
}

fn parse_header(line: &[u8]) -> Result<(HeaderName, HeaderValue), CodecError> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or(CodecError::Malformed("header line"))?;
    let name = HeaderName::from_bytes(&line[..colon]).map_err(|_| CodecError::Malformed("header name"))?;
    let value = HeaderValue::from_bytes(line[colon + 1..].trim_ascii())
        .map_err(|_| CodecError::Malformed("header value"))?;
    Ok((name, value))
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("chunked"))
}

fn content_length(headers: &HeaderMap) -> Result<Option<usize>, CodecError> {
    match headers.get(CONTENT_LENGTH) {
        None => Ok(None),
        Some(v) => v
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .map(Some)
            .ok_or(CodecError::Malformed("content-length")),
    }
}

async fn read_chunked<R>(reader: &mut R, max_body: usize) -> Result<Bytes, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = BytesMut::new();
    loop {
        let mut budget = MAX_CHUNK_LINE;
        let line = read_line(reader, &mut budget)
            .await?
            .ok_or(CodecError::UnexpectedEof)?;
        let text = std::str::from_utf8(&line).map_err(|_| CodecError::Malformed("chunk size"))?;
        let size_text = text.split(';').next().unwrap_or_default().trim();
        let size =
            usize::from_str_radix(size_text, 16).map_err(|_| CodecError::Malformed("chunk size"))?;

        if size == 0 {
            // Trailer section ends with an empty line.
            loop {
                let mut budget = MAX_CHUNK_LINE;
                match read_line(reader, &mut budget).await? {
                    None => return Err(CodecError::UnexpectedEof),
                    Some(l) if l.is_empty() => return Ok(body.freeze()),
                    Some(_) => continue,
                }
            }
        }

        let end = body
            .len()
            .checked_add(size)
            .filter(|n| *n <= max_body)
            .ok_or(CodecError::BodyTooLarge)?;
        let start = body.len();
        body.resize(end, 0);
        reader.read_exact(&mut body[start..]).await?;

        let mut budget = 2;
        match read_line(reader, &mut budget).await? {
            Some(l) if l.is_empty() => {}
            _ => return Err(CodecError::Malformed("chunk terminator")),
        }
    }
}

/// Decode the next request from `reader`.
///
/// Returns `Ok(None)` when the peer closed the connection between requests.
pub async fn read_request<R>(reader: &mut R, limits: &LimitsConfig) -> Result<Option<Request>, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let mut remaining = limits.max_head_bytes;

    // Stray empty lines before a request line are ignored.
    let line = loop {
        match read_line(reader, &mut remaining).await? {
            None => return Ok(None),
            Some(l) if l.is_empty() => continue,
            Some(l) => break l,
        }
    };

    let line = std::str::from_utf8(&line).map_err(|_| CodecError::Malformed("request line"))?;
    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(CodecError::Malformed("request line"));
    };
    let method = Method::from_bytes(method.as_bytes()).map_err(|_| CodecError::Malformed("method"))?;
    if target.is_empty() {
        return Err(CodecError::Malformed("request target"));
    }
    let version = parse_version(version)?;

    let mut headers = HeaderMap::new();
    loop {
        let line = read_line(reader, &mut remaining)
            .await?
            .ok_or(CodecError::UnexpectedEof)?;
        if line.is_empty() {
            break;
        }
        let (name, value) = parse_header(&line)?;
        headers.append(name, value);
    }

    let body = if is_chunked(&headers) {
        read_chunked(reader, limits.max_body_bytes).await?
    } else if let Some(len) = content_length(&headers)? {
        if len > limits.max_body_bytes {
            return Err(CodecError::BodyTooLarge);
        }
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        Bytes::from(buf)
    } else {
        Bytes::new()
    };

    Ok(Some(Request {
        method,
        target: target.to_string(),
        version,
        headers,
        body,
    }))
}
