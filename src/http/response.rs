//! Response construction and HTTP/1 serialization.
//!
//! # Responsibilities
//! - Canned text responses (bad request, not found, unauthorized, server error)
//! - Carry keep-alive intent from the request into the wire format
//! - Serialize status line, headers and body
//!
//! # Design Decisions
//! - Headers-only responses keep their declared content length (HEAD)
//! - `Connection` is always written explicitly, so the close decision is visible
//! - Server errors embed the triggering message verbatim

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, SERVER};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version};

use crate::http::request::Request;

/// Value of the `Server` header on every response.
pub const SERVER_NAME: &str = concat!("switchyard/", env!("CARGO_PKG_VERSION"));

/// Media type family for text replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentKind {
    #[default]
    Plain,
    Json,
    Xml,
    Text,
}

impl ContentKind {
    pub fn content_type(self) -> &'static str {
        match self {
            ContentKind::Plain | ContentKind::Text => "text/plain; charset=utf-8",
            ContentKind::Json => "application/json; charset=utf-8",
            ContentKind::Xml => "application/xml; charset=utf-8",
        }
    }
}

/// An outbound response.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    content_length: u64,
    keep_alive: bool,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            content_length: 0,
            keep_alive: true,
        }
    }

    /// A text body of the given kind.
    pub fn text(status: StatusCode, kind: ContentKind, text: impl Into<String>) -> Self {
        Self::new(status).with_body(kind.content_type(), text.into())
    }

    pub fn bad_request(why: &str) -> Self {
        Self::text(StatusCode::BAD_REQUEST, ContentKind::Text, why)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::text(
            StatusCode::NOT_FOUND,
            ContentKind::Text,
            format!("The resource '{}' was not found.", resource),
        )
    }

    pub fn unauthorized() -> Self {
        Self::text(StatusCode::UNAUTHORIZED, ContentKind::Text, "Unauthorized request.")
    }

    pub fn server_error(what: &str) -> Self {
        Self::text(
            StatusCode::INTERNAL_SERVER_ERROR,
            ContentKind::Text,
            format!("An error occurred: '{}'.", what),
        )
    }

    /// Replace the body and set its content type.
    pub fn with_body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self.content_length = self.body.len() as u64;
        self.set_header(CONTENT_TYPE, content_type);
        self
    }

    /// Drop the body but advertise `content_length` (HEAD replies).
    pub fn headers_only(mut self, content_length: u64) -> Self {
        self.body = Bytes::new();
        self.content_length = content_length;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    fn set_header(&mut self, name: HeaderName, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                self.headers.insert(name, v);
            }
            Err(_) => tracing::warn!(header = %name, "Dropping invalid header value"),
        }
    }

    /// Adopt the request's version and keep-alive intent. A HEAD request
    /// keeps the advertised length but never gets body bytes.
    pub fn for_request(mut self, request: &Request) -> Self {
        self.version = request.version();
        self.keep_alive = request.keep_alive();
        if *request.method() == Method::HEAD {
            let length = self.content_length;
            return self.headers_only(length);
        }
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Declared payload size, which differs from `body().len()` only for HEAD replies.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Whether the connection has to be closed once this response is written.
    pub fn needs_close(&self) -> bool {
        !self.keep_alive
    }

    /// Serialize to HTTP/1 wire format.
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(256 + self.body.len());
        let version = if self.version == Version::HTTP_10 { "HTTP/1.0" } else { "HTTP/1.1" };
        out.put_slice(
            format!(
                "{} {} {}\r\n",
                version,
                self.status.as_u16(),
                self.status.canonical_reason().unwrap_or("")
            )
            .as_bytes(),
        );

        let mut write_header = |name: &str, value: &[u8]| {
            out.put_slice(name.as_bytes());
            out.put_slice(b": ");
            out.put_slice(value);
            out.put_slice(b"\r\n");
        };

        if !self.headers.contains_key(SERVER) {
            write_header(SERVER.as_str(), SERVER_NAME.as_bytes());
        }
        for (name, value) in &self.headers {
            if *name == CONTENT_LENGTH || *name == CONNECTION {
                continue;
            }
            write_header(name.as_str(), value.as_bytes());
        }
        write_header(CONTENT_LENGTH.as_str(), self.content_length.to_string().as_bytes());
        let connection: &[u8] = if self.keep_alive { b"keep-alive" } else { b"close" };
        write_header(CONNECTION.as_str(), connection);

        out.put_slice(b"\r\n");
        out.put_slice(&self.body);
        out.freeze()
    }
}
