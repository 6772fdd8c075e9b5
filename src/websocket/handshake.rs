//! Server side of the WebSocket opening handshake.

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{HeaderName, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

use crate::http::request::Request;
use crate::http::response::SERVER_NAME;

/// The only protocol version this server speaks.
const SUPPORTED_VERSION: &str = "13";

/// Reasons an upgrade request cannot be accepted.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("Missing Sec-WebSocket-Key header")]
    MissingKey,
    #[error("Unsupported WebSocket version '{0}'")]
    UnsupportedVersion(String),
    #[error("I/O error during handshake: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    Protocol(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Validate the upgrade request and build the `101 Switching Protocols` head.
pub fn accept(request: &Request) -> Result<Bytes, HandshakeError> {
    let key = request
        .header(&SEC_WEBSOCKET_KEY)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(HandshakeError::MissingKey)?;

    if let Some(version) = request.header(&SEC_WEBSOCKET_VERSION) {
        if version.trim() != SUPPORTED_VERSION {
            return Err(HandshakeError::UnsupportedVersion(version.to_string()));
        }
    }

    let accept_key = derive_accept_key(key.as_bytes());
    let mut out = BytesMut::with_capacity(160);
    out.put_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    let mut header = |name: &HeaderName, value: &str| {
        out.put_slice(name.as_str().as_bytes());
        out.put_slice(b": ");
        out.put_slice(value.as_bytes());
        out.put_slice(b"\r\n");
    };
    header(&http::header::SERVER, SERVER_NAME);
    header(&http::header::UPGRADE, "websocket");
    header(&http::header::CONNECTION, "Upgrade");
    header(&SEC_WEBSOCKET_ACCEPT, &accept_key);
    out.put_slice(b"\r\n");
    Ok(out.freeze())
}
