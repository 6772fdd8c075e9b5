//! WebSocket upgrade path.
//!
//! # Data Flow
//! ```text
//! connection loop (upgrade intent detected)
//!     → handshake.rs (validate, write 101)
//!     → WebSocketStream over the same socket, buffered bytes preserved
//!     → hub.rs join(group = lower-cased target)
//!     → read loop: every text/binary frame → hub.multicast
//! ```
//!
//! # Design Decisions
//! - The socket never returns to the HTTP loop once handed off
//! - Ping/pong is answered by tungstenite itself
//! - A failed handshake gets a 400 and the connection is closed
//! - A peer the hub refuses (torn down, no group) is closed straight away

pub mod handshake;
pub mod hub;

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::WebSocketStream;

use crate::http::request::Request;
use crate::http::response::Response;
use crate::net::connection::ConnectionId;

pub use handshake::HandshakeError;
pub use hub::{Delivery, GroupHub, Peer, PeerSink, SHUTDOWN_REASON};

/// Group an upgrade request joins.
pub fn group_for(request: &Request) -> String {
    request.target().to_lowercase()
}

/// Take over `reader`'s socket for the rest of its life.
pub async fn upgrade<S>(
    mut reader: BufReader<S>,
    request: Request,
    id: ConnectionId,
    hub: Arc<GroupHub>,
) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let head = match handshake::accept(&request) {
        Ok(head) => head,
        Err(e) => {
            tracing::warn!(connection_id = %id, error = %e, "WebSocket handshake rejected");
            let response = Response::bad_request(&e.to_string())
                .for_request(&request)
                .with_keep_alive(false);
            reader.get_mut().write_all(&response.encode()).await?;
            let _ = reader.get_mut().shutdown().await;
            return Err(e);
        }
    };
    reader.get_mut().write_all(&head).await?;

    let buffered = reader.buffer().to_vec();
    let stream = reader.into_inner();
    let ws = WebSocketStream::from_partially_read(stream, buffered, Role::Server, None).await;

    let group = group_for(&request);
    tracing::info!(connection_id = %id, group = %group, "WebSocket upgraded");
    relay(ws, id, &group, &hub).await;
    Ok(())
}

/// Join `group` and forward every data frame to the other members until the peer goes away.
async fn relay<S>(ws: WebSocketStream<S>, id: ConnectionId, group: &str, hub: &GroupHub)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, mut stream) = ws.split();
    let sink: PeerSink = Box::pin(sink);
    let peer = Arc::new(Peer::new(id, sink));
    if !hub.join(group, peer.clone()) {
        let frame = if hub.is_torn_down() {
            CloseFrame {
                code: CloseCode::Away,
                reason: Utf8Bytes::from_static(SHUTDOWN_REASON),
            }
        } else {
            CloseFrame {
                code: CloseCode::Policy,
                reason: Utf8Bytes::from_static("No group"),
            }
        };
        if let Err(e) = peer.send(Message::Close(Some(frame))).await {
            tracing::debug!(connection_id = %id, error = %e, "Close frame not delivered");
        }
        peer.mark_closed();
        tracing::debug!(connection_id = %id, group = %group, "Join refused, WebSocket closed");
        return;
    }

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(message @ (Message::Text(_) | Message::Binary(_))) => {
                hub.multicast(id, group, message).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "WebSocket read failed");
                break;
            }
        }
        if peer.is_closed() {
            break;
        }
    }

    peer.mark_closed();
    tracing::debug!(connection_id = %id, group = %group, "WebSocket closed");
}
