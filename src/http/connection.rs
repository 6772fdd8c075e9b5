//! Per-socket connection loop.
//!
//! # Responsibilities
//! - Read requests one at a time, in arrival order
//! - Divert upgrade requests to the WebSocket path for good
//! - Dispatch everything else through a `Session` and write the reply
//! - Decide keep-alive vs close after each response
//!
//! # Data Flow
//! ```text
//! loop:
//!     arm idle timeout → read_request
//!         error / timeout / EOF → break (no response)
//!         upgrade intent        → websocket::upgrade, return
//!         otherwise             → Session::dispatch → finish → write
//!     response needs close      → break
//! half-close write side
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::config::LimitsConfig;
use crate::http::request::read_request;
use crate::http::session::Session;
use crate::http::static_files::StaticFiles;
use crate::net::ConnectionTracker;
use crate::observability::metrics;
use crate::routing::Router;
use crate::websocket::{self, GroupHub};

/// Everything a connection task needs, shared by all connections of one server.
#[derive(Debug)]
pub struct ConnectionContext {
    pub router: Router,
    pub files: StaticFiles,
    pub limits: LimitsConfig,
    /// Idle-read deadline armed before each request; `None` waits forever.
    pub idle_timeout: Option<Duration>,
    pub hub: Arc<GroupHub>,
    pub tracker: ConnectionTracker,
}

/// Drive one accepted socket until it closes, errors, idles out or is upgraded.
pub async fn serve_connection<S>(stream: S, peer_addr: SocketAddr, ctx: Arc<ConnectionContext>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let guard = ctx.tracker.track();
    let id = guard.id();
    tracing::debug!(connection_id = %id, peer_addr = %peer_addr, "Connection opened");

    let mut reader = BufReader::new(stream);
    loop {
        let read = read_request(&mut reader, &ctx.limits);
        let result = match ctx.idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, read).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::debug!(connection_id = %id, "Idle timeout");
                    break;
                }
            },
            None => read.await,
        };

        let request = match result {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Read request failed");
                break;
            }
        };

        if request.is_websocket_upgrade() {
            if let Err(e) = websocket::upgrade(reader, request, id, ctx.hub.clone()).await {
                tracing::debug!(connection_id = %id, error = %e, "WebSocket upgrade failed");
            }
            return;
        }

        let start = Instant::now();
        tracing::debug!(
            connection_id = %id,
            method = %request.method(),
            target = %request.target(),
            "REQ"
        );

        let mut session = Session::new(request);
        session.dispatch(&ctx.router, &ctx.files);
        let response = session.finish(&ctx.files).await;

        metrics::record_request(session.method().as_str(), response.status().as_u16(), start);
        tracing::debug!(
            connection_id = %id,
            status = response.status().as_u16(),
            content_length = response.content_length(),
            "REP"
        );

        if let Err(e) = reader.get_mut().write_all(&response.encode()).await {
            tracing::error!(connection_id = %id, error = %e, "Write response failed");
            break;
        }
        if response.needs_close() {
            break;
        }
    }

    let _ = reader.get_mut().shutdown().await;
    tracing::debug!(connection_id = %id, "Connection finished");
}
