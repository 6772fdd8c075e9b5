//! WebSocket group hub.
//!
//! # Responsibilities
//! - Track which upgraded peers belong to which group
//! - Multicast a frame from one member to every other live member
//! - Close every peer on server shutdown
//!
//! # Design Decisions
//! - One lock guards the membership map and the teardown flag's transition;
//!   `join`, `snapshot`, `prune` and teardown are the only operations that take it
//! - Frames are written outside the lock, sequentially, one peer at a time
//! - The first failed write aborts the rest of the round
//! - Closed peers are pruned lazily, by the next multicast into their group

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{Sink, SinkExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message, Utf8Bytes};

use crate::net::connection::ConnectionId;
use crate::observability::metrics;

/// Close reason sent to every peer on teardown.
pub const SHUTDOWN_REASON: &str = "Server shutdown";

/// Write half of an upgraded connection.
pub type PeerSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// One upgraded connection as seen by the hub.
pub struct Peer {
    id: ConnectionId,
    sink: tokio::sync::Mutex<PeerSink>,
    closed: AtomicBool,
}

impl Peer {
    pub fn new(id: ConnectionId, sink: PeerSink) -> Self {
        Self {
            id,
            sink: tokio::sync::Mutex::new(sink),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Write one message and flush it.
    pub async fn send(&self, message: Message) -> Result<(), WsError> {
        let mut sink = self.sink.lock().await;
        sink.send(message).await
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Result of one multicast round.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Peers the frame was written to.
    pub delivered: usize,
    /// Closed peers removed from the group after the round.
    pub pruned: usize,
    /// Peer whose write failed and ended the round early.
    pub failed: Option<ConnectionId>,
}

type Members = HashMap<ConnectionId, Arc<Peer>>;

/// Group membership and multicast for upgraded connections.
#[derive(Debug, Default)]
pub struct GroupHub {
    groups: Mutex<HashMap<String, Members>>,
    torn_down: AtomicBool,
}

impl GroupHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Members>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Add `peer` to `group`. Returns `false` for an empty group name or after teardown.
    pub fn join(&self, group: &str, peer: Arc<Peer>) -> bool {
        if group.is_empty() {
            return false;
        }
        let id = peer.id();
        let mut groups = self.lock();
        // Checked under the lock so a concurrent `shutdown` cannot miss this peer.
        if self.is_torn_down() {
            return false;
        }
        groups.entry(group.to_string()).or_default().insert(id, peer);
        drop(groups);
        metrics::ws_member_joined();
        tracing::debug!(connection_id = %id, group = %group, "Peer joined group");
        true
    }

    /// Current members of `group`, or `None` when the group is unknown.
    pub fn snapshot(&self, group: &str) -> Option<Vec<Arc<Peer>>> {
        self.lock()
            .get(group)
            .map(|members| members.values().cloned().collect())
    }

    /// Remove `ids` from `group`; an emptied group is dropped.
    pub fn prune(&self, group: &str, ids: &[ConnectionId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let mut groups = self.lock();
        let Some(members) = groups.get_mut(group) else {
            return 0;
        };
        let removed = ids.iter().filter(|id| members.remove(id).is_some()).count();
        if members.is_empty() {
            groups.remove(group);
        }
        drop(groups);
        metrics::record_ws_pruned(removed);
        removed
    }

    pub fn member_count(&self, group: &str) -> usize {
        self.lock().get(group).map_or(0, HashMap::len)
    }

    pub fn group_count(&self) -> usize {
        self.lock().len()
    }

    /// Relay `message` from `sender` to every other live member of `group`.
    pub async fn multicast(&self, sender: ConnectionId, group: &str, message: Message) -> Delivery {
        let mut delivery = Delivery::default();
        if self.is_torn_down() {
            return delivery;
        }
        let Some(members) = self.snapshot(group) else {
            tracing::warn!(connection_id = %sender, group = %group, "Multicast into unknown group");
            return delivery;
        };

        let mut stale = Vec::new();
        for peer in members.iter().filter(|p| p.id() != sender) {
            if peer.is_closed() {
                stale.push(peer.id());
                continue;
            }
            if let Err(e) = peer.send(message.clone()).await {
                tracing::error!(
                    connection_id = %peer.id(),
                    group = %group,
                    error = %e,
                    "Write to peer failed, aborting multicast"
                );
                peer.mark_closed();
                delivery.failed = Some(peer.id());
                break;
            }
            delivery.delivered += 1;
        }

        delivery.pruned = self.prune(group, &stale);
        metrics::record_ws_relayed(delivery.delivered);
        delivery
    }

    /// Mark the hub torn down and hand back every member, emptying the map.
    fn detach_all(&self) -> Vec<Arc<Peer>> {
        let groups = {
            let mut groups = self.lock();
            self.torn_down.store(true, Ordering::Release);
            std::mem::take(&mut *groups)
        };
        let peers: Vec<_> = groups.into_values().flat_map(HashMap::into_values).collect();
        metrics::ws_members_left(peers.len());
        peers
    }

    /// Close every tracked peer with `SHUTDOWN_REASON`; later joins and multicasts are no-ops.
    pub async fn shutdown(&self) -> usize {
        let mut closed = 0;
        for peer in self.detach_all() {
            if peer.is_closed() {
                continue;
            }
            let frame = CloseFrame {
                code: CloseCode::Away,
                reason: Utf8Bytes::from_static(SHUTDOWN_REASON),
            };
            if let Err(e) = peer.send(Message::Close(Some(frame))).await {
                tracing::debug!(connection_id = %peer.id(), error = %e, "Close frame not delivered");
            }
            peer.mark_closed();
            closed += 1;
        }
        tracing::info!(peers = closed, "Group hub torn down");
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::task::{Context, Poll};

    /// Sink that records every message, or fails every write.
    struct Recording {
        sent: Arc<Mutex<Vec<Message>>>,
        fail: bool,
    }

    impl Sink<Message> for Recording {
        type Error = WsError;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), WsError> {
            if self.fail {
                return Err(WsError::ConnectionClosed);
            }
            self.sent.lock().unwrap().push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }
    }

    fn peer(fail: bool) -> (Arc<Peer>, Arc<Mutex<Vec<Message>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Recording { sent: sent.clone(), fail };
        (Arc::new(Peer::new(ConnectionId::new(), Box::pin(sink))), sent)
    }

    fn text(s: &str) -> Message {
        Message::text(s.to_string())
    }

    #[tokio::test]
    async fn test_multicast_skips_sender() {
        let hub = GroupHub::new();
        let (a, a_sent) = peer(false);
        let (b, b_sent) = peer(false);
        let (c, c_sent) = peer(false);
        for p in [&a, &b, &c] {
            assert!(hub.join("g", p.clone()));
        }

        let delivery = hub.multicast(a.id(), "g", text("hello")).await;
        assert_eq!(delivery.delivered, 2);
        assert!(a_sent.lock().unwrap().is_empty());
        assert_eq!(b_sent.lock().unwrap().as_slice(), &[text("hello")]);
        assert_eq!(c_sent.lock().unwrap().as_slice(), &[text("hello")]);
    }

    #[tokio::test]
    async fn test_binary_framing_preserved() {
        let hub = GroupHub::new();
        let (a, _) = peer(false);
        let (b, b_sent) = peer(false);
        hub.join("/feed", a.clone());
        hub.join("/feed", b.clone());

        hub.multicast(a.id(), "/feed", Message::binary(vec![0u8, 159, 146])).await;
        assert!(matches!(b_sent.lock().unwrap()[0], Message::Binary(_)));
    }

    #[tokio::test]
    async fn test_closed_peer_pruned_on_next_multicast() {
        let hub = GroupHub::new();
        let (a, _) = peer(false);
        let (b, b_sent) = peer(false);
        let (c, c_sent) = peer(false);
        for p in [&a, &b, &c] {
            hub.join("g", p.clone());
        }

        b.mark_closed();
        let delivery = hub.multicast(a.id(), "g", text("one")).await;
        assert_eq!(delivery.delivered, 1);
        assert_eq!(delivery.pruned, 1);
        assert!(b_sent.lock().unwrap().is_empty());
        assert_eq!(hub.member_count("g"), 2);

        hub.multicast(a.id(), "g", text("two")).await;
        assert!(b_sent.lock().unwrap().is_empty());
        assert_eq!(c_sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_write_failure_aborts_round() {
        let hub = GroupHub::new();
        let (a, _) = peer(false);
        let (bad, _) = peer(true);
        hub.join("g", a.clone());
        hub.join("g", bad.clone());

        let delivery = hub.multicast(a.id(), "g", text("x")).await;
        assert_eq!(delivery.failed, Some(bad.id()));
        assert!(bad.is_closed());

        let delivery = hub.multicast(a.id(), "g", text("y")).await;
        assert_eq!(delivery.pruned, 1);
        assert_eq!(hub.member_count("g"), 1);
    }

    #[tokio::test]
    async fn test_unknown_group_and_empty_name() {
        let hub = GroupHub::new();
        let (a, _) = peer(false);
        assert!(!hub.join("", a.clone()));
        assert_eq!(hub.multicast(a.id(), "nobody", text("x")).await, Delivery::default());
    }

    #[tokio::test]
    async fn test_shutdown_closes_everyone() {
        let hub = GroupHub::new();
        let (a, a_sent) = peer(false);
        let (b, b_sent) = peer(false);
        hub.join("g1", a.clone());
        hub.join("g2", b.clone());

        assert_eq!(hub.shutdown().await, 2);
        assert_eq!(hub.group_count(), 0);
        assert!(a.is_closed() && b.is_closed());
        for sent in [a_sent, b_sent] {
            match &sent.lock().unwrap()[0] {
                Message::Close(Some(frame)) => {
                    assert_eq!(frame.code, CloseCode::Away);
                    assert_eq!(frame.reason.as_str(), SHUTDOWN_REASON);
                }
                other => panic!("expected close frame, got {:?}", other),
            }
        }

        let (c, _) = peer(false);
        assert!(!hub.join("g1", c));
    }

    #[tokio::test]
    async fn test_join_after_teardown_leaves_no_member() {
        let hub = GroupHub::new();
        assert_eq!(hub.shutdown().await, 0);

        let (late, late_sent) = peer(false);
        assert!(!hub.join("g", late.clone()));
        assert_eq!(hub.group_count(), 0);
        assert!(hub.snapshot("g").is_none());
        assert!(late_sent.lock().unwrap().is_empty());
        assert_eq!(hub.multicast(late.id(), "g", text("x")).await, Delivery::default());
    }

    #[test]
    fn test_teardown_releases_member_gauge() {
        use metrics_exporter_prometheus::PrometheusBuilder;

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let hub = GroupHub::new();
        let (a, _) = peer(false);
        let (b, _) = peer(false);
        b.mark_closed();

        let detached = ::metrics::with_local_recorder(&recorder, || {
            hub.join("g1", a.clone());
            hub.join("g2", b.clone());
            hub.detach_all()
        });
        assert_eq!(detached.len(), 2);
        assert!(hub.is_torn_down());

        let gauge = format!("{} 0", metrics::WS_MEMBERS);
        assert!(handle.render().lines().any(|line| line == gauge));
    }
}
