//! WebSocket group relay over real sockets.

mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(url: &str) -> Client {
    let (ws, resp) = connect_async(url).await.unwrap();
    assert_eq!(resp.status(), 101);
    ws
}

async fn wait_for_members(server: &common::TestServer, group: &str, count: usize) {
    for _ in 0..100 {
        if server.hub.member_count(group) == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("group {} never reached {} members", group, count);
}

async fn next_data(client: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("timed out waiting for frame")
        .unwrap()
        .unwrap()
}

async fn assert_silent(client: &mut Client) {
    let res = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
    assert!(res.is_err(), "unexpected frame: {:?}", res);
}

#[tokio::test]
async fn test_group_relay_without_echo() {
    let server = common::start_server().await;
    let mut a = connect(&server.ws_url("/chat/Room")).await;
    let mut b = connect(&server.ws_url("/chat/room")).await;
    let mut c = connect(&server.ws_url("/CHAT/ROOM")).await;
    wait_for_members(&server, "/chat/room", 3).await;

    a.send(Message::text("hello".to_string())).await.unwrap();
    assert_eq!(next_data(&mut b).await, Message::text("hello".to_string()));
    assert_eq!(next_data(&mut c).await, Message::text("hello".to_string()));
    assert_silent(&mut a).await;

    b.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
    assert_eq!(next_data(&mut a).await, Message::binary(vec![1u8, 2, 3]));
    assert_eq!(next_data(&mut c).await, Message::binary(vec![1u8, 2, 3]));

    server.stop().await;
}

#[tokio::test]
async fn test_groups_are_isolated() {
    let server = common::start_server().await;
    let mut a = connect(&server.ws_url("/one")).await;
    let mut b = connect(&server.ws_url("/one")).await;
    let mut other = connect(&server.ws_url("/two")).await;
    wait_for_members(&server, "/one", 2).await;
    wait_for_members(&server, "/two", 1).await;

    a.send(Message::text("only one".to_string())).await.unwrap();
    assert_eq!(next_data(&mut b).await, Message::text("only one".to_string()));
    assert_silent(&mut other).await;

    server.stop().await;
}

#[tokio::test]
async fn test_departed_peer_pruned_on_next_multicast() {
    let server = common::start_server().await;
    let mut a = connect(&server.ws_url("/g")).await;
    let b = connect(&server.ws_url("/g")).await;
    let mut c = connect(&server.ws_url("/g")).await;
    wait_for_members(&server, "/g", 3).await;

    drop(b);
    // Give the server's read loop time to observe the disconnect.
    tokio::time::sleep(Duration::from_millis(100)).await;

    a.send(Message::text("first".to_string())).await.unwrap();
    assert_eq!(next_data(&mut c).await, Message::text("first".to_string()));
    wait_for_members(&server, "/g", 2).await;

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_peers() {
    let server = common::start_server().await;
    let mut a = connect(&server.ws_url("/live")).await;
    wait_for_members(&server, "/live", 1).await;

    server.stop().await;

    match next_data(&mut a).await {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::Away);
            assert_eq!(frame.reason.as_str(), "Server shutdown");
        }
        other => panic!("expected close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_upgrade_without_key_is_rejected() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let server = common::start_server().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"GET /chat HTTP/1.1\r\nHost: t\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n")
        .await
        .unwrap();

    let mut out = String::new();
    tokio::time::timeout(Duration::from_secs(2), stream.read_to_string(&mut out))
        .await
        .unwrap()
        .unwrap();
    assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(out.contains("Missing Sec-WebSocket-Key header"));

    server.stop().await;
}
