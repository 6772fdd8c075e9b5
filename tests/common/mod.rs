//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use http::StatusCode;
use tempfile::TempDir;
use tokio::net::TcpListener;

use switchyard::net::Listener;
use switchyard::websocket::GroupHub;
use switchyard::{HttpServer, ServerConfig, Session, Shutdown};

/// A server running on an ephemeral port, torn down when dropped.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub hub: Arc<GroupHub>,
    pub doc_root: TempDir,
    task: tokio::task::JoinHandle<()>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the accept loop to return.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = self.task.await;
    }
}

fn user(session: &mut Session) -> switchyard::HandlerResult {
    let body = format!("id={}", session.arg("id", ""));
    session.reply_text(body, StatusCode::OK);
    Ok(())
}

fn user_list(session: &mut Session) -> switchyard::HandlerResult {
    session.reply_json("[\"alice\",\"bob\"]", StatusCode::OK);
    Ok(())
}

fn explode(_: &mut Session) -> switchyard::HandlerResult {
    Err("database unavailable".into())
}

/// Boot a server with a small route table and a doc root holding `index.html`.
pub async fn start_server() -> TestServer {
    start_server_with(|_| {}).await
}

/// Like `start_server`, letting the caller register extra routes first.
#[allow(dead_code)]
pub async fn start_server_with<F>(extra: F) -> TestServer
where
    F: FnOnce(&mut HttpServer),
{
    let doc_root = tempfile::tempdir().unwrap();
    std::fs::write(doc_root.path().join("index.html"), "<h1>home</h1>").unwrap();

    let mut config = ServerConfig::default();
    config.static_files.doc_root = doc_root.path().to_string_lossy().into_owned();

    let mut server = HttpServer::new(config);
    server.hook("GET", "/user/<id>", user).unwrap();
    server.hook("GET", "/user/list", user_list).unwrap();
    server.hook("POST", "/explode", explode).unwrap();
    extra(&mut server);

    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = Listener::from_tcp(tcp, 64);

    let shutdown = Shutdown::new();
    let hub = server.hub();
    let stop = shutdown.clone();
    let task = tokio::spawn(async move {
        server.run(listener, stop).await.unwrap();
    });

    TestServer {
        addr,
        shutdown,
        hub,
        doc_root,
        task,
    }
}
