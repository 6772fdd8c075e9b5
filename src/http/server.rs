//! HTTP server setup and accept loop.
//!
//! # Responsibilities
//! - Collect route registrations before serving starts
//! - Mount the built-in `GET /$apis` listing
//! - Accept connections and spawn one connection task per socket
//! - Tear down the WebSocket group hub on shutdown
//!
//! # Design Decisions
//! - The route registry is frozen when `run` starts; no registration while serving
//! - Shutdown stops accepting immediately; in-flight HTTP connections are not drained

use std::sync::Arc;
use std::time::Duration;

use http::{Method, StatusCode};

use crate::config::ServerConfig;
use crate::http::connection::{serve_connection, ConnectionContext};
use crate::http::session::Session;
use crate::http::static_files::StaticFiles;
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::routing::{parse_method, Handler, HandlerResult, RegisterError, Router};
use crate::websocket::GroupHub;

/// Path of the built-in route listing.
pub const APIS_PATH: &str = "/$apis";

/// A route ready to be mounted.
#[derive(Clone)]
pub struct Route {
    method: String,
    url: String,
    handler: Handler,
}

impl Route {
    /// `method` is upper-cased; `url` gains a leading `/` when missing.
    pub fn new<F>(method: &str, url: &str, handler: F) -> Self
    where
        F: Fn(&mut Session) -> HandlerResult + Send + Sync + 'static,
    {
        Self::from_handler(method, url, Arc::new(handler))
    }

    pub fn from_handler(method: &str, url: &str, handler: Handler) -> Self {
        let url = if url.starts_with('/') {
            url.to_string()
        } else {
            format!("/{}", url)
        };
        Self {
            method: method.to_ascii_uppercase(),
            url,
            handler,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Same route mounted at a different url.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Same route with its handler replaced.
    pub fn with_handler(mut self, handler: Handler) -> Self {
        self.handler = handler;
        self
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Render the `/$apis` body for a route listing.
pub fn render_apis(routes: &[(String, String)]) -> String {
    if routes.is_empty() {
        return "No apis".to_string();
    }
    routes
        .iter()
        .map(|(method, pattern)| format!("{:>6} {}\n", method, pattern))
        .collect()
}

/// Embedded HTTP/WebSocket server.
pub struct HttpServer {
    config: ServerConfig,
    router: Router,
    hub: Arc<GroupHub>,
    tracker: ConnectionTracker,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            router: Router::new(),
            hub: Arc::new(GroupHub::new()),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Register `handler` for a verb given as text (`"get"`, `"PROPFIND"`, ...).
    pub fn hook<F>(&mut self, method: &str, target: &str, handler: F) -> Result<(), RegisterError>
    where
        F: Fn(&mut Session) -> HandlerResult + Send + Sync + 'static,
    {
        self.hook_route(Route::new(method, target, handler))
    }

    /// Register `handler` for an already parsed verb.
    pub fn hook_method(&mut self, method: &Method, target: &str, handler: Handler) -> Result<(), RegisterError> {
        self.router.register(method, target, handler)
    }

    pub fn hook_route(&mut self, route: Route) -> Result<(), RegisterError> {
        let Some(method) = parse_method(route.method()) else {
            tracing::error!(method = %route.method(), url = %route.url(), "Unknown HTTP method");
            return Err(RegisterError::UnknownMethod(route.method().to_string()));
        };
        let Route { url, handler, .. } = route;
        self.router.register(&method, &url, handler)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// The group hub shared with every upgraded connection.
    pub fn hub(&self) -> Arc<GroupHub> {
        Arc::clone(&self.hub)
    }

    /// Connection accounting; stays valid after `run` consumes the server.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Freeze the registry, mounting `/$apis` over everything registered so far.
    fn into_context(mut self) -> ConnectionContext {
        let listing = render_apis(&self.router.list());
        let apis: Handler = Arc::new(move |session: &mut Session| {
            session.reply_text(listing.clone(), StatusCode::OK);
            Ok(())
        });
        // A user route already at this path keeps precedence; the router logs the duplicate.
        let _ = self.router.register(&Method::GET, APIS_PATH, apis);

        let idle_secs = self.config.timeouts.idle_secs;
        ConnectionContext {
            router: self.router,
            files: StaticFiles::from_config(&self.config.static_files),
            limits: self.config.limits.clone(),
            idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
            hub: self.hub,
            tracker: self.tracker,
        }
    }

    /// Run the server, accepting connections until `shutdown` is triggered.
    pub async fn run(self, listener: Listener, shutdown: Shutdown) -> Result<(), ListenerError> {
        let ctx = Arc::new(self.into_context());
        let hub = Arc::clone(&ctx.hub);
        tracing::info!(
            address = ?listener.local_addr().ok(),
            routes = ctx.router.len(),
            doc_root = %ctx.files.doc_root().display(),
            "HTTP server starting"
        );

        let stop = shutdown.wait();
        tokio::pin!(stop);

        let result = loop {
            tokio::select! {
                _ = &mut stop => break Ok(()),
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr, permit)) => {
                        let ctx = Arc::clone(&ctx);
                        tokio::spawn(async move {
                            let _permit = permit;
                            serve_connection(stream, peer_addr, ctx).await;
                        });
                    }
                    Err(ListenerError::Accept(e)) => {
                        tracing::error!(error = %e, "Accept failed");
                    }
                    Err(e) => break Err(e),
                },
            }
        };

        hub.shutdown().await;
        tracing::info!("HTTP server stopped");
        result
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("bind_address", &self.config.listener.bind_address)
            .field("routes", &self.router.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(session: &mut Session) -> HandlerResult {
        session.reply_text("ok", StatusCode::OK);
        Ok(())
    }

    #[test]
    fn test_route_normalisation() {
        let route = Route::new("post", "orders/<id>", ok);
        assert_eq!(route.method(), "POST");
        assert_eq!(route.url(), "/orders/<id>");
    }

    #[test]
    fn test_hook_by_name() {
        let mut server = HttpServer::new(ServerConfig::default());
        server.hook("get", "/a", ok).unwrap();
        server.hook("PROPFIND", "/dav", ok).unwrap();
        assert!(matches!(
            server.hook("FETCH", "/b", ok),
            Err(RegisterError::UnknownMethod(m)) if m == "FETCH"
        ));
        assert!(server.hook("GET", "/A", ok).is_err());
        assert_eq!(server.router().len(), 2);
    }

    #[test]
    fn test_render_apis() {
        assert_eq!(render_apis(&[]), "No apis");
        let listing = render_apis(&[
            ("GET".to_string(), "/user/<id>".to_string()),
            ("DELETE".to_string(), "/user/<id>".to_string()),
        ]);
        assert_eq!(listing, "   GET /user/<id>\nDELETE /user/<id>\n");
    }

    #[test]
    fn test_apis_route_excludes_itself() {
        let mut server = HttpServer::new(ServerConfig::default());
        server.hook("GET", "/ping", ok).unwrap();
        let ctx = server.into_context();
        assert_eq!(ctx.router.len(), 2);

        let found = ctx.router.find(&Method::GET, APIS_PATH).unwrap();
        let mut session = Session::new(crate::http::request::Request::new(Method::GET, APIS_PATH));
        (found.template.handler())(&mut session).unwrap();
        assert_eq!(session.response_code(), StatusCode::OK);
        assert_eq!(session.response_content_length(), "   GET /ping\n".len() as u64);
    }

    #[test]
    fn test_idle_timeout_zero_disables() {
        let ctx = HttpServer::new(ServerConfig::default()).into_context();
        assert!(ctx.idle_timeout.is_none());

        let mut config = ServerConfig::default();
        config.timeouts.idle_secs = 30;
        let ctx = HttpServer::new(config).into_context();
        assert_eq!(ctx.idle_timeout, Some(Duration::from_secs(30)));
    }
}
