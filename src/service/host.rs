//! Mounting services onto an `HttpServer`.
//!
//! # Responsibilities
//! - Initialize each service against the shared `ServerContext`
//! - Apply the mount prefix to service routes
//! - Wrap every handler with REQUEST/RESPONSE debug logging
//!
//! # Design Decisions
//! - A service whose init fails is skipped, others still mount
//! - A rejected route (duplicate, unknown verb) is logged and skipped

use std::sync::Arc;

use crate::config::ServicesConfig;
use crate::http::server::{HttpServer, Route};
use crate::http::session::Session;
use crate::routing::Handler;
use crate::service::{Service, ServerContext, ServiceError};

/// Mounts services with a common url prefix.
#[derive(Debug, Clone)]
pub struct ServiceHost {
    prefix: String,
    exempt_prefixes: Vec<String>,
    context: ServerContext,
}

impl ServiceHost {
    pub fn new(config: &ServicesConfig, context: ServerContext) -> Self {
        Self {
            prefix: config.prefix.clone(),
            exempt_prefixes: config.exempt_prefixes.clone(),
            context,
        }
    }

    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    /// Final url for a service route.
    ///
    /// A leading `/` is ensured; the prefix is prepended unless the url already
    /// starts with it or with an exempt prefix.
    pub fn mount_url(&self, url: &str) -> String {
        let url = if url.starts_with('/') {
            url.to_string()
        } else {
            format!("/{}", url)
        };
        let exempt = self.exempt_prefixes.iter().any(|p| url.starts_with(p.as_str()));
        if exempt || url.starts_with(&self.prefix) {
            url
        } else {
            format!("{}{}", self.prefix, url)
        }
    }

    /// Initialize `service` and mount its routes. Returns how many routes were mounted.
    pub fn register(&self, server: &mut HttpServer, service: Arc<dyn Service>) -> Result<usize, ServiceError> {
        let name = service.name().to_string();
        tracing::info!(service = %name, "Init service");
        if let Err(e) = service.init(&self.context) {
            tracing::error!(service = %name, error = %e, "Init service failed");
            return Err(e);
        }
        self.context.add_service(Arc::clone(&service));

        let mut mounted = 0;
        for route in Arc::clone(&service).routes() {
            let url = self.mount_url(route.url());
            let method = route.method().to_string();
            let handler = with_logging(&method, &url, route.handler().clone());
            match server.hook_route(route.with_url(url.clone()).with_handler(handler)) {
                Ok(()) => {
                    tracing::debug!(service = %name, method = %method, url = %url, "Register api");
                    mounted += 1;
                }
                Err(e) => {
                    tracing::error!(service = %name, method = %method, url = %url, error = %e, "Register api failed");
                }
            }
        }

        tracing::info!(service = %name, routes = mounted, "Init service ok");
        Ok(mounted)
    }
}

/// Wrap `inner` so each call logs the request and the resulting reply.
fn with_logging(method: &str, url: &str, inner: Handler) -> Handler {
    let method = method.to_string();
    let url = url.to_string();
    Arc::new(move |session: &mut Session| {
        tracing::debug!(
            method = %method,
            url = %url,
            body_size = session.body().len(),
            "REQUEST"
        );
        let result = inner(session);
        tracing::debug!(
            status = session.response_code().as_u16(),
            content_length = session.response_content_length(),
            "RESPONSE"
        );
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::routing::HandlerResult;
    use http::{Method, StatusCode};

    struct Orders {
        fail_init: bool,
    }

    fn list(session: &mut Session) -> HandlerResult {
        session.reply_json("[]", StatusCode::OK);
        Ok(())
    }

    impl Service for Orders {
        fn name(&self) -> &str {
            "orders"
        }

        fn init(&self, ctx: &ServerContext) -> Result<(), ServiceError> {
            if self.fail_init {
                return Err(ServiceError::Init {
                    service: self.name().to_string(),
                    reason: "no database".to_string(),
                });
            }
            ctx.set_config("orders.ready", "true");
            Ok(())
        }

        fn routes(self: Arc<Self>) -> Vec<Route> {
            vec![
                Route::new("GET", "orders", list),
                Route::new("GET", "/atom/orders", list),
                Route::new("GET", "/api/orders/<id>", list),
                Route::new("GET", "/orders", list),
            ]
        }
    }

    fn host(prefix: &str) -> ServiceHost {
        let config = ServicesConfig {
            prefix: prefix.to_string(),
            ..ServicesConfig::default()
        };
        ServiceHost::new(&config, ServerContext::new())
    }

    #[test]
    fn test_mount_url_rules() {
        let host = host("/api");
        assert_eq!(host.mount_url("orders"), "/api/orders");
        assert_eq!(host.mount_url("/api/orders"), "/api/orders");
        assert_eq!(host.mount_url("/atom/feed"), "/atom/feed");
        assert_eq!(host.mount_url("/coredb/x"), "/coredb/x");
        assert_eq!(self::host("").mount_url("/plain"), "/plain");
    }

    #[test]
    fn test_register_mounts_and_skips_duplicates() {
        let host = host("/api");
        let mut server = HttpServer::new(ServerConfig::default());
        let mounted = host
            .register(&mut server, Arc::new(Orders { fail_init: false }))
            .unwrap();

        // "orders" and "/orders" both land on /api/orders; the second is a duplicate.
        assert_eq!(mounted, 3);
        assert!(server.router().find(&Method::GET, "/api/orders").is_some());
        assert!(server.router().find(&Method::GET, "/atom/orders").is_some());
        assert!(server.router().find(&Method::GET, "/api/orders/7").is_some());
        assert!(host.context().service("orders").is_some());
        assert_eq!(host.context().config("orders.ready").as_deref(), Some("true"));
    }

    #[test]
    fn test_failed_init_mounts_nothing() {
        let host = host("");
        let mut server = HttpServer::new(ServerConfig::default());
        let err = host
            .register(&mut server, Arc::new(Orders { fail_init: true }))
            .unwrap_err();
        assert!(err.to_string().contains("no database"));
        assert!(server.router().is_empty());
        assert!(host.context().service("orders").is_none());
    }

    #[test]
    fn test_logging_wrapper_preserves_reply() {
        let handler = with_logging("GET", "/x", Arc::new(list));
        let mut session = Session::new(crate::http::request::Request::new(Method::GET, "/x"));
        handler(&mut session).unwrap();
        assert_eq!(session.response_code(), StatusCode::OK);
        assert_eq!(session.response_content_length(), 2);
    }
}
