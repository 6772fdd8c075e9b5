//! Embedded HTTP/WebSocket server.
//!
//! Routes are registered on an [`HttpServer`] before it starts; each accepted
//! socket then runs its own keep-alive loop, dispatching requests through a
//! [`Session`] to the best matching route or to the static file fallback.
//! Requests asking for a WebSocket upgrade leave the HTTP loop and join a
//! group keyed by their target path, where every frame is relayed to the
//! other members.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;
pub mod websocket;

// Extension points
pub mod service;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ServerConfig;
pub use http::{HttpServer, Route, Session};
pub use lifecycle::Shutdown;
pub use routing::{BoxError, Handler, HandlerResult};
pub use service::{ServerContext, Service, ServiceHost};
