//! Pluggable services.
//!
//! A `Service` contributes a named bundle of routes. `ServiceHost` initializes
//! it against the shared `ServerContext`, applies the mount prefix and hooks
//! each route onto the server.

pub mod context;
pub mod host;

use std::sync::Arc;

use crate::http::server::Route;

pub use context::ServerContext;
pub use host::ServiceHost;

/// Errors raised while bringing a service up.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Init service '{service}' failed: {reason}")]
    Init { service: String, reason: String },
}

/// A named bundle of routes.
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    /// Called once before any route is mounted.
    fn init(&self, _ctx: &ServerContext) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Routes to mount; urls are relative to the host's prefix.
    fn routes(self: Arc<Self>) -> Vec<Route>;
}
