//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! accepted socket
//!     → connection.rs (request loop, keep-alive, upgrade hand-off)
//!     → request.rs (decode one HTTP/1 request)
//!     → session.rs (validate, parse args, dispatch)
//!         → routing::Router (best template + path variables)
//!         → static_files.rs (fallback when nothing matches)
//!     → response.rs (serialize)
//!     → written back on the same socket
//! ```

pub mod connection;
pub mod request;
pub mod response;
pub mod server;
pub mod session;
pub mod static_files;

pub use request::{CodecError, Request};
pub use response::{ContentKind, Response};
pub use server::{HttpServer, Route};
pub use session::{Session, SessionState};
pub use static_files::StaticFiles;
