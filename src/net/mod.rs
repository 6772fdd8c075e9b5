//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limit permit)
//!     → connection.rs (id, active-connection accounting)
//!     → Hand off to the HTTP connection loop
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - The permit lives as long as the connection task, WebSocket included

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
