//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → accept loop stops → group hub torn down → run() returns
//! ```
//!
//! # Design Decisions
//! - Shutdown stops accepting and closes WebSocket peers
//! - In-flight HTTP connections are not drained

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
