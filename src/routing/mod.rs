//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (before serving):
//!     (verb, pattern, handler)
//!     → matcher.rs (lower-case, tokenize, equivalence check)
//!     → router.rs (append to the verb's template list)
//!
//! Lookup (per request):
//!     (verb, decoded path)
//!     → router.rs (candidate templates for the verb)
//!     → matcher.rs (weight each candidate)
//!     → Return: best template + bound variables, or no match
//! ```
//!
//! # Design Decisions
//! - Literal segments beat fuzzy ones; longer literal agreement beats shorter
//! - Deterministic: equal weights resolve to the earliest registration
//! - Duplicate registration is reported, never fatal

pub mod matcher;
pub mod router;

pub use router::{
    is_known_method, parse_method, BoxError, Handler, HandlerResult, RegisterError,
    RouteMatch, RouteTemplate, Router,
};
