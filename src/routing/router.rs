//! Route registry.
//!
//! # Responsibilities
//! - Store route templates per HTTP verb, in registration order
//! - Reject invalid and duplicate (equivalent) registrations
//! - Resolve a request path to the best template plus bound variables
//!
//! # Design Decisions
//! - Populated before serving, read-mostly afterwards (no interior locking)
//! - Ties keep the earlier registration (strictly greater weight wins)
//! - Request paths carrying fuzzy markers never match

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use http::Method;

use crate::http::session::Session;
use crate::routing::matcher::{self, Token};

/// Error type returned by route handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a handler invocation. `Err` becomes a 500 response.
pub type HandlerResult = Result<(), BoxError>;

/// A stored route handler.
pub type Handler = Arc<dyn Fn(&mut Session) -> HandlerResult + Send + Sync>;

/// Reasons a registration is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("unknown method {0}")]
    UnknownMethod(String),
    #[error("empty route pattern")]
    EmptyPattern,
    #[error("duplicate registration, method={method}, target={pattern}")]
    Duplicate { method: String, pattern: String },
}

/// A registered (verb, pattern, handler) triple.
#[derive(Clone)]
pub struct RouteTemplate {
    pattern: String,
    tokens: Vec<Token>,
    handler: Handler,
}

impl RouteTemplate {
    /// The lower-cased pattern as registered.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl std::fmt::Debug for RouteTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTemplate")
            .field("pattern", &self.pattern)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

/// A successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub template: RouteTemplate,
    pub args: HashMap<String, String>,
    pub weight: u32,
}

/// Standard verbs plus the WebDAV/UPnP extensions an HTTP/1 server recognises.
const KNOWN_EXTENSION_METHODS: &[&str] = &[
    "COPY", "LOCK", "MKCOL", "MOVE", "PROPFIND", "PROPPATCH", "SEARCH", "UNLOCK", "BIND",
    "REBIND", "UNBIND", "ACL", "REPORT", "MKACTIVITY", "CHECKOUT", "MERGE", "M-SEARCH",
    "NOTIFY", "SUBSCRIBE", "UNSUBSCRIBE", "PURGE", "MKCALENDAR", "LINK", "UNLINK",
];

/// True for any verb the server understands; everything else is answered with 400.
pub fn is_known_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET
            | Method::HEAD
            | Method::POST
            | Method::PUT
            | Method::DELETE
            | Method::CONNECT
            | Method::OPTIONS
            | Method::TRACE
            | Method::PATCH
    ) || KNOWN_EXTENSION_METHODS.contains(&method.as_str())
}

/// Parse a verb from user input (case-insensitive). Unknown verbs yield `None`.
pub fn parse_method(method: &str) -> Option<Method> {
    Method::from_bytes(method.trim().to_uppercase().as_bytes())
        .ok()
        .filter(is_known_method)
}

/// Per-verb collection of route templates.
#[derive(Default)]
pub struct Router {
    routes: BTreeMap<String, Vec<RouteTemplate>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `method` and `pattern`.
    ///
    /// Equivalent templates are refused and the earlier registration stays in place.
    pub fn register(
        &mut self,
        method: &Method,
        pattern: &str,
        handler: Handler,
    ) -> Result<(), RegisterError> {
        if !is_known_method(method) {
            tracing::error!(method = %method, target = %pattern, "Invalid argument");
            return Err(RegisterError::UnknownMethod(method.to_string()));
        }
        if pattern.is_empty() {
            tracing::error!(method = %method, "Invalid argument, empty target");
            return Err(RegisterError::EmptyPattern);
        }

        let pattern = pattern.to_lowercase();
        let tokens = matcher::tokenize(&pattern);
        let templates = self.routes.entry(method.as_str().to_string()).or_default();
        if templates.iter().any(|t| matcher::equivalent(&t.tokens, &tokens)) {
            tracing::error!(method = %method, target = %pattern, "Duplicate registration");
            return Err(RegisterError::Duplicate {
                method: method.to_string(),
                pattern,
            });
        }

        templates.push(RouteTemplate {
            pattern,
            tokens,
            handler,
        });
        Ok(())
    }

    /// Resolve `path` for `method` to the highest-weight template.
    pub fn find(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        if matcher::contains_fuzzy_markers(path) {
            return None;
        }
        let templates = self.routes.get(method.as_str())?;
        let segments = matcher::split_path(path);

        let mut best: Option<RouteMatch> = None;
        for template in templates {
            let Some(score) = matcher::score(&template.tokens, &segments) else {
                continue;
            };
            let current = best.as_ref().map(|b| b.weight).unwrap_or(0);
            if score.weight > current {
                best = Some(RouteMatch {
                    template: template.clone(),
                    args: score.args,
                    weight: score.weight,
                });
            }
        }
        best
    }

    /// All registered `(verb, pattern)` pairs, verbs in lexical order.
    pub fn list(&self) -> Vec<(String, String)> {
        self.routes
            .iter()
            .flat_map(|(verb, templates)| {
                templates
                    .iter()
                    .map(move |t| (verb.clone(), t.pattern.clone()))
            })
            .collect()
    }

    /// Total number of registered templates.
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").field("routes", &self.routes).finish()
    }
}
