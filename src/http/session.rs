//! Per-request session.
//!
//! # Responsibilities
//! - Hold the request snapshot, decoded href and query arguments
//! - Validate the request before any route matching or filesystem access
//! - Dispatch to the matched route handler, else to the static fallback
//! - Guarantee at most one reply per request
//!
//! # Lifecycle
//! ```text
//! Created → Parsed → Dispatched → Replied
//!     └──────── (400) ───────────────┘
//! ```
//!
//! # Design Decisions
//! - Reply calls after the first are silently ignored
//! - File replies are resolved by the connection loop, off the handler's call stack
//! - A dispatch that never replies is answered with 500 "No reply"

use std::collections::HashMap;
use std::path::PathBuf;

use http::{Method, StatusCode};
use percent_encoding::percent_decode_str;
use serde::Serialize;

use crate::http::request::Request;
use crate::http::response::{ContentKind, Response};
use crate::http::static_files::StaticFiles;
use crate::routing::{is_known_method, Router};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Parsed,
    Dispatched,
    Replied,
}

/// The single reply recorded by a session.
#[derive(Debug, Clone)]
enum Reply {
    Ready(Response),
    File {
        path: PathBuf,
        download_name: Option<String>,
    },
}

/// Percent-decode a URI component, treating `+` as a space.
fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Decode a request target and lower-case it.
pub fn decode_uri(target: &str) -> String {
    decode_component(target).to_lowercase()
}

/// Parse a query string into lower-cased keys; later duplicates overwrite earlier ones.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let query = query.split('#').next().unwrap_or_default();
    let mut args = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        args.insert(decode_component(key).to_lowercase(), decode_component(value));
    }
    args
}

/// Context for one inbound HTTP request.
#[derive(Debug)]
pub struct Session {
    request: Request,
    href: String,
    args: HashMap<String, String>,
    state: SessionState,
    reply: Option<Reply>,
    status: StatusCode,
    content_length: u64,
}

impl Session {
    pub fn new(request: Request) -> Self {
        let href = decode_uri(request.target());
        Self {
            request,
            href,
            args: HashMap::new(),
            state: SessionState::Created,
            reply: None,
            status: StatusCode::OK,
            content_length: 0,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Decoded, lower-cased request target including any query.
    pub fn href(&self) -> &str {
        &self.href
    }

    /// `href` without the query part.
    pub fn path(&self) -> &str {
        self.href.split('?').next().unwrap_or_default()
    }

    pub fn body(&self) -> &[u8] {
        self.request.body()
    }

    /// Argument value by (case-insensitive) key, or `default`.
    pub fn arg(&self, key: &str, default: &str) -> String {
        self.args
            .get(&key.to_lowercase())
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn args(&self) -> &HashMap<String, String> {
        &self.args
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_replied(&self) -> bool {
        self.reply.is_some()
    }

    pub fn response_code(&self) -> StatusCode {
        self.status
    }

    pub fn response_content_length(&self) -> u64 {
        self.content_length
    }

    /// Extract query arguments from the raw request target.
    pub fn parse_arguments(&mut self) {
        self.args = match self.request.target().split_once('?') {
            Some((_, query)) => parse_query(query),
            None => HashMap::new(),
        };
        if self.state == SessionState::Created {
            self.state = SessionState::Parsed;
        }
    }

    /// Canonical reply: every other reply method funnels through here.
    pub fn reply(&mut self, response: Response) {
        if self.is_replied() {
            tracing::debug!(href = %self.href, "Duplicate reply ignored");
            return;
        }
        let response = response.for_request(&self.request);
        self.status = response.status();
        self.content_length = response.content_length();
        self.reply = Some(Reply::Ready(response));
        self.state = SessionState::Replied;
    }

    pub fn reply_content(&mut self, kind: ContentKind, text: impl Into<String>, status: StatusCode) {
        self.reply(Response::text(status, kind, text));
    }

    pub fn reply_text(&mut self, text: impl Into<String>, status: StatusCode) {
        self.reply_content(ContentKind::Text, text, status);
    }

    pub fn reply_json(&mut self, text: impl Into<String>, status: StatusCode) {
        self.reply_content(ContentKind::Json, text, status);
    }

    pub fn reply_xml(&mut self, text: impl Into<String>, status: StatusCode) {
        self.reply_content(ContentKind::Xml, text, status);
    }

    /// Serialize `value` as JSON; a serialization failure becomes a 500.
    pub fn reply_json_value<T: Serialize>(&mut self, value: &T, status: StatusCode) {
        match serde_json::to_string(value) {
            Ok(text) => self.reply_json(text, status),
            Err(e) => self.reply_server_error(&e.to_string()),
        }
    }

    pub fn reply_bad_request(&mut self, why: &str) {
        self.reply(Response::bad_request(why));
    }

    /// 404 naming `what`, or the request target when `None`.
    pub fn reply_not_found(&mut self, what: Option<&str>) {
        let resource = what.unwrap_or(self.request.target()).to_string();
        self.reply(Response::not_found(&resource));
    }

    pub fn reply_unauthorized(&mut self) {
        self.reply(Response::unauthorized());
    }

    pub fn reply_server_error(&mut self, what: &str) {
        self.reply(Response::server_error(what));
    }

    /// Reply with a local file, resolved with the static fallback rules.
    pub fn reply_file(&mut self, path: impl Into<PathBuf>, download_name: Option<&str>) {
        if self.is_replied() {
            return;
        }
        self.reply = Some(Reply::File {
            path: path.into(),
            download_name: download_name.map(str::to_string),
        });
        self.state = SessionState::Replied;
    }

    /// Validate, route and invoke the handler; falls back to static files.
    fn handle_request(&mut self, router: &Router, files: &StaticFiles) {
        if !is_known_method(self.request.method()) {
            return self.reply_bad_request("Unknown HTTP-method");
        }
        let target = self.request.target();
        if !target.starts_with('/') || target.contains("..") || self.href.contains("..") {
            return self.reply_bad_request("Illegal request-target");
        }

        self.parse_arguments();
        self.state = SessionState::Dispatched;

        let path = self.path().to_string();
        if let Some(found) = router.find(self.request.method(), &path) {
            self.args.extend(found.args);
            if let Err(e) = (found.template.handler())(self) {
                tracing::warn!(href = %self.href, error = %e, "Handler failed");
                self.reply_server_error(&e.to_string());
            }
            return;
        }

        self.reply_file(files.resolve(&path), None);
    }

    /// Run the request through validation, routing and fallback.
    ///
    /// Always leaves the session replied.
    pub fn dispatch(&mut self, router: &Router, files: &StaticFiles) {
        self.handle_request(router, files);
        if !self.is_replied() {
            tracing::error!(method = %self.request.method(), href = %self.href, "No reply");
            self.reply_server_error("No reply");
        }
    }

    /// Produce the wire response, reading any file the reply refers to.
    pub async fn finish(&mut self, files: &StaticFiles) -> Response {
        let response = match self.reply.take() {
            Some(Reply::Ready(response)) => response,
            Some(Reply::File { path, download_name }) => {
                files.serve(&self.request, &path, download_name.as_deref()).await
            }
            None => Response::server_error("No reply").for_request(&self.request),
        };
        self.status = response.status();
        self.content_length = response.content_length();
        self.reply = Some(Reply::Ready(response.clone()));
        self.state = SessionState::Replied;
        response
    }
}
