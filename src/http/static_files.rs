//! Static file fallback.
//!
//! # Responsibilities
//! - Map a decoded request path onto the document root
//! - Serve file contents (or headers only for HEAD)
//! - Resolve content types from a fixed extension table
//!
//! # Design Decisions
//! - Missing files (and directories) are 404, other open failures are 500
//! - Unknown extensions are offered as attachment downloads
//! - Request paths are validated before reaching this module

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use http::header::CONTENT_DISPOSITION;
use http::{Method, StatusCode};
use tokio::io::AsyncReadExt;

use crate::config::StaticFilesConfig;
use crate::http::request::Request;
use crate::http::response::Response;

/// Content type for files without an extension.
const DEFAULT_CONTENT_TYPE: &str = "text/plain";
/// Best guess for extensions missing from the table.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Look up the content type for `path` by extension.
///
/// Returns `None` for an extension the table does not know.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return Some(DEFAULT_CONTENT_TYPE);
    };
    let ty = match ext.to_ascii_lowercase().as_str() {
        "htm" | "html" | "php" => "text/html",
        "css" => "text/css",
        "txt" => "text/plain",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "swf" => "application/x-shockwave-flash",
        "flv" => "video/x-flv",
        "png" => "image/png",
        "jpe" | "jpeg" | "jpg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "ico" => "image/vnd.microsoft.icon",
        "tiff" | "tif" => "image/tiff",
        "svg" | "svgz" => "image/svg+xml",
        _ => return None,
    };
    Some(ty)
}

/// Serves files below a document root.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    doc_root: PathBuf,
    index_file: String,
}

impl StaticFiles {
    pub fn new(doc_root: impl Into<PathBuf>, index_file: impl Into<String>) -> Self {
        Self {
            doc_root: doc_root.into(),
            index_file: index_file.into(),
        }
    }

    pub fn from_config(config: &StaticFilesConfig) -> Self {
        Self::new(&config.doc_root, &config.index_file)
    }

    pub fn doc_root(&self) -> &Path {
        &self.doc_root
    }

    /// Filesystem location for a decoded, lower-cased request path (no query).
    pub fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.doc_root.join(path.trim_start_matches('/'));
        if path.ends_with('/') {
            full.push(&self.index_file);
        }
        full
    }

    /// Build the response for `path` on behalf of `request`.
    ///
    /// `download_name` overrides the file name offered for attachment downloads.
    pub async fn serve(&self, request: &Request, path: &Path, download_name: Option<&str>) -> Response {
        let mut file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Response::not_found(request.target()).for_request(request);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Open file failed");
                return Response::server_error(&e.to_string()).for_request(request);
            }
        };

        let metadata = match file.metadata().await {
            Ok(m) => m,
            Err(e) => return Response::server_error(&e.to_string()).for_request(request),
        };
        if metadata.is_dir() {
            return Response::not_found(request.target()).for_request(request);
        }

        let (content_type, attachment) = match content_type_for(path) {
            Some(ty) => (ty, None),
            None => {
                let name = download_name
                    .map(str::to_string)
                    .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()));
                (FALLBACK_CONTENT_TYPE, name)
            }
        };

        let response = if *request.method() == Method::HEAD {
            Response::new(StatusCode::OK)
                .with_body(content_type, Vec::new())
                .headers_only(metadata.len())
        } else {
            let mut buf = Vec::with_capacity(metadata.len() as usize);
            if let Err(e) = file.read_to_end(&mut buf).await {
                tracing::warn!(path = %path.display(), error = %e, "Read file failed");
                return Response::server_error(&e.to_string()).for_request(request);
            }
            Response::new(StatusCode::OK).with_body(content_type, buf)
        };

        let response = match attachment {
            Some(name) => response.with_header(CONTENT_DISPOSITION, &format!("attachment;filename={}", name)),
            None => response,
        };
        response.for_request(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_TYPE;

    fn fixture() -> (tempfile::TempDir, StaticFiles) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::write(dir.path().join("data.bin"), [1u8, 2, 3]).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let files = StaticFiles::new(dir.path(), "index.html");
        (dir, files)
    }

    #[test]
    fn test_content_type_table() {
        assert_eq!(content_type_for(Path::new("a/b.HTML")), Some("text/html"));
        assert_eq!(content_type_for(Path::new("x.jpe")), Some("image/jpeg"));
        assert_eq!(content_type_for(Path::new("README")), Some("text/plain"));
        assert_eq!(content_type_for(Path::new("archive.zip")), None);
    }

    #[test]
    fn test_resolve_appends_index() {
        let files = StaticFiles::new("/srv/www", "index.html");
        assert_eq!(files.resolve("/"), PathBuf::from("/srv/www/index.html"));
        assert_eq!(files.resolve("/docs/"), PathBuf::from("/srv/www/docs/index.html"));
        assert_eq!(files.resolve("/a.css"), PathBuf::from("/srv/www/a.css"));
    }

    #[tokio::test]
    async fn test_serve_file_and_head() {
        let (_dir, files) = fixture();
        let get = Request::new(Method::GET, "/");
        let resp = files.serve(&get, &files.resolve("/"), None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.body().as_ref(), b"<h1>home</h1>");
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/html");

        let head = Request::new(Method::HEAD, "/");
        let resp = files.serve(&head, &files.resolve("/"), None).await;
        assert!(resp.body().is_empty());
        assert_eq!(resp.content_length(), 13);
    }

    #[tokio::test]
    async fn test_unknown_extension_is_attachment() {
        let (_dir, files) = fixture();
        let req = Request::new(Method::GET, "/data.bin");
        let resp = files.serve(&req, &files.resolve("/data.bin"), None).await;
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/octet-stream");
        assert_eq!(
            resp.headers()[CONTENT_DISPOSITION],
            "attachment;filename=data.bin"
        );

        let resp = files.serve(&req, &files.resolve("/data.bin"), Some("report.dat")).await;
        assert_eq!(
            resp.headers()[CONTENT_DISPOSITION],
            "attachment;filename=report.dat"
        );
    }

    #[tokio::test]
    async fn test_missing_file_and_directory() {
        let (_dir, files) = fixture();
        let req = Request::new(Method::GET, "/missing");
        let resp = files.serve(&req, &files.resolve("/missing"), None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.body().as_ref(), b"The resource '/missing' was not found.");

        let req = Request::new(Method::GET, "/sub");
        let resp = files.serve(&req, &files.resolve("/sub"), None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
