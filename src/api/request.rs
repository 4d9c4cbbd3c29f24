use tiny_http::Method;

use super::multipart::{extract_boundary, find_file};

/// A fully-read HTTP request, detached from the connection.
///
/// Handlers work on this rather than on `tiny_http::Request` so the whole
/// routing layer can be exercised without a socket.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path without query string or `/api/v1` prefix.
    pub path: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Rate-limit key: the peer IP address.
    pub client: String,
}

impl ApiRequest {
    pub fn new(method: Method, url: &str) -> Self {
        ApiRequest {
            method,
            path: normalize_path(url),
            content_type: None,
            body: Vec::new(),
            client: "unknown".into(),
        }
    }

    pub fn with_body(mut self, content_type: impl Into<String>, body: Vec<u8>) -> Self {
        self.content_type = Some(content_type.into());
        self.body = body;
        self
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = client.into();
        self
    }

    /// The file sent under `field`, if the body is multipart and has one.
    pub fn uploaded_file(&self, field: &str) -> Option<UploadedFile> {
        let boundary = extract_boundary(self.content_type.as_deref()?)?;
        let part = find_file(&self.body, &boundary, field)?;
        Some(UploadedFile {
            filename: part.filename.unwrap_or_default(),
            content_type: part.content_type,
            bytes: part.data,
        })
    }
}

/// An upload as declared by the client. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Drops the query string, the optional `/api/v1` prefix and any trailing
/// slash, so `/api/v1/health/?x=1` and `/health` route the same.
pub fn normalize_path(url: &str) -> String {
    let path = url.split_once('?').map_or(url, |(p, _)| p);
    let path = path.strip_prefix("/api/v1").unwrap_or(path);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}
