use std::io::Cursor;

use serde::Serialize;
use tiny_http::{Header, Response, StatusCode};

use crate::error::AnalyzeError;

/// A response ready to be written, independent of the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

impl ApiResponse {
    pub fn new(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        ApiResponse {
            status,
            headers: vec![("Content-Type".into(), content_type.into())],
            body,
        }
    }

    /// Serializes `value` as the JSON body.
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => ApiResponse::new(status, "application/json", body),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response body");
                ApiResponse::new(
                    500,
                    "application/json",
                    br#"{"success":false,"error":"Internal server error"}"#.to_vec(),
                )
            }
        }
    }

    /// `{success: false, error, message?}` with the given status.
    pub fn error(status: u16, error: &str, message: Option<&str>) -> Self {
        ApiResponse::json(status, &ErrorBody { success: false, error, message })
    }

    pub fn not_found() -> Self {
        ApiResponse::error(404, "Not found", None)
    }

    /// Maps a pipeline failure to exactly one client response.
    pub fn from_error(err: &AnalyzeError) -> Self {
        let (error, message) = err.client_message();
        let mut response = ApiResponse::error(err.status(), &error, message.as_deref());
        if let AnalyzeError::RateLimitExceeded { retry_after } = err {
            response = response.with_header("Retry-After", &retry_after.to_string());
        }
        response
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Converts into a `tiny_http` response. Headers that are not valid
    /// HTTP header bytes are dropped.
    pub fn into_http(self) -> Response<Cursor<Vec<u8>>> {
        let headers: Vec<Header> = self
            .headers
            .iter()
            .filter_map(|(k, v)| Header::from_bytes(k.as_bytes(), v.as_bytes()).ok())
            .collect();
        let len = self.body.len();
        Response::new(StatusCode(self.status), headers, Cursor::new(self.body), Some(len), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn body(resp: &ApiResponse) -> Value {
        serde_json::from_slice(&resp.body).unwrap()
    }

    #[test]
    fn error_body_omits_empty_message() {
        let resp = ApiResponse::error(400, "No image file provided", None);
        assert_eq!(resp.status, 400);
        assert_eq!(resp.header("content-type"), Some("application/json"));
        let json = body(&resp);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "No image file provided");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn rate_limit_error_carries_retry_after() {
        let resp = ApiResponse::from_error(&AnalyzeError::RateLimitExceeded { retry_after: 42 });
        assert_eq!(resp.status, 429);
        assert_eq!(resp.header("Retry-After"), Some("42"));
        assert_eq!(body(&resp)["error"], "Rate limit exceeded");
    }

    #[test]
    fn unexpected_error_hides_detail() {
        let resp = ApiResponse::from_error(&AnalyzeError::Unexpected("secret stack trace".into()));
        assert_eq!(resp.status, 500);
        assert!(!String::from_utf8_lossy(&resp.body).contains("secret"));
    }
}
