use std::io::Read;
use std::panic::{self, AssertUnwindSafe};

use tiny_http::{Method, Request};

use super::handlers;
use super::request::ApiRequest;
use super::response::ApiResponse;
use super::state::{AppState, SharedState};
use crate::error::AnalyzeError;

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Maps a fully-read request to its handler. Never touches the socket.
pub fn route(state: &AppState, request: &ApiRequest) -> ApiResponse {
    match (&request.method, request.path.as_str()) {
        (Method::Get, "/health") => handlers::health(),
        (Method::Get, "/pathologies") => handlers::pathologies(state),
        (Method::Post, "/analyze") => handlers::analyze(state, request),
        (Method::Get, "/random-image") => handlers::random_image(state),
        _ => ApiResponse::not_found(),
    }
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// Reads the request off the connection, routes it, and writes exactly one
/// response. Panics inside a handler are answered with a generic 500.
pub fn dispatch(mut request: Request, state: SharedState) {
    let method = request.method().clone();
    let url = request.url().to_owned();
    let client = request
        .remote_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned());

    let span = tracing::info_span!("request", method = %method, path = %url, client = %client);
    let _enter = span.enter();

    let response = match read_request(&mut request, method, &url, client, state.max_upload_bytes) {
        Ok(api_request) => {
            tracing::debug!(bytes = api_request.body.len(), "received");
            panic::catch_unwind(AssertUnwindSafe(|| route(&state, &api_request))).unwrap_or_else(|payload| {
                let detail = panic_message(payload.as_ref());
                handlers::failure(&AnalyzeError::Unexpected(format!("handler panicked: {detail}")))
            })
        }
        Err(err) => handlers::failure(&err),
    };

    let status = response.status;
    if let Err(e) = request.respond(response.into_http()) {
        tracing::warn!(error = %e, status, "failed to write response");
    } else {
        tracing::debug!(status, "responded");
    }
}

/// Reads headers and the body, refusing bodies over `max_bytes` both by
/// declared length and by bytes actually received.
fn read_request(
    request: &mut Request,
    method: Method,
    url: &str,
    client: String,
    max_bytes: u64,
) -> Result<ApiRequest, AnalyzeError> {
    if let Some(declared) = request.body_length() {
        if declared as u64 > max_bytes {
            return Err(AnalyzeError::PayloadTooLarge { limit: max_bytes, actual: declared as u64 });
        }
    }

    let content_type = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_owned());

    let mut body = Vec::new();
    request
        .as_reader()
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(|e| AnalyzeError::validation_with("Could not read request body", e.to_string()))?;
    if body.len() as u64 > max_bytes {
        return Err(AnalyzeError::PayloadTooLarge { limit: max_bytes, actual: body.len() as u64 });
    }

    let mut api_request = ApiRequest::new(method, url).with_client(client);
    api_request.content_type = content_type;
    api_request.body = body;
    Ok(api_request)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
