use std::sync::Arc;

use tiny_http::Server;

use super::routes;
use super::state::AppState;

/// Accept loop. Each request is dispatched on its own thread so a slow
/// inference does not stall health checks or other clients.
///
/// Returns when the server is unblocked or its listener closes.
pub fn serve(server: Server, state: Arc<AppState>) {
    for request in server.incoming_requests() {
        let state = Arc::clone(&state);
        let spawned = std::thread::Builder::new()
            .name("request".into())
            .spawn(move || routes::dispatch(request, state));
        if let Err(e) = spawned {
            tracing::error!(error = %e, "failed to spawn request thread");
        }
    }
    tracing::info!("server stopped accepting requests");
}
