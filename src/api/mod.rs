//! HTTP surface: request parsing, routing, handlers and the accept loop.

pub mod handlers;
pub mod multipart;
pub mod request;
pub mod response;
pub mod routes;
pub mod server;
pub mod state;

pub use request::{ApiRequest, UploadedFile};
pub use response::ApiResponse;
pub use routes::{dispatch, route};
pub use server::serve;
pub use state::{AppState, SharedState};
