//! HTTP surface: routing, handlers, client address resolution and CORS.

mod client_ip;
mod cors;
mod handlers;
mod server;

pub use client_ip::resolve_client_ip;
pub use cors::cors_layer;
pub use handlers::{liveness, panic_response, validate, AppState, LivenessResponse};
pub use server::{router, HttpServer, VALIDATE_PATH};
