//! HTTP surface: shortening API, lookups and redirects.

mod body;
mod server;
mod service;

pub use body::{ErrorBody, HealthResponse, ResolveResponse, ShortenRequest, ShortenResponse};
pub use server::TinyUrlServer;
pub use service::{configure, AppState};
