//! HTTP boundary
//!
//! Exposes the transfer registry as a JSON API and optionally serves the web UI.

pub mod handlers;
pub mod response;
pub mod server;

pub use response::{ApiError, ErrorBody};
pub use server::{create_router, start_http_server};
