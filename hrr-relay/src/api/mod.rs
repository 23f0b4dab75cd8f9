//! HTTP API
//!
//! Axum router serving the listener stream, queue control and status routes.

pub mod handlers;
pub mod server;
pub mod sse;
pub mod stream;

pub use server::{create_router, run, AppContext};
