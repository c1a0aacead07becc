//! Streamgate Server - HTTP surface of the streaming gateway
//!
//! This crate provides:
//! - `POST /stream` relaying normalized provider events as SSE frames
//! - `GET /health`
//! - Bearer-token authentication and request logging middleware

pub mod api;
pub mod middleware;
pub mod state;

pub use api::create_router;
pub use state::AppState;
