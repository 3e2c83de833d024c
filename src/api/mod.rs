//! API Module
//!
//! HTTP transport that lets peers fetch the keys this node owns.
//!
//! # Endpoints
//! - `GET <base_path>/<namespace>/<key>` - Raw value bytes
//! - `GET /stats` - Per-namespace statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
