//! # Pharma API
//!
//! REST server for the pharmacy commerce backend.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           API Server                                    │
//! │                                                                         │
//! │  Client ──► NormalizePath ──► TraceLayer ──► Router ──► Repositories   │
//! │                (trailing /)      (spans)       │            │           │
//! │                                                ▼            ▼           │
//! │                                     User / Principal     SQLite (WAL)   │
//! │                                     (bearer JWT)             ▲          │
//! │                                                              │          │
//! │                                     Sweeper (tokio interval)─┘          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;
pub mod sweeper;

use std::sync::Arc;

use axum::Router;
use tower::Layer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;

pub use auth::{JwtManager, Principal, User};
pub use config::{ApiConfig, ConfigError, LogFormat};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use state::AppState;

/// The router with tracing and state attached.
pub fn build_router(state: Arc<AppState>) -> Router {
    routes::router()
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The complete service: `/products/` and `/products` route the same.
pub fn build_app(state: Arc<AppState>) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(build_router(state))
}

async fn not_found() -> ApiError {
    ApiError::not_found("No such route")
}
