//! HTTP read surface over the activity log.

pub mod api;
pub mod config;

use axum::{http::Method, routing::get, Extension, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use threadlog_activity::FeedSettings;
use threadlog_db::DbPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Feed page sizing.
    pub feed: FeedSettings,
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/activities", get(api::list_activities_handler))
        .route("/api/activities/{id}", get(api::get_activity_handler))
        .route("/api/activities/{id}/push", get(api::get_push_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET])
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
