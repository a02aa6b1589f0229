pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod middleware;
pub mod services;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ApiConfig;
use crate::middleware::jwt_auth_middleware;
use crate::services::UnarchiveService;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<UnarchiveService>,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(service: UnarchiveService, jwt_secret: &str) -> Self {
        Self {
            service: Arc::new(service),
            jwt_secret: Arc::from(jwt_secret),
        }
    }
}

pub fn app(state: AppState, api: &ApiConfig) -> Router {
    let router = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(handlers::health))
        // Protected
        .merge(catalog_routes(state.clone()))
        // Global middleware
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(api.max_request_size_bytes)),
        );

    let router = if api.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };

    router.with_state(state)
}

fn catalog_routes(state: AppState) -> Router<AppState> {
    use handlers::catalog;

    Router::new()
        .route("/api/catalog/unarchive", post(catalog::unarchive_products))
        .route_layer(axum::middleware::from_fn_with_state(state, jwt_auth_middleware))
}

async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Catalog API",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "health": "/health (public)",
                "unarchive": "POST /api/catalog/unarchive (protected)"
            }
        }
    }))
}
