use std::sync::Arc;

use axum::extract::State;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::middleware::{auth, rate_limit};
use crate::AppState;

pub mod listings;
pub mod tokens;
pub mod users;

/// Build the application router.
///
/// Every request passes the rate limiter first, then bearer authentication;
/// per-scope permission checks happen inside the handlers that need them.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/healthcheck", get(healthcheck))
        .route(
            "/v1/listings",
            get(listings::list).post(listings::create),
        )
        .route(
            "/v1/listings/:id",
            get(listings::get)
                .patch(listings::patch)
                .delete(listings::delete),
        )
        .route("/v1/users", post(users::register))
        .route("/v1/users/activated", put(users::activate))
        .route(
            "/v1/tokens/activation",
            post(tokens::create_activation_token),
        )
        .route(
            "/v1/tokens/authentication",
            post(tokens::create_authentication_token),
        )
        // Layer order matters: the last layer added runs first, so the
        // limiter is the outermost gate, ahead of identity resolution.
        .layer(middleware::from_fn_with_state(state.clone(), auth::authenticate))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::rate_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /v1/healthcheck
async fn healthcheck(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.config.env,
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}
