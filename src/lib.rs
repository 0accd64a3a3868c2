//! Listings catalog API.
//!
//! A networked catalog of versioned, mutable listings with optimistic
//! concurrency control, a safelisted query/pagination engine, scoped
//! access-token authentication and per-client rate limiting.

use std::sync::Arc;

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod store;
pub mod validator;

use middleware::rate_limit::RateLimiter;
use store::CatalogStore;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub store: Arc<dyn CatalogStore>,
    pub limiter: Arc<RateLimiter>,
    pub config: config::Config,
}
