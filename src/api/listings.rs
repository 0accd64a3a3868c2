use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::errors::AppError;
use crate::filters::Filters;
use crate::middleware::auth::{require_permission, Identity};
use crate::models::listing::{validate_listing, Listing, ListingInput, ListingPatch};
use crate::validator::Validator;
use crate::AppState;

/// Precondition header carrying the version the client last observed,
/// rendered as a decimal string.
pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

fn sort_safelist() -> Vec<&'static str> {
    vec!["id", "title", "price", "-id", "-title", "-price"]
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub title: Option<String>,
    /// Comma-separated category names; matches listings whose category set
    /// contains all of them.
    pub categories: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub sort: Option<String>,
}

/// GET /v1/listings
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let title = params.title.unwrap_or_default();
    let categories: Vec<String> = params
        .categories
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let filters = Filters {
        page: params.page.unwrap_or(1),
        page_size: params.page_size.unwrap_or(20),
        sort: params.sort.unwrap_or_else(|| "id".to_string()),
        sort_safelist: sort_safelist(),
    };

    let mut v = Validator::new();
    filters.validate(&mut v);
    if !v.is_valid() {
        return Err(AppError::from_validator(v));
    }

    let (listings, metadata) = state
        .store
        .list_listings(&title, &categories, &filters)
        .await?;

    Ok(Json(json!({ "listings": listings, "metadata": metadata })))
}

/// POST /v1/listings — requires `listings:write`.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(input): Json<ListingInput>,
) -> Result<impl IntoResponse, AppError> {
    require_permission(&state, &identity, "listings:write").await?;

    validate_input(&input)?;

    let listing = state.store.insert_listing(&input).await?;

    let location = format!("/v1/listings/{}", listing.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({ "listing": listing })),
    ))
}

/// GET /v1/listings/:id — requires `listings:read`.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    require_permission(&state, &identity, "listings:read").await?;

    let listing = state.store.get_listing(id).await?;
    Ok(Json(json!({ "listing": listing })))
}

/// PATCH /v1/listings/:id — requires `listings:write`.
///
/// Sparse body: absent fields keep their stored value. When the client sends
/// `X-Expected-Version` it is compared against the stored version before any
/// field-level change is applied; the conditional write then re-checks the
/// version on its own.
pub async fn patch(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(patch): Json<ListingPatch>,
) -> Result<impl IntoResponse, AppError> {
    require_permission(&state, &identity, "listings:write").await?;

    let mut listing = state.store.get_listing(id).await?;

    if let Some(expected) = headers.get(EXPECTED_VERSION_HEADER) {
        let expected = expected
            .to_str()
            .map_err(|_| AppError::BadRequest("invalid X-Expected-Version header".to_string()))?;
        if expected != listing.version.to_string() {
            return Err(AppError::EditConflict);
        }
    }

    patch.apply_to(&mut listing);

    let mut v = Validator::new();
    validate_listing(&mut v, &listing);
    if !v.is_valid() {
        return Err(AppError::from_validator(v));
    }

    state.store.update_listing(&mut listing).await?;
    Ok(Json(json!({ "listing": listing })))
}

/// DELETE /v1/listings/:id — requires `listings:write`.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    require_permission(&state, &identity, "listings:write").await?;

    state.store.delete_listing(id).await?;
    Ok(Json(json!({ "message": "listing successfully deleted" })))
}

fn validate_input(input: &ListingInput) -> Result<(), AppError> {
    // Validation runs against the fully-populated shape; server-assigned
    // fields are stand-ins here.
    let now = Utc::now();
    let candidate = Listing {
        id: 0,
        title: input.title.clone(),
        description: input.description.clone(),
        categories: input.categories.clone(),
        price: input.price,
        created_at: now,
        updated_at: now,
        version: 0,
    };

    let mut v = Validator::new();
    validate_listing(&mut v, &candidate);
    if !v.is_valid() {
        return Err(AppError::from_validator(v));
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::listing::Price;

    #[test]
    fn invalid_input_is_rejected_before_the_store() {
        let input = ListingInput {
            title: String::new(),
            description: "ok".to_string(),
            categories: vec!["a".to_string()],
            price: Price(100),
        };
        match validate_input(&input) {
            Err(AppError::ValidationFailed(errors)) => {
                assert!(errors.contains_key("title"));
            }
            other => panic!("expected ValidationFailed, got {:?}", other),
        }
    }
}
