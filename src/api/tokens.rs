use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;

use crate::api::users::ACTIVATION_TTL_DAYS;
use crate::errors::AppError;
use crate::models::token::{Scope, Token};
use crate::models::user::{validate_email, validate_password_plaintext, verify_password};
use crate::validator::Validator;
use crate::AppState;

const AUTHENTICATION_TTL_HOURS: i64 = 24;

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivationTokenRequest {
    pub email: String,
}

/// POST /v1/tokens/authentication — exchange email+password for a 24h token.
///
/// A wrong email and a wrong password produce the same 401; the distinction
/// is not leaked.
pub async fn create_authentication_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut v = Validator::new();
    validate_email(&mut v, &req.email);
    validate_password_plaintext(&mut v, &req.password);
    if !v.is_valid() {
        return Err(AppError::from_validator(v));
    }

    let user = state
        .store
        .get_user_by_email(&req.email)
        .await
        .map_err(|e| match e {
            AppError::NotFound => AppError::InvalidCredentials,
            other => other,
        })?;

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(AppError::InvalidCredentials);
    }

    let token = Token::new(
        user.id,
        Duration::hours(AUTHENTICATION_TTL_HOURS),
        Scope::Authentication,
    )?;
    state.store.insert_token(&token).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "authentication_token": token })),
    ))
}

/// POST /v1/tokens/activation — re-issue an activation token.
///
/// Lets a user whose original activation token expired request a fresh one.
/// Already-activated accounts are refused with a field-level error, matching
/// the activation handler's error shape.
pub async fn create_activation_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActivationTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut v = Validator::new();
    validate_email(&mut v, &req.email);
    if !v.is_valid() {
        return Err(AppError::from_validator(v));
    }

    let user = state
        .store
        .get_user_by_email(&req.email)
        .await
        .map_err(|e| match e {
            AppError::NotFound => field_error("email", "no matching email address found"),
            other => other,
        })?;

    if user.activated {
        return Err(field_error("email", "user has already been activated"));
    }

    let token = Token::new(user.id, Duration::days(ACTIVATION_TTL_DAYS), Scope::Activation)?;
    state.store.insert_token(&token).await?;

    tracing::debug!(user = user.id, "re-issued activation token");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "activation_token": token })),
    ))
}

fn field_error(field: &str, message: &str) -> AppError {
    let mut errors = std::collections::HashMap::new();
    errors.insert(field.to_string(), message.to_string());
    AppError::ValidationFailed(errors)
}
