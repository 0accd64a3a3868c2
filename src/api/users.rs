use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::errors::AppError;
use crate::models::token::{validate_token_plaintext, Scope, Token};
use crate::models::user::{
    hash_password, validate_password_plaintext, validate_user, User,
};
use crate::validator::Validator;
use crate::AppState;

pub(crate) const ACTIVATION_TTL_DAYS: i64 = 3;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub token: String,
}

/// POST /v1/users — register a new (inactive) account.
///
/// Grants `listings:read` and issues a 3-day activation token. There is no
/// mail transport here; the token rides back in the response envelope.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut user = User {
        id: 0,
        created_at: Utc::now(),
        name: req.name,
        email: req.email,
        password_hash: String::new(),
        activated: false,
        version: 0,
    };

    let mut v = Validator::new();
    validate_user(&mut v, &user);
    validate_password_plaintext(&mut v, &req.password);
    if !v.is_valid() {
        return Err(AppError::from_validator(v));
    }

    user.password_hash = hash_password(&req.password)?;

    state.store.insert_user(&mut user).await?;
    state
        .store
        .grant_permissions(user.id, &["listings:read"])
        .await?;

    let token = Token::new(user.id, Duration::days(ACTIVATION_TTL_DAYS), Scope::Activation)?;
    state.store.insert_token(&token).await?;

    tracing::debug!(user = user.id, "issued activation token");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "user": user, "activation_token": token })),
    ))
}

/// PUT /v1/users/activated — redeem an activation token.
pub async fn activate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActivateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &req.token);
    if !v.is_valid() {
        return Err(AppError::from_validator(v));
    }

    let mut user = state
        .store
        .user_for_token(Scope::Activation, &req.token)
        .await
        .map_err(|e| match e {
            AppError::NotFound => {
                let mut errors = std::collections::HashMap::new();
                errors.insert(
                    "token".to_string(),
                    "invalid or expired activation token".to_string(),
                );
                AppError::ValidationFailed(errors)
            }
            other => other,
        })?;

    user.activated = true;
    // Version-conditional like any other update; a concurrent activation of
    // the same account loses with an edit conflict.
    state.store.update_user(&mut user).await?;

    state
        .store
        .delete_tokens_for_user(Scope::Activation, user.id)
        .await?;

    Ok(Json(json!({ "user": user })))
}
