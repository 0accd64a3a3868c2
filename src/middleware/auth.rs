use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::errors::AppError;
use crate::models::token::{validate_token_plaintext, Scope};
use crate::models::user::User;
use crate::validator::Validator;
use crate::AppState;

/// Who is making the request. An absent credential is a first-class
/// anonymous identity, distinct from a malformed or unverifiable one (which
/// fails the request outright).
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    User(User),
}

impl Identity {
    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::User(u) => Some(u),
        }
    }
}

/// Resolve the bearer credential (if any) to an [`Identity`] and stash it in
/// the request extensions. Runs on every route after the rate limiter.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = match req.headers().get(AUTHORIZATION) {
        None => Identity::Anonymous,
        Some(header) => {
            let header = header.to_str().map_err(|_| AppError::InvalidCredentials)?;
            let plaintext = header
                .strip_prefix("Bearer ")
                .ok_or(AppError::InvalidCredentials)?;

            let mut v = Validator::new();
            validate_token_plaintext(&mut v, plaintext);
            if !v.is_valid() {
                return Err(AppError::InvalidCredentials);
            }

            let user = state
                .store
                .user_for_token(Scope::Authentication, plaintext)
                .await
                .map_err(|e| match e {
                    // Unknown or expired token: never degrade to anonymous.
                    AppError::NotFound => AppError::InvalidCredentials,
                    other => other,
                })?;

            Identity::User(user)
        }
    };

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Gate a handler on a permission code such as `listings:write`.
///
/// Anonymous callers get a 401; authenticated callers whose account is not
/// activated or whose permission set lacks `scope` get a 403.
pub async fn require_permission(
    state: &AppState,
    identity: &Identity,
    scope: &str,
) -> Result<User, AppError> {
    let user = identity.user().ok_or(AppError::InvalidCredentials)?;

    if !user.activated {
        return Err(AppError::Forbidden);
    }

    let permissions = state.store.permissions_for_user(user.id).await?;
    if !permissions.iter().any(|p| p == scope) {
        tracing::warn!(user = user.id, scope, "permission denied");
        return Err(AppError::Forbidden);
    }

    Ok(user.clone())
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_identity_has_no_user() {
        assert!(Identity::Anonymous.user().is_none());
    }

    #[test]
    fn user_identity_exposes_the_user() {
        let user = User {
            id: 42,
            created_at: chrono::Utc::now(),
            name: "Alice".into(),
            email: "alice@example.com".into(),
            password_hash: String::new(),
            activated: true,
            version: 1,
        };
        let identity = Identity::User(user);
        assert_eq!(identity.user().map(|u| u.id), Some(42));
    }
}
