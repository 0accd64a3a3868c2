use async_trait::async_trait;

use crate::errors::AppError;
use crate::filters::{Filters, Metadata};
use crate::models::listing::{Listing, ListingInput};
use crate::models::token::{Scope, Token};
use crate::models::user::User;

pub mod memory;
pub mod postgres;

/// Capability set over the catalog's durable state.
///
/// One production implementation (`PgStore`) and one fully in-memory fake
/// (`MemStore`) used by the test suite; handlers only ever see this trait.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    // ── Listings ─────────────────────────────────────────────

    /// Insert a validated listing. The store assigns `id`, timestamps and
    /// `version = 1` and returns the populated entity.
    async fn insert_listing(&self, input: &ListingInput) -> Result<Listing, AppError>;

    /// `NotFound` when `id < 1` or no row matches.
    async fn get_listing(&self, id: i64) -> Result<Listing, AppError>;

    /// Conditional write matching `id AND version`. On success the entity's
    /// version is bumped and `updated_at` refreshed in place. Zero matched
    /// rows means the row was deleted or the version is stale; both surface
    /// as `EditConflict`, never `NotFound`.
    async fn update_listing(&self, listing: &mut Listing) -> Result<(), AppError>;

    /// `NotFound` when `id < 1` or zero rows were affected.
    async fn delete_listing(&self, id: i64) -> Result<(), AppError>;

    /// Filtered, sorted, paginated listing query. The total match count is
    /// computed in the same pass as the rows. Returns an empty vec (never a
    /// missing collection) when nothing matches.
    async fn list_listings(
        &self,
        title: &str,
        categories: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Listing>, Metadata), AppError>;

    // ── Users ────────────────────────────────────────────────

    /// Assigns `id`, `created_at` and `version = 1`. A duplicate email
    /// surfaces as a field-level validation failure.
    async fn insert_user(&self, user: &mut User) -> Result<(), AppError>;

    async fn get_user_by_email(&self, email: &str) -> Result<User, AppError>;

    /// Version-conditional update, same contract as `update_listing`.
    async fn update_user(&self, user: &mut User) -> Result<(), AppError>;

    // ── Tokens ───────────────────────────────────────────────

    async fn insert_token(&self, token: &Token) -> Result<(), AppError>;

    /// Delete every token of `scope` for `user_id`; tokens of other scopes
    /// are untouched.
    async fn delete_tokens_for_user(&self, scope: Scope, user_id: i64) -> Result<(), AppError>;

    /// Hash the presented plaintext and resolve it to its user, requiring
    /// `expiry > now`. An expired-but-present row is `NotFound`.
    async fn user_for_token(&self, scope: Scope, plaintext: &str) -> Result<User, AppError>;

    // ── Permissions ──────────────────────────────────────────

    async fn permissions_for_user(&self, user_id: i64) -> Result<Vec<String>, AppError>;

    /// Grant permission codes to a user. Re-granting an already-held code is
    /// a no-op; a code absent from the permissions catalog is an error, never
    /// a silent skip.
    async fn grant_permissions(&self, user_id: i64, scopes: &[&str]) -> Result<(), AppError>;
}

/// Fixed per-call deadline for anything that touches durable state.
pub(crate) const STORE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);

/// Bound a store operation by [`STORE_TIMEOUT`]; on expiry the in-flight
/// future is dropped and the caller sees `Timeout`.
pub(crate) async fn with_deadline<T, F>(fut: F) -> Result<T, AppError>
where
    F: std::future::Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(STORE_TIMEOUT, fut).await {
        Ok(res) => res,
        Err(_) => Err(AppError::Timeout),
    }
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_call_surfaces_timeout() {
        let result: Result<(), AppError> = with_deadline(async {
            tokio::time::sleep(STORE_TIMEOUT * 2).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(AppError::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn call_just_under_the_deadline_completes() {
        let result = with_deadline(async {
            tokio::time::sleep(STORE_TIMEOUT - std::time::Duration::from_millis(1)).await;
            Ok(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn immediate_result_passes_through() {
        let ok = with_deadline(async { Ok("done") }).await;
        assert_eq!(ok.unwrap(), "done");

        let err: Result<(), AppError> = with_deadline(async { Err(AppError::NotFound) }).await;
        assert!(matches!(err, Err(AppError::NotFound)));
    }
}
