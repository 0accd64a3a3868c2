use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::errors::AppError;
use crate::filters::{calculate_metadata, Filters, Metadata};
use crate::models::listing::{Listing, ListingInput};
use crate::models::token::{hash_plaintext, Scope, Token};
use crate::models::user::User;

use super::{with_deadline, CatalogStore};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Postgres unique-violation code, used to map duplicate emails onto a
/// field-level validation failure instead of an opaque 500.
const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

#[async_trait]
impl CatalogStore for PgStore {
    // ── Listings ─────────────────────────────────────────────

    async fn insert_listing(&self, input: &ListingInput) -> Result<Listing, AppError> {
        with_deadline(async {
            let listing = sqlx::query_as::<_, Listing>(
                r#"INSERT INTO listings (title, description, price, categories)
                   VALUES ($1, $2, $3, $4)
                   RETURNING id, title, description, categories, price, created_at, updated_at, version"#,
            )
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.price)
            .bind(&input.categories)
            .fetch_one(&self.pool)
            .await?;
            Ok(listing)
        })
        .await
    }

    async fn get_listing(&self, id: i64) -> Result<Listing, AppError> {
        if id < 1 {
            return Err(AppError::NotFound);
        }

        with_deadline(async {
            let listing = sqlx::query_as::<_, Listing>(
                r#"SELECT id, title, description, categories, price, created_at, updated_at, version
                   FROM listings
                   WHERE id = $1"#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound)?;
            Ok(listing)
        })
        .await
    }

    async fn update_listing(&self, listing: &mut Listing) -> Result<(), AppError> {
        with_deadline(async {
            // Compare-and-swap on the version the caller last observed.
            // Zero rows matched cannot distinguish "deleted" from "stale
            // version", so both are an edit conflict.
            let row = sqlx::query_as::<_, (i32, chrono::DateTime<Utc>)>(
                r#"UPDATE listings
                   SET title = $1, description = $2, price = $3, categories = $4,
                       version = version + 1, updated_at = now()
                   WHERE id = $5 AND version = $6
                   RETURNING version, updated_at"#,
            )
            .bind(&listing.title)
            .bind(&listing.description)
            .bind(listing.price)
            .bind(&listing.categories)
            .bind(listing.id)
            .bind(listing.version)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::EditConflict)?;

            listing.version = row.0;
            listing.updated_at = row.1;
            Ok(())
        })
        .await
    }

    async fn delete_listing(&self, id: i64) -> Result<(), AppError> {
        if id < 1 {
            return Err(AppError::NotFound);
        }

        with_deadline(async {
            let result = sqlx::query("DELETE FROM listings WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(AppError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn list_listings(
        &self,
        title: &str,
        categories: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Listing>, Metadata), AppError> {
        // Sort column and direction are interpolated, never bound: both come
        // from the safelist, which `Filters::validate` has already enforced.
        // `id DESC` is appended as a stable tiebreaker so equal-rank rows
        // keep a deterministic order across pages. The window count rides
        // along with the rows to avoid a second round trip.
        let query = format!(
            r#"SELECT count(*) OVER() AS total_records,
                      id, title, description, categories, price, created_at, updated_at, version
               FROM listings
               WHERE (to_tsvector('german', title) @@ plainto_tsquery('german', $1) OR $1 = '')
               AND (categories @> $2 OR $2 = '{{}}')
               ORDER BY {} {}, id DESC
               LIMIT $3 OFFSET $4"#,
            filters.sort_column(),
            filters.sort_direction(),
        );

        with_deadline(async {
            let rows = sqlx::query_as::<_, ListingRow>(&query)
                .bind(title)
                .bind(categories)
                .bind(filters.limit())
                .bind(filters.offset())
                .fetch_all(&self.pool)
                .await?;

            let total_records = rows.first().map_or(0, |r| r.total_records);
            let metadata = calculate_metadata(total_records, filters.page, filters.page_size);
            let listings = rows.into_iter().map(ListingRow::into_listing).collect();
            Ok((listings, metadata))
        })
        .await
    }

    // ── Users ────────────────────────────────────────────────

    async fn insert_user(&self, user: &mut User) -> Result<(), AppError> {
        with_deadline(async {
            let row = sqlx::query_as::<_, (i64, chrono::DateTime<Utc>, i32)>(
                r#"INSERT INTO users (name, email, password_hash, activated)
                   VALUES ($1, $2, $3, $4)
                   RETURNING id, created_at, version"#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.activated)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    let mut errors = std::collections::HashMap::new();
                    errors.insert(
                        "email".to_string(),
                        "a user with this email address already exists".to_string(),
                    );
                    AppError::ValidationFailed(errors)
                } else {
                    AppError::Database(e)
                }
            })?;

            user.id = row.0;
            user.created_at = row.1;
            user.version = row.2;
            Ok(())
        })
        .await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, AppError> {
        with_deadline(async {
            let user = sqlx::query_as::<_, User>(
                r#"SELECT id, created_at, name, email, password_hash, activated, version
                   FROM users
                   WHERE email = $1"#,
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound)?;
            Ok(user)
        })
        .await
    }

    async fn update_user(&self, user: &mut User) -> Result<(), AppError> {
        with_deadline(async {
            let version = sqlx::query_scalar::<_, i32>(
                r#"UPDATE users
                   SET name = $1, email = $2, password_hash = $3, activated = $4,
                       version = version + 1
                   WHERE id = $5 AND version = $6
                   RETURNING version"#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.activated)
            .bind(user.id)
            .bind(user.version)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::EditConflict)?;

            user.version = version;
            Ok(())
        })
        .await
    }

    // ── Tokens ───────────────────────────────────────────────

    async fn insert_token(&self, token: &Token) -> Result<(), AppError> {
        with_deadline(async {
            sqlx::query(
                r#"INSERT INTO tokens (hash, user_id, expiry, scope)
                   VALUES ($1, $2, $3, $4)"#,
            )
            .bind(&token.hash)
            .bind(token.user_id)
            .bind(token.expiry)
            .bind(token.scope.as_str())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn delete_tokens_for_user(&self, scope: Scope, user_id: i64) -> Result<(), AppError> {
        with_deadline(async {
            sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
                .bind(scope.as_str())
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn user_for_token(&self, scope: Scope, plaintext: &str) -> Result<User, AppError> {
        let hash = hash_plaintext(plaintext);

        with_deadline(async {
            // Expiry is enforced here, at lookup time; a row that has
            // expired but not yet been deleted is functionally invalid.
            let user = sqlx::query_as::<_, User>(
                r#"SELECT u.id, u.created_at, u.name, u.email, u.password_hash, u.activated, u.version
                   FROM users u
                   INNER JOIN tokens t ON t.user_id = u.id
                   WHERE t.hash = $1 AND t.scope = $2 AND t.expiry > $3"#,
            )
            .bind(&hash)
            .bind(scope.as_str())
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound)?;
            Ok(user)
        })
        .await
    }

    // ── Permissions ──────────────────────────────────────────

    async fn permissions_for_user(&self, user_id: i64) -> Result<Vec<String>, AppError> {
        with_deadline(async {
            let codes = sqlx::query_scalar::<_, String>(
                r#"SELECT p.code
                   FROM permissions p
                   INNER JOIN users_permissions up ON up.permission_id = p.id
                   WHERE up.user_id = $1"#,
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(codes)
        })
        .await
    }

    async fn grant_permissions(&self, user_id: i64, scopes: &[&str]) -> Result<(), AppError> {
        let scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
        with_deadline(async {
            // Resolve the codes first so a typo surfaces as an error instead
            // of a silent no-op insert.
            let known = sqlx::query_scalar::<_, String>(
                "SELECT code FROM permissions WHERE code = ANY($1)",
            )
            .bind(&scopes)
            .fetch_all(&self.pool)
            .await?;

            let unknown: Vec<&str> = scopes
                .iter()
                .filter(|s| !known.contains(s))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                return Err(AppError::BadRequest(format!(
                    "unknown permission codes: {}",
                    unknown.join(", ")
                )));
            }

            sqlx::query(
                r#"INSERT INTO users_permissions (user_id, permission_id)
                   SELECT $1, p.id FROM permissions p WHERE p.code = ANY($2)
                   ON CONFLICT DO NOTHING"#,
            )
            .bind(user_id)
            .bind(&scopes)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }
}

/// Listing row extended with the window count from `count(*) OVER()`.
#[derive(sqlx::FromRow)]
struct ListingRow {
    total_records: i64,
    id: i64,
    title: String,
    description: String,
    categories: Vec<String>,
    price: crate::models::listing::Price,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
    version: i32,
}

impl ListingRow {
    fn into_listing(self) -> Listing {
        Listing {
            id: self.id,
            title: self.title,
            description: self.description,
            categories: self.categories,
            price: self.price,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }
}
