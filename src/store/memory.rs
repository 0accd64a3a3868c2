use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::errors::AppError;
use crate::filters::{calculate_metadata, Filters, Metadata};
use crate::models::listing::{Listing, ListingInput};
use crate::models::token::{hash_plaintext, Scope, Token};
use crate::models::user::User;

use super::CatalogStore;

#[derive(Clone)]
struct StoredToken {
    hash: String,
    user_id: i64,
    expiry: chrono::DateTime<Utc>,
    scope: Scope,
}

struct Inner {
    listings: HashMap<i64, Listing>,
    next_listing_id: i64,
    users: HashMap<i64, User>,
    next_user_id: i64,
    tokens: Vec<StoredToken>,
    permissions: HashMap<i64, Vec<String>>,
    permission_codes: Vec<String>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            listings: HashMap::new(),
            next_listing_id: 0,
            users: HashMap::new(),
            next_user_id: 0,
            tokens: Vec::new(),
            permissions: HashMap::new(),
            // Same catalog the schema seeds.
            permission_codes: vec!["listings:read".to_string(), "listings:write".to_string()],
        }
    }
}

/// Fully in-memory implementation of [`CatalogStore`] for tests.
///
/// Mirrors the production semantics: version-conditioned updates, window
/// counting in the list query, expiry enforced at token lookup. The title
/// filter is a case-insensitive whole-word match standing in for Postgres
/// full-text search.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn title_matches(query: &str, title: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let title = title.to_lowercase();
    let words: Vec<&str> = title.split_whitespace().collect();
    query
        .to_lowercase()
        .split_whitespace()
        .all(|q| words.contains(&q))
}

fn categories_match(wanted: &[String], have: &[String]) -> bool {
    wanted.iter().all(|c| have.contains(c))
}

#[async_trait]
impl CatalogStore for MemStore {
    // ── Listings ─────────────────────────────────────────────

    async fn insert_listing(&self, input: &ListingInput) -> Result<Listing, AppError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_listing_id += 1;
        let now = Utc::now();
        let listing = Listing {
            id: inner.next_listing_id,
            title: input.title.clone(),
            description: input.description.clone(),
            categories: input.categories.clone(),
            price: input.price,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        inner.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    async fn get_listing(&self, id: i64) -> Result<Listing, AppError> {
        if id < 1 {
            return Err(AppError::NotFound);
        }
        let inner = self.inner.lock().unwrap();
        inner.listings.get(&id).cloned().ok_or(AppError::NotFound)
    }

    async fn update_listing(&self, listing: &mut Listing) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.listings.get_mut(&listing.id) {
            // Deleted row and stale version are indistinguishable here too.
            Some(stored) if stored.version == listing.version => {
                stored.title = listing.title.clone();
                stored.description = listing.description.clone();
                stored.categories = listing.categories.clone();
                stored.price = listing.price;
                stored.version += 1;
                stored.updated_at = Utc::now();
                listing.version = stored.version;
                listing.updated_at = stored.updated_at;
                Ok(())
            }
            _ => Err(AppError::EditConflict),
        }
    }

    async fn delete_listing(&self, id: i64) -> Result<(), AppError> {
        if id < 1 {
            return Err(AppError::NotFound);
        }
        let mut inner = self.inner.lock().unwrap();
        inner.listings.remove(&id).map(|_| ()).ok_or(AppError::NotFound)
    }

    async fn list_listings(
        &self,
        title: &str,
        categories: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Listing>, Metadata), AppError> {
        let inner = self.inner.lock().unwrap();

        let mut matched: Vec<Listing> = inner
            .listings
            .values()
            .filter(|l| title_matches(title, &l.title))
            .filter(|l| categories_match(categories, &l.categories))
            .cloned()
            .collect();

        let column = filters.sort_column().to_string();
        let descending = filters.sort_direction() == "DESC";
        matched.sort_by(|a, b| {
            let ord = match column.as_str() {
                "title" => a.title.cmp(&b.title),
                "price" => a.price.cmp(&b.price),
                _ => a.id.cmp(&b.id),
            };
            let ord = if descending { ord.reverse() } else { ord };
            // stable tiebreak: id descending
            ord.then(b.id.cmp(&a.id))
        });

        let total = matched.len() as i64;
        let metadata = calculate_metadata(total, filters.page, filters.page_size);
        let page: Vec<Listing> = matched
            .into_iter()
            .skip(filters.offset() as usize)
            .take(filters.limit() as usize)
            .collect();

        Ok((page, metadata))
    }

    // ── Users ────────────────────────────────────────────────

    async fn insert_user(&self, user: &mut User) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.values().any(|u| u.email == user.email) {
            let mut errors = HashMap::new();
            errors.insert(
                "email".to_string(),
                "a user with this email address already exists".to_string(),
            );
            return Err(AppError::ValidationFailed(errors));
        }
        inner.next_user_id += 1;
        user.id = inner.next_user_id;
        user.created_at = Utc::now();
        user.version = 1;
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, AppError> {
        let inner = self.inner.lock().unwrap();
        inner
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn update_user(&self, user: &mut User) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.users.get_mut(&user.id) {
            Some(stored) if stored.version == user.version => {
                stored.name = user.name.clone();
                stored.email = user.email.clone();
                stored.password_hash = user.password_hash.clone();
                stored.activated = user.activated;
                stored.version += 1;
                user.version = stored.version;
                Ok(())
            }
            _ => Err(AppError::EditConflict),
        }
    }

    // ── Tokens ───────────────────────────────────────────────

    async fn insert_token(&self, token: &Token) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        inner.tokens.push(StoredToken {
            hash: token.hash.clone(),
            user_id: token.user_id,
            expiry: token.expiry,
            scope: token.scope,
        });
        Ok(())
    }

    async fn delete_tokens_for_user(&self, scope: Scope, user_id: i64) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .tokens
            .retain(|t| !(t.scope == scope && t.user_id == user_id));
        Ok(())
    }

    async fn user_for_token(&self, scope: Scope, plaintext: &str) -> Result<User, AppError> {
        let hash = hash_plaintext(plaintext);
        let inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let user_id = inner
            .tokens
            .iter()
            .find(|t| t.hash == hash && t.scope == scope && t.expiry > now)
            .map(|t| t.user_id)
            .ok_or(AppError::NotFound)?;
        inner.users.get(&user_id).cloned().ok_or(AppError::NotFound)
    }

    // ── Permissions ──────────────────────────────────────────

    async fn permissions_for_user(&self, user_id: i64) -> Result<Vec<String>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.permissions.get(&user_id).cloned().unwrap_or_default())
    }

    async fn grant_permissions(&self, user_id: i64, scopes: &[&str]) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();

        let unknown: Vec<&str> = scopes
            .iter()
            .filter(|s| !inner.permission_codes.iter().any(|c| c == *s))
            .copied()
            .collect();
        if !unknown.is_empty() {
            return Err(AppError::BadRequest(format!(
                "unknown permission codes: {}",
                unknown.join(", ")
            )));
        }

        let granted = inner.permissions.entry(user_id).or_default();
        for scope in scopes {
            if !granted.iter().any(|g| g == scope) {
                granted.push(scope.to_string());
            }
        }
        Ok(())
    }
}
