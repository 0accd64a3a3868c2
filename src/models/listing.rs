use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::validator::{unique, Validator};

/// Listing price in minor currency units.
///
/// Rendered on the wire as the string `"<amount> dallas"`; input accepts
/// either that string or a bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[sqlx(transparent)]
pub struct Price(pub i64);

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{} dallas", self.0))
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PriceVisitor;

        impl<'de> Visitor<'de> for PriceVisitor {
            type Value = Price;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("an integer or a string of the form \"<amount> dallas\"")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Price, E> {
                Ok(Price(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Price, E> {
                Ok(Price(v as i64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Price, E> {
                let amount = v
                    .strip_suffix(" dallas")
                    .and_then(|n| n.parse::<i64>().ok())
                    .ok_or_else(|| E::custom("invalid price format"))?;
                Ok(Price(amount))
            }
        }

        deserializer.deserialize_any(PriceVisitor)
    }
}

/// A catalog listing. `version` is the optimistic-concurrency token and
/// increments by exactly 1 on every successful update.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Listing {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub categories: Vec<String>,
    pub price: Price,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

/// Client-supplied fields for creating a listing.
#[derive(Debug, Deserialize)]
pub struct ListingInput {
    pub title: String,
    pub description: String,
    pub categories: Vec<String>,
    pub price: Price,
}

/// Sparse PATCH payload; absent fields leave the stored value unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct ListingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub categories: Option<Vec<String>>,
    pub price: Option<Price>,
}

impl ListingPatch {
    /// Merge this sparse payload onto a freshly-read entity, producing the
    /// fully-populated desired state handed to the conditional update.
    pub fn apply_to(self, listing: &mut Listing) {
        if let Some(title) = self.title {
            listing.title = title;
        }
        if let Some(description) = self.description {
            listing.description = description;
        }
        if let Some(categories) = self.categories {
            listing.categories = categories;
        }
        if let Some(price) = self.price {
            listing.price = price;
        }
    }
}

pub fn validate_listing(v: &mut Validator, listing: &Listing) {
    v.check(!listing.title.is_empty(), "title", "must be provided");
    v.check(
        listing.title.len() <= 500,
        "title",
        "must not be more than 500 bytes long",
    );

    v.check(!listing.description.is_empty(), "description", "must be provided");
    v.check(
        listing.description.len() <= 1000,
        "description",
        "must not be more than 1000 bytes long",
    );

    v.check(listing.price.0 > 0, "price", "must be provided");
    v.check(
        listing.price.0 <= 1_000_000,
        "price",
        "must be less than one million",
    );

    v.check(!listing.categories.is_empty(), "categories", "must contain at least 1 category");
    v.check(
        listing.categories.len() <= 5,
        "categories",
        "must not contain more than 5 categories",
    );
    v.check(
        unique(&listing.categories),
        "categories",
        "must not contain duplicate values",
    );
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Listing {
        Listing {
            id: 1,
            title: "Bike".to_string(),
            description: "Mint condition and all".to_string(),
            categories: vec!["fahrrad".to_string(), "freizeit".to_string()],
            price: Price(120_00),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn valid_listing_passes() {
        let mut v = Validator::new();
        validate_listing(&mut v, &sample());
        assert!(v.is_valid());
    }

    #[test]
    fn empty_title_and_description_fail_together() {
        let mut listing = sample();
        listing.title.clear();
        listing.description.clear();
        let mut v = Validator::new();
        validate_listing(&mut v, &listing);
        let errs = v.into_errors();
        assert!(errs.contains_key("title"));
        assert!(errs.contains_key("description"));
    }

    #[test]
    fn price_bounds_enforced() {
        for bad in [0, -5, 1_000_001] {
            let mut listing = sample();
            listing.price = Price(bad);
            let mut v = Validator::new();
            validate_listing(&mut v, &listing);
            assert!(!v.is_valid(), "price {} should fail", bad);
        }

        let mut listing = sample();
        listing.price = Price(1_000_000);
        let mut v = Validator::new();
        validate_listing(&mut v, &listing);
        assert!(v.is_valid());
    }

    #[test]
    fn category_set_rules() {
        let mut listing = sample();
        listing.categories.clear();
        let mut v = Validator::new();
        validate_listing(&mut v, &listing);
        assert!(!v.is_valid());

        let mut listing = sample();
        listing.categories = vec!["a".into(); 6];
        let mut v = Validator::new();
        validate_listing(&mut v, &listing);
        let errs = v.into_errors();
        assert!(errs.contains_key("categories"));

        let mut listing = sample();
        listing.categories = vec!["dup".into(), "dup".into()];
        let mut v = Validator::new();
        validate_listing(&mut v, &listing);
        assert_eq!(
            v.into_errors().get("categories").map(String::as_str),
            Some("must not contain duplicate values")
        );
    }

    #[test]
    fn price_serializes_as_dallas_string() {
        let json = serde_json::to_string(&Price(12000)).unwrap();
        assert_eq!(json, "\"12000 dallas\"");
    }

    #[test]
    fn price_deserializes_from_string_or_int() {
        let p: Price = serde_json::from_str("\"12000 dallas\"").unwrap();
        assert_eq!(p, Price(12000));
        let p: Price = serde_json::from_str("500").unwrap();
        assert_eq!(p, Price(500));
        assert!(serde_json::from_str::<Price>("\"12000 euros\"").is_err());
    }

    #[test]
    fn patch_merges_only_present_fields() {
        let mut listing = sample();
        let patch = ListingPatch {
            title: Some("Rennrad".to_string()),
            price: Some(Price(99_00)),
            ..Default::default()
        };
        patch.apply_to(&mut listing);
        assert_eq!(listing.title, "Rennrad");
        assert_eq!(listing.price, Price(99_00));
        assert_eq!(listing.description, "Mint condition and all");
        assert_eq!(listing.categories.len(), 2);
    }
}
