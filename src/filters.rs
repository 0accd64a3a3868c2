use serde::{Deserialize, Serialize};

use crate::validator::Validator;

/// Parsed list-query parameters plus the safelist of sortable columns.
///
/// `sort` may carry a leading `-` for descending order; the stripped name
/// must appear in `sort_safelist` or validation fails before any SQL is
/// built.
#[derive(Debug, Clone)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: Vec<&'static str>,
}

impl Filters {
    pub fn validate(&self, v: &mut Validator) {
        v.check(self.page > 0, "page", "must be greater than zero");
        v.check(self.page <= 10_000_000, "page", "must be a maximum of 10 million");
        v.check(self.page_size > 0, "page_size", "must be greater than zero");
        v.check(self.page_size <= 100, "page_size", "must be a maximum of 100");
        v.check(
            self.sort_safelist.contains(&self.sort.as_str()),
            "sort",
            "invalid sort value",
        );
    }

    /// Column name with any direction marker stripped.
    ///
    /// Panics if the sort value is not safelisted; `validate` must have run
    /// first, so an unvalidated value never reaches the query builder.
    pub fn sort_column(&self) -> &str {
        for safe in &self.sort_safelist {
            if self.sort == *safe {
                return self.sort.trim_start_matches('-');
            }
        }
        panic!("unsafe sort parameter: {}", self.sort);
    }

    pub fn sort_direction(&self) -> &'static str {
        if self.sort.starts_with('-') {
            "DESC"
        } else {
            "ASC"
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

/// Pagination metadata derived from a total row count; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

/// Pure function of `(total_records, page, page_size)`.
/// All-zero when nothing matched.
pub fn calculate_metadata(total_records: i64, page: i64, page_size: i64) -> Metadata {
    if total_records == 0 {
        return Metadata::default();
    }
    Metadata {
        current_page: page,
        page_size,
        first_page: 1,
        last_page: (total_records + page_size - 1) / page_size,
        total_records,
    }
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(page: i64, page_size: i64, sort: &str) -> Filters {
        Filters {
            page,
            page_size,
            sort: sort.to_string(),
            sort_safelist: vec!["id", "title", "price", "-id", "-title", "-price"],
        }
    }

    #[test]
    fn metadata_empty_result_is_all_zero() {
        assert_eq!(calculate_metadata(0, 2, 20), Metadata::default());
    }

    #[test]
    fn metadata_rounds_last_page_up() {
        let m = calculate_metadata(51, 2, 20);
        assert_eq!(m.current_page, 2);
        assert_eq!(m.page_size, 20);
        assert_eq!(m.first_page, 1);
        assert_eq!(m.last_page, 3);
        assert_eq!(m.total_records, 51);
    }

    #[test]
    fn metadata_exact_multiple() {
        assert_eq!(calculate_metadata(40, 1, 20).last_page, 2);
        assert_eq!(calculate_metadata(1, 1, 20).last_page, 1);
    }

    #[test]
    fn valid_filters_pass() {
        let mut v = crate::validator::Validator::new();
        filters(1, 20, "-price").validate(&mut v);
        assert!(v.is_valid());
    }

    #[test]
    fn unsafelisted_sort_fails_validation() {
        let mut v = crate::validator::Validator::new();
        filters(1, 20, "password_hash").validate(&mut v);
        let errs = v.into_errors();
        assert_eq!(errs.get("sort").map(String::as_str), Some("invalid sort value"));
    }

    #[test]
    fn out_of_range_page_fails_validation() {
        let mut v = crate::validator::Validator::new();
        filters(0, 101, "id").validate(&mut v);
        let errs = v.into_errors();
        assert!(errs.contains_key("page"));
        assert!(errs.contains_key("page_size"));
    }

    #[test]
    fn sort_column_strips_direction_marker() {
        let f = filters(1, 20, "-price");
        assert_eq!(f.sort_column(), "price");
        assert_eq!(f.sort_direction(), "DESC");

        let f = filters(1, 20, "title");
        assert_eq!(f.sort_column(), "title");
        assert_eq!(f.sort_direction(), "ASC");
    }

    #[test]
    #[should_panic(expected = "unsafe sort parameter")]
    fn sort_column_panics_on_unsafelisted_value() {
        filters(1, 20, "version; DROP TABLE listings").sort_column();
    }

    #[test]
    fn limit_and_offset() {
        let f = filters(3, 25, "id");
        assert_eq!(f.limit(), 25);
        assert_eq!(f.offset(), 50);
    }
}
