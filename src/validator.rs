use std::collections::HashMap;

/// Accumulator for field-keyed validation failures.
///
/// Checks never short-circuit: every failing rule records a message so the
/// client sees all problems in one response. Only the first message per field
/// is kept.
#[derive(Debug, Default)]
pub struct Validator {
    errors: HashMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `field` unless one was already recorded.
    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    /// Record a failure for `field` when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_error(field, message);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Consume the validator, yielding the accumulated field→message map.
    pub fn into_errors(self) -> HashMap<String, String> {
        self.errors
    }
}

/// True when every element of `values` is distinct.
pub fn unique<T: AsRef<str>>(values: &[T]) -> bool {
    let mut seen = std::collections::HashSet::new();
    values.iter().all(|v| seen.insert(v.as_ref()))
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_validator_is_valid() {
        assert!(Validator::new().is_valid());
    }

    #[test]
    fn failing_check_records_message() {
        let mut v = Validator::new();
        v.check(false, "title", "must be provided");
        assert!(!v.is_valid());
        assert_eq!(
            v.into_errors().get("title").map(String::as_str),
            Some("must be provided")
        );
    }

    #[test]
    fn checks_accumulate_across_fields() {
        let mut v = Validator::new();
        v.check(false, "title", "must be provided");
        v.check(false, "price", "must be provided");
        v.check(true, "description", "must be provided");
        let errs = v.into_errors();
        assert_eq!(errs.len(), 2);
        assert!(errs.contains_key("title"));
        assert!(errs.contains_key("price"));
    }

    #[test]
    fn first_message_per_field_wins() {
        let mut v = Validator::new();
        v.add_error("title", "first");
        v.add_error("title", "second");
        assert_eq!(v.into_errors().get("title").map(String::as_str), Some("first"));
    }

    #[test]
    fn unique_detects_duplicates() {
        assert!(unique(&["a", "b", "c"]));
        assert!(!unique(&["a", "b", "a"]));
        assert!(unique::<&str>(&[]));
    }
}
