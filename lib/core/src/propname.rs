//! True-name carve/compose helpers.
//!
//! A *true name* is the canonical key a property value is stored under:
//! either a bare name (an ad hoc, schema-less property) or
//! `{schema-id}.{field-name}`. All qualification and splitting goes through
//! this pure function pair so the rest of the codebase never concatenates or
//! splits property names ad hoc.

use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

lazy_static! {
    // Printable, non-blank, no control characters. Dots are reserved for
    // schema qualification so field and thing names may not contain them.
    static ref NAME_RE: Regex = Regex::new(r"^[^\x00-\x1f\x7f.]+$").unwrap();
}

/// Whether `name` is acceptable as a schema name, field name or thing name.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed == name && NAME_RE.is_match(name)
}

/// Compose the canonical storage key for a schema-declared field.
#[must_use]
pub fn compose_true_name(schema_id: &str, field_name: &str) -> String {
    format!("{schema_id}.{field_name}")
}

/// Split a stored key back into its schema id (if any) and field name.
///
/// Only a prefix that parses as a UUID counts as a schema qualifier; anything
/// else is a bare name that happens to contain a dot.
#[must_use]
pub fn decompose_true_name(true_name: &str) -> (Option<&str>, &str) {
    if let Some((prefix, rest)) = true_name.split_once('.') {
        if !rest.is_empty() && Uuid::parse_str(prefix).is_ok() {
            return (Some(prefix), rest);
        }
    }
    (None, true_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_qualified_names() {
        let id = Uuid::new_v4().to_string();
        let composed = compose_true_name(&id, "email");
        let (schema, field) = decompose_true_name(&composed);
        assert_eq!(schema, Some(id.as_str()));
        assert_eq!(field, "email");
    }

    #[test]
    fn bare_names_stay_bare() {
        assert_eq!(decompose_true_name("email"), (None, "email"));
        // A dot without a UUID prefix is just part of the name.
        assert_eq!(decompose_true_name("not-a-uuid.x"), (None, "not-a-uuid.x"));
    }

    #[test]
    fn name_validity() {
        assert!(is_valid_name("Due Date"));
        assert!(is_valid_name("email"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("  "));
        assert!(!is_valid_name(" padded"));
        assert!(!is_valid_name("with.dot"));
        assert!(!is_valid_name("line\nbreak"));
    }
}
