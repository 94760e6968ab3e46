//! Evaluation values, errors and contexts.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use curio_core::{decompose_true_name, Schema, Thing};
use serde_json::Value;
use thiserror::Error;

/// The value domain of the formula language.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(DateTime<Utc>),
    Null,
}

impl EvalValue {
    /// Render for concatenation. `Null` renders empty.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            EvalValue::Text(s) => s.clone(),
            EvalValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            EvalValue::Bool(b) => b.to_string(),
            EvalValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            EvalValue::Null => String::new(),
        }
    }

    /// Truthiness for conditionals: false for `Null`, `false`, zero and
    /// empty/"false" text.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            EvalValue::Bool(b) => *b,
            EvalValue::Number(n) => *n != 0.0,
            EvalValue::Text(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
            EvalValue::Date(_) => true,
            EvalValue::Null => false,
        }
    }

    /// Loose equality: numeric when both sides are numbers, date-aware,
    /// case-insensitive text otherwise.
    #[must_use]
    pub fn loosely_equals(&self, other: &EvalValue) -> bool {
        match (self, other) {
            (EvalValue::Number(a), EvalValue::Number(b)) => a == b,
            (EvalValue::Bool(a), EvalValue::Bool(b)) => a == b,
            (EvalValue::Date(a), EvalValue::Date(b)) => a == b,
            (EvalValue::Null, EvalValue::Null) => true,
            (a, b) => a.to_text().eq_ignore_ascii_case(&b.to_text()),
        }
    }

    /// Best-effort date view: already a date, or text in ISO date or RFC 3339
    /// form.
    #[must_use]
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            EvalValue::Date(d) => Some(*d),
            EvalValue::Text(s) => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Some(dt.with_timezone(&Utc));
                }
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|ndt| Utc.from_utc_datetime(&ndt))
            }
            _ => None,
        }
    }

    /// Convert a stored JSON property value into the evaluation domain.
    #[must_use]
    pub fn from_json(value: &Value) -> EvalValue {
        match value {
            Value::Null => EvalValue::Null,
            Value::Bool(b) => EvalValue::Bool(*b),
            Value::Number(n) => EvalValue::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => EvalValue::Text(s.clone()),
            // Arrays and objects flatten to their JSON text form.
            other => EvalValue::Text(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    UnknownFunction,
    UnknownField,
    BadArgument,
    WrongArity,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub message: String,
}

impl EvalError {
    #[must_use]
    pub fn unknown_function(name: &str) -> Self {
        Self {
            kind: EvalErrorKind::UnknownFunction,
            message: format!("unknown function {name:?}"),
        }
    }

    #[must_use]
    pub fn unknown_field(name: &str) -> Self {
        Self {
            kind: EvalErrorKind::UnknownField,
            message: format!("unknown field {name:?}"),
        }
    }

    #[must_use]
    pub fn bad_argument(message: impl Into<String>) -> Self {
        Self {
            kind: EvalErrorKind::BadArgument,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn wrong_arity(name: &str, expected: usize, actual: usize) -> Self {
        Self {
            kind: EvalErrorKind::WrongArity,
            message: format!("{name} expects {expected} argument(s), got {actual}"),
        }
    }
}

/// Immutable, case-insensitive name -> value map formulas evaluate against.
///
/// Built three ways: empty (plus manual inserts), mocked from a schema
/// (sample values per field kind, for previewing formulas without data), or
/// from a thing's actual properties plus built-in meta-fields.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    values: HashMap<String, EvalValue>,
}

impl EvalContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: EvalValue) {
        self.values
            .insert(name.as_ref().to_ascii_lowercase(), value);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EvalValue> {
        self.values.get(&name.to_ascii_lowercase())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Synthesize representative values for every field a schema declares,
    /// so a formula can be checked before any thing exists.
    #[must_use]
    pub fn mock_from_schema(schema: &Schema) -> Self {
        let mut ctx = Self::new();
        ctx.insert("Name", EvalValue::Text(format!("A {}", schema.name())));
        for field in schema.fields() {
            ctx.insert(&field.name, EvalValue::from_json(&field.field_type.sample_value()));
        }
        ctx
    }

    /// Populate from a thing's resolved properties plus the built-in
    /// meta-fields `Name`, `CreatedOn`, `LastAccessed` and `LastModified`.
    ///
    /// Properties are exposed under their simple field name; a bare ad hoc
    /// property uses its stored name. When several schemas declare the same
    /// simple name the last one wins - formulas needing precision can rely
    /// on meta-fields or rename the colliding field.
    #[must_use]
    pub fn from_thing(thing: &Thing, schemas: &[Schema]) -> Self {
        let mut ctx = Self::new();
        for (true_name, value) in thing.raw_properties() {
            let (schema_id, field_name) = decompose_true_name(true_name);
            let value = EvalValue::from_json(value);
            // Also expose the field's display name when its schema declares one.
            let field = schema_id
                .and_then(|id| schemas.iter().find(|s| s.id() == id))
                .and_then(|s| s.field(field_name));
            if let Some(field) = field {
                ctx.insert(field.display_name(), value.clone());
            }
            ctx.insert(field_name, value);
        }
        ctx.insert("Name", EvalValue::Text(thing.name().to_string()));
        ctx.insert("CreatedOn", EvalValue::Date(thing.created_on));
        ctx.insert("LastAccessed", EvalValue::Date(thing.last_accessed));
        ctx.insert("LastModified", EvalValue::Date(thing.last_modified));
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curio_core::{FieldType, SchemaField};
    use serde_json::json;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut ctx = EvalContext::new();
        ctx.insert("Name", EvalValue::Text("x".into()));
        assert!(ctx.get("NAME").is_some());
        assert!(ctx.get("name").is_some());
        assert!(ctx.get("other").is_none());
    }

    #[test]
    fn number_rendering_drops_integral_fraction() {
        assert_eq!(EvalValue::Number(3.0).to_text(), "3");
        assert_eq!(EvalValue::Number(3.5).to_text(), "3.5");
    }

    #[test]
    fn loose_equality() {
        assert!(EvalValue::Text("Open".into()).loosely_equals(&EvalValue::Text("open".into())));
        assert!(EvalValue::Number(2.0).loosely_equals(&EvalValue::Number(2.0)));
        assert!(EvalValue::Number(2.0).loosely_equals(&EvalValue::Text("2".into())));
        assert!(!EvalValue::Null.loosely_equals(&EvalValue::Text("x".into())));
    }

    #[test]
    fn mocked_context_covers_all_fields() {
        let mut schema = Schema::new("Contact").unwrap();
        schema
            .add_field(SchemaField::new("email", FieldType::Email))
            .unwrap();
        schema
            .add_field(SchemaField::new("age", FieldType::Integer))
            .unwrap();
        let ctx = EvalContext::mock_from_schema(&schema);
        assert!(ctx.get("email").is_some());
        assert!(ctx.get("age").is_some());
        assert!(ctx.get("Name").is_some());
    }

    #[test]
    fn thing_context_exposes_simple_names_and_meta_fields() {
        let mut schema = Schema::new("Task").unwrap();
        schema
            .add_field(SchemaField::new("status", FieldType::text()))
            .unwrap();
        let mut thing = Thing::new("task1").unwrap();
        thing.associate(schema.id());
        let schemas = [schema];
        thing
            .set_property("status", "open", &schemas, None)
            .unwrap();
        thing.set_raw("priority", json!(2));

        let ctx = EvalContext::from_thing(&thing, &schemas);
        assert_eq!(ctx.get("status"), Some(&EvalValue::Text("open".into())));
        assert_eq!(ctx.get("priority"), Some(&EvalValue::Number(2.0)));
        assert_eq!(ctx.get("name"), Some(&EvalValue::Text("task1".into())));
        assert!(matches!(ctx.get("createdon"), Some(EvalValue::Date(_))));
    }
}
