//! Schema field kinds.
//!
//! The set of field kinds is fixed and closed, so it is a tagged union with
//! exhaustive matches rather than an open trait hierarchy. Each variant
//! carries only its own configuration.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9][0-9 ().\-]{4,}$").unwrap();
    static ref URI_RE: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*://\S+$").unwrap();
    // --12-31 (XML gMonthDay style) or 12-31
    static ref MONTH_DAY_RE: Regex = Regex::new(r"^(--)?(0[1-9]|1[0-2])-(0[1-9]|[12][0-9]|3[01])$").unwrap();
}

/// A field kind plus its per-kind configuration.
///
/// The type tag is immutable once chosen; changing a property's type means
/// replacing the whole field definition.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Text {
        min_length: Option<usize>,
        max_length: Option<usize>,
        pattern: Option<String>,
    },
    Number,
    Integer,
    Bool,
    Date,
    MonthDay,
    Email,
    Phone,
    Uri,
    Choice {
        values: Vec<String>,
    },
    Array {
        item: Box<FieldType>,
    },
    /// Reference to a thing that must belong to the given schema.
    SchemaRef {
        schema_id: String,
    },
    /// Value computed from a formula on read; never hand-set.
    Calculated {
        formula: String,
    },
    /// Dense auto-assigned sequence number across a schema's member things.
    /// `next` is the counter for the next value to hand out.
    Increment {
        next: u64,
    },
}

impl FieldType {
    /// Plain text with no length or pattern constraints.
    #[must_use]
    pub fn text() -> Self {
        FieldType::Text {
            min_length: None,
            max_length: None,
            pattern: None,
        }
    }

    /// Human-readable kind name, used in listings and diagnostics.
    #[must_use]
    pub fn readable_name(&self) -> &'static str {
        match self {
            FieldType::Text { .. } => "text",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Bool => "boolean",
            FieldType::Date => "date",
            FieldType::MonthDay => "month-day",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Uri => "uri",
            FieldType::Choice { .. } => "choice",
            FieldType::Array { .. } => "array",
            FieldType::SchemaRef { .. } => "reference",
            FieldType::Calculated { .. } => "calculated",
            FieldType::Increment { .. } => "increment",
        }
    }

    /// Whether `value` satisfies this kind's rules.
    #[must_use]
    pub fn validate(&self, value: &Value) -> bool {
        match self {
            FieldType::Text {
                min_length,
                max_length,
                pattern,
            } => {
                let Some(s) = value.as_str() else {
                    return false;
                };
                let len = s.chars().count();
                if min_length.is_some_and(|min| len < min) {
                    return false;
                }
                if max_length.is_some_and(|max| len > max) {
                    return false;
                }
                match pattern {
                    Some(p) => Regex::new(p).map(|re| re.is_match(s)).unwrap_or(false),
                    None => true,
                }
            }
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Date => value
                .as_str()
                .is_some_and(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
            FieldType::MonthDay => value.as_str().is_some_and(|s| MONTH_DAY_RE.is_match(s)),
            FieldType::Email => value.as_str().is_some_and(|s| EMAIL_RE.is_match(s)),
            FieldType::Phone => value.as_str().is_some_and(|s| PHONE_RE.is_match(s)),
            FieldType::Uri => value.as_str().is_some_and(|s| URI_RE.is_match(s)),
            FieldType::Choice { values } => value
                .as_str()
                .is_some_and(|s| values.iter().any(|v| v.eq_ignore_ascii_case(s))),
            FieldType::Array { item } => value
                .as_array()
                .is_some_and(|items| items.iter().all(|v| item.validate(v))),
            FieldType::SchemaRef { .. } => value
                .as_str()
                .is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
            // Calculated values are derived on read and overwritten by the
            // next evaluation; whatever is stored is acceptable.
            FieldType::Calculated { .. } => true,
            FieldType::Increment { .. } => value.is_u64(),
        }
    }

    /// Coerce raw user input into the best representable JSON value.
    ///
    /// Returns `None` only when no representation exists at all; an invalid
    /// but representable value (a malformed email, an out-of-range length)
    /// still coerces - validity is judged separately so the raw input can be
    /// stored and flagged for correction.
    #[must_use]
    pub fn coerce(&self, input: &str) -> Option<Value> {
        let input = input.trim();
        match self {
            FieldType::Text { .. }
            | FieldType::Date
            | FieldType::MonthDay
            | FieldType::Email
            | FieldType::Phone
            | FieldType::Uri
            | FieldType::Choice { .. }
            | FieldType::SchemaRef { .. }
            | FieldType::Calculated { .. } => Some(Value::String(input.to_string())),
            FieldType::Number => input
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            FieldType::Integer => input.parse::<i64>().ok().map(Value::from),
            FieldType::Increment { .. } => input.parse::<u64>().ok().map(Value::from),
            FieldType::Bool => match input.to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Some(Value::Bool(true)),
                "false" | "no" | "n" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            FieldType::Array { item } => {
                if let Ok(Value::Array(items)) = serde_json::from_str(input) {
                    return Some(Value::Array(items));
                }
                let items: Option<Vec<Value>> =
                    input.split(',').map(|part| item.coerce(part)).collect();
                items.map(Value::Array)
            }
        }
    }

    /// Representative value for this kind, used to mock evaluation contexts
    /// so formulas can be previewed without real data.
    #[must_use]
    pub fn sample_value(&self) -> Value {
        match self {
            FieldType::Text { .. } => Value::String("Sample".to_string()),
            FieldType::Number => Value::from(3.14),
            FieldType::Integer => Value::from(42),
            FieldType::Bool => Value::Bool(true),
            FieldType::Date => Value::String("2001-01-01".to_string()),
            FieldType::MonthDay => Value::String("--12-31".to_string()),
            FieldType::Email => Value::String("someone@example.com".to_string()),
            FieldType::Phone => Value::String("+1 555 0100".to_string()),
            FieldType::Uri => Value::String("https://example.com/".to_string()),
            FieldType::Choice { values } => {
                Value::String(values.first().cloned().unwrap_or_default())
            }
            FieldType::Array { item } => Value::Array(vec![item.sample_value()]),
            FieldType::SchemaRef { .. } => {
                Value::String(uuid::Uuid::nil().to_string())
            }
            FieldType::Calculated { .. } => Value::String(String::new()),
            FieldType::Increment { .. } => Value::from(1),
        }
    }
}

/// A named, typed field declaration on a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    /// Optional per-culture display names, e.g. `{"en": "Due Date"}`.
    pub display_names: Option<HashMap<String, String>>,
}

impl SchemaField {
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            display_names: None,
        }
    }

    #[must_use]
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: true,
            ..Self::new(name, field_type)
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, culture: impl Into<String>, name: impl Into<String>) -> Self {
        self.display_names
            .get_or_insert_with(HashMap::new)
            .insert(culture.into(), name.into());
        self
    }

    /// The simple display name: any configured display name, else the field name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_names
            .as_ref()
            .and_then(|names| names.get("en").or_else(|| names.values().next()))
            .map_or(self.name.as_str(), String::as_str)
    }

    /// Case-insensitive match against the field name or any display name.
    #[must_use]
    pub fn matches_name(&self, reference: &str) -> bool {
        if self.name.eq_ignore_ascii_case(reference) {
            return true;
        }
        self.display_names
            .as_ref()
            .is_some_and(|names| names.values().any(|n| n.eq_ignore_ascii_case(reference)))
    }
}

// ============================================================================
// Document form
// ============================================================================

/// On-disk shape of a field definition: a JSON-Schema-flavored object
/// discriminated by `type` plus `format` and kind-specific extras.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldDocument {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub format: Option<String>,
    #[serde(rename = "minLength", skip_serializing_if = "Option::is_none", default)]
    pub min_length: Option<usize>,
    #[serde(rename = "maxLength", skip_serializing_if = "Option::is_none", default)]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pattern: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none", default)]
    pub choices: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub items: Option<Box<FieldDocument>>,
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none", default)]
    pub schema_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub formula: Option<String>,
    #[serde(rename = "$increment", skip_serializing_if = "Option::is_none", default)]
    pub increment: Option<u64>,
    #[serde(rename = "displayNames", skip_serializing_if = "Option::is_none", default)]
    pub display_names: Option<HashMap<String, String>>,
}

impl FieldType {
    #[must_use]
    pub fn to_document(&self) -> FieldDocument {
        let mut doc = FieldDocument::default();
        match self {
            FieldType::Text {
                min_length,
                max_length,
                pattern,
            } => {
                doc.ty = "string".into();
                doc.min_length = *min_length;
                doc.max_length = *max_length;
                doc.pattern = pattern.clone();
            }
            FieldType::Number => doc.ty = "number".into(),
            FieldType::Integer => doc.ty = "integer".into(),
            FieldType::Bool => doc.ty = "boolean".into(),
            FieldType::Date => {
                doc.ty = "string".into();
                doc.format = Some("date".into());
            }
            FieldType::MonthDay => {
                doc.ty = "string".into();
                doc.format = Some("month-day".into());
            }
            FieldType::Email => {
                doc.ty = "string".into();
                doc.format = Some("email".into());
            }
            FieldType::Phone => {
                doc.ty = "string".into();
                doc.format = Some("phone".into());
            }
            FieldType::Uri => {
                doc.ty = "string".into();
                doc.format = Some("uri".into());
            }
            FieldType::Choice { values } => {
                doc.ty = "string".into();
                doc.choices = Some(values.clone());
            }
            FieldType::Array { item } => {
                doc.ty = "array".into();
                doc.items = Some(Box::new(item.to_document()));
            }
            FieldType::SchemaRef { schema_id } => {
                doc.ty = "string".into();
                doc.schema_ref = Some(schema_id.clone());
            }
            FieldType::Calculated { formula } => {
                doc.ty = "string".into();
                doc.formula = Some(formula.clone());
            }
            FieldType::Increment { next } => {
                doc.ty = "integer".into();
                doc.increment = Some(*next);
            }
        }
        doc
    }

    pub fn from_document(doc: &FieldDocument) -> Result<Self> {
        if let Some(values) = &doc.choices {
            return Ok(FieldType::Choice {
                values: values.clone(),
            });
        }
        if let Some(schema_id) = &doc.schema_ref {
            return Ok(FieldType::SchemaRef {
                schema_id: schema_id.clone(),
            });
        }
        if let Some(formula) = &doc.formula {
            return Ok(FieldType::Calculated {
                formula: formula.clone(),
            });
        }
        match doc.ty.as_str() {
            "string" => Ok(match doc.format.as_deref() {
                Some("date") => FieldType::Date,
                Some("month-day") => FieldType::MonthDay,
                Some("email") => FieldType::Email,
                Some("phone") => FieldType::Phone,
                Some("uri") => FieldType::Uri,
                _ => FieldType::Text {
                    min_length: doc.min_length,
                    max_length: doc.max_length,
                    pattern: doc.pattern.clone(),
                },
            }),
            "number" => Ok(FieldType::Number),
            "integer" => match doc.increment {
                Some(next) => Ok(FieldType::Increment { next }),
                None => Ok(FieldType::Integer),
            },
            "boolean" => Ok(FieldType::Bool),
            "array" => {
                let items = doc
                    .items
                    .as_deref()
                    .ok_or_else(|| Error::Document("array field without items".into()))?;
                Ok(FieldType::Array {
                    item: Box::new(FieldType::from_document(items)?),
                })
            }
            other => Err(Error::Document(format!("unknown field type {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_length_and_pattern() {
        let ft = FieldType::Text {
            min_length: Some(2),
            max_length: Some(4),
            pattern: None,
        };
        assert!(ft.validate(&json!("abc")));
        assert!(!ft.validate(&json!("a")));
        assert!(!ft.validate(&json!("abcde")));
        assert!(!ft.validate(&json!(42)));

        let patterned = FieldType::Text {
            min_length: None,
            max_length: None,
            pattern: Some("^[A-Z]+$".into()),
        };
        assert!(patterned.validate(&json!("ABC")));
        assert!(!patterned.validate(&json!("abc")));
    }

    #[test]
    fn email_phone_uri() {
        assert!(FieldType::Email.validate(&json!("a@b.io")));
        assert!(!FieldType::Email.validate(&json!("not an email")));
        assert!(FieldType::Phone.validate(&json!("+46 70 123 45 67")));
        assert!(!FieldType::Phone.validate(&json!("call me")));
        assert!(FieldType::Uri.validate(&json!("https://example.com/x")));
        assert!(!FieldType::Uri.validate(&json!("example com")));
    }

    #[test]
    fn month_day_accepts_both_shapes() {
        assert!(FieldType::MonthDay.validate(&json!("--12-31")));
        assert!(FieldType::MonthDay.validate(&json!("02-29")));
        assert!(!FieldType::MonthDay.validate(&json!("13-01")));
        assert!(!FieldType::MonthDay.validate(&json!("12-32")));
    }

    #[test]
    fn coercion_keeps_invalid_input_representable() {
        // A malformed email still coerces to a string; validate flags it.
        let coerced = FieldType::Email.coerce("nope").unwrap();
        assert_eq!(coerced, json!("nope"));
        assert!(!FieldType::Email.validate(&coerced));

        // A non-numeric string has no number representation at all.
        assert!(FieldType::Number.coerce("three").is_none());
        assert_eq!(FieldType::Integer.coerce("7"), Some(json!(7)));
    }

    #[test]
    fn bool_coercion_variants() {
        assert_eq!(FieldType::Bool.coerce("Yes"), Some(json!(true)));
        assert_eq!(FieldType::Bool.coerce("0"), Some(json!(false)));
        assert!(FieldType::Bool.coerce("maybe").is_none());
    }

    #[test]
    fn array_coercion_splits_or_parses_json() {
        let ft = FieldType::Array {
            item: Box::new(FieldType::Integer),
        };
        assert_eq!(ft.coerce("1, 2, 3"), Some(json!([1, 2, 3])));
        assert_eq!(ft.coerce("[4, 5]"), Some(json!([4, 5])));
    }

    #[test]
    fn calculated_accepts_any_value() {
        let ft = FieldType::Calculated {
            formula: "=UPPER([Name])".into(),
        };
        assert!(ft.validate(&json!("anything")));
    }

    #[test]
    fn document_round_trip() {
        let kinds = vec![
            FieldType::Text {
                min_length: Some(1),
                max_length: Some(10),
                pattern: Some("^x".into()),
            },
            FieldType::Number,
            FieldType::Integer,
            FieldType::Bool,
            FieldType::Date,
            FieldType::MonthDay,
            FieldType::Email,
            FieldType::Phone,
            FieldType::Uri,
            FieldType::Choice {
                values: vec!["a".into(), "b".into()],
            },
            FieldType::Array {
                item: Box::new(FieldType::Date),
            },
            FieldType::SchemaRef {
                schema_id: uuid::Uuid::new_v4().to_string(),
            },
            FieldType::Calculated {
                formula: "=LEN([Name])".into(),
            },
            FieldType::Increment { next: 17 },
        ];
        for kind in kinds {
            let doc = kind.to_document();
            let back = FieldType::from_document(&doc).unwrap();
            assert_eq!(kind, back);
        }
    }

    #[test]
    fn display_name_matching_is_case_insensitive() {
        let field = SchemaField::new("due", FieldType::Date).with_display_name("en", "Due Date");
        assert!(field.matches_name("DUE"));
        assert!(field.matches_name("due date"));
        assert!(!field.matches_name("deadline"));
        assert_eq!(field.display_name(), "Due Date");
    }
}
