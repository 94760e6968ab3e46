//! Things: schema-tagged records with a property bag, plus the property
//! resolution algorithm that reconciles user-facing property references
//! against stored properties and associated schemas.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::field::{FieldType, SchemaField};
use crate::propname::{compose_true_name, decompose_true_name, is_valid_name};
use crate::reference::Reference;
use crate::schema::Schema;

/// Reserved property reference that renames the thing instead of writing a
/// property.
pub const NAME_KEY: &str = "Name";

/// External collaborator consulted when a reference-type field receives input
/// that is not a valid id - typically an interactive disambiguation prompt
/// backed by the store.
pub trait ReferenceResolver {
    /// Resolve raw user input to a member thing of `target_schema_id`.
    fn resolve(&self, target_schema_id: &str, input: &str) -> Option<Reference>;
}

/// Outcome of a validated property write. Ambiguity is an [`Error`], not an
/// outcome - the write is rejected entirely.
#[derive(Debug, Clone, PartialEq)]
pub enum SetOutcome {
    /// The property was written under `true_name`; `valid` reflects whether
    /// the value satisfies the resolved field's rules (invalid values are
    /// stored anyway so they stay visible for correction).
    Set { true_name: String, valid: bool },
    /// A blank value unset the property instead.
    Unset {
        true_name: String,
        was_required: bool,
    },
    /// The reference was the reserved `Name` key; the thing was renamed.
    Renamed { from: String, to: String },
}

/// A record identified by a unique id, optionally tagged with one or more
/// schemas (multi-membership, not inheritance), holding a property bag keyed
/// by true property names.
#[derive(Debug, Clone, PartialEq)]
pub struct Thing {
    id: String,
    name: String,
    schema_ids: Vec<String>,
    properties: BTreeMap<String, Value>,
    pub created_on: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl Thing {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::with_id(Uuid::new_v4().to_string(), name)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(Error::InvalidName(name));
        }
        let now = Utc::now();
        Ok(Self {
            id: id.into(),
            name,
            schema_ids: Vec::new(),
            properties: BTreeMap::new(),
            created_on: now,
            last_modified: now,
            last_accessed: now,
        })
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(Error::InvalidName(name));
        }
        self.name = name;
        self.last_modified = Utc::now();
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn schema_ids(&self) -> &[String] {
        &self.schema_ids
    }

    /// Tag the thing with a schema. Idempotent; returns whether it was added.
    pub fn associate(&mut self, schema_id: &str) -> bool {
        if self.schema_ids.iter().any(|s| s == schema_id) {
            return false;
        }
        self.schema_ids.push(schema_id.to_string());
        self.last_modified = Utc::now();
        true
    }

    /// Remove a schema tag. Idempotent; returns whether it was present.
    pub fn dissociate(&mut self, schema_id: &str) -> bool {
        let before = self.schema_ids.len();
        self.schema_ids.retain(|s| s != schema_id);
        if self.schema_ids.len() != before {
            self.last_modified = Utc::now();
            true
        } else {
            false
        }
    }

    // ------------------------------------------------------------------
    // Raw property access (storage layer and increment bookkeeping)
    // ------------------------------------------------------------------

    #[must_use]
    pub fn property(&self, true_name: &str) -> Option<&Value> {
        self.properties.get(true_name)
    }

    pub fn set_raw(&mut self, true_name: impl Into<String>, value: Value) {
        self.properties.insert(true_name.into(), value);
        self.last_modified = Utc::now();
    }

    pub fn remove_raw(&mut self, true_name: &str) -> Option<Value> {
        let removed = self.properties.remove(true_name);
        if removed.is_some() {
            self.last_modified = Utc::now();
        }
        removed
    }

    pub fn raw_properties(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.properties.iter()
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Set (or unset) a property through the validated resolution path.
    ///
    /// `reference` may be a true name, a full display name
    /// (`SchemaName.field`), or a simple display name. `schemas` should hold
    /// the thing's associated schemas; others are ignored. Resolution:
    ///
    /// - no candidate: a brand-new ad hoc property, or a rename when the
    ///   reference is the reserved `Name` key
    /// - one candidate: the write happens; blank input unsets instead, and an
    ///   invalid value is stored but flagged
    /// - several candidates: rejected as [`Error::AmbiguousProperty`]
    pub fn set_property(
        &mut self,
        reference: &str,
        raw: &str,
        schemas: &[Schema],
        resolver: Option<&dyn ReferenceResolver>,
    ) -> Result<SetOutcome> {
        assert!(
            !reference.trim().is_empty(),
            "property reference must be non-blank"
        );
        let mut candidates = self.resolve_candidates(reference, schemas);

        if candidates.len() > 1 {
            let mut names: Vec<String> = candidates.into_iter().map(|c| c.true_name).collect();
            names.sort();
            return Err(Error::AmbiguousProperty {
                reference: reference.to_string(),
                candidates: names,
            });
        }
        match candidates.pop() {
            None => self.set_unresolved(reference, raw),
            Some(candidate) => self.set_resolved(candidate, raw, resolver),
        }
    }

    fn set_unresolved(&mut self, reference: &str, raw: &str) -> Result<SetOutcome> {
        if reference.eq_ignore_ascii_case(NAME_KEY) {
            let from = self.name.clone();
            self.rename(raw.trim())?;
            return Ok(SetOutcome::Renamed {
                from,
                to: self.name.clone(),
            });
        }
        if raw.trim().is_empty() {
            // Nothing stored, nothing declared: unsetting is a no-op.
            return Ok(SetOutcome::Unset {
                true_name: reference.to_string(),
                was_required: false,
            });
        }
        if !is_valid_name(reference) {
            return Err(Error::InvalidName(reference.to_string()));
        }
        self.set_raw(reference, Value::String(raw.trim().to_string()));
        Ok(SetOutcome::Set {
            true_name: reference.to_string(),
            valid: true,
        })
    }

    fn set_resolved(
        &mut self,
        candidate: Candidate,
        raw: &str,
        resolver: Option<&dyn ReferenceResolver>,
    ) -> Result<SetOutcome> {
        let true_name = candidate.true_name;
        if raw.trim().is_empty() {
            let was_required = candidate.field.as_ref().is_some_and(|f| f.required);
            self.remove_raw(&true_name);
            if was_required {
                warn!(property = %true_name, "unset a required property");
            }
            return Ok(SetOutcome::Unset {
                true_name,
                was_required,
            });
        }

        let Some(field) = candidate.field else {
            // Existing ad hoc property: plain text, always valid.
            self.set_raw(&true_name, Value::String(raw.trim().to_string()));
            return Ok(SetOutcome::Set {
                true_name,
                valid: true,
            });
        };

        let coerced = field.field_type.coerce(raw);
        let value = coerced.unwrap_or_else(|| Value::String(raw.trim().to_string()));
        let mut valid = field.field_type.validate(&value);

        let value = if !valid {
            // Reference fields may be rescued by an interactive lookup; all
            // other invalid values are stored as-is so they can be corrected.
            if let (FieldType::SchemaRef { schema_id }, Some(resolver)) =
                (&field.field_type, resolver)
            {
                match resolver.resolve(schema_id, raw.trim()) {
                    Some(reference) => {
                        valid = true;
                        Value::String(reference.id)
                    }
                    None => value,
                }
            } else {
                value
            }
        } else {
            value
        };

        if !valid {
            warn!(
                property = %true_name,
                kind = field.field_type.readable_name(),
                "stored value does not satisfy its field; flagged invalid"
            );
        }
        self.set_raw(&true_name, value);
        Ok(SetOutcome::Set { true_name, valid })
    }

    /// Two-pass candidate collection: the thing's set properties first, then
    /// declared-but-unset "phantom" fields on every associated schema, merged
    /// by true name.
    fn resolve_candidates(&self, reference: &str, schemas: &[Schema]) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = Vec::new();

        for true_name in self.properties.keys() {
            let (schema_id, field_name) = decompose_true_name(true_name);
            let schema = schema_id.and_then(|id| schemas.iter().find(|s| s.id() == id));
            let field = schema.and_then(|s| s.field(field_name));
            if Self::reference_matches(reference, true_name, field_name, schema, field) {
                candidates.push(Candidate {
                    true_name: true_name.clone(),
                    field: field.cloned(),
                });
            }
        }

        for schema in schemas {
            if !self.schema_ids.iter().any(|id| id == schema.id()) {
                continue;
            }
            for field in schema.fields() {
                let true_name = compose_true_name(schema.id(), &field.name);
                if candidates
                    .iter()
                    .any(|c| c.true_name.eq_ignore_ascii_case(&true_name))
                {
                    continue; // already found among set properties
                }
                if Self::reference_matches(
                    reference,
                    &true_name,
                    &field.name,
                    Some(schema),
                    Some(field),
                ) {
                    candidates.push(Candidate {
                        true_name,
                        field: Some(field.clone()),
                    });
                }
            }
        }

        candidates
    }

    fn reference_matches(
        reference: &str,
        true_name: &str,
        field_name: &str,
        schema: Option<&Schema>,
        field: Option<&SchemaField>,
    ) -> bool {
        if reference.eq_ignore_ascii_case(true_name) {
            return true;
        }
        if let Some(field) = field {
            if field.matches_name(reference) {
                return true;
            }
        } else if field_name.eq_ignore_ascii_case(reference) {
            return true;
        }
        // Full display forms: SchemaName.field or SchemaName.display-name.
        if let Some(schema) = schema {
            let qualified = format!("{}.{}", schema.name(), field_name);
            if qualified.eq_ignore_ascii_case(reference) {
                return true;
            }
            if let Some(field) = field {
                let display = format!("{}.{}", schema.name(), field.display_name());
                if display.eq_ignore_ascii_case(reference) {
                    return true;
                }
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Projections
    // ------------------------------------------------------------------

    /// Read-only projection of every stored property against the given
    /// schemas: true name, display names, validity, required-ness.
    #[must_use]
    pub fn properties(&self, schemas: &[Schema]) -> Vec<ThingProperty> {
        self.properties
            .iter()
            .map(|(true_name, value)| {
                let (schema_id, field_name) = decompose_true_name(true_name);
                let schema = schema_id.and_then(|id| schemas.iter().find(|s| s.id() == id));
                let field = schema.and_then(|s| s.field(field_name));
                let simple_name = field
                    .map(|f| f.display_name().to_string())
                    .unwrap_or_else(|| field_name.to_string());
                let full_name = match schema {
                    Some(s) => format!("{}.{}", s.name(), simple_name),
                    None => simple_name.clone(),
                };
                ThingProperty {
                    true_name: true_name.clone(),
                    full_name,
                    simple_name,
                    value: value.clone(),
                    valid: field.map_or(true, |f| f.field_type.validate(value)),
                    required: field.is_some_and(|f| f.required),
                    type_name: field.map(|f| f.field_type.readable_name()),
                }
            })
            .collect()
    }

    /// The complement of [`Thing::properties`]: fields declared on associated
    /// schemas that this thing has not set.
    #[must_use]
    pub fn unset_properties(&self, schemas: &[Schema]) -> Vec<ThingUnsetProperty> {
        let mut unset = Vec::new();
        for schema in schemas {
            if !self.schema_ids.iter().any(|id| id == schema.id()) {
                continue;
            }
            for field in schema.fields() {
                let true_name = compose_true_name(schema.id(), &field.name);
                if self.properties.contains_key(&true_name) {
                    continue;
                }
                let simple_name = field.display_name().to_string();
                unset.push(ThingUnsetProperty {
                    full_name: format!("{}.{}", schema.name(), simple_name),
                    true_name,
                    simple_name,
                    required: field.required,
                    type_name: field.field_type.readable_name(),
                });
            }
        }
        unset.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        unset
    }

    /// Required fields missing from this thing, per associated schema.
    #[must_use]
    pub fn missing_required(&self, schemas: &[Schema]) -> Vec<ThingUnsetProperty> {
        self.unset_properties(schemas)
            .into_iter()
            .filter(|p| p.required)
            .collect()
    }

    // ------------------------------------------------------------------
    // Document conversion
    // ------------------------------------------------------------------

    #[must_use]
    pub fn to_document(&self) -> ThingDocument {
        ThingDocument {
            guid: self.id.clone(),
            name: self.name.clone(),
            schema_guids: self.schema_ids.clone(),
            legacy_schema_guid: None,
            created_on: Some(self.created_on),
            last_modified: Some(self.last_modified),
            last_accessed: Some(self.last_accessed),
            properties: self.properties.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            extra: Map::new(),
        }
    }

    /// Build a thing from its document, migrating legacy shapes to the
    /// canonical in-memory representation:
    ///
    /// - a singular legacy `SchemaGuid` is merged (additively) into the list
    /// - stray top-level keys are treated as properties
    /// - null values and nested objects (other than `Properties` itself) are
    ///   dropped with a warning, never an error
    pub fn from_document(doc: ThingDocument) -> Result<Self> {
        let mut thing = Thing::with_id(doc.guid, doc.name)?;
        thing.schema_ids = doc.schema_guids;
        if let Some(legacy) = doc.legacy_schema_guid {
            if !thing.schema_ids.iter().any(|id| *id == legacy) {
                thing.schema_ids.push(legacy);
            }
        }
        let now = Utc::now();
        thing.created_on = doc.created_on.unwrap_or(now);
        thing.last_modified = doc.last_modified.unwrap_or(now);
        thing.last_accessed = doc.last_accessed.unwrap_or(now);

        let mut properties = BTreeMap::new();
        let entries = doc.properties.into_iter().chain(doc.extra.into_iter());
        for (key, value) in entries {
            match value {
                Value::Null => {
                    warn!(thing = %thing.id, property = %key, "dropped null property");
                }
                Value::Object(_) => {
                    warn!(thing = %thing.id, property = %key, "dropped nested object property");
                }
                other => {
                    properties.insert(key, other);
                }
            }
        }
        thing.properties = properties;
        Ok(thing)
    }
}

/// One possible resolution of a property reference: the true name it would
/// write to, plus the declaring field when the name is schema-backed.
struct Candidate {
    true_name: String,
    field: Option<SchemaField>,
}

/// Derived, read-only view of one stored property.
#[derive(Debug, Clone, PartialEq)]
pub struct ThingProperty {
    pub true_name: String,
    pub full_name: String,
    pub simple_name: String,
    pub value: Value,
    pub valid: bool,
    pub required: bool,
    pub type_name: Option<&'static str>,
}

/// A schema-declared field absent on a given thing, synthesized on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct ThingUnsetProperty {
    pub true_name: String,
    pub full_name: String,
    pub simple_name: String,
    pub required: bool,
    pub type_name: &'static str,
}

/// On-disk shape of a thing.
///
/// `SchemaGuid` (singular) is the legacy association field; it is accepted on
/// read and merged into `SchemaGuids`, never written back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThingDocument {
    #[serde(rename = "Guid")]
    pub guid: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "SchemaGuids", default, skip_serializing_if = "Vec::is_empty")]
    pub schema_guids: Vec<String>,
    #[serde(rename = "SchemaGuid", default, skip_serializing_if = "Option::is_none")]
    pub legacy_schema_guid: Option<String>,
    #[serde(rename = "CreatedOn", default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<DateTime<Utc>>,
    #[serde(rename = "LastModified", default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(rename = "LastAccessed", default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(rename = "Properties", default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contact() -> Schema {
        let mut schema = Schema::new("Contact").unwrap();
        schema
            .add_field(SchemaField::required("email", FieldType::Email))
            .unwrap();
        schema
            .add_field(
                SchemaField::new("due", FieldType::Date).with_display_name("en", "Due Date"),
            )
            .unwrap();
        schema
    }

    fn associated(schema: &Schema) -> Thing {
        let mut thing = Thing::new("Alice").unwrap();
        thing.associate(schema.id());
        thing
    }

    #[test]
    fn set_by_simple_name_resolves_against_schema() {
        let schema = contact();
        let mut thing = associated(&schema);
        let schemas = [schema];
        let outcome = thing
            .set_property("email", "alice@example.com", &schemas, None)
            .unwrap();
        let expected = compose_true_name(schemas[0].id(), "email");
        assert_eq!(
            outcome,
            SetOutcome::Set {
                true_name: expected.clone(),
                valid: true
            }
        );
        assert_eq!(thing.property(&expected), Some(&json!("alice@example.com")));
    }

    #[test]
    fn set_by_display_name_and_full_name() {
        let schema = contact();
        let mut thing = associated(&schema);
        let schemas = [schema];
        let expected = compose_true_name(schemas[0].id(), "due");

        let outcome = thing
            .set_property("Due Date", "2026-01-01", &schemas, None)
            .unwrap();
        assert!(matches!(outcome, SetOutcome::Set { ref true_name, valid: true } if *true_name == expected));

        let outcome = thing
            .set_property("Contact.due", "2026-02-02", &schemas, None)
            .unwrap();
        assert!(matches!(outcome, SetOutcome::Set { ref true_name, valid: true } if *true_name == expected));
    }

    #[test]
    fn invalid_value_is_stored_and_flagged() {
        let schema = contact();
        let mut thing = associated(&schema);
        let schemas = [schema];
        let outcome = thing
            .set_property("email", "not-an-email", &schemas, None)
            .unwrap();
        assert!(matches!(outcome, SetOutcome::Set { valid: false, .. }));
        // The raw value is preserved so it stays visible for correction.
        let true_name = compose_true_name(schemas[0].id(), "email");
        assert_eq!(thing.property(&true_name), Some(&json!("not-an-email")));
        let props = thing.properties(&schemas);
        assert!(!props[0].valid);
    }

    #[test]
    fn blank_value_unsets_and_reports_required() {
        let schema = contact();
        let mut thing = associated(&schema);
        let schemas = [schema];
        thing
            .set_property("email", "a@b.io", &schemas, None)
            .unwrap();
        let outcome = thing.set_property("email", "  ", &schemas, None).unwrap();
        assert!(matches!(
            outcome,
            SetOutcome::Unset {
                was_required: true,
                ..
            }
        ));
        assert!(thing
            .property(&compose_true_name(schemas[0].id(), "email"))
            .is_none());
    }

    #[test]
    fn unresolved_reference_creates_ad_hoc_property() {
        let schema = contact();
        let mut thing = associated(&schema);
        let schemas = [schema];
        let outcome = thing
            .set_property("nickname", "Ally", &schemas, None)
            .unwrap();
        assert_eq!(
            outcome,
            SetOutcome::Set {
                true_name: "nickname".into(),
                valid: true
            }
        );
        assert_eq!(thing.property("nickname"), Some(&json!("Ally")));
    }

    #[test]
    fn name_key_renames() {
        let schema = contact();
        let mut thing = associated(&schema);
        let schemas = [schema];
        let outcome = thing.set_property("Name", "Alicia", &schemas, None).unwrap();
        assert!(matches!(outcome, SetOutcome::Renamed { .. }));
        assert_eq!(thing.name(), "Alicia");
    }

    #[test]
    fn two_schemas_with_same_field_are_ambiguous_by_bare_name() {
        let mut s1 = Schema::new("Task").unwrap();
        s1.add_field(SchemaField::new("x", FieldType::text())).unwrap();
        let mut s2 = Schema::new("Note").unwrap();
        s2.add_field(SchemaField::new("x", FieldType::text())).unwrap();

        let mut thing = Thing::new("t").unwrap();
        thing.associate(s1.id());
        thing.associate(s2.id());
        let schemas = [s1, s2];

        let err = thing.set_property("x", "v", &schemas, None).unwrap_err();
        match err {
            Error::AmbiguousProperty { candidates, .. } => {
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }

        // Qualified writes stay independent.
        let q1 = compose_true_name(schemas[0].id(), "x");
        let q2 = compose_true_name(schemas[1].id(), "x");
        thing.set_property(&q1, "one", &schemas, None).unwrap();
        thing.set_property(&q2, "two", &schemas, None).unwrap();
        assert_eq!(thing.property(&q1), Some(&json!("one")));
        assert_eq!(thing.property(&q2), Some(&json!("two")));
    }

    #[test]
    fn phantom_merges_with_set_property() {
        // A set property and its declaring schema field must count once.
        let schema = contact();
        let mut thing = associated(&schema);
        let schemas = [schema];
        thing
            .set_property("email", "a@b.io", &schemas, None)
            .unwrap();
        // If the phantom pass double-counted, this would be ambiguous.
        let outcome = thing
            .set_property("email", "c@d.io", &schemas, None)
            .unwrap();
        assert!(matches!(outcome, SetOutcome::Set { valid: true, .. }));
    }

    #[test]
    fn unset_properties_lists_declared_but_absent_fields() {
        let schema = contact();
        let thing = associated(&schema);
        let schemas = [schema];
        let unset = thing.unset_properties(&schemas);
        assert_eq!(unset.len(), 2);
        let email = unset.iter().find(|p| p.simple_name == "email").unwrap();
        assert_eq!(email.full_name, "Contact.email");
        assert!(email.required);
        assert_eq!(thing.missing_required(&schemas).len(), 1);
    }

    #[test]
    fn reference_resolver_rescues_partial_match() {
        struct Fixed(String);
        impl ReferenceResolver for Fixed {
            fn resolve(&self, _schema: &str, _input: &str) -> Option<Reference> {
                Some(Reference::thing(self.0.clone()))
            }
        }

        let mut schema = Schema::new("Task").unwrap();
        let target = Uuid::new_v4().to_string();
        schema
            .add_field(SchemaField::new(
                "parent",
                FieldType::SchemaRef {
                    schema_id: target.clone(),
                },
            ))
            .unwrap();
        let mut thing = Thing::new("t").unwrap();
        thing.associate(schema.id());
        let schemas = [schema];

        let resolved_id = Uuid::new_v4().to_string();
        let resolver = Fixed(resolved_id.clone());
        let outcome = thing
            .set_property("parent", "some partial name", &schemas, Some(&resolver))
            .unwrap();
        assert!(matches!(outcome, SetOutcome::Set { valid: true, .. }));
        let true_name = compose_true_name(schemas[0].id(), "parent");
        assert_eq!(thing.property(&true_name), Some(&json!(resolved_id)));
    }

    #[test]
    fn document_migration_merges_legacy_schema_and_drops_junk() {
        let legacy = Uuid::new_v4().to_string();
        let modern = Uuid::new_v4().to_string();
        let doc: ThingDocument = serde_json::from_value(json!({
            "Guid": Uuid::new_v4().to_string(),
            "Name": "Widget",
            "SchemaGuids": [modern],
            "SchemaGuid": legacy,
            "Properties": { "color": "red", "broken": null },
            "Stray": 7,
            "Nested": { "deep": true }
        }))
        .unwrap();

        let thing = Thing::from_document(doc).unwrap();
        assert_eq!(thing.schema_ids().len(), 2);
        assert!(thing.schema_ids().contains(&legacy));
        assert_eq!(thing.property("color"), Some(&json!("red")));
        assert_eq!(thing.property("Stray"), Some(&json!(7)));
        assert!(thing.property("broken").is_none());
        assert!(thing.property("Nested").is_none());
    }

    #[test]
    fn document_round_trip_is_modern_shape() {
        let schema = contact();
        let mut thing = associated(&schema);
        thing.set_raw("color", json!("red"));
        let text = serde_json::to_string(&thing.to_document()).unwrap();
        assert!(text.contains("\"SchemaGuids\""));
        assert!(!text.contains("\"SchemaGuid\":"));
        let back = Thing::from_document(serde_json::from_str(&text).unwrap()).unwrap();
        assert_eq!(back, thing);
    }

    #[test]
    fn associate_is_idempotent() {
        let mut thing = Thing::new("t").unwrap();
        assert!(thing.associate("s1"));
        assert!(!thing.associate("s1"));
        assert_eq!(thing.schema_ids().len(), 1);
        assert!(thing.dissociate("s1"));
        assert!(!thing.dissociate("s1"));
    }
}
