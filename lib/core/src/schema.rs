//! Schemas and their on-disk document envelope.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::field::{FieldDocument, FieldType, SchemaField};
use crate::propname::is_valid_name;

/// Base URL used in the `$id` envelope key. The schema id is the last path
/// segment; the rest is decoration for JSON-Schema tooling.
const ID_BASE: &str = "https://curio.dev/schemas/";
const SCHEMA_URL: &str = "https://json-schema.org/draft/2020-12/schema";

/// One entry of an import map: where a value comes from (a source-file column
/// or an `=formula`) and which schema field it lands in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportMapItem {
    /// Column name from the file header, or a formula starting with `=`.
    pub source: String,
    /// Target schema field name.
    #[serde(rename = "targetField")]
    pub target_field: String,
    #[serde(rename = "skipIfMissing", default)]
    pub skip_if_missing: bool,
    #[serde(rename = "skipIfInvalid", default)]
    pub skip_if_invalid: bool,
}

impl ImportMapItem {
    #[must_use]
    pub fn is_formula(&self) -> bool {
        self.source.starts_with('=')
    }
}

/// A user-defined mapping from external file columns/formulas to schema
/// properties, used during bulk import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportMap {
    pub name: String,
    pub items: Vec<ImportMapItem>,
}

/// A named, user-defined record type: typed field declarations plus metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    id: String,
    name: String,
    pub plural: Option<String>,
    pub description: Option<String>,
    fields: HashMap<String, SchemaField>,
    pub import_maps: Vec<ImportMap>,
    pub version_plan: Option<String>,
}

impl Schema {
    /// Create a schema with a fresh id. Fails if the name is not valid.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::with_id(Uuid::new_v4().to_string(), name)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(Error::InvalidName(name));
        }
        Ok(Self {
            id: id.into(),
            name,
            plural: None,
            description: None,
            fields: HashMap::new(),
            import_maps: Vec::new(),
            version_plan: None,
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
        Ok(())
    }

    /// Case-insensitive field lookup. Keys stay case-sensitive on disk.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields
            .get(name)
            .or_else(|| self.fields.values().find(|f| f.name.eq_ignore_ascii_case(name)))
    }

    pub fn fields(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.values()
    }

    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Add or replace a field declaration.
    ///
    /// At most one field per schema may be the increment kind.
    pub fn add_field(&mut self, field: SchemaField) -> Result<()> {
        if !is_valid_name(&field.name) {
            return Err(Error::InvalidName(field.name));
        }
        if matches!(field.field_type, FieldType::Increment { .. }) {
            if let Some(existing) = self.increment_field() {
                if !existing.name.eq_ignore_ascii_case(&field.name) {
                    return Err(Error::DuplicateIncrementField(existing.name.clone()));
                }
            }
        }
        self.fields.insert(field.name.clone(), field);
        Ok(())
    }

    pub fn remove_field(&mut self, name: &str) -> Option<SchemaField> {
        let key = self
            .fields
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))?
            .clone();
        self.fields.remove(&key)
    }

    /// The schema's increment field, if it declares one.
    #[must_use]
    pub fn increment_field(&self) -> Option<&SchemaField> {
        self.fields
            .values()
            .find(|f| matches!(f.field_type, FieldType::Increment { .. }))
    }

    /// Current `next` counter of the increment field, if any.
    #[must_use]
    pub fn increment_next(&self) -> Option<u64> {
        self.increment_field().and_then(|f| match f.field_type {
            FieldType::Increment { next } => Some(next),
            _ => None,
        })
    }

    /// Advance (or rewind) the increment counter. No-op without an increment field.
    pub fn set_increment_next(&mut self, next: u64) {
        for field in self.fields.values_mut() {
            if let FieldType::Increment { next: n } = &mut field.field_type {
                *n = next;
            }
        }
    }

    /// Find an import map by name (case-insensitive).
    #[must_use]
    pub fn import_map(&self, name: &str) -> Option<&ImportMap> {
        self.import_maps
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    // ------------------------------------------------------------------
    // Document conversion
    // ------------------------------------------------------------------

    #[must_use]
    pub fn to_document(&self) -> SchemaDocument {
        let mut properties = BTreeMap::new();
        let mut required = Vec::new();
        for field in self.fields.values() {
            let mut doc = field.field_type.to_document();
            doc.display_names = field.display_names.clone();
            properties.insert(field.name.clone(), doc);
            if field.required {
                required.push(field.name.clone());
            }
        }
        required.sort();
        SchemaDocument {
            schema_url: SCHEMA_URL.to_string(),
            id_url: format!("{ID_BASE}{}", self.id),
            title: self.name.clone(),
            description: self.description.clone(),
            plural: self.plural.clone(),
            doc_type: "object".to_string(),
            required,
            properties,
            import_maps: self.import_maps.clone(),
            version_plan: self.version_plan.clone(),
        }
    }

    pub fn from_document(doc: SchemaDocument) -> Result<Self> {
        let id = doc
            .id_url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Document(format!("bad $id: {:?}", doc.id_url)))?
            .to_string();
        let mut schema = Schema::with_id(id, doc.title)?;
        schema.description = doc.description;
        schema.plural = doc.plural;
        schema.import_maps = doc.import_maps;
        schema.version_plan = doc.version_plan;
        for (name, field_doc) in &doc.properties {
            let field = SchemaField {
                name: name.clone(),
                field_type: FieldType::from_document(field_doc)?,
                required: doc.required.iter().any(|r| r == name),
                display_names: field_doc.display_names.clone(),
            };
            schema.add_field(field)?;
        }
        Ok(schema)
    }
}

/// On-disk shape of a schema: a JSON-Schema-flavored envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(rename = "$schema")]
    pub schema_url: String,
    #[serde(rename = "$id")]
    pub id_url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(rename = "$plural", skip_serializing_if = "Option::is_none", default)]
    pub plural: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, FieldDocument>,
    #[serde(rename = "importMaps", skip_serializing_if = "Vec::is_empty", default)]
    pub import_maps: Vec<ImportMap>,
    #[serde(rename = "$versionPlan", skip_serializing_if = "Option::is_none", default)]
    pub version_plan: Option<String>,
}
