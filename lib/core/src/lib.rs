//! # curio Core
//!
//! Core data model for the curio object store.
//!
//! This crate provides the fundamental types shared by every other layer:
//!
//! - [`Schema`] - a named set of typed field declarations plus metadata
//! - [`FieldType`] - the closed set of field kinds with validation and coercion
//! - [`Thing`] - a record tagged with zero or more schemas, holding a property bag
//! - [`Reference`] - the universal handle returned by lookups
//!
//! Property resolution - reconciling a user-facing property reference against a
//! thing's stored properties and every associated schema's declared fields -
//! lives on [`Thing`]; see [`Thing::set_property`].
//!
//! ## Example
//!
//! ```rust
//! use curio_core::{Schema, SchemaField, FieldType, Thing, SetOutcome};
//!
//! let mut schema = Schema::new("Contact").unwrap();
//! schema.add_field(SchemaField::required("email", FieldType::Email)).unwrap();
//!
//! let mut thing = Thing::new("Alice").unwrap();
//! thing.associate(schema.id());
//!
//! let outcome = thing.set_property("email", "alice@example.com", &[schema], None).unwrap();
//! assert!(matches!(outcome, SetOutcome::Set { valid: true, .. }));
//! ```

pub mod error;
pub mod field;
pub mod propname;
pub mod reference;
pub mod schema;
pub mod thing;

pub use error::{Error, Result};
pub use field::{FieldType, SchemaField};
pub use propname::{compose_true_name, decompose_true_name, is_valid_name};
pub use reference::{RefKind, Reference};
pub use schema::{ImportMap, ImportMapItem, Schema, SchemaDocument};
pub use thing::{
    ReferenceResolver, SetOutcome, Thing, ThingDocument, ThingProperty, ThingUnsetProperty,
    NAME_KEY,
};
