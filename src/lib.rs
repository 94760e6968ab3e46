//! # curio
//!
//! A schema-driven, file-backed object store.
//!
//! Users define **schemas** (named sets of typed fields) and create
//! **things** (schema-tagged records) whose properties are validated against
//! those schemas. Every schema and thing persists as an individual JSON
//! document; flat CSV index files (name lookup, plural lookup, per-schema
//! membership, increment counters) sit alongside the documents and can
//! always be rebuilt from them.
//!
//! ## Quick Start
//!
//! ### As a CLI
//!
//! ```bash
//! cargo install curio
//! curio --data-dir ./data rebuild-indexes
//! curio --data-dir ./data import contacts.csv --schema Contact
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use curio::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> curio::Result<()> {
//! let store = Store::open("./data");
//! let cancel = CancellationToken::new();
//!
//! // Define a schema
//! let mut schema = store.schemas().create("Contact", &cancel).await?;
//! schema.add_field(SchemaField::required("email", FieldType::Email))?;
//! store.schemas().save(&schema).await?;
//!
//! // Create a thing and set a validated property
//! let mut thing = store
//!     .things()
//!     .create(store.schemas(), Some(schema.id()), "Alice", &[], None, &cancel)
//!     .await?;
//! thing.set_property("email", "alice@example.com", &[schema], None)?;
//! store.things().save(&thing).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! curio is composed of several crates:
//!
//! - [`curio-core`](https://docs.rs/curio-core) - Data model (Schema, Thing, field types, property resolution)
//! - [`curio-expr`](https://docs.rs/curio-expr) - The formula language for calculated fields and imports
//! - [`curio-storage`](https://docs.rs/curio-storage) - Persistence (documents, flat-file indexes, import)
//!
//! ## Features
//!
//! - **Schema-polymorphic things**: a record may carry several schema tags
//! - **Tolerant validation**: invalid values are stored and flagged, never lost
//! - **Rebuildable indexes**: every index reconstructs from the document set
//! - **Dense sequence numbers**: increment fields renumber after deletions
//! - **Formula language**: `=UPPER([Name]) & " - " & [Status]`
//! - **Bulk import**: delimited files with configurable duplicate policies

// Re-export the data model
pub use curio_core::{
    compose_true_name, decompose_true_name, is_valid_name, Error, FieldType, ImportMap,
    ImportMapItem, RefKind, Reference, ReferenceResolver, Result, Schema, SchemaField, SetOutcome,
    Thing, ThingProperty, ThingUnsetProperty, NAME_KEY,
};

// Re-export the expression engine
pub use curio_expr::{parse, EvalContext, EvalError, EvalValue, Expr, ParseError};

// Re-export storage
pub use curio_storage::{
    DuplicatePolicy, Entry, ImportOptions, ImportReport, Importer, IndexManager, NullSink,
    PathLocks, ProgressSink, SchemaStore, Store, StoreLayout, ThingStore, TracingSink,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        DuplicatePolicy, Error, EvalContext, FieldType, ImportOptions, Importer, Reference,
        Result, Schema, SchemaField, SetOutcome, Store, Thing, TracingSink,
    };
}
