//! # curio Storage
//!
//! File-backed persistence for the curio object store.
//!
//! One filesystem root holds a `schemas/` and a `things/` directory. Every
//! schema and thing is an individual JSON document; flat CSV index files
//! (name lookup, plural lookup, per-schema membership, increment ordinals)
//! sit alongside the documents so lookups never need a full-directory scan.
//! Indexes are derived state: [`Store::rebuild_indexes`] reconstructs all of
//! them from the document set and is the authoritative recovery path.
//!
//! Concurrency is in-process only. Each index file is guarded by a per-path
//! counting semaphore (capacity 2): readers take one permit, writers take
//! both. Nothing here protects against other processes touching the files.
//!
//! ## Example
//!
//! ```rust,no_run
//! use curio_storage::Store;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> curio_core::Result<()> {
//! let store = Store::open("/var/lib/curio");
//! let cancel = CancellationToken::new();
//! let schema = store.schemas().create("Contact", &cancel).await?;
//! let thing = store
//!     .things()
//!     .create(store.schemas(), Some(schema.id()), "Alice", &[], None, &cancel)
//!     .await?;
//! assert_eq!(thing.name(), "Alice");
//! # Ok(())
//! # }
//! ```

pub mod csv;
pub mod import;
pub mod index;
pub mod layout;
mod persist;
pub mod report;
pub mod schema_store;
pub mod store;
pub mod thing_store;

pub use import::{DuplicatePolicy, ImportOptions, ImportReport, Importer};
pub use index::{Entry, IndexManager, PathLocks};
pub use layout::StoreLayout;
pub use report::{NullSink, ProgressSink, TracingSink};
pub use schema_store::SchemaStore;
pub use store::Store;
pub use thing_store::ThingStore;
