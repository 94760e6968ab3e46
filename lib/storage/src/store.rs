//! The two providers over one root, sharing one lock table.

use std::path::PathBuf;
use std::sync::Arc;

use curio_core::Result;
use tokio_util::sync::CancellationToken;

use crate::index::PathLocks;
use crate::layout::StoreLayout;
use crate::report::ProgressSink;
use crate::schema_store::SchemaStore;
use crate::thing_store::ThingStore;

/// An open store root. Both providers share the same [`PathLocks`] table,
/// so schema and thing operations on the same index file serialize
/// correctly. Opening does no I/O; directories are created on first write.
#[derive(Debug, Clone)]
pub struct Store {
    layout: StoreLayout,
    schemas: SchemaStore,
    things: ThingStore,
}

impl Store {
    #[must_use]
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let layout = StoreLayout::new(root);
        let locks = Arc::new(PathLocks::default());
        Self {
            schemas: SchemaStore::new(layout.clone(), locks.clone()),
            things: ThingStore::new(layout.clone(), locks),
            layout,
        }
    }

    #[inline]
    #[must_use]
    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    #[inline]
    #[must_use]
    pub fn schemas(&self) -> &SchemaStore {
        &self.schemas
    }

    #[inline]
    #[must_use]
    pub fn things(&self) -> &ThingStore {
        &self.things
    }

    /// Rebuild every derived index from the document set. This is the
    /// recovery path for crashes between a document write and its index
    /// update.
    pub async fn rebuild_indexes(
        &self,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.schemas.rebuild_indexes(sink, cancel).await?;
        self.things.rebuild_indexes(&self.schemas, sink, cancel).await
    }
}
