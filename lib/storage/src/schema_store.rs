//! Schema CRUD and index orchestration.

use std::collections::HashSet;
use std::sync::Arc;

use curio_core::{Error, Reference, Result, Schema, SchemaDocument};
use futures_util::StreamExt;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::index::{Entry, IndexManager, PathLocks};
use crate::layout::StoreLayout;
use crate::persist;
use crate::report::ProgressSink;
use crate::thing_store::ThingStore;

/// CRUD over schema documents plus the name and plural indexes.
#[derive(Debug, Clone)]
pub struct SchemaStore {
    layout: StoreLayout,
    locks: Arc<PathLocks>,
    index: IndexManager,
}

impl SchemaStore {
    pub(crate) fn new(layout: StoreLayout, locks: Arc<PathLocks>) -> Self {
        let index = IndexManager::new(locks.clone());
        Self {
            layout,
            locks,
            index,
        }
    }

    /// Allocate a fresh schema, write its document and index its name.
    /// An existing document at the computed path is an id collision and
    /// fails outright.
    pub async fn create(&self, name: &str, _cancel: &CancellationToken) -> Result<Schema> {
        self.layout.ensure().await?;
        let schema = Schema::new(name)?;
        let path = self.layout.schema_document(schema.id());
        persist::create_json(&self.locks, &path, &schema.to_document()).await?;
        self.index
            .add(
                &self.layout.schema_names_index(),
                schema.name(),
                &StoreLayout::schema_file_name(schema.id()),
            )
            .await;
        debug!(schema = schema.id(), name = schema.name(), "created schema");
        Ok(schema)
    }

    /// Load a schema by id. Absent or corrupt-empty documents are `None`.
    pub async fn load(&self, id: &str) -> Result<Option<Schema>> {
        let path = self.layout.schema_document(id);
        let doc: Option<SchemaDocument> = persist::read_json(&self.locks, &path).await?;
        doc.map(Schema::from_document).transpose()
    }

    /// Write the schema document and refresh its name and plural index rows.
    pub async fn save(&self, schema: &Schema) -> Result<()> {
        self.layout.ensure().await?;
        let path = self.layout.schema_document(schema.id());
        persist::write_json(&self.locks, &path, &schema.to_document()).await?;

        let file_name = StoreLayout::schema_file_name(schema.id());
        let names = self.layout.schema_names_index();
        self.index.remove_by_value(&names, &file_name).await;
        self.index.add(&names, schema.name(), &file_name).await;

        let plurals = self.layout.schema_plurals_index();
        self.index.remove_by_value(&plurals, &file_name).await;
        if let Some(plural) = &schema.plural {
            self.index.add(&plurals, plural, &file_name).await;
        }
        Ok(())
    }

    /// Delete a schema. Refuses while any thing is still a member, naming
    /// the blocking thing; nothing is modified in that case.
    pub async fn delete(
        &self,
        id: &str,
        things: &ThingStore,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let Some(schema) = self.load(id).await? else {
            return Ok(false);
        };
        if let Some(member) = things.get_by_schema(id, cancel).await?.first() {
            let thing_name = match things.load(&member.id).await? {
                Some(thing) => thing.name().to_string(),
                None => member.id.clone(),
            };
            return Err(Error::SchemaInUse {
                schema: schema.name().to_string(),
                thing: thing_name,
            });
        }

        fs::remove_file(self.layout.schema_document(id)).await?;
        let file_name = StoreLayout::schema_file_name(id);
        self.index
            .remove_by_value(&self.layout.schema_names_index(), &file_name)
            .await;
        self.index
            .remove_by_value(&self.layout.schema_plurals_index(), &file_name)
            .await;
        // Per-schema thing indexes are empty by now; drop the files.
        for index in [
            self.layout.membership_index(id),
            self.layout.schema_thing_names_index(id),
            self.layout.increment_index(id),
        ] {
            self.index.rebuild(&index, &[]).await;
        }
        debug!(schema = id, "deleted schema");
        Ok(true)
    }

    /// Exact name lookup (case-insensitive), via the name index.
    pub async fn find_by_name(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Reference>> {
        let wanted = name.to_string();
        let mut hits = self
            .index
            .lookup(
                &self.layout.schema_names_index(),
                move |e| e.key.eq_ignore_ascii_case(&wanted),
                cancel,
            )
            .await;
        Ok(hits.next().await.and_then(|e| Self::to_reference(&e)))
    }

    /// Case-insensitive prefix match against the name index.
    pub async fn find_by_partial_name(
        &self,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Reference>> {
        let wanted = prefix.to_ascii_lowercase();
        let hits = self
            .index
            .lookup(
                &self.layout.schema_names_index(),
                move |e| e.key.to_ascii_lowercase().starts_with(&wanted),
                cancel,
            )
            .await
            .collect::<Vec<_>>()
            .await;
        Ok(hits.iter().filter_map(Self::to_reference).collect())
    }

    /// Exact plural-name lookup (case-insensitive).
    pub async fn find_by_plural_name(
        &self,
        plural: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Reference>> {
        let wanted = plural.to_string();
        let mut hits = self
            .index
            .lookup(
                &self.layout.schema_plurals_index(),
                move |e| e.key.eq_ignore_ascii_case(&wanted),
                cancel,
            )
            .await;
        Ok(hits.next().await.and_then(|e| Self::to_reference(&e)))
    }

    /// Load every schema, in document file-name order.
    pub async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<Schema>> {
        let mut schemas = Vec::new();
        for file_name in self.document_file_names().await? {
            if cancel.is_cancelled() {
                break;
            }
            let Some(id) = StoreLayout::schema_id_of(&file_name) else {
                continue;
            };
            if let Some(schema) = self.load(id).await? {
                schemas.push(schema);
            }
        }
        Ok(schemas)
    }

    /// Reconstruct the name and plural indexes from the document set.
    ///
    /// Duplicate names or plurals keep the first-seen winner; the collision
    /// is reported through the sink, not treated as fatal.
    pub async fn rebuild_indexes(
        &self,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let schemas = self.get_all(cancel).await?;
        let total = schemas.len();
        let mut names = Vec::new();
        let mut plurals = Vec::new();
        let mut seen_names = HashSet::new();
        let mut seen_plurals = HashSet::new();

        for (i, schema) in schemas.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(());
            }
            sink.progress(i + 1, total, schema.name());
            let file_name = StoreLayout::schema_file_name(schema.id());
            if seen_names.insert(schema.name().to_ascii_lowercase()) {
                names.push(Entry::new(schema.name(), file_name.clone()));
            } else {
                sink.warning(&format!(
                    "duplicate schema name {:?}; keeping the first occurrence",
                    schema.name()
                ));
            }
            if let Some(plural) = &schema.plural {
                if seen_plurals.insert(plural.to_ascii_lowercase()) {
                    plurals.push(Entry::new(plural.clone(), file_name));
                } else {
                    sink.warning(&format!(
                        "duplicate schema plural {plural:?}; keeping the first occurrence"
                    ));
                }
            }
        }

        self.index
            .rebuild(&self.layout.schema_names_index(), &names)
            .await;
        self.index
            .rebuild(&self.layout.schema_plurals_index(), &plurals)
            .await;
        sink.done(&format!("rebuilt schema indexes over {total} document(s)"));
        Ok(())
    }

    fn to_reference(entry: &Entry) -> Option<Reference> {
        StoreLayout::schema_id_of(&entry.value).map(Reference::schema)
    }

    /// Sorted schema document file names; sorted so rebuilds are
    /// deterministic.
    async fn document_file_names(&self) -> Result<Vec<String>> {
        let dir = self.layout.schemas_dir();
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if StoreLayout::schema_id_of(&name).is_some() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::NullSink;
    use crate::store::Store;
    use curio_core::{FieldType, RefKind, SchemaField};

    fn open() -> (tempfile::TempDir, Store, CancellationToken) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path());
        (dir, store, CancellationToken::new())
    }

    #[tokio::test]
    async fn create_load_save_round_trip() {
        let (_dir, store, cancel) = open();
        let mut schema = store.schemas().create("Contact", &cancel).await.unwrap();
        schema
            .add_field(SchemaField::required("email", FieldType::Email))
            .unwrap();
        schema.plural = Some("Contacts".into());
        store.schemas().save(&schema).await.unwrap();

        let back = store.schemas().load(schema.id()).await.unwrap().unwrap();
        assert_eq!(back.name(), "Contact");
        assert!(back.field("email").unwrap().required);
        assert_eq!(back.plural.as_deref(), Some("Contacts"));

        assert!(store.schemas().load("no-such-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn name_lookups_are_index_backed() {
        let (_dir, store, cancel) = open();
        let contact = store.schemas().create("Contact", &cancel).await.unwrap();
        store.schemas().create("Task", &cancel).await.unwrap();

        let hit = store
            .schemas()
            .find_by_name("contact", &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.kind, RefKind::Schema);
        assert_eq!(hit.id, contact.id());

        let partial = store
            .schemas()
            .find_by_partial_name("con", &cancel)
            .await
            .unwrap();
        assert_eq!(partial.len(), 1);
        assert!(store
            .schemas()
            .find_by_name("nothing", &cancel)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn plural_lookup_and_rename_keep_indexes_fresh() {
        let (_dir, store, cancel) = open();
        let mut schema = store.schemas().create("Contact", &cancel).await.unwrap();
        schema.plural = Some("People".into());
        store.schemas().save(&schema).await.unwrap();

        assert!(store
            .schemas()
            .find_by_plural_name("people", &cancel)
            .await
            .unwrap()
            .is_some());

        schema.rename("Person").unwrap();
        store.schemas().save(&schema).await.unwrap();
        assert!(store
            .schemas()
            .find_by_name("Contact", &cancel)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .schemas()
            .find_by_name("Person", &cancel)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn delete_refuses_while_things_remain() {
        let (_dir, store, cancel) = open();
        let schema = store.schemas().create("Contact", &cancel).await.unwrap();
        store
            .things()
            .create(store.schemas(), Some(schema.id()), "Alice", &[], None, &cancel)
            .await
            .unwrap();

        let err = store
            .schemas()
            .delete(schema.id(), store.things(), &cancel)
            .await
            .unwrap_err();
        match err {
            Error::SchemaInUse { schema: s, thing } => {
                assert_eq!(s, "Contact");
                assert_eq!(thing, "Alice");
            }
            other => panic!("expected SchemaInUse, got {other:?}"),
        }
        // Nothing was modified.
        assert!(store.schemas().load(schema.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_refuses_even_with_a_truncated_membership_index() {
        let (dir, store, cancel) = open();
        let schema = store.schemas().create("Contact", &cancel).await.unwrap();
        store
            .things()
            .create(store.schemas(), Some(schema.id()), "Alice", &[], None, &cancel)
            .await
            .unwrap();

        // A zero-length membership index must not read as "no members".
        let membership = dir
            .path()
            .join("things")
            .join(format!("_thing.schema.{}.csv", schema.id()));
        std::fs::write(&membership, b"").unwrap();

        let err = store
            .schemas()
            .delete(schema.id(), store.things(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SchemaInUse { .. }));
        assert!(store.schemas().load(schema.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_prunes_everything() {
        let (_dir, store, cancel) = open();
        let schema = store.schemas().create("Contact", &cancel).await.unwrap();
        assert!(store
            .schemas()
            .delete(schema.id(), store.things(), &cancel)
            .await
            .unwrap());
        assert!(store.schemas().load(schema.id()).await.unwrap().is_none());
        assert!(store
            .schemas()
            .find_by_name("Contact", &cancel)
            .await
            .unwrap()
            .is_none());
        // Deleting again is a no-op.
        assert!(!store
            .schemas()
            .delete(schema.id(), store.things(), &cancel)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn rebuild_is_idempotent() {
        let (dir, store, cancel) = open();
        let mut schema = store.schemas().create("Contact", &cancel).await.unwrap();
        schema.plural = Some("Contacts".into());
        store.schemas().save(&schema).await.unwrap();
        store.schemas().create("Task", &cancel).await.unwrap();

        store
            .schemas()
            .rebuild_indexes(&NullSink, &cancel)
            .await
            .unwrap();
        let names_path = dir.path().join("schemas/_schema.names.csv");
        let first = std::fs::read(&names_path).unwrap();
        store
            .schemas()
            .rebuild_indexes(&NullSink, &cancel)
            .await
            .unwrap();
        let second = std::fs::read(&names_path).unwrap();
        assert_eq!(first, second);
        assert!(store
            .schemas()
            .find_by_name("Task", &cancel)
            .await
            .unwrap()
            .is_some());
    }
}
