//! Thing CRUD, schema membership and increment bookkeeping.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use curio_core::{
    compose_true_name, Error, Reference, ReferenceResolver, Result, Schema, Thing, ThingDocument,
};
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::index::{Entry, IndexManager, PathLocks};
use crate::layout::StoreLayout;
use crate::persist;
use crate::report::ProgressSink;
use crate::schema_store::SchemaStore;

/// CRUD over thing documents plus the name, membership and increment
/// indexes.
#[derive(Debug, Clone)]
pub struct ThingStore {
    layout: StoreLayout,
    locks: Arc<PathLocks>,
    index: IndexManager,
}

impl ThingStore {
    pub(crate) fn new(layout: StoreLayout, locks: Arc<PathLocks>) -> Self {
        let index = IndexManager::new(locks.clone());
        Self {
            layout,
            locks,
            index,
        }
    }

    /// Create a thing, optionally associated with a schema.
    ///
    /// Writes a minimal document first (exclusive create, so an id collision
    /// is fatal), indexes the name, applies the schema's increment field if
    /// it has one, then applies `initial` through the same validated
    /// property path as an interactive edit. A failure partway through
    /// surfaces the specific error; partially written documents are left in
    /// place for the next index rebuild to reconcile.
    pub async fn create(
        &self,
        schemas: &SchemaStore,
        schema_id: Option<&str>,
        name: &str,
        initial: &[(String, String)],
        resolver: Option<&dyn ReferenceResolver>,
        cancel: &CancellationToken,
    ) -> Result<Thing> {
        self.layout.ensure().await?;
        let mut thing = Thing::new(name)?;
        let path = self.layout.thing_document(thing.id());
        persist::create_json(&self.locks, &path, &thing.to_document()).await?;
        self.index
            .add(
                &self.layout.thing_names_index(),
                thing.name(),
                &StoreLayout::thing_file_name(thing.id()),
            )
            .await;

        let mut associated = Vec::new();
        if let Some(schema_id) = schema_id {
            let schema = schemas
                .load(schema_id)
                .await?
                .ok_or_else(|| Error::Storage(format!("schema {schema_id:?} not found")))?;
            thing.associate(schema.id());
            self.index
                .add(
                    &self.layout.membership_index(schema.id()),
                    thing.id(),
                    &StoreLayout::thing_file_name(thing.id()),
                )
                .await;
            self.apply_increment(schemas, &schema, &mut thing).await?;
            associated.push(schema);
        }

        for (reference, value) in initial {
            if cancel.is_cancelled() {
                break;
            }
            thing.set_property(reference, value, &associated, resolver)?;
        }
        self.save_unchecked(&thing).await?;
        debug!(thing = thing.id(), name = thing.name(), "created thing");
        Ok(thing)
    }

    /// Load a thing by id, migrating legacy document shapes. Absent or
    /// corrupt-empty documents are `None`.
    pub async fn load(&self, id: &str) -> Result<Option<Thing>> {
        let path = self.layout.thing_document(id);
        let doc: Option<ThingDocument> = persist::read_json(&self.locks, &path).await?;
        doc.map(Thing::from_document).transpose()
    }

    /// Write the document and refresh its name index rows. A thing with no
    /// schema association cannot be saved.
    pub async fn save(&self, thing: &Thing) -> Result<()> {
        if thing.schema_ids().is_empty() {
            return Err(Error::NoSchemaAssociation(thing.name().to_string()));
        }
        self.save_unchecked(thing).await
    }

    /// Tag the thing with a schema and index the membership. Idempotent.
    pub async fn associate(&self, thing: &mut Thing, schema: &Schema) -> Result<bool> {
        if !thing.associate(schema.id()) {
            return Ok(false);
        }
        self.save(thing).await?;
        self.index
            .add(
                &self.layout.membership_index(schema.id()),
                thing.id(),
                &StoreLayout::thing_file_name(thing.id()),
            )
            .await;
        Ok(true)
    }

    /// Remove a schema tag and its index rows. Idempotent; refuses to strip
    /// the last association since such a thing could not be saved back.
    pub async fn dissociate(&self, thing: &mut Thing, schema_id: &str) -> Result<bool> {
        if !thing.dissociate(schema_id) {
            return Ok(false);
        }
        if thing.schema_ids().is_empty() {
            thing.associate(schema_id);
            return Err(Error::NoSchemaAssociation(thing.name().to_string()));
        }
        self.save(thing).await?;
        let file_name = StoreLayout::thing_file_name(thing.id());
        self.index
            .remove_by_key(&self.layout.membership_index(schema_id), thing.id())
            .await;
        self.index
            .remove_by_value(&self.layout.schema_thing_names_index(schema_id), &file_name)
            .await;
        Ok(true)
    }

    /// Delete a thing and prune every index that referenced it. Frees the
    /// top increment ordinal for immediate recycling when the thing held it.
    pub async fn delete(
        &self,
        schemas: &SchemaStore,
        id: &str,
        _cancel: &CancellationToken,
    ) -> Result<bool> {
        let Some(thing) = self.load(id).await? else {
            return Ok(false);
        };
        fs::remove_file(self.layout.thing_document(id)).await?;
        let file_name = StoreLayout::thing_file_name(id);
        self.index
            .remove_by_value(&self.layout.thing_names_index(), &file_name)
            .await;

        for schema_id in thing.schema_ids() {
            self.index
                .remove_by_key(&self.layout.membership_index(schema_id), id)
                .await;
            self.index
                .remove_by_value(&self.layout.schema_thing_names_index(schema_id), &file_name)
                .await;

            let Some(mut schema) = schemas.load(schema_id).await? else {
                continue;
            };
            let Some(field_name) = schema.increment_field().map(|f| f.name.clone()) else {
                continue;
            };
            self.index
                .remove_by_value(&self.layout.increment_index(schema_id), &file_name)
                .await;
            let held = thing
                .property(&compose_true_name(schema_id, &field_name))
                .and_then(Value::as_u64);
            if let Some(next) = schema.increment_next() {
                if next > 1 && held == Some(next - 1) {
                    schema.set_increment_next(next - 1);
                    schemas.save(&schema).await?;
                    debug!(schema = schema_id, recycled = next - 1, "recycled increment ordinal");
                }
            }
        }
        debug!(thing = id, "deleted thing");
        Ok(true)
    }

    /// Member things of a schema. Index-backed when the membership index
    /// is usable; otherwise a full scan, logged as a degraded path. A
    /// zero-length index file counts as absent, same as the lookup path.
    pub async fn get_by_schema(
        &self,
        schema_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Reference>> {
        let path = self.layout.membership_index(schema_id);
        let usable = match fs::metadata(&path).await {
            Ok(meta) => meta.len() > 0,
            Err(_) => false,
        };
        if usable {
            let entries = self.index.all(&path, cancel).await;
            return Ok(entries
                .into_iter()
                .map(|e| Reference::thing(e.key))
                .collect());
        }
        warn!(schema = schema_id, "membership index missing or empty; scanning all things");
        let mut members = Vec::new();
        for thing in self.get_all(cancel).await? {
            if thing.schema_ids().iter().any(|s| s == schema_id) {
                members.push(Reference::thing(thing.id().to_string()));
            }
        }
        Ok(members)
    }

    /// Load every thing, in document file-name order.
    pub async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<Thing>> {
        let mut things = Vec::new();
        for file_name in self.document_file_names().await? {
            if cancel.is_cancelled() {
                break;
            }
            let Some(id) = StoreLayout::thing_id_of(&file_name) else {
                continue;
            };
            if let Some(thing) = self.load(id).await? {
                things.push(thing);
            }
        }
        Ok(things)
    }

    /// Exact name lookup (case-insensitive), via the global name index.
    pub async fn find_by_name(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Reference>> {
        let wanted = name.to_string();
        let mut hits = self
            .index
            .lookup(
                &self.layout.thing_names_index(),
                move |e| e.key.eq_ignore_ascii_case(&wanted),
                cancel,
            )
            .await;
        Ok(hits.next().await.and_then(|e| Self::to_reference(&e)))
    }

    /// Case-insensitive prefix match against the global name index.
    pub async fn find_by_partial_name(
        &self,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Reference>> {
        let wanted = prefix.to_ascii_lowercase();
        let hits = self
            .index
            .lookup(
                &self.layout.thing_names_index(),
                move |e| e.key.to_ascii_lowercase().starts_with(&wanted),
                cancel,
            )
            .await
            .collect::<Vec<_>>()
            .await;
        Ok(hits.iter().filter_map(Self::to_reference).collect())
    }

    /// Rebuild the name index and every per-schema membership and name
    /// index from the document set, then renumber every increment field.
    pub async fn rebuild_indexes(
        &self,
        schemas: &SchemaStore,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let things = self.get_all(cancel).await?;
        let total = things.len();
        let mut names = Vec::new();
        let mut membership: BTreeMap<String, Vec<Entry>> = BTreeMap::new();
        let mut per_schema_names: BTreeMap<String, Vec<Entry>> = BTreeMap::new();

        for (i, thing) in things.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(());
            }
            sink.progress(i + 1, total, thing.name());
            let file_name = StoreLayout::thing_file_name(thing.id());
            names.push(Entry::new(thing.name(), file_name.clone()));
            for schema_id in thing.schema_ids() {
                membership
                    .entry(schema_id.clone())
                    .or_default()
                    .push(Entry::new(thing.id(), file_name.clone()));
                per_schema_names
                    .entry(schema_id.clone())
                    .or_default()
                    .push(Entry::new(thing.name(), file_name.clone()));
            }
        }
        self.index
            .rebuild(&self.layout.thing_names_index(), &names)
            .await;

        // Cover every known schema, not just those with members, so stale
        // per-schema index files get deleted.
        let all_schemas = schemas.get_all(cancel).await?;
        let mut schema_ids: BTreeSet<String> =
            all_schemas.iter().map(|s| s.id().to_string()).collect();
        schema_ids.extend(membership.keys().cloned());
        for schema_id in &schema_ids {
            let rows = match membership.get(schema_id) {
                Some(rows) => rows.as_slice(),
                None => &[],
            };
            self.index
                .rebuild(&self.layout.membership_index(schema_id), rows)
                .await;
            let rows = match per_schema_names.get(schema_id) {
                Some(rows) => rows.as_slice(),
                None => &[],
            };
            self.index
                .rebuild(&self.layout.schema_thing_names_index(schema_id), rows)
                .await;
        }

        for schema in &all_schemas {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if schema.increment_field().is_some() {
                self.renumber_increment_field(schemas, schema.id(), cancel)
                    .await?;
            }
        }
        sink.done(&format!("rebuilt thing indexes over {total} document(s)"));
        Ok(())
    }

    /// Reassign dense `1..N` ordinals to a schema's increment field,
    /// ordered by (prior value, creation time), rewrite the increment index
    /// and advance the schema's counter to `N + 1`.
    pub async fn renumber_increment_field(
        &self,
        schemas: &SchemaStore,
        schema_id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some(mut schema) = schemas.load(schema_id).await? else {
            return Ok(());
        };
        let Some(field_name) = schema.increment_field().map(|f| f.name.clone()) else {
            return Ok(());
        };
        let true_name = compose_true_name(schema_id, &field_name);

        let mut things = Vec::new();
        for member in self.get_by_schema(schema_id, cancel).await? {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if let Some(thing) = self.load(&member.id).await? {
                things.push(thing);
            }
        }
        things.sort_by_key(|t| {
            (
                t.property(&true_name).and_then(Value::as_u64).unwrap_or(u64::MAX),
                t.created_on,
            )
        });

        let mut rows = Vec::with_capacity(things.len());
        for (i, thing) in things.iter_mut().enumerate() {
            let ordinal = i as u64 + 1;
            if thing.property(&true_name).and_then(Value::as_u64) != Some(ordinal) {
                thing.set_raw(true_name.clone(), json!(ordinal));
                self.write_document(thing).await?;
            }
            rows.push(Entry::new(
                ordinal.to_string(),
                StoreLayout::thing_file_name(thing.id()),
            ));
        }
        self.index
            .rebuild(&self.layout.increment_index(schema_id), &rows)
            .await;
        schema.set_increment_next(things.len() as u64 + 1);
        schemas.save(&schema).await?;
        debug!(schema = schema_id, count = things.len(), "renumbered increment field");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Assign the schema's next increment ordinal to the thing, advance the
    /// schema's counter and index the ordinal. No-op without an increment
    /// field.
    async fn apply_increment(
        &self,
        schemas: &SchemaStore,
        schema: &Schema,
        thing: &mut Thing,
    ) -> Result<()> {
        let Some(field) = schema.increment_field() else {
            return Ok(());
        };
        let next = schema.increment_next().unwrap_or(1);
        thing.set_raw(compose_true_name(schema.id(), &field.name), json!(next));
        let mut updated = schema.clone();
        updated.set_increment_next(next + 1);
        schemas.save(&updated).await?;
        self.index
            .add(
                &self.layout.increment_index(schema.id()),
                &next.to_string(),
                &StoreLayout::thing_file_name(thing.id()),
            )
            .await;
        Ok(())
    }

    /// Persist without the association check and refresh the name rows
    /// (global and per associated schema), so renames stay queryable.
    async fn save_unchecked(&self, thing: &Thing) -> Result<()> {
        self.write_document(thing).await?;
        let file_name = StoreLayout::thing_file_name(thing.id());
        let names = self.layout.thing_names_index();
        self.index.remove_by_value(&names, &file_name).await;
        self.index.add(&names, thing.name(), &file_name).await;
        for schema_id in thing.schema_ids() {
            let per_schema = self.layout.schema_thing_names_index(schema_id);
            self.index.remove_by_value(&per_schema, &file_name).await;
            self.index
                .add(&per_schema, thing.name(), &file_name)
                .await;
        }
        Ok(())
    }

    async fn write_document(&self, thing: &Thing) -> Result<()> {
        self.layout.ensure().await?;
        let path = self.layout.thing_document(thing.id());
        persist::write_json(&self.locks, &path, &thing.to_document()).await
    }

    fn to_reference(entry: &Entry) -> Option<Reference> {
        StoreLayout::thing_id_of(&entry.value).map(Reference::thing)
    }

    /// Sorted thing document file names, so scans and rebuilds are
    /// deterministic.
    async fn document_file_names(&self) -> Result<Vec<String>> {
        let dir = self.layout.things_dir();
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if StoreLayout::thing_id_of(&name).is_some() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}
