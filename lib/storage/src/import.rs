//! Bulk import of delimited files into things of one schema.
//!
//! Rows flow through a user-chosen import map (column names or `=formulas`
//! per target field). Duplicate names, both within the parsed batch and
//! against the existing store, are handled by one configurable policy.
//! Indexes are rebuilt before the run so duplicate detection is accurate,
//! and again after so the new documents are queryable.

use std::collections::HashMap;
use std::path::Path;

use curio_core::{
    Error, ImportMap, ImportMapItem, Reference, Result, Schema, SetOutcome, Thing, NAME_KEY,
};
use curio_expr::{is_formula, parse, EvalContext, EvalValue, Expr};
use serde_json::json;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::csv;
use crate::report::ProgressSink;
use crate::store::Store;

/// Property under which every imported thing records the shared job id.
pub const IMPORT_JOB_KEY: &str = "ImportJobId";

/// What to do when two rows (or a row and a stored thing) share a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Fail the whole import on the first duplicate.
    Abort,
    /// Keep the first occurrence, drop the rest.
    Skip,
    /// Union the properties; on conflicts the last value wins.
    Merge,
    /// The last occurrence replaces earlier properties wholesale.
    Overwrite,
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub schema_id: String,
    /// Import map to use; `None` requires the schema to have exactly one.
    pub map_name: Option<String>,
    pub delimiter: char,
    pub policy: DuplicatePolicy,
    /// Perform every step except the writes.
    pub dry_run: bool,
}

impl ImportOptions {
    #[must_use]
    pub fn new(schema_id: impl Into<String>) -> Self {
        Self {
            schema_id: schema_id.into(),
            map_name: None,
            delimiter: ',',
            policy: DuplicatePolicy::Abort,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub job_id: String,
    pub created: usize,
    pub merged: usize,
    pub overwritten: usize,
    pub skipped: usize,
    pub dry_run: bool,
}

/// One import run over a store.
pub struct Importer<'a> {
    store: &'a Store,
    sink: &'a dyn ProgressSink,
}

impl<'a> Importer<'a> {
    #[must_use]
    pub fn new(store: &'a Store, sink: &'a dyn ProgressSink) -> Self {
        Self { store, sink }
    }

    pub async fn import_file(
        &self,
        path: &Path,
        options: &ImportOptions,
        cancel: &CancellationToken,
    ) -> Result<ImportReport> {
        let text = fs::read_to_string(path).await?;
        self.import_text(&text, options, cancel).await
    }

    pub async fn import_text(
        &self,
        text: &str,
        options: &ImportOptions,
        cancel: &CancellationToken,
    ) -> Result<ImportReport> {
        // Stale indexes would make duplicate detection lie.
        self.store.rebuild_indexes(self.sink, cancel).await?;

        let schema = self
            .store
            .schemas()
            .load(&options.schema_id)
            .await?
            .ok_or_else(|| Error::Storage(format!("schema {:?} not found", options.schema_id)))?;
        let map = select_map(&schema, options.map_name.as_deref())?;

        let mut records = csv::parse_records(text, options.delimiter);
        let mut report = ImportReport {
            job_id: Uuid::new_v4().to_string(),
            dry_run: options.dry_run,
            ..ImportReport::default()
        };
        if records.is_empty() {
            self.sink.done("import: empty file");
            return Ok(report);
        }
        let header = records.remove(0);
        let (name_item, items) = compile(map, &header)?;

        let candidates = self.collect_batch(
            &records,
            &header,
            &name_item,
            &items,
            options.policy,
            &mut report,
        )?;

        // Resolve every candidate against the store before the first write,
        // so an abort leaves the store untouched.
        let mut resolved = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let existing = self
                .store
                .things()
                .find_by_name(&candidate.name, cancel)
                .await?;
            if existing.is_some() && options.policy == DuplicatePolicy::Abort {
                return Err(Error::Storage(format!(
                    "thing named {:?} already exists",
                    candidate.name
                )));
            }
            resolved.push((candidate, existing));
        }

        let associated = [schema];
        let job_id = report.job_id.clone();
        let total = resolved.len();
        for (i, (candidate, existing)) in resolved.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break; // partial results, not failure
            }
            self.sink.progress(i + 1, total, &candidate.name);
            if let Err(e) = self
                .apply_candidate(candidate, existing, &associated, options, &job_id, &mut report, cancel)
                .await
            {
                // Earlier rows may already be saved; leave the indexes
                // accurate for the next run.
                if !options.dry_run {
                    self.store.rebuild_indexes(self.sink, cancel).await?;
                }
                return Err(e);
            }
        }

        if !options.dry_run {
            self.store.rebuild_indexes(self.sink, cancel).await?;
        }
        self.sink.done(&format!(
            "import {}: {} created, {} merged, {} overwritten, {} skipped{}",
            report.job_id,
            report.created,
            report.merged,
            report.overwritten,
            report.skipped,
            if report.dry_run { " (dry run)" } else { "" },
        ));
        Ok(report)
    }

    /// Parse rows into candidates and collapse same-name collisions within
    /// the batch according to the policy.
    fn collect_batch(
        &self,
        records: &[Vec<String>],
        header: &[String],
        name_item: &CompiledItem,
        items: &[CompiledItem],
        policy: DuplicatePolicy,
        report: &mut ImportReport,
    ) -> Result<Vec<Candidate>> {
        let mut batch: Vec<Candidate> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();

        for record in records {
            let ctx = row_context(header, record);
            let Some(name) = self.extract_value(name_item, record, &ctx)? else {
                self.sink.warning("skipping row without a name");
                report.skipped += 1;
                continue;
            };
            if name.trim().is_empty() {
                self.sink.warning("skipping row without a name");
                report.skipped += 1;
                continue;
            }

            let mut values = Vec::new();
            for item in items {
                if let Some(value) = self.extract_value(item, record, &ctx)? {
                    values.push((item.item.clone(), value));
                }
            }

            match by_name.get(&name.to_ascii_lowercase()) {
                None => {
                    by_name.insert(name.to_ascii_lowercase(), batch.len());
                    batch.push(Candidate { name, values });
                }
                Some(&at) => match policy {
                    DuplicatePolicy::Abort => return Err(Error::DuplicateInBatch(name)),
                    DuplicatePolicy::Skip => {
                        self.sink
                            .warning(&format!("duplicate {name:?} in batch; skipped"));
                        report.skipped += 1;
                    }
                    DuplicatePolicy::Merge => batch[at].values.extend(values),
                    DuplicatePolicy::Overwrite => batch[at].values = values,
                },
            }
        }
        Ok(batch)
    }

    /// Evaluate one map item against a row. `Ok(None)` means "leave the
    /// field alone" (missing input, or invalid input under skip-if-invalid).
    fn extract_value(
        &self,
        item: &CompiledItem,
        record: &[String],
        ctx: &EvalContext,
    ) -> Result<Option<String>> {
        match &item.source {
            ItemSource::Column(at) => {
                let cell = record.get(*at).map(String::as_str).unwrap_or_default();
                if cell.trim().is_empty() && item.item.skip_if_missing {
                    return Ok(None);
                }
                Ok(Some(cell.to_string()))
            }
            ItemSource::Formula(expr) => match expr.evaluate(ctx) {
                Ok(value) => Ok(Some(value.to_text())),
                Err(e) if item.item.skip_if_invalid => {
                    self.sink
                        .warning(&format!("formula for {:?} failed: {e}", item.item.target_field));
                    Ok(None)
                }
                Err(e) => Err(Error::Formula(e.to_string())),
            },
        }
    }

    /// Save one pre-resolved candidate. Abort collisions are rejected
    /// before this runs; the arm here is a guard.
    #[allow(clippy::too_many_arguments)]
    async fn apply_candidate(
        &self,
        candidate: Candidate,
        existing: Option<Reference>,
        associated: &[Schema],
        options: &ImportOptions,
        job_id: &str,
        report: &mut ImportReport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match existing {
            None => {
                if options.dry_run {
                    // Validate against a detached thing; nothing is written.
                    let mut thing = Thing::new(&candidate.name)?;
                    thing.associate(associated[0].id());
                    self.apply_values(&mut thing, &candidate.values, associated)?;
                    report.created += 1;
                    return Ok(());
                }
                let mut thing = self
                    .store
                    .things()
                    .create(
                        self.store.schemas(),
                        Some(associated[0].id()),
                        &candidate.name,
                        &[],
                        None,
                        cancel,
                    )
                    .await?;
                self.apply_values(&mut thing, &candidate.values, associated)?;
                thing.set_raw(IMPORT_JOB_KEY, json!(job_id));
                self.store.things().save(&thing).await?;
                report.created += 1;
            }
            Some(reference) => match options.policy {
                DuplicatePolicy::Abort => {
                    return Err(Error::Storage(format!(
                        "thing named {:?} already exists",
                        candidate.name
                    )))
                }
                DuplicatePolicy::Skip => {
                    self.sink
                        .warning(&format!("{:?} already exists; skipped", candidate.name));
                    report.skipped += 1;
                }
                DuplicatePolicy::Merge | DuplicatePolicy::Overwrite => {
                    let Some(mut thing) = self.store.things().load(&reference.id).await? else {
                        return Err(Error::Storage(format!(
                            "index points at missing thing {:?}",
                            reference.id
                        )));
                    };
                    if options.policy == DuplicatePolicy::Overwrite {
                        strip_properties(&mut thing, associated);
                    }
                    self.apply_values(&mut thing, &candidate.values, associated)?;
                    if !options.dry_run {
                        thing.set_raw(IMPORT_JOB_KEY, json!(job_id));
                        self.store.things().save(&thing).await?;
                    }
                    if options.policy == DuplicatePolicy::Overwrite {
                        report.overwritten += 1;
                    } else {
                        report.merged += 1;
                    }
                }
            },
        }
        Ok(())
    }

    /// Run every mapped value through the validated property path.
    fn apply_values(
        &self,
        thing: &mut Thing,
        values: &[(ImportMapItem, String)],
        schemas: &[Schema],
    ) -> Result<()> {
        for (item, value) in values {
            match thing.set_property(&item.target_field, value, schemas, None) {
                Ok(SetOutcome::Set {
                    true_name,
                    valid: false,
                }) if item.skip_if_invalid => {
                    thing.remove_raw(&true_name);
                    self.sink.warning(&format!(
                        "invalid value for {:?}; skipped",
                        item.target_field
                    ));
                }
                Ok(_) => {}
                Err(e) if item.skip_if_invalid => {
                    self.sink
                        .warning(&format!("could not set {:?}: {e}", item.target_field));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

struct Candidate {
    name: String,
    values: Vec<(ImportMapItem, String)>,
}

enum ItemSource {
    Column(usize),
    Formula(Expr),
}

struct CompiledItem {
    item: ImportMapItem,
    source: ItemSource,
}

/// Pick the import map: by name, or the schema's only one.
fn select_map<'s>(schema: &'s Schema, name: Option<&str>) -> Result<&'s ImportMap> {
    match name {
        Some(name) => schema
            .import_map(name)
            .ok_or_else(|| Error::Storage(format!("no import map named {name:?}"))),
        None => match schema.import_maps.as_slice() {
            [] => Err(Error::Storage(format!(
                "schema {:?} has no import maps",
                schema.name()
            ))),
            [only] => Ok(only),
            maps => Err(Error::AmbiguousImportMap(
                maps.iter()
                    .map(|m| m.name.clone())
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
        },
    }
}

/// Resolve every map item against the header: columns to indexes
/// (case-insensitive), formulas parsed once. The item targeting `Name` is
/// split out since names are handled before ordinary properties.
fn compile(map: &ImportMap, header: &[String]) -> Result<(CompiledItem, Vec<CompiledItem>)> {
    let mut name_item = None;
    let mut items = Vec::new();
    for item in &map.items {
        let source = if is_formula(&item.source) {
            ItemSource::Formula(parse(&item.source).map_err(|e| Error::Formula(e.to_string()))?)
        } else {
            match header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(item.source.trim()))
            {
                Some(at) => ItemSource::Column(at),
                None if item.skip_if_missing => continue,
                None => {
                    return Err(Error::Storage(format!(
                        "import column {:?} not in the file header",
                        item.source
                    )))
                }
            }
        };
        let compiled = CompiledItem {
            item: item.clone(),
            source,
        };
        if item.target_field.eq_ignore_ascii_case(NAME_KEY) {
            name_item = Some(compiled);
        } else {
            items.push(compiled);
        }
    }
    let name_item = name_item.ok_or_else(|| {
        Error::Storage(format!("import map {:?} does not target Name", map.name))
    })?;
    Ok((name_item, items))
}

fn row_context(header: &[String], record: &[String]) -> EvalContext {
    let mut ctx = EvalContext::new();
    for (i, column) in header.iter().enumerate() {
        let cell = record.get(i).map(String::as_str).unwrap_or_default();
        ctx.insert(column.trim(), EvalValue::Text(cell.to_string()));
    }
    ctx
}

/// Drop every stored property except increment ordinals, for the overwrite
/// policy.
fn strip_properties(thing: &mut Thing, schemas: &[Schema]) {
    let keep: Vec<String> = schemas
        .iter()
        .filter_map(|s| {
            s.increment_field()
                .map(|f| curio_core::compose_true_name(s.id(), &f.name))
        })
        .collect();
    let condemned: Vec<String> = thing
        .raw_properties()
        .map(|(k, _)| k.clone())
        .filter(|k| !keep.iter().any(|kept| kept == k))
        .collect();
    for key in condemned {
        thing.remove_raw(&key);
    }
}
