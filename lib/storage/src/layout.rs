//! Path arithmetic for the on-disk layout.
//!
//! ```text
//! {root}/schemas/{schema-id}.schema.json
//! {root}/schemas/_schema.names.csv
//! {root}/schemas/_schema.plurals.csv
//! {root}/things/{thing-id}.thing.json
//! {root}/things/_thing.names.csv
//! {root}/things/_thing.schema.{schema-id}.csv
//! {root}/things/_thing.names.schema.{schema-id}.csv
//! {root}/things/_thing.inc.schema.{schema-id}.csv
//! ```
//!
//! Index values are document file names, never full paths, so a store root
//! can be moved wholesale.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

const SCHEMA_SUFFIX: &str = ".schema.json";
const THING_SUFFIX: &str = ".thing.json";

/// Pure path helpers over one store root. Cheap to clone, does no I/O apart
/// from [`StoreLayout::ensure`].
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the `schemas/` and `things/` directories if absent.
    pub async fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(self.schemas_dir()).await?;
        fs::create_dir_all(self.things_dir()).await
    }

    #[must_use]
    pub fn schemas_dir(&self) -> PathBuf {
        self.root.join("schemas")
    }

    #[must_use]
    pub fn things_dir(&self) -> PathBuf {
        self.root.join("things")
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    #[must_use]
    pub fn schema_file_name(id: &str) -> String {
        format!("{id}{SCHEMA_SUFFIX}")
    }

    #[must_use]
    pub fn thing_file_name(id: &str) -> String {
        format!("{id}{THING_SUFFIX}")
    }

    #[must_use]
    pub fn schema_document(&self, id: &str) -> PathBuf {
        self.schemas_dir().join(Self::schema_file_name(id))
    }

    #[must_use]
    pub fn thing_document(&self, id: &str) -> PathBuf {
        self.things_dir().join(Self::thing_file_name(id))
    }

    /// The schema id encoded in a document file name, if it is one.
    #[must_use]
    pub fn schema_id_of(file_name: &str) -> Option<&str> {
        file_name.strip_suffix(SCHEMA_SUFFIX).filter(|s| !s.is_empty())
    }

    /// The thing id encoded in a document file name, if it is one.
    #[must_use]
    pub fn thing_id_of(file_name: &str) -> Option<&str> {
        file_name.strip_suffix(THING_SUFFIX).filter(|s| !s.is_empty())
    }

    // ------------------------------------------------------------------
    // Indexes
    // ------------------------------------------------------------------

    #[must_use]
    pub fn schema_names_index(&self) -> PathBuf {
        self.schemas_dir().join("_schema.names.csv")
    }

    #[must_use]
    pub fn schema_plurals_index(&self) -> PathBuf {
        self.schemas_dir().join("_schema.plurals.csv")
    }

    #[must_use]
    pub fn thing_names_index(&self) -> PathBuf {
        self.things_dir().join("_thing.names.csv")
    }

    /// Membership index: thing-id to document file name.
    #[must_use]
    pub fn membership_index(&self, schema_id: &str) -> PathBuf {
        self.things_dir()
            .join(format!("_thing.schema.{schema_id}.csv"))
    }

    /// Per-schema name index: thing name to document file name.
    #[must_use]
    pub fn schema_thing_names_index(&self, schema_id: &str) -> PathBuf {
        self.things_dir()
            .join(format!("_thing.names.schema.{schema_id}.csv"))
    }

    /// Increment-ordinal index, present only for schemas with an increment
    /// field.
    #[must_use]
    pub fn increment_index(&self, schema_id: &str) -> PathBuf {
        self.things_dir()
            .join(format!("_thing.inc.schema.{schema_id}.csv"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_the_layout() {
        let layout = StoreLayout::new("/tmp/db");
        assert_eq!(
            layout.schema_document("s1"),
            PathBuf::from("/tmp/db/schemas/s1.schema.json")
        );
        assert_eq!(
            layout.thing_document("t1"),
            PathBuf::from("/tmp/db/things/t1.thing.json")
        );
        assert_eq!(
            layout.membership_index("s1"),
            PathBuf::from("/tmp/db/things/_thing.schema.s1.csv")
        );
        assert_eq!(
            layout.increment_index("s1"),
            PathBuf::from("/tmp/db/things/_thing.inc.schema.s1.csv")
        );
    }

    #[test]
    fn file_name_carving() {
        assert_eq!(StoreLayout::schema_id_of("s1.schema.json"), Some("s1"));
        assert_eq!(StoreLayout::thing_id_of("t1.thing.json"), Some("t1"));
        assert_eq!(StoreLayout::thing_id_of("s1.schema.json"), None);
        assert_eq!(StoreLayout::schema_id_of(".schema.json"), None);
        assert_eq!(StoreLayout::schema_id_of("_schema.names.csv"), None);
    }
}
