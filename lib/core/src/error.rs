use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the store.
///
/// Absence (document or index entry not found) is never an error; read paths
/// return `Ok(None)` or an empty sequence and the caller decides. Validation
/// failures on property values are also not errors - the value is stored and
/// flagged invalid. Everything here is a genuine failure.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Ambiguous property '{reference}': matches {}", candidates.join(", "))]
    AmbiguousProperty {
        reference: String,
        candidates: Vec<String>,
    },

    #[error("Ambiguous import map: {0}")]
    AmbiguousImportMap(String),

    #[error("Schema already declares an increment field: {0}")]
    DuplicateIncrementField(String),

    #[error("Document already exists: {0}")]
    DocumentExists(String),

    #[error("Thing '{0}' has no schema associations and cannot be saved")]
    NoSchemaAssociation(String),

    #[error("Schema '{schema}' is still in use by thing '{thing}'")]
    SchemaInUse { schema: String, thing: String },

    #[error("Duplicate name '{0}' in import batch")]
    DuplicateInBatch(String),

    #[error("Malformed document: {0}")]
    Document(String),

    #[error("Formula error: {0}")]
    Formula(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
