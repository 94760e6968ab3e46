use serde::{Deserialize, Serialize};

/// What a [`Reference`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefKind {
    Schema,
    Thing,
    Unknown,
}

/// The universal handle returned by lookups: a kind plus a document id.
///
/// Immutable value type; cheap to clone, compare and print.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub kind: RefKind,
    pub id: String,
}

impl Reference {
    #[inline]
    #[must_use]
    pub fn schema(id: impl Into<String>) -> Self {
        Self {
            kind: RefKind::Schema,
            id: id.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn thing(id: impl Into<String>) -> Self {
        Self {
            kind: RefKind::Thing,
            id: id.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn unknown(id: impl Into<String>) -> Self {
        Self {
            kind: RefKind::Unknown,
            id: id.into(),
        }
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            RefKind::Schema => write!(f, "schema:{}", self.id),
            RefKind::Thing => write!(f, "thing:{}", self.id),
            RefKind::Unknown => write!(f, "unknown:{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind() {
        assert_eq!(Reference::schema("abc").to_string(), "schema:abc");
        assert_eq!(Reference::thing("abc").to_string(), "thing:abc");
    }

    #[test]
    fn references_compare_by_value() {
        assert_eq!(Reference::thing("x"), Reference::thing("x"));
        assert_ne!(Reference::thing("x"), Reference::schema("x"));
    }
}
