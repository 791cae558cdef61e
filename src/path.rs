//! Typed references into the entity graph.
//!
//! A [`Path`] is an ordered chain of field accesses, possibly crossing
//! relationships (`publisher.editor.name`). Paths are produced by
//! [`crate::metadata::MetadataStore::resolve_path`], which checks every hop
//! against the registered entity descriptors; a resolved path is an immutable
//! value object with structural equality and hashing.

use std::fmt;

use crate::value::FieldType;

/// What a single path hop refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// A scalar attribute with its declared type.
    Scalar(FieldType),
    /// A relationship to another entity.
    Relationship { target: String },
}

/// One hop in an entity graph traversal: the owning entity type, the field
/// name on that type, and what the field refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathElement {
    owner_type: String,
    field_name: String,
    field_kind: FieldKind,
}

impl PathElement {
    pub fn new(
        owner_type: impl Into<String>,
        field_name: impl Into<String>,
        field_kind: FieldKind,
    ) -> Self {
        PathElement {
            owner_type: owner_type.into(),
            field_name: field_name.into(),
            field_kind,
        }
    }

    pub fn owner_type(&self) -> &str {
        &self.owner_type
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn field_kind(&self) -> &FieldKind {
        &self.field_kind
    }
}

/// An ordered, non-empty sequence of path elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    elements: Vec<PathElement>,
}

impl Path {
    /// Builds a path from already-resolved elements. Callers outside tests
    /// normally go through the metadata store instead.
    pub fn new(elements: Vec<PathElement>) -> Self {
        debug_assert!(!elements.is_empty(), "a path has at least one element");
        Path { elements }
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    /// The final hop, which for predicate and sort paths is always a scalar
    /// attribute.
    pub fn terminal(&self) -> &PathElement {
        // Non-empty by construction.
        self.elements.last().unwrap()
    }

    /// Declared type of the terminal field, if it is a scalar attribute.
    pub fn terminal_type(&self) -> Option<FieldType> {
        match self.terminal().field_kind {
            FieldKind::Scalar(field_type) => Some(field_type),
            FieldKind::Relationship { .. } => None,
        }
    }

    /// The relationship hops leading up to the terminal field.
    pub fn relationship_prefix(&self) -> &[PathElement] {
        &self.elements[..self.elements.len() - 1]
    }

    /// Dotted field names, `publisher.editor.name`.
    pub fn dotted(&self) -> String {
        self.elements
            .iter()
            .map(|e| e.field_name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn name_path() -> Path {
        Path::new(vec![
            PathElement::new(
                "book",
                "publisher",
                FieldKind::Relationship {
                    target: "publisher".to_string(),
                },
            ),
            PathElement::new("publisher", "name", FieldKind::Scalar(FieldType::String)),
        ])
    }

    #[test]
    fn test_dotted_rendering() {
        assert_eq!(name_path().to_string(), "publisher.name");
    }

    #[test]
    fn test_structural_equality_and_hashing() {
        let mut set = HashSet::new();
        set.insert(name_path());
        set.insert(name_path());
        assert_eq!(set.len(), 1);

        let other = Path::new(vec![PathElement::new(
            "book",
            "title",
            FieldKind::Scalar(FieldType::String),
        )]);
        assert!(!set.contains(&other));
    }

    #[test]
    fn test_terminal_type() {
        assert_eq!(name_path().terminal_type(), Some(FieldType::String));
        assert_eq!(name_path().relationship_prefix().len(), 1);
    }
}
