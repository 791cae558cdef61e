//! The in-memory backend: applies a validated request to a slice of JSON
//! rows instead of compiling it to SQL.
//!
//! Filter semantics are shared with the SQL path through the operator
//! catalog, so a request evaluated here returns the same rows as the
//! compiled query would. Aggregate projections are a SQL-only feature.

use std::cmp::Ordering;

use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::error::{QueryError, Result};
use crate::expression::lookup;
use crate::metadata::MetadataStore;
use crate::path::Path;
use crate::sql_compiler::{decode_cursor, Pagination, Projection, QueryRequest, SortDirection};

/// Filters, sorts and windows `rows`, returning owned result rows. Sort and
/// projection paths are validated against the metadata store exactly like in
/// the SQL backend.
pub fn execute(
    metadata: &MetadataStore,
    entity: &str,
    request: &QueryRequest,
    rows: &[JsonValue],
) -> Result<Vec<JsonValue>> {
    let mut sort_keys = Vec::with_capacity(request.sort.len());
    for key in &request.sort {
        let path = metadata.resolve_path(entity, &key.path)?;
        sort_keys.push((path, key.direction));
    }

    let mut projected = Vec::new();
    for projection in &request.projection {
        match projection {
            Projection::Attribute(path) => {
                projected.push(metadata.resolve_path(entity, path)?);
            }
            Projection::Aggregate { .. } => {
                return Err(QueryError::invalid_operation(
                    "aggregate projections are not supported by the in-memory store",
                ));
            }
        }
    }

    let mut selected: Vec<&JsonValue> = rows
        .iter()
        .filter(|row| request.filter.as_ref().map_or(true, |f| f.evaluate(row)))
        .collect();
    debug!(entity, matched = selected.len(), total = rows.len(), "filtered rows");

    selected.sort_by(|a, b| {
        for (path, direction) in &sort_keys {
            let ordering = compare(lookup(a, path), lookup(b, path));
            let ordering = match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    let (skip, take) = window(&request.pagination)?;
    let windowed = selected.into_iter().skip(skip).take(take);

    Ok(if projected.is_empty() {
        windowed.cloned().collect()
    } else {
        windowed.map(|row| project(row, &projected)).collect()
    })
}

fn window(pagination: &Option<Pagination>) -> Result<(usize, usize)> {
    Ok(match pagination {
        None => (0, usize::MAX),
        Some(Pagination::Offset { offset, limit }) => (*offset as usize, *limit as usize),
        Some(Pagination::Cursor { cursor, limit }) => {
            (decode_cursor(cursor)? as usize, *limit as usize)
        }
    })
}

/// Total order over candidate field values: missing values and JSON nulls
/// sort last, numbers numerically, strings lexically, false before true.
fn compare(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (JsonValue::Number(a), JsonValue::Number(b)) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(Ordering::Equal),
            (JsonValue::String(a), JsonValue::String(b)) => a.cmp(b),
            (JsonValue::Bool(a), JsonValue::Bool(b)) => a.cmp(b),
            _ => rank(a).cmp(&rank(b)),
        },
    }
}

fn rank(value: &JsonValue) -> u8 {
    match value {
        JsonValue::Bool(_) => 0,
        JsonValue::Number(_) => 1,
        JsonValue::String(_) => 2,
        _ => 3,
    }
}

/// Narrows a row to the projected paths, keyed by their dotted names.
fn project(row: &JsonValue, paths: &[Path]) -> JsonValue {
    let mut out = Map::new();
    for path in paths {
        let value = lookup(row, path).cloned().unwrap_or(JsonValue::Null);
        out.insert(path.dotted(), value);
    }
    JsonValue::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::EntityDescriptor;
    use crate::parser::parse_filter;
    use crate::sql_compiler::{encode_cursor, SortKey};
    use crate::value::FieldType;
    use serde_json::json;

    fn store() -> MetadataStore {
        MetadataStore::new(vec![
            EntityDescriptor::build("book")
                .attribute("id", FieldType::Int)
                .attribute("title", FieldType::String)
                .attribute("genre", FieldType::String)
                .relationship("publisher", "publisher")
                .finish(),
            EntityDescriptor::build("publisher")
                .attribute("id", FieldType::Int)
                .attribute("name", FieldType::String)
                .finish(),
        ])
        .unwrap()
    }

    fn rows() -> Vec<JsonValue> {
        vec![
            json!({"id": 1, "title": "Dune", "genre": "SciFi",
                   "publisher": {"id": 10, "name": "Chilton"}}),
            json!({"id": 2, "title": "Hyperion", "genre": "SciFi",
                   "publisher": {"id": 11, "name": "Doubleday"}}),
            json!({"id": 3, "title": "Mistborn", "genre": "Fantasy",
                   "publisher": {"id": 12, "name": "Tor"}}),
            json!({"id": 4, "title": "Anathem", "genre": null}),
        ]
    }

    fn request(store: &MetadataStore, text: &str) -> QueryRequest {
        QueryRequest {
            filter: Some(
                store
                    .resolve_filter("book", &parse_filter(text).unwrap())
                    .unwrap(),
            ),
            ..Default::default()
        }
    }

    fn titles(result: &[JsonValue]) -> Vec<&str> {
        result
            .iter()
            .map(|row| row.get("title").and_then(JsonValue::as_str).unwrap_or(""))
            .collect()
    }

    #[test]
    fn test_filter_sort_window_pipeline() {
        let store = store();
        let mut request = request(&store, "genre=in=('SciFi','Fantasy')");
        request.sort = vec![SortKey::desc("title")];
        request.pagination = Some(Pagination::Offset { offset: 1, limit: 2 });
        let result = execute(&store, "book", &request, &rows()).unwrap();
        // Full sorted order is Mistborn, Hyperion, Dune; the window drops
        // the first row and takes two.
        assert_eq!(titles(&result), vec!["Hyperion", "Dune"]);
    }

    #[test]
    fn test_cursor_window_matches_offset_window() {
        let store = store();
        let mut by_offset = request(&store, "genre=isnull=false");
        by_offset.sort = vec![SortKey::asc("id")];
        by_offset.pagination = Some(Pagination::Offset { offset: 1, limit: 10 });
        let mut by_cursor = by_offset.clone();
        by_cursor.pagination = Some(Pagination::Cursor {
            cursor: encode_cursor(1),
            limit: 10,
        });
        assert_eq!(
            execute(&store, "book", &by_offset, &rows()).unwrap(),
            execute(&store, "book", &by_cursor, &rows()).unwrap()
        );
    }

    #[test]
    fn test_relationship_paths_navigate_nested_objects() {
        let store = store();
        let request = request(&store, "publisher.name=='Tor'");
        let result = execute(&store, "book", &request, &rows()).unwrap();
        assert_eq!(titles(&result), vec!["Mistborn"]);
    }

    #[test]
    fn test_null_genre_matches_isnull_only() {
        let store = store();
        let result = execute(&store, "book", &request(&store, "genre=isnull=true"), &rows()).unwrap();
        assert_eq!(titles(&result), vec!["Anathem"]);
        let result = execute(&store, "book", &request(&store, "genre!='SciFi'"), &rows()).unwrap();
        // SQL three-valued logic: a null genre satisfies neither != nor =.
        assert_eq!(titles(&result), vec!["Mistborn"]);
    }

    #[test]
    fn test_projection_narrows_rows() {
        let store = store();
        let mut request = request(&store, "title=='Dune'");
        request.projection = vec![
            Projection::Attribute("title".to_string()),
            Projection::Attribute("publisher.name".to_string()),
        ];
        let result = execute(&store, "book", &request, &rows()).unwrap();
        assert_eq!(
            result,
            vec![json!({"title": "Dune", "publisher.name": "Chilton"})]
        );
    }

    #[test]
    fn test_aggregates_are_rejected() {
        let store = store();
        let request = QueryRequest {
            projection: vec![Projection::Aggregate {
                function: crate::sql_compiler::AggregateFunction::Count,
                path: "id".to_string(),
                alias: "total".to_string(),
            }],
            ..Default::default()
        };
        let err = execute(&store, "book", &request, &rows()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidOperation { .. }));
    }

    #[test]
    fn test_unknown_sort_path_is_rejected() {
        let store = store();
        let request = QueryRequest {
            sort: vec![SortKey::asc("missing")],
            ..Default::default()
        };
        let err = execute(&store, "book", &request, &rows()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidPath { .. }));
    }
}
