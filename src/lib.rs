//! Query core for exposing persisted domain models as API resources.
//!
//! Client filter/sort/pagination requests are represented as a typed
//! predicate tree, validated against a metadata store of entity attributes,
//! relationships and derived ("formula") columns, and compiled either to
//! backend-specific SQL (through [`sql_compiler::QueryEngine`]) or evaluated
//! directly against in-memory rows (through [`memory::execute`]).
//!
//! ```
//! use resource_query::metadata::{EntityDescriptor, MetadataStore};
//! use resource_query::parser::parse_filter;
//! use resource_query::sql_compiler::{QueryEngine, QueryRequest};
//! use resource_query::{Dialect, FieldType};
//!
//! let store = MetadataStore::new(vec![
//!     EntityDescriptor::build("book")
//!         .attribute("title", FieldType::String)
//!         .attribute("genre", FieldType::String)
//!         .finish(),
//! ])
//! .unwrap();
//!
//! let ast = parse_filter("title=='Dune*';genre=='SciFi'").unwrap();
//! let filter = store.resolve_filter("book", &ast).unwrap();
//! let engine = QueryEngine::new(&store, Dialect::Postgres);
//! let compiled = engine
//!     .compile("book", &QueryRequest { filter: Some(filter), ..Default::default() })
//!     .unwrap();
//! assert_eq!(compiled.binds.len(), 2);
//! ```

pub mod ast;
pub mod config;
pub mod dialect;
pub mod error;
pub mod expression;
pub mod lexer;
pub mod memory;
pub mod metadata;
pub mod operator;
pub mod parser;
pub mod path;
pub mod sql_compiler;
pub mod token;
pub mod value;

pub use dialect::Dialect;
pub use error::{QueryError, Result};
pub use expression::{Expression, Predicate};
pub use metadata::{EntityDescriptor, MetadataStore};
pub use operator::Operator;
pub use path::{Path, PathElement};
pub use sql_compiler::{CompiledQuery, QueryEngine, QueryRequest};
pub use value::{FieldType, Value};
