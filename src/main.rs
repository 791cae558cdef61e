//! Interactive driver: reads filter expressions, compiles them against a
//! demo metadata store and prints the SQL, bind parameters and join aliases.

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use resource_query::config::EngineConfig;
use resource_query::dialect::Dialect;
use resource_query::metadata::{EntityDescriptor, MetadataStore};
use resource_query::parser::parse_filter;
use resource_query::sql_compiler::{CompiledQuery, QueryEngine, QueryRequest};
use resource_query::value::FieldType;

const CONFIG_FILE: &str = "resource_query.json";
const ROOT_ENTITY: &str = "book";

/// The demo entity graph: books with a publisher, publishers with an editor,
/// and a derived chapter count on the book.
fn demo_store(config: &EngineConfig) -> Result<MetadataStore> {
    let entities = vec![
        EntityDescriptor::build("book")
            .table(config.table_for("book"))
            .attribute("id", FieldType::Int)
            .attribute("title", FieldType::String)
            .attribute("genre", FieldType::String)
            .attribute("language", FieldType::String)
            .attribute_with_column("publishDate", FieldType::Date, "publish_date")
            .attribute_with_column("editorName", FieldType::String, "editor_name")
            .formula(
                "chapterCount",
                FieldType::Int,
                "(SELECT COUNT(*) FROM book_chapter bc WHERE bc.book_id = {{id}})",
            )
            .relationship("publisher", "publisher")
            .finish(),
        EntityDescriptor::build("publisher")
            .table(config.table_for("publisher"))
            .attribute("id", FieldType::Int)
            .attribute("name", FieldType::String)
            .relationship("editor", "editor")
            .finish(),
        EntityDescriptor::build("editor")
            .table(config.table_for("editor"))
            .attribute("id", FieldType::Int)
            .attribute("name", FieldType::String)
            .finish(),
    ];
    MetadataStore::new(entities).context("building the demo metadata store")
}

fn compile_line(
    store: &MetadataStore,
    dialect: Dialect,
    line: &str,
) -> resource_query::Result<CompiledQuery> {
    let ast = parse_filter(line)?;
    let filter = store.resolve_filter(ROOT_ENTITY, &ast)?;
    let engine = QueryEngine::new(store, dialect);
    engine.compile(
        ROOT_ENTITY,
        &QueryRequest {
            filter: Some(filter),
            ..Default::default()
        },
    )
}

fn print_compiled(compiled: &CompiledQuery) {
    println!("\n[sql]\n{}", compiled.sql);
    if !compiled.binds.is_empty() {
        println!("[binds]");
        for (i, value) in compiled.binds.iter().enumerate() {
            println!("  ${} = {}", i + 1, value);
        }
    }
    if !compiled.join_aliases.is_empty() {
        println!("[joins]");
        for (prefix, alias) in &compiled.join_aliases {
            println!("  {} -> {}", prefix, alias);
        }
    }
    println!();
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match EngineConfig::from_json_file(CONFIG_FILE) {
        Ok(config) => {
            println!("loaded configuration from {}", CONFIG_FILE);
            config
        }
        Err(_) => EngineConfig::default(),
    };
    let dialect = config.dialect().context("reading dialect from config")?;
    let store = demo_store(&config)?;

    println!("--- resource_query: filter-to-SQL compiler ({}) ---", dialect.name());
    println!("entities: book, publisher, editor (root: {})", ROOT_ENTITY);
    println!("examples:");
    println!("  title=='Dune*';(genre=='SciFi',genre=='Fantasy')");
    println!("  publisher.editor.name=='Herbert'");
    println!("  chapterCount=ge=10");
    println!("type :quit to exit\n");

    let mut editor = DefaultEditor::new().context("initializing the line editor")?;
    loop {
        match editor.readline("filter> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == ":quit" || line == ":q" {
                    break;
                }
                let _ = editor.add_history_entry(line);
                match compile_line(&store, dialect, line) {
                    Ok(compiled) => print_compiled(&compiled),
                    Err(e) => println!("error: {}\n", e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("reading input"),
        }
    }

    Ok(())
}
