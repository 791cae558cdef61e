//! Backend-specific syntax rules consulted during compilation.
//!
//! Identifier quoting and the pagination clause are delegated to the
//! matching sea-query builder; the dialect additionally owns the date/time
//! function vocabulary substituted into formula templates.

use sea_query::{
    DeleteStatement, MysqlQueryBuilder, PostgresQueryBuilder, SelectStatement, SqliteQueryBuilder,
    Values,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::Postgres, Dialect::MySql, Dialect::Sqlite];

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }

    pub fn from_name(name: &str) -> Option<Dialect> {
        match name.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "mysql" => Some(Dialect::MySql),
            "sqlite" => Some(Dialect::Sqlite),
            _ => None,
        }
    }

    /// Function/keyword yielding the current date.
    pub fn current_date(&self) -> &'static str {
        match self {
            Dialect::Postgres | Dialect::MySql => "CURRENT_DATE",
            Dialect::Sqlite => "DATE('now')",
        }
    }

    /// Function/keyword yielding the current timestamp.
    pub fn current_timestamp(&self) -> &'static str {
        match self {
            Dialect::Postgres => "CURRENT_TIMESTAMP",
            Dialect::MySql => "NOW()",
            Dialect::Sqlite => "DATETIME('now')",
        }
    }

    /// Renders a select statement into fragment text plus ordered bind
    /// values, using this dialect's quoting and pagination syntax.
    pub(crate) fn build_select(&self, statement: &SelectStatement) -> (String, Values) {
        match self {
            Dialect::Postgres => statement.build(PostgresQueryBuilder),
            Dialect::MySql => statement.build(MysqlQueryBuilder),
            Dialect::Sqlite => statement.build(SqliteQueryBuilder),
        }
    }

    pub(crate) fn build_delete(&self, statement: &DeleteStatement) -> (String, Values) {
        match self {
            Dialect::Postgres => statement.build(PostgresQueryBuilder),
            Dialect::MySql => statement.build(MysqlQueryBuilder),
            Dialect::Sqlite => statement.build(SqliteQueryBuilder),
        }
    }
}
