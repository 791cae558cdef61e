//! Compiles validated query requests into executable SQL using sea-query.
//!
//! The engine walks the expression tree plus sort/pagination/projection
//! requests against the metadata store and produces fragment text, the
//! positional bind parameters (in left-to-right, depth-first order of
//! appearance in the fragment) and the join-alias map. Compilation is a
//! pure, synchronous computation; executing the query belongs to the
//! external store.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sea_query::{
    Asterisk, DeleteStatement, Expr, Func, Iden, JoinType, LikeExpr, Order, SelectStatement,
    SimpleExpr,
};
use tracing::debug;

use crate::dialect::Dialect;
use crate::error::{QueryError, Result};
use crate::expression::{Expression, Predicate};
use crate::metadata::{Attribute, EntityDescriptor, FormulaContext, MetadataStore};
use crate::operator::Operator;
use crate::path::Path;
use crate::value::Value;

/// Identifier wrapper so dynamic table/column/alias names pass through
/// sea-query with the active dialect's quoting.
#[derive(Debug, Clone)]
struct Ident(String);

impl Iden for Ident {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One sort key: a dotted attribute path and a direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub path: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(path: impl Into<String>) -> Self {
        SortKey {
            path: path.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(path: impl Into<String>) -> Self {
        SortKey {
            path: path.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Requested result window.
#[derive(Debug, Clone, PartialEq)]
pub enum Pagination {
    Offset { offset: u64, limit: u64 },
    /// An opaque cursor produced by [`encode_cursor`].
    Cursor { cursor: String, limit: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Avg => "avg",
        }
    }
}

/// One requested output column.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// A (possibly relationship-crossing) attribute path.
    Attribute(String),
    /// An aggregate over an attribute path, exposed under `alias`. Plain
    /// attribute projections become the GROUP BY key.
    Aggregate {
        function: AggregateFunction,
        path: String,
        alias: String,
    },
}

/// A parsed filter/sort/pagination/projection request against one entity.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub filter: Option<Expression>,
    pub sort: Vec<SortKey>,
    pub pagination: Option<Pagination>,
    /// Empty selects every scalar attribute of the target entity.
    pub projection: Vec<Projection>,
}

/// The backend-executable query handed to the external store.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    /// Positional bind parameters, in the order the placeholders appear.
    pub binds: Vec<Value>,
    /// Dotted relationship prefix -> join alias (the root rides as `t0`).
    pub join_aliases: BTreeMap<String, String>,
}

/// Encodes an offset into the opaque cursor format.
pub fn encode_cursor(offset: u64) -> String {
    BASE64.encode(format!("offset:{}", offset))
}

pub(crate) fn decode_cursor(cursor: &str) -> Result<u64> {
    let invalid = || QueryError::invalid_operation(format!("invalid pagination cursor '{}'", cursor));
    let bytes = BASE64.decode(cursor).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    text.strip_prefix("offset:")
        .and_then(|offset| offset.parse().ok())
        .ok_or_else(invalid)
}

/// The query engine: borrows the immutable metadata store for the duration
/// of a compilation and carries the target dialect. Cheap to construct, safe
/// to share across threads.
pub struct QueryEngine<'a> {
    metadata: &'a MetadataStore,
    dialect: Dialect,
}

impl<'a> QueryEngine<'a> {
    pub fn new(metadata: &'a MetadataStore, dialect: Dialect) -> Self {
        QueryEngine { metadata, dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Compiles a full select for `entity`.
    pub fn compile(&self, entity: &str, request: &QueryRequest) -> Result<CompiledQuery> {
        let root = self.metadata.entity(entity)?;
        let mut walk = Walk::select(self.metadata, self.dialect, root);
        let mut statement = SelectStatement::new();
        statement.from_as(Ident(root.table().to_string()), Ident(ROOT_ALIAS.to_string()));

        // The filter is walked first so join registration order follows the
        // left-to-right order of predicates in the tree.
        let condition = match &request.filter {
            Some(filter) => Some(walk.expression(filter)?),
            None => None,
        };

        let has_aggregate = request
            .projection
            .iter()
            .any(|p| matches!(p, Projection::Aggregate { .. }));
        let mut group_keys: Vec<SimpleExpr> = Vec::new();

        if request.projection.is_empty() {
            for attribute in root.attributes() {
                let expr = walk.root_attribute(root, attribute)?;
                statement.expr_as(expr, Ident(attribute.name().to_string()));
            }
        } else {
            for projection in &request.projection {
                match projection {
                    Projection::Attribute(path) => {
                        let path = self.metadata.resolve_path(entity, path)?;
                        let expr: SimpleExpr = walk.operand(&path)?.into();
                        let name = path.terminal().field_name().to_string();
                        statement.expr_as(expr.clone(), Ident(name));
                        group_keys.push(expr);
                    }
                    Projection::Aggregate {
                        function,
                        path,
                        alias,
                    } => {
                        let path = self.metadata.resolve_path(entity, path)?;
                        check_aggregate(*function, &path)?;
                        let operand: SimpleExpr = walk.operand(&path)?.into();
                        let call: SimpleExpr = match function {
                            AggregateFunction::Count => Func::count(operand).into(),
                            AggregateFunction::Sum => Func::sum(operand).into(),
                            AggregateFunction::Min => Func::min(operand).into(),
                            AggregateFunction::Max => Func::max(operand).into(),
                            AggregateFunction::Avg => Func::avg(operand).into(),
                        };
                        statement.expr_as(call, Ident(alias.clone()));
                    }
                }
            }
        }

        for key in &request.sort {
            let path = self.metadata.resolve_path(entity, &key.path)?;
            let expr: SimpleExpr = walk.operand(&path)?.into();
            let order = match key.direction {
                SortDirection::Asc => Order::Asc,
                SortDirection::Desc => Order::Desc,
            };
            statement.order_by_expr(expr, order);
        }

        if let Some(condition) = condition {
            statement.and_where(condition);
        }
        if has_aggregate && !group_keys.is_empty() {
            statement.add_group_by(group_keys);
        }

        match &request.pagination {
            Some(Pagination::Offset { offset, limit }) => {
                statement.limit(*limit);
                if *offset > 0 {
                    statement.offset(*offset);
                }
            }
            Some(Pagination::Cursor { cursor, limit }) => {
                let offset = decode_cursor(cursor)?;
                statement.limit(*limit);
                if offset > 0 {
                    statement.offset(offset);
                }
            }
            None => {}
        }

        walk.apply_joins(&mut statement);
        let (sql, values) = self.dialect.build_select(&statement);
        debug!(entity, %sql, "compiled select");
        Ok(CompiledQuery {
            sql,
            binds: collect_binds(values)?,
            join_aliases: walk.alias_map(),
        })
    }

    /// Compiles `SELECT COUNT(*)` over the filtered row set.
    pub fn compile_count(&self, entity: &str, filter: Option<&Expression>) -> Result<CompiledQuery> {
        let root = self.metadata.entity(entity)?;
        let mut walk = Walk::select(self.metadata, self.dialect, root);
        let mut statement = SelectStatement::new();
        statement.from_as(Ident(root.table().to_string()), Ident(ROOT_ALIAS.to_string()));
        statement.expr(Func::count(Expr::col(Asterisk)));
        if let Some(filter) = filter {
            let condition = walk.expression(filter)?;
            statement.and_where(condition);
        }
        walk.apply_joins(&mut statement);
        let (sql, values) = self.dialect.build_select(&statement);
        Ok(CompiledQuery {
            sql,
            binds: collect_binds(values)?,
            join_aliases: walk.alias_map(),
        })
    }

    /// Compiles a bulk delete over the filtered row set. Delete filters may
    /// not traverse relationships; columns are qualified by table name.
    pub fn compile_delete(&self, entity: &str, filter: Option<&Expression>) -> Result<CompiledQuery> {
        let root = self.metadata.entity(entity)?;
        let mut walk = Walk::delete(self.metadata, self.dialect, root);
        let mut statement = DeleteStatement::new();
        statement.from_table(Ident(root.table().to_string()));
        if let Some(filter) = filter {
            let condition = walk.expression(filter)?;
            statement.and_where(condition);
        }
        let (sql, values) = self.dialect.build_delete(&statement);
        debug!(entity, %sql, "compiled delete");
        Ok(CompiledQuery {
            sql,
            binds: collect_binds(values)?,
            join_aliases: BTreeMap::new(),
        })
    }
}

const ROOT_ALIAS: &str = "t0";

fn check_aggregate(function: AggregateFunction, path: &Path) -> Result<()> {
    let Some(field_type) = path.terminal_type() else {
        return Err(QueryError::invalid_path(
            path.dotted(),
            "aggregate path must end in a scalar attribute",
        ));
    };
    let supported = match function {
        AggregateFunction::Count => true,
        AggregateFunction::Sum | AggregateFunction::Avg => field_type.is_numeric(),
        AggregateFunction::Min | AggregateFunction::Max => field_type.is_orderable(),
    };
    if !supported {
        return Err(QueryError::invalid_operation(format!(
            "aggregate {} is not supported for {} field '{}'",
            function.name(),
            field_type,
            path.dotted(),
        )));
    }
    Ok(())
}

fn collect_binds(values: sea_query::Values) -> Result<Vec<Value>> {
    values.0.into_iter().map(Value::try_from).collect()
}

/// One registered join clause, in first-use order.
struct JoinClause {
    table: String,
    alias: String,
    parent_alias: String,
    local_column: String,
    remote_column: String,
}

/// Mutable state of a single compilation: the canonical path-prefix-to-alias
/// cache and the join list it feeds.
struct Walk<'a> {
    metadata: &'a MetadataStore,
    dialect: Dialect,
    root: &'a EntityDescriptor,
    /// Qualifier for root-entity columns: the `t0` alias for selects, the
    /// bare table name for deletes.
    root_qualifier: String,
    joins_allowed: bool,
    aliases: Vec<(String, String)>,
    joins: Vec<JoinClause>,
    counter: usize,
}

impl<'a> Walk<'a> {
    fn select(metadata: &'a MetadataStore, dialect: Dialect, root: &'a EntityDescriptor) -> Self {
        Walk {
            metadata,
            dialect,
            root,
            root_qualifier: ROOT_ALIAS.to_string(),
            joins_allowed: true,
            aliases: Vec::new(),
            joins: Vec::new(),
            counter: 0,
        }
    }

    fn delete(metadata: &'a MetadataStore, dialect: Dialect, root: &'a EntityDescriptor) -> Self {
        Walk {
            metadata,
            dialect,
            root,
            root_qualifier: root.table().to_string(),
            joins_allowed: false,
            aliases: Vec::new(),
            joins: Vec::new(),
            counter: 0,
        }
    }

    /// Recursive descent over the expression tree. Composites are built with
    /// sea-query's binary operators, which parenthesize nested composites in
    /// the rendered fragment; `Not` wraps its child in a negation clause.
    fn expression(&mut self, expression: &Expression) -> Result<SimpleExpr> {
        match expression {
            Expression::Predicate(predicate) => self.predicate(predicate),
            Expression::And(left, right) => {
                let left = self.expression(left)?;
                let right = self.expression(right)?;
                Ok(left.and(right))
            }
            Expression::Or(left, right) => {
                let left = self.expression(left)?;
                let right = self.expression(right)?;
                Ok(left.or(right))
            }
            Expression::Not(inner) => {
                let inner = self.expression(inner)?;
                Ok(inner.not())
            }
        }
    }

    fn predicate(&mut self, predicate: &Predicate) -> Result<SimpleExpr> {
        let column = self.operand(predicate.path())?;
        let values = predicate.values();
        let single = || -> Result<sea_query::Value> {
            values
                .first()
                .map(Into::into)
                .ok_or_else(|| QueryError::invalid_operation("predicate is missing its value"))
        };
        let pattern = |wrap: fn(&str) -> String| -> Result<LikeExpr> {
            let value = values
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| QueryError::invalid_operation("match operator needs a string"))?;
            Ok(LikeExpr::new(wrap(&escape_like(value))).escape('\\'))
        };
        let expr = match predicate.operator() {
            Operator::Eq => column.eq(single()?),
            Operator::Ne => column.ne(single()?),
            Operator::Lt => column.lt(single()?),
            Operator::Le => column.lte(single()?),
            Operator::Gt => column.gt(single()?),
            Operator::Ge => column.gte(single()?),
            Operator::In => column.is_in(values.iter().map(sea_query::Value::from)),
            Operator::NotIn => column.is_not_in(values.iter().map(sea_query::Value::from)),
            Operator::Prefix => column.like(pattern(|v| format!("{}%", v))?),
            Operator::Postfix => column.like(pattern(|v| format!("%{}", v))?),
            Operator::Infix => column.like(pattern(|v| format!("%{}%", v))?),
            Operator::IsNull => column.is_null(),
            Operator::NotNull => column.is_not_null(),
        };
        Ok(expr)
    }

    /// The SQL operand for a resolved path: a qualified column reference, or
    /// the inlined expansion when the terminal attribute is formula-backed.
    fn operand(&mut self, path: &Path) -> Result<Expr> {
        let chain: Vec<String> = path
            .relationship_prefix()
            .iter()
            .map(|e| e.field_name().to_string())
            .collect();
        let owner = self.entity_at(&chain)?;
        let terminal = path.terminal();
        let attribute = owner.attribute(terminal.field_name()).ok_or_else(|| {
            QueryError::invalid_path(
                path.dotted(),
                format!(
                    "no field '{}' on entity '{}'",
                    terminal.field_name(),
                    owner.name()
                ),
            )
        })?;
        if attribute.formula().is_some() {
            let metadata = self.metadata;
            let sql = metadata.expand_formula(owner, attribute, &chain, self)?;
            debug!(path = %path, %sql, "inlined formula");
            Ok(Expr::expr(Expr::cust(sql)))
        } else {
            let qualifier = self.alias_for(&chain)?;
            Ok(Expr::col((
                Ident(qualifier),
                Ident(attribute.column().to_string()),
            )))
        }
    }

    /// Operand for a root-entity attribute, used by the default projection.
    fn root_attribute(
        &mut self,
        root: &'a EntityDescriptor,
        attribute: &'a Attribute,
    ) -> Result<Expr> {
        if attribute.formula().is_some() {
            let metadata = self.metadata;
            let sql = metadata.expand_formula(root, attribute, &[], self)?;
            Ok(Expr::expr(Expr::cust(sql)))
        } else {
            Ok(Expr::col((
                Ident(self.root_qualifier.clone()),
                Ident(attribute.column().to_string()),
            )))
        }
    }

    /// Canonical path-prefix-to-alias cache: an alias is created once per
    /// relationship prefix and reused by every later path sharing it, so the
    /// same traversal never produces duplicate joins.
    fn alias_for(&mut self, chain: &[String]) -> Result<String> {
        if chain.is_empty() {
            return Ok(self.root_qualifier.clone());
        }
        if !self.joins_allowed {
            return Err(QueryError::invalid_operation(
                "delete filters must not traverse relationships",
            ));
        }
        let dotted = chain.join(".");
        if let Some((_, alias)) = self.aliases.iter().find(|(prefix, _)| prefix == &dotted) {
            return Ok(alias.clone());
        }
        let parent = &chain[..chain.len() - 1];
        let parent_alias = self.alias_for(parent)?;
        let owner = self.entity_at(parent)?;
        let rel_name = &chain[chain.len() - 1];
        let relationship = owner.relationship(rel_name).ok_or_else(|| {
            QueryError::invalid_path(
                dotted.clone(),
                format!("no relationship '{}' on entity '{}'", rel_name, owner.name()),
            )
        })?;
        let target = self.metadata.entity(relationship.target())?;
        self.counter += 1;
        let alias = format!("t{}", self.counter);
        debug!(prefix = %dotted, alias = %alias, table = target.table(), "registered join");
        self.joins.push(JoinClause {
            table: target.table().to_string(),
            alias: alias.clone(),
            parent_alias,
            local_column: relationship.local_column().to_string(),
            remote_column: relationship.remote_column().to_string(),
        });
        self.aliases.push((dotted, alias.clone()));
        Ok(alias)
    }

    /// Walks the entity graph from the root along a relationship chain.
    fn entity_at(&self, chain: &[String]) -> Result<&'a EntityDescriptor> {
        let mut entity = self.root;
        for rel_name in chain {
            let relationship = entity.relationship(rel_name).ok_or_else(|| {
                QueryError::invalid_path(
                    chain.join("."),
                    format!("no relationship '{}' on entity '{}'", rel_name, entity.name()),
                )
            })?;
            entity = self.metadata.entity(relationship.target())?;
        }
        Ok(entity)
    }

    /// Emits the registered joins, in first-use order.
    fn apply_joins(&self, statement: &mut SelectStatement) {
        for join in &self.joins {
            statement.join_as(
                JoinType::LeftJoin,
                Ident(join.table.clone()),
                Ident(join.alias.clone()),
                Expr::col((
                    Ident(join.parent_alias.clone()),
                    Ident(join.local_column.clone()),
                ))
                .equals((Ident(join.alias.clone()), Ident(join.remote_column.clone()))),
            );
        }
    }

    fn alias_map(&self) -> BTreeMap<String, String> {
        self.aliases.iter().cloned().collect()
    }
}

impl FormulaContext for Walk<'_> {
    fn qualifier(&mut self, chain: &[String]) -> Result<String> {
        self.alias_for(chain)
    }

    fn current_date(&self) -> &'static str {
        self.dialect.current_date()
    }

    fn current_timestamp(&self) -> &'static str {
        self.dialect.current_timestamp()
    }
}

/// Escapes LIKE wildcards so match operators compare literally, mirroring
/// the in-memory `starts_with`/`ends_with`/`contains` semantics.
fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
