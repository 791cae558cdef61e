//! The metadata store: entity descriptors, their attributes, relationships
//! and formula columns, plus the formula reference graph.
//!
//! Descriptors enter through an explicit builder API populated by an
//! external discovery pass; the store itself never scans classes. The store
//! is built once per application or test scope and is immutable afterwards.
//! Acyclicity of formula references is proven at construction and never
//! re-checked per query.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::ast::FilterNode;
use crate::error::{QueryError, Result};
use crate::expression::Expression;
use crate::path::{FieldKind, Path, PathElement};
use crate::value::FieldType;

/// A scalar attribute of an entity. `column` is the physical column name;
/// formula-backed attributes carry a SQL template instead of a real column.
#[derive(Debug, Clone)]
pub struct Attribute {
    name: String,
    field_type: FieldType,
    column: String,
    formula: Option<String>,
}

impl Attribute {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn formula(&self) -> Option<&str> {
        self.formula.as_deref()
    }
}

/// A to-one traversal to another entity, with the join columns that realize
/// it in SQL.
#[derive(Debug, Clone)]
pub struct Relationship {
    name: String,
    target: String,
    local_column: String,
    remote_column: String,
}

impl Relationship {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn local_column(&self) -> &str {
        &self.local_column
    }

    pub fn remote_column(&self) -> &str {
        &self.remote_column
    }
}

/// One registered entity: logical name, physical table, attributes in
/// declaration order, relationships in declaration order.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    name: String,
    table: String,
    attributes: Vec<Attribute>,
    relationships: Vec<Relationship>,
}

impl EntityDescriptor {
    pub fn build(name: impl Into<String>) -> EntityBuilder {
        let name = name.into();
        EntityBuilder {
            table: name.clone(),
            name,
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }
}

/// Builder for [`EntityDescriptor`]. Declaration order is preserved; it
/// drives the deterministic traversal order of the formula graph.
pub struct EntityBuilder {
    name: String,
    table: String,
    attributes: Vec<Attribute>,
    relationships: Vec<Relationship>,
}

impl EntityBuilder {
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// A plain attribute whose column name equals the attribute name.
    pub fn attribute(self, name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        let column = name.clone();
        self.push_attribute(name, field_type, column, None)
    }

    /// A plain attribute with an explicit physical column name.
    pub fn attribute_with_column(
        self,
        name: impl Into<String>,
        field_type: FieldType,
        column: impl Into<String>,
    ) -> Self {
        self.push_attribute(name.into(), field_type, column.into(), None)
    }

    /// A derived column backed by a SQL template. The template references
    /// other columns as `{{field}}` (same entity) or `{{relationship.field}}`
    /// (related entity), and may use the `{{$$CURRENT_DATE}}` /
    /// `{{$$CURRENT_TIMESTAMP}}` dialect tokens.
    pub fn formula(
        self,
        name: impl Into<String>,
        field_type: FieldType,
        template: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let column = name.clone();
        self.push_attribute(name, field_type, column, Some(template.into()))
    }

    /// A to-one relationship joining `<name>_id` to the target's `id`.
    pub fn relationship(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        let name = name.into();
        let local_column = format!("{}_id", name);
        self.relationship_via(name, target, local_column, "id")
    }

    /// A to-one relationship with explicit join columns.
    pub fn relationship_via(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        local_column: impl Into<String>,
        remote_column: impl Into<String>,
    ) -> Self {
        self.relationships.push(Relationship {
            name: name.into(),
            target: target.into(),
            local_column: local_column.into(),
            remote_column: remote_column.into(),
        });
        self
    }

    pub fn finish(self) -> EntityDescriptor {
        EntityDescriptor {
            name: self.name,
            table: self.table,
            attributes: self.attributes,
            relationships: self.relationships,
        }
    }

    fn push_attribute(
        mut self,
        name: String,
        field_type: FieldType,
        column: String,
        formula: Option<String>,
    ) -> Self {
        self.attributes.push(Attribute {
            name,
            field_type,
            column,
            formula,
        });
        self
    }
}

/// One parsed piece of a formula template.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TemplateToken {
    Text(String),
    Column {
        relationship: Option<String>,
        field: String,
    },
    CurrentDate,
    CurrentTimestamp,
}

/// Splits a formula template into literal SQL text and `{{...}}` references.
pub(crate) fn parse_template(template: &str) -> Result<Vec<TemplateToken>> {
    let mut tokens = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        if !rest[..open].is_empty() {
            tokens.push(TemplateToken::Text(rest[..open].to_string()));
        }
        let after = &rest[open + 2..];
        let close = after.find("}}").ok_or_else(|| {
            QueryError::invalid_operation(format!("unclosed placeholder in formula '{}'", template))
        })?;
        let reference = after[..close].trim();
        tokens.push(match reference {
            "$$CURRENT_DATE" => TemplateToken::CurrentDate,
            "$$CURRENT_TIMESTAMP" => TemplateToken::CurrentTimestamp,
            _ => match reference.split_once('.') {
                Some((relationship, field)) if !relationship.is_empty() && !field.contains('.') => {
                    TemplateToken::Column {
                        relationship: Some(relationship.to_string()),
                        field: field.to_string(),
                    }
                }
                Some(_) => {
                    return Err(QueryError::invalid_operation(format!(
                        "placeholder '{}' must be 'field' or 'relationship.field'",
                        reference
                    )))
                }
                None => TemplateToken::Column {
                    relationship: None,
                    field: reference.to_string(),
                },
            },
        });
        rest = &after[close + 2..];
    }
    if !rest.is_empty() {
        tokens.push(TemplateToken::Text(rest.to_string()));
    }
    Ok(tokens)
}

/// Context handed to formula expansion: maps a chain of relationship names
/// (from the root entity occurrence) to the SQL qualifier of that occurrence,
/// and supplies the dialect's date function vocabulary.
pub(crate) trait FormulaContext {
    fn qualifier(&mut self, chain: &[String]) -> Result<String>;

    fn current_date(&self) -> &'static str {
        "CURRENT_DATE"
    }

    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }
}

/// Registry of entity descriptors plus the validated formula graph.
#[derive(Debug)]
pub struct MetadataStore {
    entities: Vec<EntityDescriptor>,
    index: HashMap<String, usize>,
}

impl MetadataStore {
    /// Builds the store and fails fast on duplicate entities, dangling
    /// relationship targets, malformed or dangling formula placeholders, and
    /// formula reference loops.
    pub fn new(entities: Vec<EntityDescriptor>) -> Result<Self> {
        let mut index = HashMap::new();
        for (i, entity) in entities.iter().enumerate() {
            if index.insert(entity.name.clone(), i).is_some() {
                return Err(QueryError::invalid_operation(format!(
                    "duplicate entity '{}'",
                    entity.name
                )));
            }
        }
        let store = MetadataStore { entities, index };
        store.check_references()?;
        store.check_formula_cycles()?;
        // Prove every formula fully expands: after this, compilation can
        // inline any formula without hitting an unresolved placeholder.
        for entity in &store.entities {
            for attribute in &entity.attributes {
                if attribute.formula.is_some() {
                    let expanded = store.resolved_formula(&entity.name, &attribute.name)?;
                    trace!(
                        entity = %entity.name,
                        column = %attribute.name,
                        %expanded,
                        "resolved formula"
                    );
                }
            }
        }
        debug!(entities = store.entities.len(), "metadata store built");
        Ok(store)
    }

    pub fn entities(&self) -> &[EntityDescriptor] {
        &self.entities
    }

    pub fn entity(&self, name: &str) -> Result<&EntityDescriptor> {
        self.index
            .get(name)
            .map(|&i| &self.entities[i])
            .ok_or_else(|| QueryError::invalid_operation(format!("unknown entity '{}'", name)))
    }

    /// Resolves a dotted field access (`publisher.editor.name`) against the
    /// entity graph rooted at `root`. Every non-terminal hop must be a
    /// relationship and the terminal hop a scalar attribute.
    pub fn resolve_path(&self, root: &str, raw: &str) -> Result<Path> {
        if raw.is_empty() {
            return Err(QueryError::invalid_path(raw, "empty path"));
        }
        let mut entity = self.entity(root)?;
        let segments: Vec<&str> = raw.split('.').collect();
        let mut elements = Vec::with_capacity(segments.len());
        for (i, segment) in segments.iter().enumerate() {
            let last = i == segments.len() - 1;
            if let Some(attribute) = entity.attribute(segment) {
                if !last {
                    return Err(QueryError::invalid_path(
                        raw,
                        format!(
                            "'{}' is an attribute of '{}', not a relationship",
                            segment, entity.name
                        ),
                    ));
                }
                elements.push(PathElement::new(
                    entity.name.clone(),
                    attribute.name.clone(),
                    FieldKind::Scalar(attribute.field_type),
                ));
            } else if let Some(relationship) = entity.relationship(segment) {
                if last {
                    return Err(QueryError::invalid_path(
                        raw,
                        format!("path must end in an attribute, not relationship '{}'", segment),
                    ));
                }
                elements.push(PathElement::new(
                    entity.name.clone(),
                    relationship.name.clone(),
                    FieldKind::Relationship {
                        target: relationship.target.clone(),
                    },
                ));
                entity = self.entity(&relationship.target)?;
            } else {
                return Err(QueryError::invalid_path(
                    raw,
                    format!("no field '{}' on entity '{}'", segment, entity.name),
                ));
            }
        }
        Ok(Path::new(elements))
    }

    /// Resolves a raw filter AST (from the text front end or the transport
    /// layer) into a validated expression tree.
    pub fn resolve_filter(&self, root: &str, node: &FilterNode) -> Result<Expression> {
        match node {
            FilterNode::Comparison {
                path,
                operator,
                values,
            } => {
                let path = self.resolve_path(root, path)?;
                Ok(operator.apply(path, values.clone())?.into())
            }
            FilterNode::And(left, right) => Ok(Expression::and(
                self.resolve_filter(root, left)?,
                self.resolve_filter(root, right)?,
            )),
            FilterNode::Or(left, right) => Ok(Expression::or(
                self.resolve_filter(root, left)?,
                self.resolve_filter(root, right)?,
            )),
            FilterNode::Not(inner) => Ok(Expression::not(self.resolve_filter(root, inner)?)),
        }
    }

    /// Fully expands a formula into SQL text qualified by physical table
    /// names (no join aliases). Used to validate templates at build time and
    /// by callers that want the context-free inline text.
    pub fn resolved_formula(&self, entity: &str, attribute: &str) -> Result<String> {
        let entity = self.entity(entity)?;
        let attribute = entity.attribute(attribute).ok_or_else(|| {
            QueryError::invalid_path(
                format!("{}.{}", entity.name, attribute),
                "no such attribute",
            )
        })?;
        let mut ctx = TableContext {
            store: self,
            root: entity,
        };
        self.expand_formula(entity, attribute, &[], &mut ctx)
    }

    /// Recursive formula expansion. `chain` is the relationship chain from
    /// the root entity occurrence to `entity`; the context turns chains into
    /// SQL qualifiers. Recursion terminates because the graph is acyclic.
    pub(crate) fn expand_formula(
        &self,
        entity: &EntityDescriptor,
        attribute: &Attribute,
        chain: &[String],
        ctx: &mut dyn FormulaContext,
    ) -> Result<String> {
        let template = attribute.formula().ok_or_else(|| {
            QueryError::invalid_operation(format!(
                "attribute '{}.{}' is not formula-backed",
                entity.name, attribute.name
            ))
        })?;
        let mut out = String::new();
        for token in parse_template(template)? {
            match token {
                TemplateToken::Text(text) => out.push_str(&text),
                TemplateToken::CurrentDate => out.push_str(ctx.current_date()),
                TemplateToken::CurrentTimestamp => out.push_str(ctx.current_timestamp()),
                TemplateToken::Column {
                    relationship,
                    field,
                } => {
                    let (target, target_chain) = match relationship {
                        None => (entity, chain.to_vec()),
                        Some(rel_name) => {
                            let relationship = entity.relationship(&rel_name).ok_or_else(|| {
                                QueryError::invalid_path(
                                    format!("{}.{}", entity.name, rel_name),
                                    "formula references an unknown relationship",
                                )
                            })?;
                            let mut target_chain = chain.to_vec();
                            target_chain.push(relationship.name.clone());
                            (self.entity(&relationship.target)?, target_chain)
                        }
                    };
                    let referenced = target.attribute(&field).ok_or_else(|| {
                        QueryError::invalid_path(
                            format!("{}.{}", target.name, field),
                            "formula references an unknown attribute",
                        )
                    })?;
                    if referenced.formula().is_some() {
                        let inner =
                            self.expand_formula(target, referenced, &target_chain, ctx)?;
                        out.push_str(&inner);
                    } else {
                        let qualifier = ctx.qualifier(&target_chain)?;
                        out.push_str(&qualifier);
                        out.push('.');
                        out.push_str(&referenced.column);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Validates relationship targets and formula placeholders.
    fn check_references(&self) -> Result<()> {
        for entity in &self.entities {
            for relationship in &entity.relationships {
                if !self.index.contains_key(&relationship.target) {
                    return Err(QueryError::invalid_path(
                        format!("{}.{}", entity.name, relationship.name),
                        format!("relationship target '{}' is not registered", relationship.target),
                    ));
                }
            }
            for attribute in &entity.attributes {
                let Some(template) = attribute.formula() else {
                    continue;
                };
                for token in parse_template(template)? {
                    let TemplateToken::Column {
                        relationship,
                        field,
                    } = token
                    else {
                        continue;
                    };
                    let target = match &relationship {
                        None => entity,
                        Some(rel_name) => {
                            let relationship =
                                entity.relationship(rel_name).ok_or_else(|| {
                                    QueryError::invalid_path(
                                        format!("{}.{}", entity.name, rel_name),
                                        "formula references an unknown relationship",
                                    )
                                })?;
                            self.entity(&relationship.target)?
                        }
                    };
                    if target.attribute(&field).is_none() {
                        return Err(QueryError::invalid_path(
                            format!("{}.{}", target.name, field),
                            format!(
                                "formula on '{}.{}' references an unknown attribute",
                                entity.name, attribute.name
                            ),
                        ));
                    }
                    trace!(
                        from = %format!("{}.{}", entity.name, attribute.name),
                        to = %format!("{}.{}", target.name, field),
                        "formula reference edge"
                    );
                }
            }
        }
        Ok(())
    }

    /// Depth-first traversal of the formula reference graph in insertion
    /// order of entities and declaration order of columns. A node revisited
    /// while still on the traversal stack is a loop; the error message
    /// renders the cycle from the first repetition back to the repeated node
    /// inclusive.
    fn check_formula_cycles(&self) -> Result<()> {
        let mut done = HashSet::new();
        for (ei, entity) in self.entities.iter().enumerate() {
            for (ai, attribute) in entity.attributes.iter().enumerate() {
                if attribute.formula.is_some() {
                    self.visit(ei, ai, &mut Vec::new(), &mut done)?;
                }
            }
        }
        Ok(())
    }

    fn visit(
        &self,
        ei: usize,
        ai: usize,
        stack: &mut Vec<(usize, usize)>,
        done: &mut HashSet<(usize, usize)>,
    ) -> Result<()> {
        if let Some(pos) = stack.iter().position(|&node| node == (ei, ai)) {
            let mut nodes: Vec<String> = stack[pos..].iter().map(|&n| self.node_name(n)).collect();
            nodes.push(self.node_name((ei, ai)));
            return Err(QueryError::FormulaReferenceLoop {
                cycle: nodes.join("->"),
            });
        }
        if done.contains(&(ei, ai)) {
            return Ok(());
        }
        stack.push((ei, ai));
        let entity = &self.entities[ei];
        if let Some(template) = entity.attributes[ai].formula() {
            for token in parse_template(template)? {
                let TemplateToken::Column {
                    relationship,
                    field,
                } = token
                else {
                    continue;
                };
                // Targets were validated by check_references.
                let tei = match &relationship {
                    None => ei,
                    Some(rel_name) => {
                        let target = entity
                            .relationship(rel_name)
                            .map(Relationship::target)
                            .unwrap_or_default();
                        *self.index.get(target).unwrap_or(&ei)
                    }
                };
                let target_entity = &self.entities[tei];
                if let Some(tai) = target_entity
                    .attributes
                    .iter()
                    .position(|a| a.name == field)
                {
                    if target_entity.attributes[tai].formula.is_some() {
                        self.visit(tei, tai, stack, done)?;
                    }
                }
            }
        }
        stack.pop();
        done.insert((ei, ai));
        Ok(())
    }

    fn node_name(&self, (ei, ai): (usize, usize)) -> String {
        let entity = &self.entities[ei];
        format!("{}.{}", entity.name, entity.attributes[ai].name)
    }
}

/// Build-time expansion context: qualifies references with physical table
/// names by walking the relationship chain from the root entity.
struct TableContext<'a> {
    store: &'a MetadataStore,
    root: &'a EntityDescriptor,
}

impl FormulaContext for TableContext<'_> {
    fn qualifier(&mut self, chain: &[String]) -> Result<String> {
        let mut entity = self.root;
        for rel_name in chain {
            let relationship = entity.relationship(rel_name).ok_or_else(|| {
                QueryError::invalid_path(
                    format!("{}.{}", entity.name, rel_name),
                    "unknown relationship",
                )
            })?;
            entity = self.store.entity(&relationship.target)?;
        }
        Ok(entity.table.clone())
    }
}
