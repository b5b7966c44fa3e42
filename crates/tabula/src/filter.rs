//! Query filters.
//!
//! A [`Filter`] is what callers write: comparisons on model field names,
//! nested under AND / OR / NOT. [`build`] checks it against the physical
//! schema and produces a [`PredicateNode`]: the same tree with column names
//! resolved, values coerced to the column type and the structure normalized.
//! Stores only ever see predicate nodes.

use serde::{Deserialize, Serialize};
use tabula_schema::{PhysicalSchema, ScalarType, Table, Value};

use crate::error::QueryError;

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Substring match, text only.
    Contains,
    /// Prefix match, text only.
    StartsWith,
}

impl CompareOp {
    /// The operator's key in the JSON filter form.
    pub fn key(self) -> &'static str {
        match self {
            CompareOp::Eq => "equals",
            CompareOp::Ne => "not",
            CompareOp::Lt => "lt",
            CompareOp::Lte => "lte",
            CompareOp::Gt => "gt",
            CompareOp::Gte => "gte",
            CompareOp::Contains => "contains",
            CompareOp::StartsWith => "startsWith",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "equals" => CompareOp::Eq,
            "not" => CompareOp::Ne,
            "lt" => CompareOp::Lt,
            "lte" => CompareOp::Lte,
            "gt" => CompareOp::Gt,
            "gte" => CompareOp::Gte,
            "contains" => CompareOp::Contains,
            "startsWith" => CompareOp::StartsWith,
            _ => return None,
        })
    }

    fn is_ordering(self) -> bool {
        matches!(
            self,
            CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte
        )
    }

    fn is_text(self) -> bool {
        matches!(self, CompareOp::Contains | CompareOp::StartsWith)
    }
}

/// A filter over model fields, as written by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Matches every record.
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Filter::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lte, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gte, value)
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::Contains, Value::Text(value.into()))
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::StartsWith, Value::Text(value.into()))
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// Parse the structured JSON form.
    ///
    /// ```text
    /// { "AND": [ ... ], "OR": [ ... ], "NOT": { ... },
    ///   "title": "Roughing It",                 // equals
    ///   "publishedYear": { "gt": 2000, "lte": 2020 } }
    /// ```
    ///
    /// Several keys in one object are combined with AND.
    pub fn from_json(json: &serde_json::Value) -> Result<Filter, QueryError> {
        let serde_json::Value::Object(object) = json else {
            return Err(QueryError::MalformedFilter(format!(
                "expected an object, got `{json}`"
            )));
        };

        let mut parts = Vec::new();
        for (key, value) in object {
            match key.as_str() {
                "AND" => parts.push(Filter::And(filter_list(value)?)),
                "OR" => parts.push(Filter::Or(filter_list(value)?)),
                "NOT" => {
                    let inner = match filter_list(value)?.as_slice() {
                        [single] => single.clone(),
                        many => Filter::And(many.to_vec()),
                    };
                    parts.push(Filter::not(inner));
                }
                field => parts.extend(field_filters(field, value)?),
            }
        }

        Ok(match parts.len() {
            1 => parts.remove(0),
            _ => Filter::And(parts),
        })
    }
}

fn filter_list(value: &serde_json::Value) -> Result<Vec<Filter>, QueryError> {
    match value {
        serde_json::Value::Array(items) => items.iter().map(Filter::from_json).collect(),
        single => Ok(vec![Filter::from_json(single)?]),
    }
}

fn field_filters(field: &str, value: &serde_json::Value) -> Result<Vec<Filter>, QueryError> {
    let serde_json::Value::Object(ops) = value else {
        return Ok(vec![Filter::eq(field, Value::from_json(value.clone()))]);
    };

    let known = ops.keys().filter(|k| CompareOp::from_key(k).is_some()).count();
    if known == 0 {
        // A plain object is a JSON value to compare against.
        return Ok(vec![Filter::eq(field, Value::Json(value.clone()))]);
    }
    if known != ops.len() {
        let unknown: Vec<&str> = ops
            .keys()
            .filter(|k| CompareOp::from_key(k).is_none())
            .map(String::as_str)
            .collect();
        return Err(QueryError::MalformedFilter(format!(
            "unknown operator(s) {} on `{field}`",
            unknown.join(", ")
        )));
    }

    Ok(ops
        .iter()
        .filter_map(|(key, operand)| {
            CompareOp::from_key(key)
                .map(|op| Filter::compare(field, op, Value::from_json(operand.clone())))
        })
        .collect())
}

/// A single resolved comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Model field name.
    pub field: String,
    /// Column name.
    pub column: String,
    pub op: CompareOp,
    /// Already coerced to the column type.
    pub value: Value,
}

/// A validated, normalized predicate tree in physical names.
///
/// An empty `And` matches everything; an empty `Or` matches nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PredicateNode {
    Comparison(Comparison),
    And(Vec<PredicateNode>),
    Or(Vec<PredicateNode>),
    Not(Box<PredicateNode>),
}

impl PredicateNode {
    /// The predicate that matches every row.
    pub fn always() -> Self {
        PredicateNode::And(Vec::new())
    }

    /// The predicate that matches no row.
    pub fn never() -> Self {
        PredicateNode::Or(Vec::new())
    }

    pub fn is_always(&self) -> bool {
        matches!(self, PredicateNode::And(children) if children.is_empty())
    }

    /// Column equality on every given column, AND-ed together.
    ///
    /// Used to target a single row by primary key.
    pub fn key(table: &Table, values: impl IntoIterator<Item = (String, Value)>) -> Self {
        let children = values
            .into_iter()
            .map(|(column, value)| {
                let field = table
                    .column(&column)
                    .map(|c| c.field.clone())
                    .unwrap_or_else(|| column.clone());
                PredicateNode::Comparison(Comparison {
                    field,
                    column,
                    op: CompareOp::Eq,
                    value,
                })
            })
            .collect();
        PredicateNode::And(children).normalize()
    }

    /// Flatten nested same-kind combinators, collapse single-child AND / OR
    /// and remove double negation.
    pub fn normalize(self) -> Self {
        match self {
            PredicateNode::Comparison(_) => self,
            PredicateNode::Not(inner) => match (*inner).normalize() {
                PredicateNode::Not(twice) => *twice,
                other => PredicateNode::Not(Box::new(other)),
            },
            PredicateNode::And(children) => {
                let mut flat = Vec::new();
                for child in children.into_iter().map(PredicateNode::normalize) {
                    match child {
                        PredicateNode::And(grand) => flat.extend(grand),
                        other => flat.push(other),
                    }
                }
                collapse(flat, PredicateNode::And)
            }
            PredicateNode::Or(children) => {
                let mut flat = Vec::new();
                for child in children.into_iter().map(PredicateNode::normalize) {
                    match child {
                        PredicateNode::Or(grand) => flat.extend(grand),
                        other => flat.push(other),
                    }
                }
                collapse(flat, PredicateNode::Or)
            }
        }
    }

    pub fn and(self, other: PredicateNode) -> Self {
        PredicateNode::And(vec![self, other]).normalize()
    }

    /// Check that every comparison names a column of `table` under its own
    /// field, with a value of the column's type.
    ///
    /// Catches a predicate built for one model and run against another.
    pub fn check(&self, table: &Table) -> Result<(), QueryError> {
        match self {
            PredicateNode::Comparison(cmp) => {
                let column = table
                    .column(&cmp.column)
                    .filter(|c| c.field == cmp.field)
                    .ok_or_else(|| QueryError::FieldNotFound {
                        model: table.model.clone(),
                        field: cmp.field.clone(),
                    })?;
                cmp.value
                    .coerce_to(column.ty)
                    .map_err(|err| QueryError::TypeMismatch {
                        model: table.model.clone(),
                        field: cmp.field.clone(),
                        reason: err.to_string(),
                    })?;
                Ok(())
            }
            PredicateNode::And(children) | PredicateNode::Or(children) => {
                children.iter().try_for_each(|child| child.check(table))
            }
            PredicateNode::Not(inner) => inner.check(table),
        }
    }
}

fn collapse(
    mut children: Vec<PredicateNode>,
    wrap: fn(Vec<PredicateNode>) -> PredicateNode,
) -> PredicateNode {
    if children.len() == 1 {
        children.remove(0)
    } else {
        wrap(children)
    }
}

/// Validate `filter` against `model` and build its predicate tree.
pub fn build(
    schema: &PhysicalSchema,
    model: &str,
    filter: &Filter,
) -> Result<PredicateNode, QueryError> {
    let table = schema
        .table(model)
        .ok_or_else(|| QueryError::UnknownModel(model.to_string()))?;
    Ok(build_node(table, filter)?.normalize())
}

fn build_node(table: &Table, filter: &Filter) -> Result<PredicateNode, QueryError> {
    Ok(match filter {
        Filter::Compare { field, op, value } => {
            PredicateNode::Comparison(build_comparison(table, field, *op, value)?)
        }
        Filter::And(children) => PredicateNode::And(
            children
                .iter()
                .map(|c| build_node(table, c))
                .collect::<Result<_, _>>()?,
        ),
        Filter::Or(children) => PredicateNode::Or(
            children
                .iter()
                .map(|c| build_node(table, c))
                .collect::<Result<_, _>>()?,
        ),
        Filter::Not(inner) => PredicateNode::Not(Box::new(build_node(table, inner)?)),
    })
}

fn build_comparison(
    table: &Table,
    field: &str,
    op: CompareOp,
    value: &Value,
) -> Result<Comparison, QueryError> {
    let mismatch = |reason: String| QueryError::TypeMismatch {
        model: table.model.clone(),
        field: field.to_string(),
        reason,
    };

    let Some(column) = table.column_for_field(field) else {
        if table.is_relation(field) {
            return Err(mismatch("relation fields cannot be compared".to_string()));
        }
        return Err(QueryError::FieldNotFound {
            model: table.model.clone(),
            field: field.to_string(),
        });
    };

    if value.is_null() && !matches!(op, CompareOp::Eq | CompareOp::Ne) {
        return Err(mismatch(format!("`{}` cannot compare with null", op.key())));
    }
    if op.is_text() && column.ty != ScalarType::Text {
        return Err(mismatch(format!(
            "`{}` needs a text field, not {}",
            op.key(),
            column.ty
        )));
    }
    if op.is_ordering() && !column.ty.is_orderable() {
        return Err(mismatch(format!(
            "`{}` is not defined for {} fields",
            op.key(),
            column.ty
        )));
    }

    let value = value
        .coerce_to(column.ty)
        .map_err(|err| mismatch(err.to_string()))?;

    Ok(Comparison {
        field: field.to_string(),
        column: column.name.clone(),
        op,
        value,
    })
}
