//! AST types for SCIM filters.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use super::error::FilterError;
use super::naming::canonical_identifier;

/// Root filter expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expression {
    /// `userName eq "bjensen"`, `title pr`
    Comparison(ComparisonExpression),

    /// `a eq 1 and b eq 2`
    Logical(LogicalExpression),

    /// `not (a eq 1)`, or a bare `(a eq 1)` with `not` cleared
    Negated(NegatedExpression),

    /// `emails[type eq "work"]`
    ValuePath(ValuePathExpression),
}

/// Attribute predicate: `path op value` or `path pr`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonExpression {
    pub path: AttributePath,
    pub operator: Operator,
    /// Absent only for [`Operator::Present`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ComparisonValue>,
}

/// `left and right` / `left or right`.
///
/// The parser only ever puts an atom on the left; chains lean right, so
/// `a and b or c` is `a and (b or c)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogicalExpression {
    pub left: Box<Expression>,
    pub operator: LogicalOperator,
    pub right: Box<Expression>,
}

impl Drop for LogicalExpression {
    fn drop(&mut self) {
        // Detach the right spine link by link so long chains drop in a loop.
        let mut next = std::mem::replace(&mut *self.right, Expression::vacant());
        loop {
            let Expression::Logical(logical) = &mut next else {
                break;
            };
            let right = std::mem::replace(&mut *logical.right, Expression::vacant());
            next = right;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NegatedExpression {
    pub not: bool,
    pub inner: Box<Expression>,
}

/// Sub-filter scoped to the elements of a multi-valued attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuePathExpression {
    pub path: AttributePath,
    pub filter: Box<Expression>,
}

/// `[schema ":"] name ["." sub_attribute]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AttributePath {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaUri>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_attribute: Option<String>,
}

impl AttributePath {
    pub fn new(name: impl Into<String>) -> Self {
        AttributePath {
            schema: None,
            name: name.into(),
            sub_attribute: None,
        }
    }

    pub fn with_sub_attribute(mut self, sub_attribute: impl Into<String>) -> Self {
        self.sub_attribute = Some(sub_attribute.into());
        self
    }

    pub fn with_schema(mut self, schema: SchemaUri) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Canonical identifier of the attribute name (`userName` -> `user_name`).
    pub fn canonical_name(&self) -> String {
        canonical_identifier(&self.name)
    }

    pub fn canonical_sub_attribute(&self) -> Option<String> {
        self.sub_attribute.as_deref().map(canonical_identifier)
    }
}

/// Schema URNs accepted as attribute path prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SchemaUri {
    /// `urn:ietf:params:scim:schemas:core:2.0:User`
    User,
    /// `urn:ietf:params:scim:schemas:core:2.0:Group`
    Group,
    /// `urn:ietf:params:scim:schemas:extension:{name}:{version}:{resource}`
    Extension {
        name: String,
        version: String,
        resource: String,
    },
}

pub(crate) const SCHEMA_URN_PREFIX: &str = "urn:ietf:params:scim:schemas:";

impl fmt::Display for SchemaUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaUri::User => write!(f, "{SCHEMA_URN_PREFIX}core:2.0:User"),
            SchemaUri::Group => write!(f, "{SCHEMA_URN_PREFIX}core:2.0:Group"),
            SchemaUri::Extension {
                name,
                version,
                resource,
            } => write!(f, "{SCHEMA_URN_PREFIX}extension:{name}:{version}:{resource}"),
        }
    }
}

impl Serialize for SchemaUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Attribute comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    Co,
    Sw,
    Ew,
    Gt,
    Lt,
    Ge,
    Le,
    #[serde(rename = "pr")]
    Present,
}

impl Operator {
    pub fn keyword(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Co => "co",
            Operator::Sw => "sw",
            Operator::Ew => "ew",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Ge => "ge",
            Operator::Le => "le",
            Operator::Present => "pr",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    pub fn keyword(self) -> &'static str {
        match self {
            LogicalOperator::And => "and",
            LogicalOperator::Or => "or",
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ComparisonValue {
    Boolean(bool),
    Null,
    Number(serde_json::Number),
    String(String),
}

impl ComparisonValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ComparisonValue::Boolean(b) => serde_json::Value::Bool(*b),
            ComparisonValue::Null => serde_json::Value::Null,
            ComparisonValue::Number(n) => serde_json::Value::Number(n.clone()),
            ComparisonValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ComparisonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // JSON text is valid filter literal text for every variant.
        write!(f, "{}", self.to_json())
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{schema}:")?;
        }
        write!(f, "{}", self.name)?;
        if let Some(sub) = &self.sub_attribute {
            write!(f, ".{sub}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Comparison(expr) => match &expr.value {
                Some(value) => write!(f, "{} {} {}", expr.path, expr.operator, value),
                None => write!(f, "{} {}", expr.path, expr.operator),
            },
            Expression::Logical(_) => {
                let mut current = self;
                while let Expression::Logical(expr) = current {
                    // A hand-built logical left operand needs grouping to re-parse.
                    if matches!(*expr.left, Expression::Logical(_)) {
                        write!(f, "({}) {} ", expr.left, expr.operator)?;
                    } else {
                        write!(f, "{} {} ", expr.left, expr.operator)?;
                    }
                    current = &expr.right;
                }
                write!(f, "{current}")
            }
            Expression::Negated(expr) if expr.not => write!(f, "not ({})", expr.inner),
            Expression::Negated(expr) => write!(f, "({})", expr.inner),
            Expression::ValuePath(expr) => write!(f, "{}[{}]", expr.path, expr.filter),
        }
    }
}

impl FromStr for Expression {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        super::parse(s)
    }
}

impl Expression {
    /// Placeholder left behind when a subtree is detached; owns no heap data.
    fn vacant() -> Expression {
        Expression::Comparison(ComparisonExpression {
            path: AttributePath::new(String::new()),
            operator: Operator::Present,
            value: None,
        })
    }

    /// Attribute paths referenced by the filter, in source order.
    pub fn attribute_paths(&self) -> Vec<&AttributePath> {
        let mut paths = Vec::new();
        let mut pending = vec![self];
        while let Some(expr) = pending.pop() {
            match expr {
                Expression::Comparison(cmp) => paths.push(&cmp.path),
                Expression::Logical(logical) => {
                    pending.push(&logical.right);
                    pending.push(&logical.left);
                }
                Expression::Negated(negated) => pending.push(&negated.inner),
                Expression::ValuePath(value_path) => {
                    paths.push(&value_path.path);
                    pending.push(&value_path.filter);
                }
            }
        }
        paths
    }
}
