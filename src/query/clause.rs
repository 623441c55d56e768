use crate::domain::Number;
use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

const TAGS_PREFIX: &str = "tags.";
const DESIRED_PREFIX: &str = "properties.desired.";
const REPORTED_PREFIX: &str = "properties.reported.";

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum FieldScope {
    Tags,
    Desired,
    Reported,
}

impl FieldScope {
    fn prefix(&self) -> &'static str {
        match self {
            FieldScope::Tags => TAGS_PREFIX,
            FieldScope::Desired => DESIRED_PREFIX,
            FieldScope::Reported => REPORTED_PREFIX,
        }
    }
}

/// A dotted path into the addressable part of a device twin.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct FieldPath {
    scope: FieldScope,
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, String> {
        let (scope, rest) = [FieldScope::Tags, FieldScope::Desired, FieldScope::Reported]
            .into_iter()
            .find_map(|scope| path.strip_prefix(scope.prefix()).map(|rest| (scope, rest)))
            .ok_or_else(|| format!("'{}' must start with one of '{}', '{}' or '{}'", path, TAGS_PREFIX, DESIRED_PREFIX, REPORTED_PREFIX))?;

        let segments = rest.split('.').map(str::to_string).collect::<Vec<_>>();
        if let Some(segment) = segments.iter().find(|segment| !is_valid_segment(segment)) {
            return Err(format!("'{}' contains an invalid segment '{}'", path, segment));
        }

        Ok(FieldPath { scope, segments })
    }

    pub fn scope(&self) -> FieldScope {
        self.scope
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$'),
        _ => false,
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.scope.prefix(), self.segments.join("."))
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    /// Looks up an operator by its structured-clause name (`EQ`, `NE`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "EQ" => Some(Operator::Eq),
            "NE" => Some(Operator::Ne),
            "LT" => Some(Operator::Lt),
            "LE" => Some(Operator::Le),
            "GT" => Some(Operator::Gt),
            "GE" => Some(Operator::Ge),
            _ => None,
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(Operator::Eq),
            "!=" | "<>" => Some(Operator::Ne),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Le),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Ge),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }

    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum Literal {
    String(String),
    Number(Number),
    Boolean(bool),
}

impl Literal {
    pub fn string(value: impl Into<String>) -> Self {
        Literal::String(value.into())
    }

    pub fn number(value: Number) -> Result<Self, String> {
        if !value.is_finite() {
            return Err(format!("number {} is not finite", value));
        }
        Ok(Literal::Number(value))
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            // Backslashes are escaped before quotes
            Literal::String(value) => write!(f, "'{}'", value.replace('\\', "\\\\").replace('\'', "\\'")),
            Literal::Number(value) => write!(f, "{}", value),
            Literal::Boolean(value) => write!(f, "{}", value),
        }
    }
}

#[derive(PartialEq, Debug, Clone, Deserialize)]
pub struct Clause {
    #[serde(rename = "Key", alias = "key")]
    pub field: FieldPath,
    #[serde(rename = "Operator", alias = "operator")]
    pub operator: Operator,
    #[serde(rename = "Value", alias = "value")]
    pub value: Literal,
}

impl Display for Clause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator.symbol(), self.value)
    }
}

/// A validated device query: a conjunction of clauses, empty meaning all devices.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct DeviceQuery {
    clauses: Vec<Clause>,
}

impl DeviceQuery {
    pub fn all() -> Self {
        DeviceQuery::default()
    }

    pub fn new(clauses: Vec<Clause>) -> Self {
        DeviceQuery { clauses }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_match_all(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn where_clause(&self) -> Option<String> {
        if self.clauses.is_empty() {
            return None;
        }
        Some(self.clauses.iter().map(Clause::to_string).collect::<Vec<_>>().join(" AND "))
    }

    /// Renders the query in the registry's native SQL-like query language.
    pub fn to_native(&self) -> String {
        match self.where_clause() {
            Some(condition) => format!("SELECT * FROM devices WHERE {}", condition),
            None => "SELECT * FROM devices".to_string(),
        }
    }
}
