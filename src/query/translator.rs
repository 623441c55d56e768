use crate::query::clause::{Clause, DeviceQuery};
use crate::query::parser::parse_clauses;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug, PartialEq)]
pub enum QueryError {
    #[error("invalid query syntax in '{input}': {reason}")]
    InvalidQuerySyntax { input: String, reason: String },
}

impl QueryError {
    fn syntax(input: &str, reason: impl Into<String>) -> Self {
        QueryError::InvalidQuerySyntax {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub fn input(&self) -> &str {
        match self {
            QueryError::InvalidQuerySyntax { input, .. } => input,
        }
    }
}

/// Parses a decoded query, either a filter clause string or a JSON array of
/// `{Key, Operator, Value}` clauses. Blank input and `[]` match every device.
#[instrument(level = "debug")]
pub fn parse(input: &str) -> Result<DeviceQuery, QueryError> {
    let trimmed = input.trim();

    // A JSON encoded string body carries the clause string itself
    if trimmed.starts_with('"') {
        if let Ok(inner) = serde_json::from_str::<String>(trimmed) {
            return parse(&inner);
        }
    }

    let query = if trimmed.is_empty() {
        DeviceQuery::all()
    } else if trimmed.starts_with('[') {
        let clauses = serde_json::from_str::<Vec<Clause>>(trimmed).map_err(|e| QueryError::syntax(input, e.to_string()))?;
        DeviceQuery::new(clauses)
    } else {
        parse_clauses(trimmed).map_err(|reason| QueryError::syntax(input, reason))?
    };

    debug!(clauses = query.clauses().len(), "Parsed query '{}'", input);
    Ok(query)
}

/// Translates a decoded query into the registry's native query string.
pub fn translate(input: &str) -> Result<String, QueryError> {
    parse(input).map(|query| query.to_native())
}
