mod clause;
mod clause_deserializer;
mod parser;
mod translator;

pub use clause::{Clause, DeviceQuery, FieldPath, FieldScope, Literal, Operator};
pub use translator::{QueryError, parse, translate};
