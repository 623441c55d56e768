use crate::domain::Number;
use crate::query::clause::{FieldPath, Literal, Operator};
use serde::de::{Error, Unexpected};
use serde::{Deserialize, Deserializer};

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        FieldPath::parse(value.trim()).map_err(Error::custom)
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Operator::from_name(&value).ok_or_else(|| Error::invalid_value(Unexpected::Str(&value), &"one of EQ, NE, LT, LE, GT or GE"))
    }
}

impl<'de> Deserialize<'de> for Literal {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: serde_json::Value = Deserialize::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(value) => Ok(Literal::string(value)),
            serde_json::Value::Number(value) => Literal::number(Number::from(&value)).map_err(Error::custom),
            serde_json::Value::Bool(value) => Ok(Literal::Boolean(value)),
            _ => Err(Error::custom("expected the value to be a string, a number or a boolean")),
        }
    }
}
