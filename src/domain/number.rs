use std::cmp::Ordering;
use std::fmt::Display;

#[derive(Clone, Debug)]
pub enum Number {
    PositiveInt(u64),
    NegativeInt(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::PositiveInt(n) => *n as f64,
            Number::NegativeInt(n) => *n as f64,
            Number::Float(n) => *n,
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            Number::Float(n) => n.is_finite(),
            _ => true,
        }
    }
}

impl From<&serde_json::Number> for Number {
    fn from(value: &serde_json::Number) -> Self {
        if let Some(n) = value.as_u64() {
            Number::PositiveInt(n)
        } else if let Some(n) = value.as_i64() {
            Number::NegativeInt(n)
        } else {
            Number::Float(value.as_f64().unwrap_or(f64::NAN))
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            // Integer vs Integer
            (Number::PositiveInt(a), Number::PositiveInt(b)) => a.partial_cmp(b),
            (Number::NegativeInt(a), Number::NegativeInt(b)) => a.partial_cmp(b),
            (Number::PositiveInt(a), Number::NegativeInt(b)) => {
                if *b < 0 {
                    Some(Ordering::Greater)
                } else {
                    a.partial_cmp(&(*b as u64))
                }
            }
            (Number::NegativeInt(a), Number::PositiveInt(b)) => {
                if *a < 0 {
                    Some(Ordering::Less)
                } else {
                    (*a as u64).partial_cmp(b)
                }
            }
            // Float vs Anything
            (Number::Float(a), _) => a.partial_cmp(&other.as_f64()),
            (_, Number::Float(b)) => self.as_f64().partial_cmp(b),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::PositiveInt(n) => write!(f, "{}", n),
            Number::NegativeInt(n) => write!(f, "{}", n),
            Number::Float(n) => write!(f, "{}", n),
        }
    }
}
