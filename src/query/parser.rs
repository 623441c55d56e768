use crate::domain::Number;
use crate::query::clause::{Clause, DeviceQuery, FieldPath, Literal, Operator};
use std::iter::Peekable;
use std::str::CharIndices;

#[derive(PartialEq, Debug, Clone)]
enum Token {
    Word(String),
    Operator(Operator),
    Literal(Literal),
    And,
}

/// Parses a filter clause of the form `path op literal (and path op literal)*`.
pub fn parse_clauses(input: &str) -> Result<DeviceQuery, String> {
    let tokens = tokenize(input)?;
    let mut tokens = tokens.into_iter().peekable();
    let mut clauses = Vec::new();

    loop {
        let field = match tokens.next() {
            Some((_, Token::Word(path))) => FieldPath::parse(&path)?,
            Some((position, token)) => return Err(format!("expected a field path at position {}, found {}", position, describe(&token))),
            None => return Err("expected a field path at the end of the query".to_string()),
        };

        let operator = match tokens.next() {
            Some((_, Token::Operator(operator))) => operator,
            Some((position, token)) => return Err(format!("expected an operator after '{}' at position {}, found {}", field, position, describe(&token))),
            None => return Err(format!("expected an operator after '{}'", field)),
        };

        let value = match tokens.next() {
            Some((_, Token::Literal(value))) => value,
            Some((position, token)) => return Err(format!("expected a value after '{} {}' at position {}, found {}", field, operator.symbol(), position, describe(&token))),
            None => return Err(format!("expected a value after '{} {}'", field, operator.symbol())),
        };

        clauses.push(Clause { field, operator, value });

        match tokens.next() {
            None => break,
            Some((_, Token::And)) if tokens.peek().is_some() => continue,
            Some((position, Token::And)) => return Err(format!("expected a clause after 'and' at position {}", position)),
            Some((position, token)) => return Err(format!("expected 'and' at position {}, found {}", position, describe(&token))),
        }
    }

    Ok(DeviceQuery::new(clauses))
}

fn describe(token: &Token) -> String {
    match token {
        Token::Word(word) => format!("'{}'", word),
        Token::Operator(operator) => format!("operator '{}'", operator.symbol()),
        Token::Literal(literal) => format!("value {}", literal),
        Token::And => "'and'".to_string(),
    }
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '\'' | '"' => read_string(&mut chars)?,
            '=' | '!' | '<' | '>' => read_operator(&mut chars)?,
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => read_number(input, &mut chars)?,
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => read_word(input, &mut chars),
            c => return Err(format!("unexpected character '{}' at position {}", c, position)),
        };
        tokens.push((position, token));
    }

    Ok(tokens)
}

fn read_string(chars: &mut Peekable<CharIndices>) -> Result<Token, String> {
    let Some((start, quote)) = chars.next() else {
        return Err("expected a string".to_string());
    };

    let mut value = String::new();
    for (_, c) in chars.by_ref() {
        if c == quote {
            return Ok(Token::Literal(Literal::string(value)));
        }
        value.push(c);
    }

    Err(format!("unterminated string starting at position {}", start))
}

fn read_operator(chars: &mut Peekable<CharIndices>) -> Result<Token, String> {
    let Some((start, first)) = chars.next() else {
        return Err("expected an operator".to_string());
    };

    let mut symbol = first.to_string();
    if let Some(&(_, second)) = chars.peek() {
        let candidate = format!("{}{}", first, second);
        if Operator::from_symbol(&candidate).is_some() {
            symbol = candidate;
            chars.next();
        }
    }

    Operator::from_symbol(&symbol)
        .map(Token::Operator)
        .ok_or_else(|| format!("unknown operator '{}' at position {}", symbol, start))
}

fn read_number(input: &str, chars: &mut Peekable<CharIndices>) -> Result<Token, String> {
    let start = chars.peek().map(|&(position, _)| position).unwrap_or(input.len());
    let mut end = start;
    while let Some(&(position, c)) = chars.peek() {
        let sign_allowed = position == start || matches!(input[..position].chars().last(), Some('e' | 'E'));
        if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || ((c == '-' || c == '+') && sign_allowed) {
            end = position + c.len_utf8();
            chars.next();
        } else {
            break;
        }
    }

    let text = &input[start..end];
    let number = if let Ok(n) = text.parse::<u64>() {
        Number::PositiveInt(n)
    } else if let Ok(n) = text.parse::<i64>() {
        Number::NegativeInt(n)
    } else {
        text.parse::<f64>()
            .map(Number::Float)
            .map_err(|_| format!("invalid number '{}' at position {}", text, start))?
    };

    Ok(Token::Literal(Literal::number(number)?))
}

fn read_word(input: &str, chars: &mut Peekable<CharIndices>) -> Token {
    let start = chars.peek().map(|&(position, _)| position).unwrap_or(input.len());
    let mut end = start;
    while let Some(&(position, c)) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.' {
            end = position + c.len_utf8();
            chars.next();
        } else {
            break;
        }
    }

    let word = &input[start..end];
    if word.eq_ignore_ascii_case("and") {
        Token::And
    } else if word.eq_ignore_ascii_case("true") {
        Token::Literal(Literal::Boolean(true))
    } else if word.eq_ignore_ascii_case("false") {
        Token::Literal(Literal::Boolean(false))
    } else {
        Token::Word(word.to_string())
    }
}
