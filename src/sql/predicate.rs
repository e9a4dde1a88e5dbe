//! WHERE clause evaluation.
//!
//! A WHERE clause is split on top-level `AND` into conjuncts. Each conjunct is
//! matched against four shapes, tried in order:
//!
//! 1. `EXTRACT(YEAR FROM col) = N`
//! 2. `EXTRACT(MONTH FROM col) = N`
//! 3. `col = 'literal'`
//! 4. `col <op> number` with `op` one of `= > < >= <=`
//!
//! A conjunct matching none of them keeps every row. The date shapes also keep
//! rows whose value is not a date, while a comparison against a value that is
//! not a number drops the row.

use super::lexer::{column_ref, span_text, split_top_level, tokenize, Keyword, Spanned, Token};
use crate::value::{Record, Value};
use chrono::Datelike;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CompareOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(CompareOp::Eq),
            ">" => Some(CompareOp::Gt),
            "<" => Some(CompareOp::Lt),
            ">=" => Some(CompareOp::Ge),
            "<=" => Some(CompareOp::Le),
            _ => None,
        }
    }

    fn eval(&self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::Eq => left == right,
            CompareOp::Gt => left > right,
            CompareOp::Lt => left < right,
            CompareOp::Ge => left >= right,
            CompareOp::Le => left <= right,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    ExtractYear { column: String, year: i32 },
    ExtractMonth { column: String, month: u32 },
    TextEquals { column: String, literal: String },
    Compare { column: String, op: CompareOp, value: f64 },
    /// Conjunct text that matched no known shape; always true.
    Unrecognized(String),
}

impl Predicate {
    pub fn matches(&self, row: &Record) -> bool {
        match self {
            Predicate::ExtractYear { column, year } => {
                match row.get_ci(column).and_then(Value::as_date) {
                    Some(date) => date.year() == *year,
                    None => true,
                }
            }
            Predicate::ExtractMonth { column, month } => {
                match row.get_ci(column).and_then(Value::as_date) {
                    Some(date) => date.month() == *month,
                    None => true,
                }
            }
            Predicate::TextEquals { column, literal } => {
                matches!(row.get_ci(column), Some(Value::Text(s)) if s == literal)
            }
            Predicate::Compare { column, op, value } => {
                match row.get_ci(column).and_then(Value::as_number) {
                    Some(n) => op.eval(n, *value),
                    None => false,
                }
            }
            Predicate::Unrecognized(_) => true,
        }
    }
}

/// Reads a WHERE clause into its conjuncts.
pub fn parse_predicates(where_text: &str) -> Vec<Predicate> {
    if where_text.trim().is_empty() {
        return Vec::new();
    }
    let tokens = match tokenize(where_text) {
        Ok(tokens) => tokens,
        Err(e) => {
            debug!("WHERE clause not tokenized ({}): {}", e, where_text);
            return vec![Predicate::Unrecognized(where_text.to_string())];
        }
    };
    split_top_level(&tokens, &Token::Keyword(Keyword::And))
        .into_iter()
        .filter(|part| !part.is_empty())
        .map(|part| {
            let part = strip_parens(part);
            let predicate = parse_conjunct(part)
                .unwrap_or_else(|| Predicate::Unrecognized(span_text(where_text, part).to_string()));
            if let Predicate::Unrecognized(text) = &predicate {
                debug!("predicate kept as always-true: {}", text);
            }
            predicate
        })
        .collect()
}

/// Rows that satisfy every conjunct of `where_text`, in their original order.
pub fn apply_where(rows: &[Record], where_text: &str) -> Vec<Record> {
    let predicates = parse_predicates(where_text);
    rows.iter()
        .filter(|row| predicates.iter().all(|p| p.matches(row)))
        .cloned()
        .collect()
}

/// Removes parentheses that wrap the whole conjunct.
fn strip_parens(mut tokens: &[Spanned]) -> &[Spanned] {
    while let [open, inner @ .., close] = tokens {
        if open.token != Token::LParen || close.token != Token::RParen || !balanced(inner) {
            break;
        }
        tokens = inner;
    }
    tokens
}

fn balanced(tokens: &[Spanned]) -> bool {
    let mut depth = 0i32;
    for t in tokens {
        match t.token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

fn parse_conjunct(tokens: &[Spanned]) -> Option<Predicate> {
    parse_extract(tokens, "YEAR")
        .and_then(|(column, n)| {
            (n.fract() == 0.0).then(|| Predicate::ExtractYear {
                column,
                year: n as i32,
            })
        })
        .or_else(|| {
            parse_extract(tokens, "MONTH").and_then(|(column, n)| {
                (n.fract() == 0.0 && (1.0..=12.0).contains(&n)).then(|| Predicate::ExtractMonth {
                    column,
                    month: n as u32,
                })
            })
        })
        .or_else(|| parse_text_equals(tokens))
        .or_else(|| parse_compare(tokens))
}

/// `EXTRACT(<part> FROM col) = N`
fn parse_extract(tokens: &[Spanned], part: &str) -> Option<(String, f64)> {
    match tokens {
        [func, open, unit, from, column @ .., close, eq, number]
            if matches!(&func.token, Token::Ident(f) if f.eq_ignore_ascii_case("EXTRACT"))
                && open.token == Token::LParen
                && matches!(&unit.token, Token::Ident(u) if u.eq_ignore_ascii_case(part))
                && from.token == Token::Keyword(Keyword::From)
                && close.token == Token::RParen
                && eq.token == Token::Op("=".to_string()) =>
        {
            let column = column_ref(column)?;
            match number.token {
                Token::Number(n) => Some((column, n)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// `col = 'literal'`
fn parse_text_equals(tokens: &[Spanned]) -> Option<Predicate> {
    match tokens {
        [column @ .., eq, literal] if eq.token == Token::Op("=".to_string()) => {
            let column = column_ref(column)?;
            match &literal.token {
                Token::Str(literal) => Some(Predicate::TextEquals {
                    column,
                    literal: literal.clone(),
                }),
                _ => None,
            }
        }
        _ => None,
    }
}

/// `col <op> [-]number`
fn parse_compare(tokens: &[Spanned]) -> Option<Predicate> {
    let (number, rest) = tokens.split_last()?;
    let value = match number.token {
        Token::Number(n) => n,
        _ => return None,
    };
    let (value, rest) = match rest.split_last() {
        Some((sign, rest)) if sign.token == Token::Op("-".to_string()) => (-value, rest),
        _ => (value, rest),
    };
    let (op, column) = rest.split_last()?;
    let op = match &op.token {
        Token::Op(symbol) => CompareOp::from_symbol(symbol)?,
        _ => return None,
    };
    Some(Predicate::Compare {
        column: column_ref(column)?,
        op,
        value,
    })
}
