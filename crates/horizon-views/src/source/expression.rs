//! Custom filter expressions evaluated by list sources.
//!
//! The grammar is a flat boolean expression over property comparisons:
//!
//! ```text
//! expression := clause (("AND" | "OR") clause)*
//! clause     := property op literal
//! op         := = | == | != | <> | < | <= | > | >=
//! literal    := 'text' | number | true | false | null
//! ```
//!
//! `AND` binds tighter than `OR`. Quotes inside text literals are doubled
//! (`'O''Brien'`).

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::FilterFn;
use crate::error::{Result, ViewError};
use crate::item::{CollectionItem, PropertyAccessor};
use crate::value::PropertyValue;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?P<text>'(?:[^']|'')*')|(?P<number>-?\d+(?:\.\d+)?)|(?P<op><=|>=|<>|!=|==|=|<|>)|(?P<word>[A-Za-z_][A-Za-z0-9_.]*))",
    )
    .expect("filter token pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "=" | "==" => Self::Eq,
            "!=" | "<>" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            _ => return None,
        })
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering.is_eq(),
            Self::Ne => ordering.is_ne(),
            Self::Lt => ordering.is_lt(),
            Self::Le => ordering.is_le(),
            Self::Gt => ordering.is_gt(),
            Self::Ge => ordering.is_ge(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Number(PropertyValue),
    Op(CompareOp),
    Word(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Comparison {
    property: String,
    op: CompareOp,
    literal: PropertyValue,
}

/// A parsed filter expression, not yet bound to an item type.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpression {
    text: String,
    // OR of ANDs
    disjuncts: Vec<Vec<Comparison>>,
}

impl FilterExpression {
    /// Parse an expression.
    ///
    /// ```
    /// use horizon_views::source::FilterExpression;
    ///
    /// let expr = FilterExpression::parse("State = 'WA' AND Population > 100000").unwrap();
    /// assert_eq!(expr.properties(), vec!["State", "Population"]);
    /// assert!(FilterExpression::parse("State =").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = tokenize(text)?;
        let mut disjuncts = vec![Vec::new()];
        let mut tokens = tokens.into_iter().peekable();

        loop {
            let property = match tokens.next() {
                Some(Token::Word(word)) if !is_keyword(&word) => word,
                other => return Err(syntax(text, "a property name", other)),
            };
            let op = match tokens.next() {
                Some(Token::Op(op)) => op,
                other => return Err(syntax(text, "a comparison operator", other)),
            };
            let literal = match tokens.next() {
                Some(Token::Text(value)) => PropertyValue::String(value),
                Some(Token::Number(value)) => value,
                Some(Token::Word(word)) if word.eq_ignore_ascii_case("true") => true.into(),
                Some(Token::Word(word)) if word.eq_ignore_ascii_case("false") => false.into(),
                Some(Token::Word(word)) if word.eq_ignore_ascii_case("null") => PropertyValue::None,
                other => return Err(syntax(text, "a literal", other)),
            };
            if let Some(current) = disjuncts.last_mut() {
                current.push(Comparison {
                    property,
                    op,
                    literal,
                });
            }

            match tokens.next() {
                None => break,
                Some(Token::Word(word)) if word.eq_ignore_ascii_case("and") => {}
                Some(Token::Word(word)) if word.eq_ignore_ascii_case("or") => {
                    disjuncts.push(Vec::new());
                }
                other => return Err(syntax(text, "AND or OR", other)),
            }
        }

        Ok(Self {
            text: text.to_string(),
            disjuncts,
        })
    }

    /// The source text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Property names referenced, in order of first use.
    pub fn properties(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for comparison in self.disjuncts.iter().flatten() {
            if !names.contains(&comparison.property.as_str()) {
                names.push(&comparison.property);
            }
        }
        names
    }

    /// Bind the expression to `T`, resolving every property path.
    pub fn compile<T: CollectionItem>(&self) -> Result<FilterFn<T>> {
        let mut compiled: Vec<Vec<(PropertyAccessor<T>, CompareOp, PropertyValue)>> =
            Vec::with_capacity(self.disjuncts.len());
        for conjunction in &self.disjuncts {
            let mut clauses = Vec::with_capacity(conjunction.len());
            for comparison in conjunction {
                let accessor = T::property_accessor(&comparison.property).ok_or_else(|| {
                    ViewError::configuration(format!(
                        "unknown property '{}' in filter expression '{}'",
                        comparison.property, self.text
                    ))
                })?;
                clauses.push((accessor, comparison.op, comparison.literal.clone()));
            }
            compiled.push(clauses);
        }

        Ok(Arc::new(move |item: &T| {
            compiled.iter().any(|clauses| {
                clauses
                    .iter()
                    .all(|(accessor, op, literal)| evaluate(&accessor(item), *op, literal))
            })
        }))
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn evaluate(value: &PropertyValue, op: CompareOp, literal: &PropertyValue) -> bool {
    // Ordering between a null and a value is only meaningful for (in)equality.
    if (value.is_none() || literal.is_none()) && !matches!(op, CompareOp::Eq | CompareOp::Ne) {
        return false;
    }
    op.holds(value.compare_ordinal(literal))
}

fn is_keyword(word: &str) -> bool {
    ["and", "or", "true", "false", "null"]
        .iter()
        .any(|k| word.eq_ignore_ascii_case(k))
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = text;
    while !rest.trim_start().is_empty() {
        let captures = TOKEN.captures(rest).ok_or_else(|| {
            ViewError::configuration(format!(
                "unexpected input at offset {} in filter expression '{text}'",
                text.len() - rest.len()
            ))
        })?;
        let token = if let Some(m) = captures.name("text") {
            let quoted = m.as_str();
            Token::Text(quoted[1..quoted.len() - 1].replace("''", "'"))
        } else if let Some(m) = captures.name("number") {
            let raw = m.as_str();
            let value = match raw.parse::<i64>() {
                Ok(n) => PropertyValue::Int(n),
                Err(_) => raw.parse::<f64>().map(PropertyValue::Float).map_err(|e| {
                    ViewError::configuration(format!("invalid number '{raw}': {e}"))
                })?,
            };
            Token::Number(value)
        } else if let Some(m) = captures.name("op") {
            match CompareOp::parse(m.as_str()) {
                Some(op) => Token::Op(op),
                None => return Err(ViewError::configuration(format!("unknown operator '{}'", m.as_str()))),
            }
        } else if let Some(m) = captures.name("word") {
            Token::Word(m.as_str().to_string())
        } else {
            break;
        };
        tokens.push(token);
        let consumed = captures.get(0).map_or(rest.len(), |m| m.end());
        rest = &rest[consumed..];
    }
    Ok(tokens)
}

fn syntax(text: &str, expected: &str, found: Option<Token>) -> ViewError {
    let found = match found {
        Some(token) => format!("{token:?}"),
        None => "end of input".to_string(),
    };
    ViewError::configuration(format!(
        "expected {expected} but found {found} in filter expression '{text}'"
    ))
}
