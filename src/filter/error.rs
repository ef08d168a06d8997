//! Error types for filter parsing.

use std::fmt;

use thiserror::Error;

/// Failure returned by [`parse`](super::parse).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// The text does not match the filter grammar.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// A literal matched the grammar but could not be converted to its value.
    #[error("invalid {kind} literal {text:?}: {reason}")]
    ValueType {
        kind: LiteralKind,
        text: String,
        reason: String,
    },
}

impl FilterError {
    /// True when the input was rejected by the grammar (SCIM `invalidFilter`).
    pub fn is_syntax(&self) -> bool {
        matches!(self, FilterError::Syntax(_))
    }

    /// Byte offset of a syntax error, if this is one.
    pub fn position(&self) -> Option<usize> {
        match self {
            FilterError::Syntax(err) => Some(err.position),
            FilterError::ValueType { .. } => None,
        }
    }
}

/// Diagnostics for input the grammar could not match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at position {position}{}", describe(.expected, .found))]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    /// Byte offset of the furthest point the grammar reached.
    pub position: usize,
    /// Rules attempted at `position`, sorted and de-duplicated.
    pub expected: Vec<&'static str>,
    /// Character at `position`, `None` at end of input.
    pub found: Option<char>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    UnexpectedInput,
    UnsupportedSchemaUri,
    NestingTooDeep,
    TooManyTerms,
}

impl fmt::Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxErrorKind::UnexpectedInput => write!(f, "unexpected input"),
            SyntaxErrorKind::UnsupportedSchemaUri => write!(f, "unsupported schema URI"),
            SyntaxErrorKind::NestingTooDeep => write!(f, "nesting too deep"),
            SyntaxErrorKind::TooManyTerms => write!(f, "too many and/or terms"),
        }
    }
}

fn describe(expected: &[&'static str], found: &Option<char>) -> String {
    let found = match found {
        Some(c) => format!("found {c:?}"),
        None => "found end of input".to_string(),
    };
    match expected {
        [] => format!(": {found}"),
        [only] => format!(": expected {only}, {found}"),
        [init @ .., last] => format!(": expected {} or {last}, {found}", init.join(", ")),
    }
}

/// Kind of a comparison literal as tagged by the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Boolean,
    Null,
    Number,
    String,
}

impl fmt::Display for LiteralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralKind::Boolean => write!(f, "boolean"),
            LiteralKind::Null => write!(f, "null"),
            LiteralKind::Number => write!(f, "number"),
            LiteralKind::String => write!(f, "string"),
        }
    }
}
