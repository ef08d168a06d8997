//! SCIM filter parsing (RFC 7644 §3.4.2.2).
//!
//! Syntax:
//!   userName eq "bjensen"                  - comparison (eq ne co sw ew gt lt ge le)
//!   title pr                               - presence
//!   name.familyName co "O'Malley"          - sub-attribute
//!   urn:ietf:params:scim:schemas:core:2.0:User:userName sw "J"
//!                                          - schema-qualified attribute
//!   emails[type eq "work" and primary eq true]
//!                                          - value path
//!   expr and expr, expr or expr            - logical, right-leaning
//!   not (expr), (expr)                     - negation and grouping
//!
//! Literals are `true`, `false`, `null`, JSON numbers and double-quoted
//! strings with backslash escapes.

mod ast;
mod builder;
mod error;
mod grammar;
pub mod naming;

pub use ast::*;
pub use error::{FilterError, LiteralKind, SyntaxError, SyntaxErrorKind};

/// Default limit on nested groups and value paths.
pub const MAX_PARSE_DEPTH: usize = 64;

/// Default limit on `and`/`or` terms in one filter, counted across all groups.
pub const MAX_LOGICAL_TERMS: usize = 10_000;

/// Knobs for [`parse_with_options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Deepest nesting of `( )` groups and `[ ]` value paths accepted.
    pub max_depth: usize,
    /// Most operands joined by `and`/`or` in the whole filter.
    pub max_terms: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_depth: MAX_PARSE_DEPTH,
            max_terms: MAX_LOGICAL_TERMS,
        }
    }
}

/// Parse a SCIM filter into an expression tree.
pub fn parse(text: &str) -> Result<Expression, FilterError> {
    parse_with_options(text, &ParseOptions::default())
}

pub fn parse_with_options(text: &str, options: &ParseOptions) -> Result<Expression, FilterError> {
    let limits = grammar::Limits {
        max_depth: options.max_depth,
        max_terms: options.max_terms,
    };
    let raw = grammar::recognize(text, limits).inspect_err(|err| {
        tracing::debug!(filter = text, "Filter rejected: {}", err);
    })?;
    let expression = builder::build(&raw)?;
    tracing::trace!(filter = text, "Filter parsed");
    Ok(expression)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(s: &str) -> Option<ComparisonValue> {
        Some(ComparisonValue::String(s.into()))
    }

    #[test]
    fn test_simple_comparison() {
        let expr = parse(r#"userName eq "bjensen""#).unwrap();
        assert_eq!(
            expr,
            Expression::Comparison(ComparisonExpression {
                path: AttributePath::new("userName"),
                operator: Operator::Eq,
                value: string("bjensen"),
            })
        );
    }

    #[test]
    fn test_presence() {
        let expr = parse("title pr").unwrap();
        assert_eq!(
            expr,
            Expression::Comparison(ComparisonExpression {
                path: AttributePath::new("title"),
                operator: Operator::Present,
                value: None,
            })
        );
    }

    #[test]
    fn test_not_collapses_into_flag() {
        let expr = parse(r#"not (userType eq "Employee")"#).unwrap();
        assert_eq!(
            expr,
            Expression::Negated(NegatedExpression {
                not: true,
                inner: Box::new(Expression::Comparison(ComparisonExpression {
                    path: AttributePath::new("userType"),
                    operator: Operator::Eq,
                    value: string("Employee"),
                })),
            })
        );
    }

    #[test]
    fn test_from_str() {
        let expr: Expression = "meta.lastModified gt \"2011-05-13T04:42:34Z\""
            .parse()
            .unwrap();
        let Expression::Comparison(cmp) = expr else {
            panic!("Expected comparison");
        };
        assert_eq!(cmp.path.sub_attribute.as_deref(), Some("lastModified"));
        assert_eq!(cmp.path.canonical_sub_attribute().as_deref(), Some("last_modified"));
    }

    #[test]
    fn test_custom_depth() {
        let options = ParseOptions {
            max_depth: 1,
            ..ParseOptions::default()
        };
        assert!(parse_with_options("(a pr)", &options).is_ok());
        let err = parse_with_options("((a pr))", &options).unwrap_err();
        assert_eq!(err.position(), Some(1));
    }

    #[test]
    fn test_custom_term_limit() {
        let options = ParseOptions {
            max_terms: 2,
            ..ParseOptions::default()
        };
        assert!(parse_with_options("a pr and b pr", &options).is_ok());
        let err = parse_with_options("a pr and b pr and c pr", &options).unwrap_err();
        assert!(err.is_syntax());
        assert_eq!(err.position(), Some(14));
    }

    #[test]
    fn test_empty_input() {
        let err = parse("").unwrap_err();
        assert!(err.is_syntax());
        assert_eq!(err.position(), Some(0));
    }
}
