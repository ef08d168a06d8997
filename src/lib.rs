//! Parser for SCIM filter expressions.
//!
//! ```
//! use scim_filter::{Expression, Operator, parse};
//!
//! let Expression::Comparison(cmp) = parse(r#"userName eq "bjensen""#).unwrap() else {
//!     unreachable!()
//! };
//! assert_eq!(cmp.path.name, "userName");
//! assert_eq!(cmp.operator, Operator::Eq);
//! ```

pub mod filter;

pub use filter::{
    AttributePath, ComparisonExpression, ComparisonValue, Expression, FilterError,
    LogicalExpression, LogicalOperator, MAX_LOGICAL_TERMS, MAX_PARSE_DEPTH, NegatedExpression,
    Operator, ParseOptions, SchemaUri, SyntaxError, SyntaxErrorKind, ValuePathExpression, parse,
    parse_with_options,
};
