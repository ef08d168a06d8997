//! Raw match tree to typed expression tree.

use std::str::FromStr;

use super::ast::{
    AttributePath, ComparisonExpression, ComparisonValue, Expression, LogicalExpression,
    NegatedExpression, SchemaUri, ValuePathExpression,
};
use super::error::{FilterError, LiteralKind};
use super::grammar::{
    RawAtom, RawAttributeExpression, RawFilter, RawLiteral, RawLogical, RawPath, RawSchema,
    RawValueFilter,
};

type Result<T> = std::result::Result<T, FilterError>;

pub(crate) fn build(raw: &RawFilter<'_>) -> Result<Expression> {
    build_filter(raw)
}

fn build_filter(raw: &RawFilter<'_>) -> Result<Expression> {
    match raw {
        RawFilter::Atom(atom) => build_atom(atom),
        RawFilter::Logical(logical) => build_logical(logical),
    }
}

/// `a op1 b op2 c` => `a op1 (b op2 c)`
fn build_logical(raw: &RawLogical<'_>) -> Result<Expression> {
    let mut operands = Vec::with_capacity(raw.links.len());
    let mut left = build_atom(&raw.head)?;
    for (operator, atom) in &raw.links {
        operands.push((left, *operator));
        left = build_atom(atom)?;
    }

    Ok(operands
        .into_iter()
        .rev()
        .fold(left, |right, (left, operator)| {
            Expression::Logical(LogicalExpression {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            })
        }))
}

fn build_atom(raw: &RawAtom<'_>) -> Result<Expression> {
    match raw {
        RawAtom::Group { not, inner } => Ok(Expression::Negated(NegatedExpression {
            not: not.is_some(),
            inner: Box::new(build_filter(inner)?),
        })),
        RawAtom::Attribute(expr) => build_comparison(expr),
        RawAtom::ValuePath { path, filter } => Ok(Expression::ValuePath(ValuePathExpression {
            path: build_path(path),
            filter: Box::new(build_value_filter(filter)?),
        })),
    }
}

fn build_value_filter(raw: &RawValueFilter<'_>) -> Result<Expression> {
    match raw {
        RawValueFilter::Logical(logical) => build_logical(logical),
        RawValueFilter::Attribute(expr) => build_comparison(expr),
        RawValueFilter::Group { not, inner } => Ok(Expression::Negated(NegatedExpression {
            not: not.is_some(),
            inner: Box::new(build_value_filter(inner)?),
        })),
    }
}

fn build_comparison(raw: &RawAttributeExpression<'_>) -> Result<Expression> {
    let value = raw.value.as_ref().map(build_value).transpose()?;
    Ok(Expression::Comparison(ComparisonExpression {
        path: build_path(&raw.path),
        operator: raw.operator,
        value,
    }))
}

fn build_path(raw: &RawPath<'_>) -> AttributePath {
    AttributePath {
        schema: raw.schema.as_ref().map(build_schema),
        name: raw.name.to_string(),
        sub_attribute: raw.sub_attribute.map(str::to_string),
    }
}

fn build_schema(raw: &RawSchema<'_>) -> SchemaUri {
    match raw {
        RawSchema::User => SchemaUri::User,
        RawSchema::Group => SchemaUri::Group,
        RawSchema::Extension {
            name,
            version,
            resource,
        } => SchemaUri::Extension {
            name: name.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        },
    }
}

fn build_value(raw: &RawLiteral<'_>) -> Result<ComparisonValue> {
    let invalid = |reason: &str| FilterError::ValueType {
        kind: raw.kind,
        text: raw.text.to_string(),
        reason: reason.to_string(),
    };

    match (raw.kind, raw.text) {
        (LiteralKind::Boolean, "true") => Ok(ComparisonValue::Boolean(true)),
        (LiteralKind::Boolean, "false") => Ok(ComparisonValue::Boolean(false)),
        (LiteralKind::Boolean, _) => Err(invalid("expected true or false")),
        (LiteralKind::Null, "null") => Ok(ComparisonValue::Null),
        (LiteralKind::Null, _) => Err(invalid("expected null")),
        (LiteralKind::Number, text) => serde_json::Number::from_str(text)
            .map(ComparisonValue::Number)
            .map_err(|err| invalid(&err.to_string())),
        (LiteralKind::String, text) => {
            let body = text
                .strip_prefix('"')
                .and_then(|rest| rest.strip_suffix('"'))
                .ok_or_else(|| invalid("missing delimiting quotes"))?;
            Ok(ComparisonValue::String(unescape(body)))
        }
    }
}

/// Decode backslash escapes in a string literal body.
///
/// JSON escapes are honoured, including `\uXXXX` surrogate pairs (a lone
/// surrogate decodes to U+FFFD). Any other escaped character, or a `\u` not
/// followed by four hex digits, stands for itself.
fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escaped) = chars.next() else {
            out.push('\\');
            break;
        };
        match escaped {
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'u' => match hex4(chars.as_str()) {
                Some(unit) => {
                    chars.nth(3);
                    out.push(decode_utf16_unit(unit, &mut chars));
                }
                None => out.push('u'),
            },
            other => out.push(other),
        }
    }

    out
}

fn hex4(s: &str) -> Option<u16> {
    let digits = s.get(..4)?;
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(digits, 16).ok()
}

/// Decode one UTF-16 unit, consuming a following `\uXXXX` low surrogate when
/// `unit` is a high surrogate.
fn decode_utf16_unit(unit: u16, rest: &mut std::str::Chars<'_>) -> char {
    if (0xD800..0xDC00).contains(&unit) {
        let low = rest
            .as_str()
            .strip_prefix("\\u")
            .and_then(hex4)
            .filter(|low| (0xDC00..0xE000).contains(low));
        if let Some(low) = low {
            rest.nth(5);
            return char::decode_utf16([unit, low])
                .next()
                .and_then(|decoded| decoded.ok())
                .unwrap_or(char::REPLACEMENT_CHARACTER);
        }
    }
    char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ast::{LogicalOperator, Operator};
    use crate::filter::grammar::{Limits, recognize};

    const TEST_LIMITS: Limits = Limits {
        max_depth: 64,
        max_terms: 10_000,
    };

    fn literal(kind: LiteralKind, text: &str) -> RawLiteral<'_> {
        RawLiteral { kind, text }
    }

    fn build_str(source: &str) -> Expression {
        build(&recognize(source, TEST_LIMITS).unwrap()).unwrap()
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r#"say \"hi\""#), r#"say "hi""#);
        assert_eq!(unescape(r"a\\b\/c"), r"a\b/c");
        assert_eq!(unescape(r"line\nbreak\ttab"), "line\nbreak\ttab");
        assert_eq!(unescape(r"\q"), "q");
        assert_eq!(unescape(r"été"), "été");
        assert_eq!(unescape(r"caf\u00e9"), "café");
        assert_eq!(unescape(r"\ud83d\ude00"), "😀");
        assert_eq!(unescape(r"\ud83dx"), "\u{fffd}x");
        assert_eq!(unescape(r"\u12"), "u12");
    }

    #[test]
    fn test_numbers() {
        let value = build_value(&literal(LiteralKind::Number, "42")).unwrap();
        assert_eq!(value, ComparisonValue::Number(42.into()));

        let ComparisonValue::Number(n) =
            build_value(&literal(LiteralKind::Number, "-2.5E-3")).unwrap()
        else {
            panic!("Expected number");
        };
        let n = n.as_f64().unwrap();
        assert!((n + 0.0025).abs() < 1e-15);
    }

    #[test]
    fn test_out_of_range_number_is_rejected() {
        let err = build_value(&literal(LiteralKind::Number, "1e999")).unwrap_err();
        assert!(matches!(
            err,
            FilterError::ValueType {
                kind: LiteralKind::Number,
                ..
            }
        ));
    }

    #[test]
    fn test_mismatched_literal_is_rejected() {
        let err = build_value(&literal(LiteralKind::Boolean, "null")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid boolean literal \"null\": expected true or false"
        );
        assert!(build_value(&literal(LiteralKind::String, "abc")).is_err());
    }

    #[test]
    fn test_group_without_not() {
        let expr = build_str("(title pr)");
        let Expression::Negated(group) = expr else {
            panic!("Expected group");
        };
        assert!(!group.not);
        assert!(matches!(*group.inner, Expression::Comparison(_)));
    }

    #[test]
    fn test_right_spine() {
        let expr = build_str("a pr or b pr and c pr or d pr");
        let Expression::Logical(first) = &expr else {
            panic!("Expected logical expression");
        };
        assert_eq!(first.operator, LogicalOperator::Or);
        let Expression::Logical(second) = first.right.as_ref() else {
            panic!("Expected logical right operand");
        };
        assert_eq!(second.operator, LogicalOperator::And);
        let Expression::Logical(third) = second.right.as_ref() else {
            panic!("Expected logical right operand");
        };
        assert_eq!(third.operator, LogicalOperator::Or);
        assert_eq!(second.right.to_string(), "c pr or d pr");
    }

    #[test]
    fn test_builder_does_not_consume_raw_tree() {
        let raw = recognize(r#"emails[value ew "@example.com"]"#, TEST_LIMITS).unwrap();
        let first = build(&raw).unwrap();
        let second = build(&raw).unwrap();
        assert_eq!(first, second);
        let Expression::ValuePath(value_path) = first else {
            panic!("Expected value path");
        };
        let Expression::Comparison(cmp) = *value_path.filter else {
            panic!("Expected comparison");
        };
        assert_eq!(cmp.operator, Operator::Ew);
    }
}
