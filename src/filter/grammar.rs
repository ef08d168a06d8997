//! Recognizer for the SCIM filter grammar.
//!
//! Ordered-choice rules, first match wins (RFC 7644 §3.4.2.2 as built):
//!
//! filter               = logical_expression / filter_atom
//! filter_atom          = ["not" SP] "(" filter ")" / attribute_expression / value_path
//! value_path           = attribute_path "[" value_filter "]"
//! value_filter         = logical_expression / attribute_expression
//!                        / ["not" SP] "(" value_filter ")"
//! attribute_expression = attribute_path SP "pr"
//!                        / attribute_path SP compare_op SP compare_value
//! logical_expression   = filter_atom SP ("and" / "or") SP filter
//! attribute_path       = [uri ":"] attribute_name ["." attribute_name]
//! uri                  = "urn:ietf:params:scim:schemas:" ("core:2.0:User"
//!                        / "core:2.0:Group" / "extension:" ALPHA+ ":" DIGIT "." DIGIT ":" ALPHA+)
//! compare_op           = "eq" / "ne" / "co" / "sw" / "ew" / "gt" / "lt" / "le" / "ge"
//! compare_value        = "false" / "null" / "true" / number / string
//!
//! The left operand of a logical expression is an atom and only the right
//! operand recurses into `filter`, so chains lean right. `filter` is
//! recognized as `filter_atom *(SP op SP filter_atom)` and kept flat; the
//! builder folds it into the right-leaning shape. Every `value_filter`
//! alternative is also a `filter` shape, so a value filter is recognized once
//! as a `filter` and then narrowed.
//!
//! Two limits stop adversarial input early: nesting of `( )` and `[ ]`, and
//! the total number of `and`/`or` terms.
//!
//! The output is a raw tree of borrowed captures; [`super::builder`] turns it
//! into typed nodes.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use winnow::ascii::{alpha1, digit0, digit1};
use winnow::combinator::{alt, opt, repeat};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{any, literal, none_of, one_of, take_while};

use super::ast::{LogicalOperator, Operator, SCHEMA_URN_PREFIX};
use super::error::{LiteralKind, SyntaxError, SyntaxErrorKind};

// Backtrack means try the next alternative; Cut means a limit was hit.
type PResult<T> = Result<T, ErrMode<ContextError>>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawFilter<'s> {
    Atom(RawAtom<'s>),
    Logical(RawLogical<'s>),
}

/// `head op1 a op2 b ...`, at least one link.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawLogical<'s> {
    pub head: RawAtom<'s>,
    pub links: Vec<(LogicalOperator, RawAtom<'s>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawAtom<'s> {
    Group {
        not: Option<&'s str>,
        inner: Box<RawFilter<'s>>,
    },
    Attribute(RawAttributeExpression<'s>),
    ValuePath {
        path: RawPath<'s>,
        filter: Box<RawValueFilter<'s>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawValueFilter<'s> {
    Logical(RawLogical<'s>),
    Attribute(RawAttributeExpression<'s>),
    Group {
        not: Option<&'s str>,
        inner: Box<RawValueFilter<'s>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawAttributeExpression<'s> {
    pub path: RawPath<'s>,
    pub operator: Operator,
    pub value: Option<RawLiteral<'s>>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawPath<'s> {
    pub schema: Option<RawSchema<'s>>,
    pub name: &'s str,
    pub sub_attribute: Option<&'s str>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawSchema<'s> {
    User,
    Group,
    Extension {
        name: &'s str,
        version: &'s str,
        resource: &'s str,
    },
}

/// Literal text as matched, tagged with the alternative that matched it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawLiteral<'s> {
    pub kind: LiteralKind,
    pub text: &'s str,
}

/// Furthest point any rule failed at, and which rules failed there.
#[derive(Debug, Default)]
struct Furthest {
    offset: usize,
    expected: BTreeSet<&'static str>,
}

/// Bounds on how much structure one filter may contain.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub max_depth: usize,
    pub max_terms: usize,
}

pub(crate) struct Recognizer<'s> {
    source: &'s str,
    limits: Limits,
    depth: Cell<usize>,
    terms: Cell<usize>,
    furthest: RefCell<Furthest>,
    unsupported_uri: Cell<Option<usize>>,
    exceeded: Cell<Option<(SyntaxErrorKind, usize)>>,
}

/// Match the whole of `source` against the `filter` rule.
pub(crate) fn recognize(source: &str, limits: Limits) -> Result<RawFilter<'_>, SyntaxError> {
    let recognizer = Recognizer::new(source, limits);
    let mut input = source;
    match recognizer.filter(&mut input) {
        Ok(tree) if input.is_empty() => Ok(tree),
        Ok(_) => {
            recognizer.miss(recognizer.offset(input), "end of input");
            Err(recognizer.syntax_error())
        }
        Err(_) => Err(recognizer.syntax_error()),
    }
}

impl<'s> Recognizer<'s> {
    fn new(source: &'s str, limits: Limits) -> Self {
        Recognizer {
            source,
            limits,
            depth: Cell::new(0),
            terms: Cell::new(1),
            furthest: RefCell::new(Furthest::default()),
            unsupported_uri: Cell::new(None),
            exceeded: Cell::new(None),
        }
    }

    fn offset(&self, input: &str) -> usize {
        self.source.len() - input.len()
    }

    fn miss(&self, offset: usize, rule: &'static str) {
        let mut furthest = self.furthest.borrow_mut();
        if offset > furthest.offset {
            furthest.offset = offset;
            furthest.expected.clear();
        }
        if offset == furthest.offset {
            furthest.expected.insert(rule);
        }
    }

    fn syntax_error(&self) -> SyntaxError {
        let furthest = self.furthest.borrow();
        let (kind, position, expected) = if let Some((kind, at)) = self.exceeded.get() {
            (kind, at, Vec::new())
        } else if let Some(at) = self.unsupported_uri.get() {
            (SyntaxErrorKind::UnsupportedSchemaUri, at, vec!["schema URI"])
        } else {
            (
                SyntaxErrorKind::UnexpectedInput,
                furthest.offset,
                furthest.expected.iter().copied().collect(),
            )
        };
        SyntaxError {
            kind,
            position,
            expected,
            found: self.source[position..].chars().next(),
        }
    }

    /// Record a broken limit at `at` and stop every pending alternative.
    fn exceed<T>(&self, kind: SyntaxErrorKind, at: usize) -> PResult<T> {
        if self.exceeded.get().is_none() {
            self.exceeded.set(Some((kind, at)));
        }
        Err(ErrMode::Cut(ContextError::default()))
    }

    /// Run `rule` one nesting level deeper; past the limit nothing else is tried.
    fn nested<T>(
        &self,
        input: &mut &'s str,
        rule: impl FnOnce(&mut &'s str) -> PResult<T>,
    ) -> PResult<T> {
        let depth = self.depth.get() + 1;
        if depth > self.limits.max_depth {
            // Called just past the one-byte opening bracket.
            let at = self.offset(input).saturating_sub(1);
            return self.exceed(SyntaxErrorKind::NestingTooDeep, at);
        }
        self.depth.set(depth);
        let result = rule(input);
        self.depth.set(depth - 1);
        result
    }

    fn token(&self, input: &mut &'s str, rule: &'static str, text: &'static str) -> PResult<&'s str> {
        let at = self.offset(input);
        literal(text)
            .parse_next(input)
            .inspect_err(|_| self.miss(at, rule))
    }

    fn space(&self, input: &mut &'s str) -> PResult<char> {
        let at = self.offset(input);
        one_of(|c: char| c.is_ascii_whitespace())
            .parse_next(input)
            .inspect_err(|_| self.miss(at, "whitespace"))
    }

    fn filter(&self, input: &mut &'s str) -> PResult<RawFilter<'s>> {
        let head = self.filter_atom(input)?;
        let mut links = Vec::new();
        loop {
            let checkpoint = *input;
            match self.logical_link(input) {
                Ok(link) => {
                    let terms = self.terms.get() + 1;
                    if terms > self.limits.max_terms {
                        // The operator follows the single separating space.
                        let at = self.offset(checkpoint) + 1;
                        return self.exceed(SyntaxErrorKind::TooManyTerms, at);
                    }
                    self.terms.set(terms);
                    links.push(link);
                }
                Err(ErrMode::Backtrack(_)) => {
                    *input = checkpoint;
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        if links.is_empty() {
            Ok(RawFilter::Atom(head))
        } else {
            Ok(RawFilter::Logical(RawLogical { head, links }))
        }
    }

    /// `SP ("and" / "or") SP filter_atom`
    fn logical_link(&self, input: &mut &'s str) -> PResult<(LogicalOperator, RawAtom<'s>)> {
        self.space(input)?;
        let operator = self.logical_operator(input)?;
        self.space(input)?;
        let atom = self.filter_atom(input)?;
        Ok((operator, atom))
    }

    fn logical_operator(&self, input: &mut &'s str) -> PResult<LogicalOperator> {
        let at = self.offset(input);
        alt((
            "and".value(LogicalOperator::And),
            "or".value(LogicalOperator::Or),
        ))
        .parse_next(input)
        .inspect_err(|_| {
            self.miss(at, "\"and\"");
            self.miss(at, "\"or\"");
        })
    }

    fn filter_atom(&self, input: &mut &'s str) -> PResult<RawAtom<'s>> {
        alt((
            |i: &mut &'s str| self.filter_group(i),
            |i: &mut &'s str| self.attribute_expression(i).map(RawAtom::Attribute),
            |i: &mut &'s str| self.value_path(i),
        ))
        .parse_next(input)
    }

    /// `["not" SP] "(" filter ")"`
    fn filter_group(&self, input: &mut &'s str) -> PResult<RawAtom<'s>> {
        let not = opt(|i: &mut &'s str| self.not_keyword(i)).parse_next(input)?;
        self.token(input, "\"(\"", "(")?;
        let inner = self.nested(input, |i| self.filter(i))?;
        self.token(input, "\")\"", ")")?;
        Ok(RawAtom::Group {
            not,
            inner: Box::new(inner),
        })
    }

    fn not_keyword(&self, input: &mut &'s str) -> PResult<&'s str> {
        let keyword = self.token(input, "\"not\"", "not")?;
        self.space(input)?;
        Ok(keyword)
    }

    fn value_path(&self, input: &mut &'s str) -> PResult<RawAtom<'s>> {
        let path = self.attribute_path(input)?;
        self.token(input, "\"[\"", "[")?;
        let filter = self.nested(input, |i| self.value_filter(i))?;
        self.token(input, "\"]\"", "]")?;
        Ok(RawAtom::ValuePath {
            path,
            filter: Box::new(filter),
        })
    }

    /// `logical_expression / attribute_expression / ["not" SP] "(" value_filter ")"`
    ///
    /// Each alternative matches exactly what `filter` matches for that shape,
    /// so the text is recognized once and the result narrowed.
    fn value_filter(&self, input: &mut &'s str) -> PResult<RawValueFilter<'s>> {
        let start = *input;
        let filter = self.filter(input)?;
        narrow(filter).ok_or_else(|| {
            *input = start;
            ErrMode::Backtrack(ContextError::default())
        })
    }

    fn attribute_expression(&self, input: &mut &'s str) -> PResult<RawAttributeExpression<'s>> {
        alt((
            |i: &mut &'s str| self.presence_expression(i),
            |i: &mut &'s str| self.comparison_expression(i),
        ))
        .parse_next(input)
    }

    /// `attribute_path SP "pr"`
    fn presence_expression(&self, input: &mut &'s str) -> PResult<RawAttributeExpression<'s>> {
        let path = self.attribute_path(input)?;
        self.space(input)?;
        self.token(input, "\"pr\"", "pr")?;
        Ok(RawAttributeExpression {
            path,
            operator: Operator::Present,
            value: None,
        })
    }

    /// `attribute_path SP compare_op SP compare_value`
    fn comparison_expression(&self, input: &mut &'s str) -> PResult<RawAttributeExpression<'s>> {
        let path = self.attribute_path(input)?;
        self.space(input)?;
        let operator = self.comparison_operator(input)?;
        self.space(input)?;
        let value = self.comparison_value(input)?;
        Ok(RawAttributeExpression {
            path,
            operator,
            value: Some(value),
        })
    }

    fn comparison_operator(&self, input: &mut &'s str) -> PResult<Operator> {
        let at = self.offset(input);
        alt((
            "eq".value(Operator::Eq),
            "ne".value(Operator::Ne),
            "co".value(Operator::Co),
            "sw".value(Operator::Sw),
            "ew".value(Operator::Ew),
            "gt".value(Operator::Gt),
            "lt".value(Operator::Lt),
            "le".value(Operator::Le),
            "ge".value(Operator::Ge),
        ))
        .parse_next(input)
        .inspect_err(|_| self.miss(at, "comparison operator"))
    }

    fn comparison_value(&self, input: &mut &'s str) -> PResult<RawLiteral<'s>> {
        let at = self.offset(input);
        let tagged = |kind: LiteralKind| move |text: &'s str| RawLiteral { kind, text };
        alt((
            "false".map(tagged(LiteralKind::Boolean)),
            "null".map(tagged(LiteralKind::Null)),
            "true".map(tagged(LiteralKind::Boolean)),
            number.map(tagged(LiteralKind::Number)),
            (|i: &mut &'s str| self.string(i)).map(tagged(LiteralKind::String)),
        ))
        .parse_next(input)
        .inspect_err(|_| self.miss(at, "comparison value"))
    }

    /// `'"' *("\" ANY / not-quote) '"'`, quotes included.
    fn string(&self, input: &mut &'s str) -> PResult<&'s str> {
        let start = *input;
        let body: PResult<()> = (
            '"',
            repeat(0.., alt((('\\', any).void(), none_of('"').void()))).map(|()| ()),
        )
            .void()
            .parse_next(input);
        body?;
        self.token(input, "closing quote", "\"")?;
        Ok(&start[..start.len() - input.len()])
    }

    fn attribute_path(&self, input: &mut &'s str) -> PResult<RawPath<'s>> {
        let schema = opt(|i: &mut &'s str| self.schema_prefix(i)).parse_next(input)?;
        let name = self.attribute_name(input)?;
        let sub_attribute = opt(|i: &mut &'s str| self.sub_attribute(i)).parse_next(input)?;
        Ok(RawPath {
            schema,
            name,
            sub_attribute,
        })
    }

    /// `uri ":"`
    fn schema_prefix(&self, input: &mut &'s str) -> PResult<RawSchema<'s>> {
        let at = self.offset(input);
        let start = *input;
        let result = (|i: &mut &'s str| self.schema_uri(i), ':')
            .map(|(schema, _)| schema)
            .parse_next(input);
        if result.is_err()
            && start
                .get(..4)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("urn:"))
            && self.unsupported_uri.get().is_none()
        {
            self.unsupported_uri.set(Some(at));
        }
        result.inspect_err(|_| self.miss(at, "schema URI"))
    }

    fn schema_uri(&self, input: &mut &'s str) -> PResult<RawSchema<'s>> {
        let digit = || one_of(|c: char| c.is_ascii_digit());
        let extension = (
            "extension:",
            alpha1,
            ':',
            (digit(), '.', digit()).take(),
            ':',
            alpha1,
        )
            .map(|(_, name, _, version, _, resource)| RawSchema::Extension {
                name,
                version,
                resource,
            });
        (
            SCHEMA_URN_PREFIX,
            alt((
                "core:2.0:User".value(RawSchema::User),
                "core:2.0:Group".value(RawSchema::Group),
                extension,
            )),
        )
            .map(|(_, schema)| schema)
            .parse_next(input)
    }

    /// `ALPHA *(ALPHA / DIGIT / "-" / "_")`
    fn attribute_name(&self, input: &mut &'s str) -> PResult<&'s str> {
        let at = self.offset(input);
        (
            one_of(|c: char| c.is_ascii_alphabetic()),
            take_while(0.., |c: char| {
                c.is_ascii_alphanumeric() || c == '-' || c == '_'
            }),
        )
            .take()
            .parse_next(input)
            .inspect_err(|_| self.miss(at, "attribute name"))
    }

    /// `"." attribute_name`
    fn sub_attribute(&self, input: &mut &'s str) -> PResult<&'s str> {
        self.token(input, "\".\"", ".")?;
        self.attribute_name(input)
    }
}

/// JSON number: `["-"] ("0" / [1-9] *DIGIT) ["." 1*DIGIT] [("e" / "E") ["+" / "-"] 1*DIGIT]`
fn number<'s>(input: &mut &'s str) -> PResult<&'s str> {
    (
        opt('-'),
        alt(("0".void(), (one_of('1'..='9'), digit0).void())),
        opt(('.', digit1)),
        opt((one_of(['e', 'E']), opt(one_of(['+', '-'])), digit1)),
    )
        .take()
        .parse_next(input)
}

/// Restrict a `filter` match to the `value_filter` shapes. Value paths do
/// not nest directly inside brackets, even within groups.
fn narrow(filter: RawFilter<'_>) -> Option<RawValueFilter<'_>> {
    match filter {
        RawFilter::Logical(logical) => Some(RawValueFilter::Logical(logical)),
        RawFilter::Atom(RawAtom::Attribute(expr)) => Some(RawValueFilter::Attribute(expr)),
        RawFilter::Atom(RawAtom::Group { not, inner }) => Some(RawValueFilter::Group {
            not,
            inner: Box::new(narrow(*inner)?),
        }),
        RawFilter::Atom(RawAtom::ValuePath { .. }) => None,
    }
}
