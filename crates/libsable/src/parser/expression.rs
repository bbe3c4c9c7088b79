//! Expression parsing with operator precedence for the Sable language.
//!
//! Implements recursive descent with precedence climbing. Each
//! precedence level is a small parser struct implementing
//! [`SableExpressionParser`], chained from lowest to highest binding:
//!
//! 1. Logical or (`||`)
//! 2. Logical and (`&&`)
//! 3. Bitwise or (`|`)
//! 4. Bitwise xor (`^`)
//! 5. Bitwise and (`&`)
//! 6. Equality (`==`, `!=`)
//! 7. Relational (`<`, `>`, `<=`, `>=`)
//! 8. Shifts (`<<`, `>>`)
//! 9. Additive (`+`, `-`)
//! 10. Multiplicative (`*`, `/`, `%`)
//! 11. Prefix unary (`-`, `!`, `&`, `*`)
//! 12. Postfix (call, method call, field access, index, `as` cast)
//! 13. Primary (literals, identifiers, literals of aggregates, `if`,
//!     `if let`, `match`, parentheses)
//!
//! The `ALLOW_STRUCT` const parameter disables struct literals in
//! condition and scrutinee positions (`if x { ... }` must parse `x` as
//! an identifier, not the start of a struct literal `x { ... }`).

use std::sync::atomic::Ordering;

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{char, one_of};
use nom::combinator::{consumed, cut, map, not, opt, peek, recognize, value};
use nom::error::context;
use nom::multi::{many, many1};
use nom::sequence::{delimited, pair, terminated};
use nom::{IResult, Parser};

use crate::ast::{
    AstIndex, BinaryOperator, ExpressionAst, IfExpressionAst, IfLetAst, LiteralValue,
    MatchExpressionAst, UnaryOperator,
};
use crate::nom_tools::{cleanup, token, NomSpan, State};

use super::{comma_list, ident, keyword, SableParserError};

/// Trait for expression parsers at one precedence level.
pub trait SableExpressionParser {
    /// Parses an expression at this precedence level.
    fn parse(input: NomSpan<'_>) -> IResult<NomSpan<'_>, ExpressionAst<'_>, SableParserError<'_>>;
}

// Precedence level parsers, lowest binding first.

/// Logical or (`||`), the loosest level.
struct OrParser<const ALLOW_STRUCT: bool>;

/// Logical and (`&&`).
struct AndParser<const ALLOW_STRUCT: bool>;

/// Bitwise or (`|`).
struct BitOrParser<const ALLOW_STRUCT: bool>;

/// Bitwise xor (`^`).
struct BitXorParser<const ALLOW_STRUCT: bool>;

/// Bitwise and (`&`).
struct BitAndParser<const ALLOW_STRUCT: bool>;

/// Equality (`==`, `!=`).
struct EqualityParser<const ALLOW_STRUCT: bool>;

/// Relational (`<`, `>`, `<=`, `>=`).
struct RelationalParser<const ALLOW_STRUCT: bool>;

/// Shifts (`<<`, `>>`).
struct ShiftParser<const ALLOW_STRUCT: bool>;

/// Additive (`+`, `-`).
struct AddSubParser<const ALLOW_STRUCT: bool>;

/// Multiplicative (`*`, `/`, `%`), the tightest binary level.
struct MulDivModParser<const ALLOW_STRUCT: bool>;

/// Prefix unary operators.
struct UnaryParser<const ALLOW_STRUCT: bool>;

/// Postfix forms: calls, field access, indexing, casts.
struct PostfixParser<const ALLOW_STRUCT: bool>;

/// Primary expressions.
struct PrimaryParser<const ALLOW_STRUCT: bool>;

/// Folds a level's left-associative operator chain into Binary nodes.
fn binary_level<'base, P, F>(
    input: NomSpan<'base>,
    operator: F,
) -> IResult<NomSpan<'base>, ExpressionAst<'base>, SableParserError<'base>>
where
    P: SableExpressionParser,
    F: Parser<NomSpan<'base>, Output = BinaryOperator, Error = SableParserError<'base>>,
{
    let state = input.extra.clone();
    let (input, initial) = P::parse(input)?;
    let (input, remainder): (NomSpan<'base>, Vec<(BinaryOperator, ExpressionAst<'base>)>) =
        many(0.., pair(operator, P::parse)).parse(input)?;

    let folded = remainder.into_iter().fold(initial, |left, (operator, right)| {
        ExpressionAst::Binary {
            index: next_index_from(&state),
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    });
    Ok((input, folded))
}

fn next_index_from(state: &State) -> AstIndex {
    AstIndex(state.indexer.fetch_add(1, Ordering::Relaxed))
}

impl<const A: bool> SableExpressionParser for OrParser<A> {
    fn parse(input: NomSpan<'_>) -> IResult<NomSpan<'_>, ExpressionAst<'_>, SableParserError<'_>> {
        binary_level::<AndParser<A>, _>(input, value(BinaryOperator::Or, cleanup(tag("||"))))
    }
}

impl<const A: bool> SableExpressionParser for AndParser<A> {
    fn parse(input: NomSpan<'_>) -> IResult<NomSpan<'_>, ExpressionAst<'_>, SableParserError<'_>> {
        binary_level::<BitOrParser<A>, _>(input, value(BinaryOperator::And, cleanup(tag("&&"))))
    }
}

impl<const A: bool> SableExpressionParser for BitOrParser<A> {
    fn parse(input: NomSpan<'_>) -> IResult<NomSpan<'_>, ExpressionAst<'_>, SableParserError<'_>> {
        binary_level::<BitXorParser<A>, _>(
            input,
            value(BinaryOperator::BitOr, cleanup(terminated(char('|'), not(char('|'))))),
        )
    }
}

impl<const A: bool> SableExpressionParser for BitXorParser<A> {
    fn parse(input: NomSpan<'_>) -> IResult<NomSpan<'_>, ExpressionAst<'_>, SableParserError<'_>> {
        binary_level::<BitAndParser<A>, _>(input, value(BinaryOperator::BitXor, token('^')))
    }
}

impl<const A: bool> SableExpressionParser for BitAndParser<A> {
    fn parse(input: NomSpan<'_>) -> IResult<NomSpan<'_>, ExpressionAst<'_>, SableParserError<'_>> {
        binary_level::<EqualityParser<A>, _>(
            input,
            value(BinaryOperator::BitAnd, cleanup(terminated(char('&'), not(char('&'))))),
        )
    }
}

impl<const A: bool> SableExpressionParser for EqualityParser<A> {
    fn parse(input: NomSpan<'_>) -> IResult<NomSpan<'_>, ExpressionAst<'_>, SableParserError<'_>> {
        binary_level::<RelationalParser<A>, _>(
            input,
            alt((
                value(BinaryOperator::Equal, cleanup(tag("=="))),
                value(BinaryOperator::NotEqual, cleanup(tag("!="))),
            )),
        )
    }
}

impl<const A: bool> SableExpressionParser for RelationalParser<A> {
    fn parse(input: NomSpan<'_>) -> IResult<NomSpan<'_>, ExpressionAst<'_>, SableParserError<'_>> {
        binary_level::<ShiftParser<A>, _>(
            input,
            alt((
                value(BinaryOperator::LessEqual, cleanup(tag("<="))),
                value(BinaryOperator::GreaterEqual, cleanup(tag(">="))),
                value(BinaryOperator::Less, cleanup(terminated(char('<'), not(char('<'))))),
                value(BinaryOperator::Greater, cleanup(terminated(char('>'), not(char('>'))))),
            )),
        )
    }
}

impl<const A: bool> SableExpressionParser for ShiftParser<A> {
    fn parse(input: NomSpan<'_>) -> IResult<NomSpan<'_>, ExpressionAst<'_>, SableParserError<'_>> {
        binary_level::<AddSubParser<A>, _>(
            input,
            alt((
                value(BinaryOperator::ShiftLeft, cleanup(tag("<<"))),
                value(BinaryOperator::ShiftRight, cleanup(tag(">>"))),
            )),
        )
    }
}

impl<const A: bool> SableExpressionParser for AddSubParser<A> {
    fn parse(input: NomSpan<'_>) -> IResult<NomSpan<'_>, ExpressionAst<'_>, SableParserError<'_>> {
        binary_level::<MulDivModParser<A>, _>(
            input,
            alt((
                value(BinaryOperator::Add, token('+')),
                value(BinaryOperator::Sub, token('-')),
            )),
        )
    }
}

impl<const A: bool> SableExpressionParser for MulDivModParser<A> {
    fn parse(input: NomSpan<'_>) -> IResult<NomSpan<'_>, ExpressionAst<'_>, SableParserError<'_>> {
        binary_level::<UnaryParser<A>, _>(
            input,
            alt((
                value(BinaryOperator::Mul, token('*')),
                value(BinaryOperator::Div, token('/')),
                value(BinaryOperator::Mod, token('%')),
            )),
        )
    }
}

impl<const A: bool> SableExpressionParser for UnaryParser<A> {
    fn parse(input: NomSpan<'_>) -> IResult<NomSpan<'_>, ExpressionAst<'_>, SableParserError<'_>> {
        let operator = cleanup(alt((
            value(UnaryOperator::Negate, char('-')),
            value(UnaryOperator::Not, char('!')),
            value(UnaryOperator::AddressOf, char('&')),
            value(UnaryOperator::Deref, char('*')),
        )));

        let index = next_index_from(&input.extra);
        match consumed(pair(operator, |i| Self::parse(i))).parse(input.clone()) {
            Ok((rest, (span, (operator, operand)))) => Ok((
                rest,
                ExpressionAst::Unary { index, operator, operand: Box::new(operand), span: span.into() },
            )),
            Err(_) => PostfixParser::<A>::parse(input),
        }
    }
}

impl<const A: bool> SableExpressionParser for PostfixParser<A> {
    fn parse(input: NomSpan<'_>) -> IResult<NomSpan<'_>, ExpressionAst<'_>, SableParserError<'_>> {
        let state = input.extra.clone();
        let start = input.location_offset();
        let (mut input, mut expr) = PrimaryParser::<A>::parse(input)?;

        loop {
            // `.member`, but never the `..` range operator.
            let mut dot = cleanup(terminated(char('.'), not(char('.'))));
            if let Ok((rest, _)) = dot.parse(input.clone()) {
                // Tuple field access: `t.0`
                if let Ok((rest, digits)) =
                    cleanup(recognize(many1(one_of::<NomSpan<'_>, _, SableParserError<'_>>("0123456789"))))
                        .parse(rest.clone())
                {
                    expr = ExpressionAst::FieldAccess {
                        index: next_index_from(&state),
                        receiver: Box::new(expr),
                        field: digits.into(),
                    };
                    input = rest;
                    continue;
                }

                let (rest, member) = super::expected_ident("Missing member name after '.'", rest)?;

                if peek(token('(')).parse(rest.clone()).is_ok() {
                    let (rest, args) = argument_list(rest)?;
                    let span = span_from(&state, start, rest.location_offset());
                    expr = ExpressionAst::MethodCall {
                        index: next_index_from(&state),
                        receiver: Box::new(expr),
                        method: member.into(),
                        args,
                        span,
                    };
                    input = rest;
                } else {
                    expr = ExpressionAst::FieldAccess {
                        index: next_index_from(&state),
                        receiver: Box::new(expr),
                        field: member.into(),
                    };
                    input = rest;
                }
                continue;
            }

            // Indexing: `a[i]`
            if let Ok((rest, _)) = token('[').parse(input.clone()) {
                let (rest, index_expr) =
                    context("Missing index expression", cut(ExpressionAst::parse)).parse(rest)?;
                let (rest, _) = context("Missing ']'", cut(token(']'))).parse(rest)?;
                let span = span_from(&state, start, rest.location_offset());
                expr = ExpressionAst::Index {
                    index: next_index_from(&state),
                    receiver: Box::new(expr),
                    index_expr: Box::new(index_expr),
                    span,
                };
                input = rest;
                continue;
            }

            // Cast: `e as T`
            if let Ok((rest, _)) = keyword("as").parse(input.clone()) {
                let (rest, target) =
                    context("Missing cast target type", cut(crate::ast::TypeAst::parse)).parse(rest)?;
                let span = span_from(&state, start, rest.location_offset());
                expr = ExpressionAst::Cast {
                    index: next_index_from(&state),
                    value: Box::new(expr),
                    target,
                    span,
                };
                input = rest;
                continue;
            }

            // Direct call: `f(args)`; only a named function is callable.
            if matches!(expr, ExpressionAst::Identifier { .. })
                && peek(token('(')).parse(input.clone()).is_ok()
            {
                let (rest, args) = argument_list(input)?;
                let function = match expr {
                    ExpressionAst::Identifier { name, .. } => name,
                    _ => unreachable!(),
                };
                let span = span_from(&state, start, rest.location_offset());
                expr = ExpressionAst::Call { index: next_index_from(&state), function, args, span };
                input = rest;
                continue;
            }

            break;
        }

        Ok((input, expr))
    }
}

/// Builds a span from the byte range the postfix loop covered.
fn span_from<'base>(state: &State, start: usize, end: usize) -> crate::nom_tools::Span<'base> {
    crate::nom_tools::Span {
        text: "",
        position: start..end,
        state: state.clone(),
    }
}

/// Parses a parenthesized argument list with trailing comma support.
fn argument_list(
    input: NomSpan<'_>,
) -> IResult<NomSpan<'_>, Vec<ExpressionAst<'_>>, SableParserError<'_>> {
    delimited(
        token('('),
        comma_list(ExpressionAst::parse),
        context("Missing ')'", cut(token(')'))),
    )
    .parse(input)
}

impl<const A: bool> SableExpressionParser for PrimaryParser<A> {
    fn parse(input: NomSpan<'_>) -> IResult<NomSpan<'_>, ExpressionAst<'_>, SableParserError<'_>> {
        let mut attempts = alt((
            LiteralValue::parse_for_expression,
            IfLetAst::parse_for_expression,
            IfExpressionAst::parse_for_expression,
            MatchExpressionAst::parse_for_expression,
            ExpressionAst::array_literal,
            ExpressionAst::paren_or_tuple,
            ExpressionAst::ident_for_expression,
        ));

        if A {
            if let Ok(result) = ExpressionAst::struct_literal(input.clone()) {
                return Ok(result);
            }
        }
        attempts.parse(input)
    }
}

impl<'base> ExpressionAst<'base> {
    /// Parses a full expression.
    pub fn parse(input: NomSpan<'base>) -> IResult<NomSpan<'base>, ExpressionAst<'base>, SableParserError<'base>> {
        OrParser::<true>::parse(input)
    }

    /// Parses an expression with struct literals disallowed at the top
    /// level, used for `if`/`while` conditions and `match` scrutinees.
    pub fn parse_no_struct(
        input: NomSpan<'base>,
    ) -> IResult<NomSpan<'base>, ExpressionAst<'base>, SableParserError<'base>> {
        OrParser::<false>::parse(input)
    }

    fn ident_for_expression(
        input: NomSpan<'base>,
    ) -> IResult<NomSpan<'base>, ExpressionAst<'base>, SableParserError<'base>> {
        let index = super::next_index(&input);
        let (input, name) = ident().parse(input)?;
        Ok((input, ExpressionAst::Identifier { index, name: name.into() }))
    }

    /// `[e, e, e]`
    fn array_literal(
        input: NomSpan<'base>,
    ) -> IResult<NomSpan<'base>, ExpressionAst<'base>, SableParserError<'base>> {
        let index = super::next_index(&input);
        let (input, (span, elements)) = consumed(delimited(
            token('['),
            comma_list(ExpressionAst::parse),
            context("Missing ']'", cut(token(']'))),
        ))
        .parse(input)?;
        Ok((input, ExpressionAst::ArrayLiteral { index, elements, span: span.into() }))
    }

    /// `(e)` grouping or `(e, e)` tuple literal.
    fn paren_or_tuple(
        input: NomSpan<'base>,
    ) -> IResult<NomSpan<'base>, ExpressionAst<'base>, SableParserError<'base>> {
        let index = super::next_index(&input);
        let (rest, (span, (mut elements, trailing))) = consumed(delimited(
            token('('),
            pair(
                nom::multi::separated_list1(token(','), ExpressionAst::parse),
                map(opt(token(',')), |c| c.is_some()),
            ),
            context("Missing ')'", cut(token(')'))),
        ))
        .parse(input)?;

        if elements.len() == 1 && !trailing {
            Ok((rest, elements.remove(0)))
        } else {
            Ok((rest, ExpressionAst::TupleLiteral { index, elements, span: span.into() }))
        }
    }

    /// `Name { field: expr, ... }`
    fn struct_literal(
        input: NomSpan<'base>,
    ) -> IResult<NomSpan<'base>, ExpressionAst<'base>, SableParserError<'base>> {
        let index = super::next_index(&input);
        let field = pair(terminated(ident(), context("Missing ':'", cut(token(':')))), ExpressionAst::parse);
        let (input, (span, (name, fields))) = consumed(pair(
            ident(),
            delimited(token('{'), comma_list(field), token('}')),
        ))
        .parse(input)?;

        let fields = fields.into_iter().map(|(name, value)| (name.into(), value)).collect();
        Ok((input, ExpressionAst::StructLiteral { index, name: name.into(), fields, span: span.into() }))
    }
}

impl std::fmt::Display for ExpressionAst<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpressionAst::Literal { value, .. } => write!(f, "{value}"),
            ExpressionAst::Identifier { name, .. } => write!(f, "{name}"),
            ExpressionAst::Binary { left, operator, right, .. } => {
                write!(f, "({left} {operator} {right})")
            }
            ExpressionAst::Unary { operator, operand, .. } => {
                let symbol = match operator {
                    UnaryOperator::Negate => '-',
                    UnaryOperator::Not => '!',
                    UnaryOperator::AddressOf => '&',
                    UnaryOperator::Deref => '*',
                };
                write!(f, "{symbol}{operand}")
            }
            ExpressionAst::Call { function, args, .. } => {
                write!(f, "{function}(")?;
                write_comma_separated(f, args)?;
                write!(f, ")")
            }
            ExpressionAst::MethodCall { receiver, method, args, .. } => {
                write!(f, "{receiver}.{method}(")?;
                write_comma_separated(f, args)?;
                write!(f, ")")
            }
            ExpressionAst::FieldAccess { receiver, field, .. } => write!(f, "{receiver}.{field}"),
            ExpressionAst::Index { receiver, index_expr, .. } => write!(f, "{receiver}[{index_expr}]"),
            ExpressionAst::Cast { value, target, .. } => write!(f, "({value} as {target})"),
            ExpressionAst::StructLiteral { name, fields, .. } => {
                write!(f, "{name} {{ ")?;
                for (index, (field, value)) in fields.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}: {value}")?;
                }
                write!(f, " }}")
            }
            ExpressionAst::ArrayLiteral { elements, .. } => {
                write!(f, "[")?;
                write_comma_separated(f, elements)?;
                write!(f, "]")
            }
            ExpressionAst::TupleLiteral { elements, .. } => {
                write!(f, "(")?;
                write_comma_separated(f, elements)?;
                write!(f, ")")
            }
            ExpressionAst::If(_) => write!(f, "if"),
            ExpressionAst::IfLet(_) => write!(f, "if let"),
            ExpressionAst::Match(_) => write!(f, "match"),
        }
    }
}

fn write_comma_separated(
    f: &mut std::fmt::Formatter<'_>,
    items: &[ExpressionAst<'_>],
) -> std::fmt::Result {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Greater => ">",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::Less => "<",
            BinaryOperator::BitXor => "^",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::ShiftLeft => "<<",
            BinaryOperator::ShiftRight => ">>",
        };
        f.write_str(symbol)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::{file::SourceFile, nom_tools::State};

    use super::*;

    fn parse_to_string(code: &str) -> String {
        let state = State::new(SourceFile::new(vec!["<memory>".into()], code.to_string()));
        let input = NomSpan::new_extra(state.file.code.as_str(), state.clone());
        let (rest, parsed) = ExpressionAst::parse(input).unwrap();
        assert!(rest.fragment().trim().is_empty(), "unparsed input: {rest:?}");
        parsed.to_string()
    }

    #[rstest]
    #[case("1", "1")]
    #[case("1-2", "(1 - 2)")]
    #[case("(1+2)", "(1 + 2)")]
    #[case("  1 / 2  ", "(1 / 2)")]
    #[case("2*2/ 2 * 22 - 2 - ( 5 - 1) + 3", "((((((2 * 2) / 2) * 22) - 2) - (5 - 1)) + 3)")]
    #[case("call(1,2,3) / 2", "(call(1, 2, 3) / 2)")]
    fn binary_test(#[case] code: &str, #[case] expected: &str) {
        assert_eq!(parse_to_string(code), expected, "{code}");
    }

    #[rstest]
    #[case("1 - 10 == 20", "((1 - 10) == 20)")]
    #[case("1 - 10 == 20 * 4 >> 2", "((1 - 10) == ((20 * 4) >> 2))")]
    #[case("20 && 10 | 30", "(20 && (10 | 30))")]
    #[case("20 || 10 & 30", "(20 || (10 & 30))")]
    #[case("20 % 10 == 10 || 30 > 20", "(((20 % 10) == 10) || (30 > 20))")]
    #[case("20 ^ 10 | 30", "((20 ^ 10) | 30)")]
    #[case("1 << 2 + 3", "(1 << (2 + 3))")]
    fn precedence_test(#[case] code: &str, #[case] expected: &str) {
        assert_eq!(parse_to_string(code), expected, "{code}");
    }

    #[rstest]
    #[case("!x", "!x")]
    #[case("!!x", "!!x")]
    #[case("-x + 1", "(-x + 1)")]
    #[case("&x", "&x")]
    #[case("*p + 1", "(*p + 1)")]
    #[case("!call(10) - 20", "(!call(10) - 20)")]
    fn unary_test(#[case] code: &str, #[case] expected: &str) {
        assert_eq!(parse_to_string(code), expected, "{code}");
    }

    #[rstest]
    #[case("p.x", "p.x")]
    #[case("p.x.y", "p.x.y")]
    #[case("t.0", "t.0")]
    #[case("o.m(1)", "o.m(1)")]
    #[case("Option.Some(7)", "Option.Some(7)")]
    #[case("a[i]", "a[i]")]
    #[case("a[i + 1]", "a[(i + 1)]")]
    #[case("x as i64", "(x as i64)")]
    #[case("p.x as f64 + 1.5", "((p.x as f64) + 1.5)")]
    #[case("len(xs)", "len(xs)")]
    fn postfix_test(#[case] code: &str, #[case] expected: &str) {
        assert_eq!(parse_to_string(code), expected, "{code}");
    }

    #[rstest]
    #[case("[1, 2, 3]", "[1, 2, 3]")]
    #[case("(1, true)", "(1, true)")]
    #[case("Point { x: 1, y: 2 }", "Point { x: 1, y: 2 }")]
    #[case("()", "()")]
    fn aggregate_test(#[case] code: &str, #[case] expected: &str) {
        assert_eq!(parse_to_string(code), expected, "{code}");
    }

    #[test]
    fn no_struct_mode_leaves_brace_alone() {
        let state = State::new(SourceFile::new(vec!["<memory>".into()], "x { }".to_string()));
        let input = NomSpan::new_extra(state.file.code.as_str(), state.clone());
        let (rest, parsed) = ExpressionAst::parse_no_struct(input).unwrap();
        assert!(matches!(parsed, ExpressionAst::Identifier { .. }));
        assert!(rest.fragment().starts_with('{'));
    }
}
