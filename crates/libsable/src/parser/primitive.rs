//! Literal value parsing for the Sable language.
//!
//! Handles every literal form the language has:
//!
//! - **Integers** in decimal, hex (`0xff`), octal (`0o17`) and binary
//!   (`0b1010`), with `_` digit separators. Integers keep their unsigned
//!   magnitude and base; the semantic analyzer picks the concrete width
//!   from context and range-checks it.
//! - **Floats** (`1.5`, `2.5e-3`) parsed through `minimal-lexical`.
//! - **Strings** with `\n \r \t \\ \" \0` escapes. Escape-free strings
//!   borrow from the source.
//! - **Chars** (`'a'`, `'\n'`).
//! - **Booleans** (`true` / `false`) and the unit literal `()`.

use std::borrow::Cow;

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{char, none_of, one_of};
use nom::combinator::{consumed, opt, recognize, value};
use nom::error::context;
use nom::multi::{many0, many1};
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::{Err, IResult, Parser};
use nom_language::error::{VerboseError, VerboseErrorKind};

use crate::ast::{ExpressionAst, IntBase, LiteralValue};
use crate::nom_tools::{cleanup, NomSpan};

use super::{keyword, next_index, SableParserError};

/// Parses one string character, decoding escapes.
fn character(input: NomSpan<'_>) -> IResult<NomSpan<'_>, char, SableParserError<'_>> {
    let (input, c) = none_of("\"\\")(input)?;
    Ok((input, c))
}

/// Parses one escape sequence after a backslash.
fn escape(input: NomSpan<'_>) -> IResult<NomSpan<'_>, char, SableParserError<'_>> {
    preceded(
        char('\\'),
        alt((
            value('\n', char('n')),
            value('\r', char('r')),
            value('\t', char('t')),
            value('\\', char('\\')),
            value('"', char('"')),
            value('\'', char('\'')),
            value('\0', char('0')),
        )),
    )
    .parse(input)
}

/// Parses a string literal.
///
/// The content borrows from the source when no escape sequence occurs;
/// otherwise the decoded characters are collected into an owned string.
pub fn string(input: NomSpan<'_>) -> IResult<NomSpan<'_>, LiteralValue<'_>, SableParserError<'_>> {
    let (rest, raw) = delimited(
        char('"'),
        recognize(many0(alt((value((), character), value((), escape))))),
        context("Unterminated string literal", nom::combinator::cut(char('"'))),
    )
    .parse(input)?;

    let fragment: &str = raw.fragment();
    let text = if fragment.contains('\\') {
        let mut decoded = String::with_capacity(fragment.len());
        let mut chars = NomSpan::new_extra(fragment, raw.extra.clone());
        while !chars.fragment().is_empty() {
            let (next, c) = alt((character, escape)).parse(chars)?;
            decoded.push(c);
            chars = next;
        }
        Cow::Owned(decoded)
    } else {
        Cow::Borrowed(fragment)
    };

    Ok((rest, LiteralValue::String(text)))
}

/// Parses a character literal.
pub fn char_literal(input: NomSpan<'_>) -> IResult<NomSpan<'_>, LiteralValue<'_>, SableParserError<'_>> {
    let (input, c) = delimited(
        char('\''),
        alt((escape, none_of("'\\"))),
        context("Unterminated character literal", nom::combinator::cut(char('\''))),
    )
    .parse(input)?;
    Ok((input, LiteralValue::Char(c)))
}

/// Parses a run of digits in the given alphabet, allowing `_` separators.
fn digits<'base>(
    alphabet: &'static str,
) -> impl Parser<NomSpan<'base>, Output = NomSpan<'base>, Error = SableParserError<'base>> {
    recognize(many1(terminated(one_of(alphabet), many0(char('_')))))
}

/// Parses an integer magnitude in a non-decimal base.
fn based_integer(input: NomSpan<'_>) -> IResult<NomSpan<'_>, LiteralValue<'_>, SableParserError<'_>> {
    let (rest, (base, digits_span)) = alt((
        pair(value(IntBase::Hexadecimal, tag("0x")), digits("0123456789abcdefABCDEF")),
        pair(value(IntBase::Octal, tag("0o")), digits("01234567")),
        pair(value(IntBase::Binary, tag("0b")), digits("01")),
    ))
    .parse(input.clone())?;

    let cleaned = digits_span.fragment().replace('_', "");
    match u128::from_str_radix(&cleaned, base.radix()) {
        Ok(magnitude) => Ok((rest, LiteralValue::Int { magnitude, base })),
        Err(_) => Err(Err::Failure(VerboseError {
            errors: vec![(input, VerboseErrorKind::Context("Integer literal is too large"))],
        })),
    }
}

/// Parses a decimal integer or floating point literal.
///
/// `1..10` must leave the range operator intact, so the fraction part is
/// only consumed when a digit follows the dot.
fn decimal_number(input: NomSpan<'_>) -> IResult<NomSpan<'_>, LiteralValue<'_>, SableParserError<'_>> {
    let (rest, (integer, fraction)) = (
        digits("0123456789"),
        opt(preceded(
            terminated(char('.'), nom::combinator::peek(one_of("0123456789"))),
            (
                digits("0123456789"),
                opt(preceded(
                    one_of("eE"),
                    (opt(alt((value(true, char('-')), value(false, char('+'))))), digits("0123456789")),
                )),
            ),
        )),
    )
        .parse(input.clone())?;

    let integer_digits = integer.fragment().replace('_', "");

    let literal = if let Some((fraction, exponent)) = fraction {
        let fraction_digits = fraction.fragment().replace('_', "");
        let exponent = match exponent {
            Some((negative, digits_span)) => {
                let mut exponent = digits_span.fragment().replace('_', "").parse::<i32>().unwrap_or(0);
                if negative == Some(true) {
                    exponent = -exponent;
                }
                exponent
            }
            None => 0,
        };

        let number: f64 = minimal_lexical::parse_float(
            integer_digits.as_bytes().iter(),
            fraction_digits.as_bytes().iter(),
            exponent,
        );
        LiteralValue::Float(number)
    } else {
        match integer_digits.parse::<u128>() {
            Ok(magnitude) => LiteralValue::Int { magnitude, base: IntBase::Decimal },
            Err(_) => {
                return Err(Err::Failure(VerboseError {
                    errors: vec![(input, VerboseErrorKind::Context("Integer literal is too large"))],
                }));
            }
        }
    };

    Ok((rest, literal))
}

/// Parses any numeric literal.
pub fn number(input: NomSpan<'_>) -> IResult<NomSpan<'_>, LiteralValue<'_>, SableParserError<'_>> {
    alt((based_integer, decimal_number)).parse(input)
}

/// Parses the unit literal `()`.
fn unit(input: NomSpan<'_>) -> IResult<NomSpan<'_>, LiteralValue<'_>, SableParserError<'_>> {
    value(LiteralValue::Unit, pair(char('('), cleanup(char(')')))).parse(input)
}

impl LiteralValue<'_> {
    /// Parses any literal value, returning the consumed span alongside it.
    pub fn parse(
        input: NomSpan<'_>,
    ) -> IResult<NomSpan<'_>, (NomSpan<'_>, LiteralValue<'_>), SableParserError<'_>> {
        consumed(cleanup(alt((
            number,
            string,
            char_literal,
            value(LiteralValue::Bool(true), keyword("true")),
            value(LiteralValue::Bool(false), keyword("false")),
            unit,
        ))))
        .parse(input)
    }

    /// Parses a literal as an expression node.
    pub fn parse_for_expression(
        input: NomSpan<'_>,
    ) -> IResult<NomSpan<'_>, ExpressionAst<'_>, SableParserError<'_>> {
        let index = next_index(&input);
        let (input, (span, literal)) = Self::parse(input)?;
        Ok((input, ExpressionAst::Literal { index, span: span.into(), value: literal }))
    }
}

impl std::fmt::Display for LiteralValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiteralValue::Int { magnitude, .. } => write!(f, "{magnitude}"),
            LiteralValue::Float(v) => write!(f, "{v}"),
            LiteralValue::Bool(v) => write!(f, "{v}"),
            LiteralValue::Char(v) => write!(f, "'{v}'"),
            LiteralValue::String(v) => write!(f, "\"{v}\""),
            LiteralValue::Unit => write!(f, "()"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::{ast::IntBase, file::SourceFile, nom_tools::State};

    use super::*;

    fn span_for(state: &State) -> NomSpan<'_> {
        NomSpan::new_extra(state.file.code.as_str(), state.clone())
    }

    fn state_for(code: &str) -> State {
        State::new(SourceFile::new(vec!["<memory>".into()], code.to_string()))
    }

    #[rstest]
    #[case("0", 0, IntBase::Decimal)]
    #[case("123", 123, IntBase::Decimal)]
    #[case("1_000_000", 1_000_000, IntBase::Decimal)]
    #[case("0xff", 255, IntBase::Hexadecimal)]
    #[case("0o17", 15, IntBase::Octal)]
    #[case("0b1010", 10, IntBase::Binary)]
    #[case("18446744073709551615", u64::MAX as u128, IntBase::Decimal)]
    fn integer_test(#[case] code: &str, #[case] expected: u128, #[case] base: IntBase) {
        let state = state_for(code);
        let (_, parsed) = number(span_for(&state)).unwrap();
        assert_eq!(parsed, LiteralValue::Int { magnitude: expected, base });
    }

    #[rstest]
    #[case("1.5", 1.5)]
    #[case("1024.0", 1024.0)]
    #[case("1.0e-7", 1.0e-7)]
    #[case("2.5e3", 2500.0)]
    fn float_test(#[case] code: &str, #[case] expected: f64) {
        let state = state_for(code);
        let (_, parsed) = number(span_for(&state)).unwrap();
        assert_eq!(parsed, LiteralValue::Float(expected));
    }

    #[test]
    fn integer_does_not_eat_range_operator() {
        let state = state_for("1..10");
        let (rest, parsed) = number(span_for(&state)).unwrap();
        assert_eq!(parsed, LiteralValue::Int { magnitude: 1, base: IntBase::Decimal });
        assert_eq!(*rest.fragment(), "..10");
    }

    #[rstest]
    #[case(r#""hello""#, "hello")]
    #[case(r#""hello\nworld""#, "hello\nworld")]
    #[case(r#""tab\there""#, "tab\there")]
    #[case(r#""quote\"inner""#, "quote\"inner")]
    #[case(r#""""#, "")]
    fn string_test(#[case] code: &str, #[case] expected: &str) {
        let state = state_for(code);
        let (_, parsed) = string(span_for(&state)).unwrap();
        assert_eq!(parsed, LiteralValue::String(expected.into()));
    }

    #[test]
    fn escape_free_string_borrows() {
        let state = state_for(r#""borrowed""#);
        let (_, parsed) = string(span_for(&state)).unwrap();
        assert!(matches!(parsed, LiteralValue::String(std::borrow::Cow::Borrowed(_))));
    }

    #[rstest]
    #[case("'a'", 'a')]
    #[case("'\\n'", '\n')]
    #[case("'\\''", '\'')]
    fn char_test(#[case] code: &str, #[case] expected: char) {
        let state = state_for(code);
        let (_, parsed) = char_literal(span_for(&state)).unwrap();
        assert_eq!(parsed, LiteralValue::Char(expected));
    }

    #[test]
    fn unit_test() {
        let state = state_for("( )");
        let (_, (_, parsed)) = LiteralValue::parse(span_for(&state)).unwrap();
        assert_eq!(parsed, LiteralValue::Unit);
    }
}
