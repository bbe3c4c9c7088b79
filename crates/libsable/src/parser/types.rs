//! Written type parsing for the Sable language.
//!
//! Grammar:
//!
//! ```text
//! type  := '*' type
//!        | '[' type ']'            // slice
//!        | '[' type ';' int ']'    // fixed-size array
//!        | '(' type ',' type+ ')'  // tuple
//!        | 'fn' '(' type,* ')' ['->' type]
//!        | ident ['<' type,* '>']  // named / generic instantiation
//! ```

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::char;
use nom::combinator::{consumed, cut, opt};
use nom::error::context;
use nom::sequence::preceded;
use nom::{IResult, Parser};

use crate::ast::TypeAst;
use crate::nom_tools::{cleanup, token, NomSpan};

use super::{comma_list, ident, keyword, primitive, SableParserError};

impl<'base> TypeAst<'base> {
    /// Parses a written type.
    pub fn parse(input: NomSpan<'base>) -> IResult<NomSpan<'base>, TypeAst<'base>, SableParserError<'base>> {
        cleanup(alt((Self::pointer, Self::slice_or_array, Self::tuple, Self::function, Self::named)))
            .parse(input)
    }

    /// `*T`
    fn pointer(input: NomSpan<'base>) -> IResult<NomSpan<'base>, TypeAst<'base>, SableParserError<'base>> {
        let (input, (span, pointee)) = consumed(preceded(
            char('*'),
            context("Missing pointee type after '*'", cut(Self::parse)),
        ))
        .parse(input)?;
        Ok((input, TypeAst::Pointer { pointee: Box::new(pointee), span: span.into() }))
    }

    /// `[T]` or `[T; N]`
    fn slice_or_array(input: NomSpan<'base>) -> IResult<NomSpan<'base>, TypeAst<'base>, SableParserError<'base>> {
        let (input, (span, (element, len))) = consumed(preceded(
            char('['),
            cut((
                context("Missing element type", Self::parse),
                nom::sequence::terminated(
                    opt(preceded(token(';'), context("Missing array length", cut(cleanup(primitive::number))))),
                    context("Missing ']'", token(']')),
                ),
            )),
        ))
        .parse(input)?;

        let ty = match len {
            Some(crate::ast::LiteralValue::Int { magnitude, .. }) => TypeAst::Array {
                element: Box::new(element),
                len: magnitude.min(u64::MAX as u128) as u64,
                span: span.into(),
            },
            Some(_) => {
                return Err(nom::Err::Failure(nom_language::error::VerboseError {
                    errors: vec![(
                        input,
                        nom_language::error::VerboseErrorKind::Context("Array length must be an integer literal"),
                    )],
                }));
            }
            None => TypeAst::Slice { element: Box::new(element), span: span.into() },
        };
        Ok((input, ty))
    }

    /// `(T, U)`; needs at least two elements, `(T)` is not a type.
    fn tuple(input: NomSpan<'base>) -> IResult<NomSpan<'base>, TypeAst<'base>, SableParserError<'base>> {
        let (input, (span, elements)) = consumed(nom::sequence::delimited(
            char('('),
            comma_list(Self::parse),
            context("Missing ')'", cut(token(')'))),
        ))
        .parse(input)?;

        if elements.len() < 2 {
            return Err(nom::Err::Error(nom_language::error::VerboseError {
                errors: vec![(
                    input,
                    nom_language::error::VerboseErrorKind::Context("Tuple types need at least two elements"),
                )],
            }));
        }

        Ok((input, TypeAst::Tuple { elements, span: span.into() }))
    }

    /// `fn(T, U) -> R`
    fn function(input: NomSpan<'base>) -> IResult<NomSpan<'base>, TypeAst<'base>, SableParserError<'base>> {
        let (input, (span, (params, result))) = consumed(preceded(
            keyword("fn"),
            cut((
                nom::sequence::delimited(
                    context("Missing '('", token('(')),
                    comma_list(Self::parse),
                    context("Missing ')'", token(')')),
                ),
                opt(preceded(cleanup(tag("->")), context("Missing return type", cut(Self::parse)))),
            )),
        ))
        .parse(input)?;

        Ok((
            input,
            TypeAst::Function { params, result: result.map(Box::new), span: span.into() },
        ))
    }

    /// `Name` or `Name<T, U>`
    fn named(input: NomSpan<'base>) -> IResult<NomSpan<'base>, TypeAst<'base>, SableParserError<'base>> {
        let (input, (span, (name, args))) = consumed((
            ident(),
            opt(nom::sequence::delimited(
                token('<'),
                context("Missing generic arguments", cut(comma_list(Self::parse))),
                context("Missing '>'", cut(token('>'))),
            )),
        ))
        .parse(input)?;

        let ty = match args {
            Some(args) if !args.is_empty() => {
                TypeAst::Generic { name: name.into(), args, span: span.into() }
            }
            _ => TypeAst::Named { name: name.into() },
        };
        Ok((input, ty))
    }
}

impl std::fmt::Display for TypeAst<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeAst::Named { name } => write!(f, "{name}"),
            TypeAst::Generic { name, args, .. } => {
                write!(f, "{name}<")?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")
            }
            TypeAst::Pointer { pointee, .. } => write!(f, "*{pointee}"),
            TypeAst::Slice { element, .. } => write!(f, "[{element}]"),
            TypeAst::Array { element, len, .. } => write!(f, "[{element}; {len}]"),
            TypeAst::Tuple { elements, .. } => {
                write!(f, "(")?;
                for (index, element) in elements.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, ")")
            }
            TypeAst::Function { params, result, .. } => {
                write!(f, "fn(")?;
                for (index, param) in params.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ")")?;
                if let Some(result) = result {
                    write!(f, " -> {result}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::{file::SourceFile, nom_tools::State};

    use super::*;

    fn parse_type(code: &str) -> String {
        let state = State::new(SourceFile::new(vec!["<memory>".into()], code.to_string()));
        let input = NomSpan::new_extra(state.file.code.as_str(), state.clone());
        let (_, parsed) = TypeAst::parse(input).unwrap();
        parsed.to_string()
    }

    #[rstest]
    #[case("i32", "i32")]
    #[case(" bool ", "bool")]
    #[case("*i32", "*i32")]
    #[case("**u8", "**u8")]
    #[case("[i32]", "[i32]")]
    #[case("[u8; 16]", "[u8; 16]")]
    #[case("(i32, bool)", "(i32, bool)")]
    #[case("(i32, bool, f64,)", "(i32, bool, f64)")]
    #[case("fn(i32) -> bool", "fn(i32) -> bool")]
    #[case("fn()", "fn()")]
    #[case("Option<i32>", "Option<i32>")]
    #[case("Result<i32, string>", "Result<i32, string>")]
    #[case("Option<[*Point]>", "Option<[*Point]>")]
    fn type_round_trip(#[case] code: &str, #[case] expected: &str) {
        assert_eq!(parse_type(code), expected);
    }

    #[test]
    fn array_length_is_kept() {
        let state = State::new(SourceFile::new(vec!["<memory>".into()], "[f64; 3]".to_string()));
        let input = NomSpan::new_extra(state.file.code.as_str(), state.clone());
        let (_, parsed) = TypeAst::parse(input).unwrap();
        assert!(matches!(parsed, TypeAst::Array { len: 3, .. }));
    }
}
