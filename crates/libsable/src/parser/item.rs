//! Top-level declaration parsing for the Sable language.
//!
//! Covers everything that can appear at file scope:
//!
//! ```text
//! import net;                      import net.tls as tls;
//! fn add(a: i32, b: i32) -> i32 { ... }
//! extern fn panic(message: string) -> never;
//! extern fn printf(format: string, ...) -> i32;
//! struct Point { x: i32, y: i32, }
//! enum Shape { Circle(f64), Rect(f64, f64), }
//! const LIMIT: i32 = 100;
//! ```
//!
//! Functions without a `->` clause return unit. Struct and enum
//! definitions may carry generic type parameters (`struct Pair<A, B>`).

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::combinator::{consumed, cut, map, opt};
use nom::error::context;
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::{IResult, Parser};

use crate::ast::{
    BlockAst, ConstDefinitionAst, EnumDefinitionAst, ExpressionAst, ExternFunctionAst, FieldAst,
    FileStatementAst, FunctionDefinitionAst, ImportAst, ParameterAst, StructDefinitionAst, TypeAst,
    VariantAst,
};
use crate::nom_tools::{cleanup, token, NomSpan};

use super::{comma_list, expected_ident, ident, is_public, keyword, next_index, SableParserError};

/// Parses any top-level declaration.
pub fn file_statement(input: NomSpan<'_>) -> IResult<NomSpan<'_>, FileStatementAst<'_>, SableParserError<'_>> {
    alt((
        ImportAst::parse_for_file,
        ExternFunctionAst::parse_for_file,
        FunctionDefinitionAst::parse_for_file,
        StructDefinitionAst::parse_for_file,
        EnumDefinitionAst::parse_for_file,
        ConstDefinitionAst::parse_for_file,
    ))
    .parse(input)
}

/// Parses one `name: Type` parameter.
impl<'base> ParameterAst<'base> {
    fn parse(input: NomSpan<'base>) -> IResult<NomSpan<'base>, ParameterAst<'base>, SableParserError<'base>> {
        let (input, (name, written_type)) = pair(
            terminated(ident(), context("Missing ':' after parameter name", cut(token(':')))),
            context("Missing parameter type", cut(TypeAst::parse)),
        )
        .parse(input)?;
        Ok((input, ParameterAst { name: name.into(), written_type }))
    }
}

impl<'base> FunctionDefinitionAst<'base> {
    /// Parses a function definition as a file statement.
    pub fn parse_for_file(
        input: NomSpan<'base>,
    ) -> IResult<NomSpan<'base>, FileStatementAst<'base>, SableParserError<'base>> {
        let (input, function) = Self::parse(input)?;
        Ok((input, FileStatementAst::Function(function.into())))
    }

    /// Parses `[pub] fn name(params) [-> Type] { body }`.
    pub fn parse(input: NomSpan<'base>) -> IResult<NomSpan<'base>, FunctionDefinitionAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let (input, is_public) = is_public(input)?;
        let (input, _) = keyword("fn").parse(input)?;
        let (input, name) = expected_ident("Missing function name", input)?;
        let (input, (parameters_span, parameters)) = consumed(delimited(
            context("Missing '('", cut(token('('))),
            comma_list(ParameterAst::parse),
            context("Missing ')'", cut(token(')'))),
        ))
        .parse(input)?;
        let (input, return_type) = opt(preceded(
            cleanup(tag("->")),
            context("Missing function return type", cut(TypeAst::parse)),
        ))
        .parse(input)?;
        let (input, body) = BlockAst::parse(input)?;

        Ok((
            input,
            FunctionDefinitionAst {
                index,
                is_public: is_public.map(Into::into),
                name: name.into(),
                parameters,
                parameters_span: parameters_span.into(),
                return_type,
                body,
            },
        ))
    }
}

impl<'base> ExternFunctionAst<'base> {
    /// Parses an external declaration as a file statement.
    pub fn parse_for_file(
        input: NomSpan<'base>,
    ) -> IResult<NomSpan<'base>, FileStatementAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let (input, _) = keyword("extern").parse(input)?;
        let (input, _) = context("Missing 'fn' after 'extern'", cut(keyword("fn"))).parse(input)?;
        let (input, name) = expected_ident("Missing function name", input)?;

        let (input, _) = context("Missing '('", cut(token('('))).parse(input)?;
        let (input, parameters) = comma_list(ParameterAst::parse).parse(input)?;
        let (input, variadic) = map(opt(cleanup(tag("..."))), |dots| dots.is_some()).parse(input)?;
        let (input, _) = context("Missing ')'", cut(token(')'))).parse(input)?;

        let (input, return_type) = opt(preceded(
            cleanup(tag("->")),
            context("Missing return type", cut(TypeAst::parse)),
        ))
        .parse(input)?;
        let (input, _) = context("Missing ';' after extern declaration", cut(token(';'))).parse(input)?;

        Ok((
            input,
            FileStatementAst::Extern(
                ExternFunctionAst { index, name: name.into(), parameters, variadic, return_type }.into(),
            ),
        ))
    }
}

/// Parses an optional `<A, B>` type parameter list.
fn type_params(input: NomSpan<'_>) -> IResult<NomSpan<'_>, Vec<NomSpan<'_>>, SableParserError<'_>> {
    map(
        opt(delimited(
            token('<'),
            context("Missing type parameters", cut(comma_list(ident()))),
            context("Missing '>'", cut(token('>'))),
        )),
        Option::unwrap_or_default,
    )
    .parse(input)
}

impl<'base> StructDefinitionAst<'base> {
    /// Parses `[pub] struct Name[<T>] { field: Type, ... }`.
    pub fn parse_for_file(
        input: NomSpan<'base>,
    ) -> IResult<NomSpan<'base>, FileStatementAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let (input, is_public) = is_public(input)?;
        let (input, _) = keyword("struct").parse(input)?;
        let (input, name) = expected_ident("Missing struct name", input)?;
        let (input, params) = type_params(input)?;

        let field = map(ParameterAst::parse, |parameter| FieldAst {
            name: parameter.name,
            field_type: parameter.written_type,
        });
        let (input, fields) = delimited(
            context("Missing '{'", cut(token('{'))),
            comma_list(field),
            context("Missing '}'", cut(token('}'))),
        )
        .parse(input)?;

        Ok((
            input,
            FileStatementAst::Struct(
                StructDefinitionAst {
                    index,
                    is_public: is_public.map(Into::into),
                    name: name.into(),
                    type_params: params.into_iter().map(Into::into).collect(),
                    fields,
                }
                .into(),
            ),
        ))
    }
}

impl<'base> VariantAst<'base> {
    /// Parses `Name` or `Name(Type, Type)`.
    fn parse(input: NomSpan<'base>) -> IResult<NomSpan<'base>, VariantAst<'base>, SableParserError<'base>> {
        let (input, (name, payload)) = pair(
            ident(),
            opt(delimited(
                token('('),
                context("Missing payload types", cut(comma_list(TypeAst::parse))),
                context("Missing ')'", cut(token(')'))),
            )),
        )
        .parse(input)?;
        Ok((input, VariantAst { name: name.into(), payload: payload.unwrap_or_default() }))
    }
}

impl<'base> EnumDefinitionAst<'base> {
    /// Parses `[pub] enum Name[<T>] { Variant, Variant(Type), ... }`.
    pub fn parse_for_file(
        input: NomSpan<'base>,
    ) -> IResult<NomSpan<'base>, FileStatementAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let (input, is_public) = is_public(input)?;
        let (input, _) = keyword("enum").parse(input)?;
        let (input, name) = expected_ident("Missing enum name", input)?;
        let (input, params) = type_params(input)?;
        let (input, variants) = delimited(
            context("Missing '{'", cut(token('{'))),
            comma_list(VariantAst::parse),
            context("Missing '}'", cut(token('}'))),
        )
        .parse(input)?;

        Ok((
            input,
            FileStatementAst::Enum(
                EnumDefinitionAst {
                    index,
                    is_public: is_public.map(Into::into),
                    name: name.into(),
                    type_params: params.into_iter().map(Into::into).collect(),
                    variants,
                }
                .into(),
            ),
        ))
    }
}

impl<'base> ConstDefinitionAst<'base> {
    /// Parses `[pub] const NAME: Type = expr;`.
    pub fn parse_for_file(
        input: NomSpan<'base>,
    ) -> IResult<NomSpan<'base>, FileStatementAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let (input, is_public) = is_public(input)?;
        let (input, _) = keyword("const").parse(input)?;
        let (input, name) = expected_ident("Missing constant name", input)?;
        let (input, _) = context("Missing ':' after constant name", cut(token(':'))).parse(input)?;
        let (input, written_type) = context("Missing constant type", cut(TypeAst::parse)).parse(input)?;
        let (input, _) = context("Missing '=' in constant", cut(token('='))).parse(input)?;
        let (input, value) =
            context("Missing constant value", cut(ExpressionAst::parse)).parse(input)?;
        let (input, _) = context("Missing ';'", cut(token(';'))).parse(input)?;

        Ok((
            input,
            FileStatementAst::Const(
                ConstDefinitionAst {
                    index,
                    is_public: is_public.map(Into::into),
                    name: name.into(),
                    written_type,
                    value,
                }
                .into(),
            ),
        ))
    }
}

impl<'base> ImportAst<'base> {
    /// Parses `import path.to.module [as alias];`.
    pub fn parse_for_file(
        input: NomSpan<'base>,
    ) -> IResult<NomSpan<'base>, FileStatementAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let (input, (span, (module, alias))) = consumed(preceded(
            keyword("import"),
            cut(pair(
                context(
                    "Missing module path",
                    nom::multi::separated_list1(token('.'), ident()),
                ),
                terminated(
                    opt(preceded(keyword("as"), context("Missing alias name", cut(ident())))),
                    context("Missing ';' after import", token(';')),
                ),
            )),
        ))
        .parse(input)?;

        Ok((
            input,
            FileStatementAst::Import(
                ImportAst {
                    index,
                    module: module.into_iter().map(Into::into).collect(),
                    alias: alias.map(Into::into),
                    span: span.into(),
                }
                .into(),
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::{ast::FileStatementAst, file::SourceFile, nom_tools::State, parser};

    fn parse_file(code: &str) -> Vec<&'static str> {
        let state: &'static State = Box::leak(Box::new(State::new(SourceFile::new(
            vec!["<memory>".into()],
            code.to_string(),
        ))));
        let ast = parser::parse(state);
        assert!(
            state.recovered_errors.borrow().is_empty(),
            "unexpected syntax errors: {:?}",
            state.recovered_errors.borrow()
        );
        ast.statements
            .iter()
            .map(|statement| match statement {
                FileStatementAst::Function(_) => "fn",
                FileStatementAst::Struct(_) => "struct",
                FileStatementAst::Enum(_) => "enum",
                FileStatementAst::Const(_) => "const",
                FileStatementAst::Extern(_) => "extern",
                FileStatementAst::Import(_) => "import",
            })
            .collect()
    }

    #[rstest]
    #[case("fn main() { }", vec!["fn"])]
    #[case("fn id(x: i32) -> i32 { return x; }", vec!["fn"])]
    #[case("pub fn visible() -> bool { true }", vec!["fn"])]
    #[case("struct Point { x: i32, y: i32 }", vec!["struct"])]
    #[case("struct Pair<A, B> { first: A, second: B, }", vec!["struct"])]
    #[case("enum Color { Red, Green, Blue }", vec!["enum"])]
    #[case("enum Shape { Circle(f64), Rect(f64, f64) }", vec!["enum"])]
    #[case("const LIMIT: i32 = 100;", vec!["const"])]
    #[case("extern fn panic(message: string) -> never;", vec!["extern"])]
    #[case("extern fn printf(format: string, ...) -> i32;", vec!["extern"])]
    #[case("import math;", vec!["import"])]
    #[case("import net.tls as tls;", vec!["import"])]
    #[case(
        "import math; struct P { x: i32 } fn main() -> i32 { return 0; }",
        vec!["import", "struct", "fn"]
    )]
    fn declaration_shapes(#[case] code: &str, #[case] expected: Vec<&str>) {
        assert_eq!(parse_file(code), expected, "{code}");
    }

    #[test]
    fn declarations_keep_source_order() {
        let kinds = parse_file(
            "const A: i32 = 1; fn f() { } enum E { X } struct S { } extern fn e() -> i32;",
        );
        assert_eq!(kinds, vec!["const", "fn", "enum", "struct", "extern"]);
    }

    #[test]
    fn variadic_flag_is_set() {
        let state: &'static State = Box::leak(Box::new(State::new(SourceFile::new(
            vec!["<memory>".into()],
            "extern fn printf(format: string, ...) -> i32;".to_string(),
        ))));
        let ast = parser::parse(state);
        match &ast.statements[0] {
            FileStatementAst::Extern(extern_fn) => assert!(extern_fn.variadic),
            other => panic!("expected extern, got {other:?}"),
        }
    }
}
