//! Statement, block and pattern parsing for the Sable language.
//!
//! Blocks are brace-delimited statement sequences. The last statement
//! may be an expression without a trailing semicolon, which makes it
//! the block's tail value. A statement that fails to parse records a
//! diagnostic and the block parser synchronizes to the next `;` or the
//! block's closing brace, so one bad statement does not hide the rest
//! of the file.
//!
//! `if`, `if let` and `match` are expressions; the statement parser
//! accepts them without a semicolon so they read naturally in statement
//! position too.

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::char;
use nom::combinator::{consumed, cut, map, not, opt, peek, value};
use nom::error::context;
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::{IResult, Input, Parser};

use crate::ast::{
    BlockAst, ExpressionAst, IfExpressionAst, IfLetAst, LiteralValue, MatchArmAst,
    MatchExpressionAst, PatternAst, StatementAst, TypeAst,
};
use crate::nom_tools::{cleanup, token, NomSpan, ToRange};

use super::{comma_list, expected_ident, ident, keyword, next_index, skip_trivia, SableParserError};

impl<'base> BlockAst<'base> {
    /// Parses a brace-delimited block with statement-level recovery.
    pub fn parse(input: NomSpan<'base>) -> IResult<NomSpan<'base>, BlockAst<'base>, SableParserError<'base>> {
        let start_offset;
        let state = input.extra.clone();

        let (mut input, _) = context("Block's opening '{' missing", cut(token('{'))).parse(input)?;
        start_offset = input.location_offset().saturating_sub(1);

        let mut statements = Vec::new();
        loop {
            input = skip_trivia(input);
            if input.fragment().is_empty() || input.fragment().starts_with('}') {
                break;
            }

            match StatementAst::parse(input.clone()) {
                Ok((rest, statement)) => {
                    statements.push(statement);
                    input = rest;
                }
                Err(error) => {
                    super::report_parse_error(&state, &error, input.location_offset());
                    input = synchronize_statement(input);
                }
            }
        }

        let (input, _) = context("Block's closing '}' missing", cut(token('}'))).parse(input)?;
        let end_offset = input.location_offset();

        let span = crate::nom_tools::Span {
            text: "",
            position: start_offset..end_offset,
            state,
        };
        Ok((input, BlockAst { statements, span }))
    }
}

/// Skips past a failing statement: consumes up to and including the next
/// `;` at the current brace depth, or stops before the block's `}`.
fn synchronize_statement(input: NomSpan<'_>) -> NomSpan<'_> {
    let fragment = input.fragment();
    let mut depth = 0i32;
    let mut skipped = fragment.len();

    for (offset, ch) in fragment.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                if depth == 0 {
                    skipped = offset;
                    break;
                }
                depth -= 1;
            }
            ';' if depth == 0 => {
                skipped = offset + 1;
                break;
            }
            _ => {}
        }
    }

    // Always make progress, even on a stray closing brace at offset 0.
    if skipped == 0 {
        skipped = fragment.chars().next().map(char::len_utf8).unwrap_or(0);
    }
    input.take_from(skipped)
}

impl<'base> StatementAst<'base> {
    /// Parses one statement.
    pub fn parse(input: NomSpan<'base>) -> IResult<NomSpan<'base>, StatementAst<'base>, SableParserError<'base>> {
        alt((
            Self::let_statement,
            Self::while_statement,
            Self::for_statement,
            Self::return_statement,
            Self::break_statement,
            Self::continue_statement,
            Self::expression_or_assignment,
        ))
        .parse(input)
    }

    /// `let [mut] name [: Type] = expr ;`
    fn let_statement(input: NomSpan<'base>) -> IResult<NomSpan<'base>, StatementAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let (input, _) = keyword("let").parse(input)?;
        let (input, mutable) = map(opt(keyword("mut")), |m| m.is_some()).parse(input)?;
        let (input, name) = expected_ident("Missing binding name", input)?;
        let (input, written_type) =
            opt(preceded(token(':'), context("Missing type after ':'", cut(TypeAst::parse)))).parse(input)?;
        let (input, _) = context("Missing '=' in let binding", cut(token('='))).parse(input)?;
        let (input, expression) =
            context("Missing initializer expression", cut(ExpressionAst::parse)).parse(input)?;
        let (input, _) = context("Missing ';'", cut(token(';'))).parse(input)?;

        Ok((
            input,
            StatementAst::Let { index, mutable, name: name.into(), written_type, value: expression },
        ))
    }

    /// `while cond { ... }`
    fn while_statement(input: NomSpan<'base>) -> IResult<NomSpan<'base>, StatementAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let (input, span) = keyword("while").parse(input)?;
        let (input, condition) =
            context("Missing loop condition", cut(ExpressionAst::parse_no_struct)).parse(input)?;
        let (input, body) = BlockAst::parse(input)?;

        Ok((input, StatementAst::While { index, condition, body, span: span.into() }))
    }

    /// `for i in start .. end { ... }`
    fn for_statement(input: NomSpan<'base>) -> IResult<NomSpan<'base>, StatementAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let (input, span) = keyword("for").parse(input)?;
        let (input, binding) = expected_ident("Missing loop variable", input)?;
        let (input, _) = context("Missing 'in'", cut(keyword("in"))).parse(input)?;
        let (input, start) =
            context("Missing range start", cut(ExpressionAst::parse_no_struct)).parse(input)?;
        let (input, _) = context("Missing '..' in range", cut(cleanup(tag("..")))).parse(input)?;
        let (input, end) =
            context("Missing range end", cut(ExpressionAst::parse_no_struct)).parse(input)?;
        let (input, body) = BlockAst::parse(input)?;

        Ok((
            input,
            StatementAst::For { index, binding: binding.into(), start, end, body, span: span.into() },
        ))
    }

    /// `return [expr] ;`
    fn return_statement(input: NomSpan<'base>) -> IResult<NomSpan<'base>, StatementAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let (input, span) = keyword("return").parse(input)?;
        let (input, value) = opt(ExpressionAst::parse).parse(input)?;
        let (input, _) = context("Missing ';' after return", cut(token(';'))).parse(input)?;

        Ok((input, StatementAst::Return { index, value, span: span.into() }))
    }

    /// `break ;`
    fn break_statement(input: NomSpan<'base>) -> IResult<NomSpan<'base>, StatementAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let (input, span) = keyword("break").parse(input)?;
        let (input, _) = context("Missing ';' after break", cut(token(';'))).parse(input)?;
        Ok((input, StatementAst::Break { index, span: span.into() }))
    }

    /// `continue ;`
    fn continue_statement(input: NomSpan<'base>) -> IResult<NomSpan<'base>, StatementAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let (input, span) = keyword("continue").parse(input)?;
        let (input, _) = context("Missing ';' after continue", cut(token(';'))).parse(input)?;
        Ok((input, StatementAst::Continue { index, span: span.into() }))
    }

    /// An expression statement, an assignment, or a block tail value.
    fn expression_or_assignment(
        input: NomSpan<'base>,
    ) -> IResult<NomSpan<'base>, StatementAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let (input, expr) = ExpressionAst::parse(input)?;

        // `=` not followed by `=` starts an assignment.
        let mut assign = cleanup(terminated(char('='), not(char('='))));
        if let Ok((rest, _)) = assign.parse(input.clone()) {
            let (rest, value) =
                context("Missing value after '='", cut(ExpressionAst::parse)).parse(rest)?;
            let (rest, _) = context("Missing ';' after assignment", cut(token(';'))).parse(rest)?;
            return Ok((rest, StatementAst::Assignment { index, target: expr, value }));
        }

        // Block-form expressions stand on their own; everything else
        // needs a semicolon unless it is the block's tail expression.
        let block_form = matches!(
            expr,
            ExpressionAst::If(_) | ExpressionAst::IfLet(_) | ExpressionAst::Match(_)
        );

        let (input, semicolon) = map(opt(token(';')), |s| s.is_some()).parse(input)?;
        if semicolon || block_form {
            return Ok((input, StatementAst::Expression { expr, semicolon }));
        }

        // Tail expression: only valid immediately before the closing brace.
        let (input, _) = context("Missing ';'", cut(peek(token('}')))).parse(input)?;
        Ok((input, StatementAst::Expression { expr, semicolon: false }))
    }
}

impl<'base> PatternAst<'base> {
    /// Parses a match / `if let` pattern.
    pub fn parse(input: NomSpan<'base>) -> IResult<NomSpan<'base>, PatternAst<'base>, SableParserError<'base>> {
        cleanup(alt((Self::wildcard, Self::literal, Self::variant_or_binding))).parse(input)
    }

    /// `_`
    fn wildcard(input: NomSpan<'base>) -> IResult<NomSpan<'base>, PatternAst<'base>, SableParserError<'base>> {
        let (input, span) =
            terminated(tag("_"), not(alt((nom::character::complete::alphanumeric1, tag("_"))))).parse(input)?;
        Ok((input, PatternAst::Wildcard { span: span.into() }))
    }

    /// An integer, boolean or char literal pattern.
    fn literal(input: NomSpan<'base>) -> IResult<NomSpan<'base>, PatternAst<'base>, SableParserError<'base>> {
        let (input, (span, literal)) = consumed(alt((
            super::primitive::number,
            super::primitive::char_literal,
            value(LiteralValue::Bool(true), keyword("true")),
            value(LiteralValue::Bool(false), keyword("false")),
        )))
        .parse(input)?;
        Ok((input, PatternAst::Literal { span: span.into(), value: literal }))
    }

    /// `Enum.Variant(bindings)`, `Enum.Variant`, or a plain binding name.
    fn variant_or_binding(
        input: NomSpan<'base>,
    ) -> IResult<NomSpan<'base>, PatternAst<'base>, SableParserError<'base>> {
        let (rest, (span, (first, qualified))) = consumed(pair(
            ident(),
            opt(pair(
                preceded(terminated(token('.'), not(char('.'))), cut(ident())),
                opt(delimited(
                    token('('),
                    comma_list(PatternAst::parse),
                    context("Missing ')'", cut(token(')'))),
                )),
            )),
        ))
        .parse(input)?;

        let pattern = match qualified {
            Some((variant, bindings)) => PatternAst::EnumVariant {
                enum_name: Some(first.into()),
                variant: variant.into(),
                bindings: bindings.unwrap_or_default(),
                span: span.into(),
            },
            None => PatternAst::Binding { name: first.into() },
        };
        Ok((rest, pattern))
    }
}

impl<'base> IfExpressionAst<'base> {
    /// Parses `if cond { } [else if cond { }]* [else { }]`.
    pub fn parse_for_expression(
        input: NomSpan<'base>,
    ) -> IResult<NomSpan<'base>, ExpressionAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let start = input.location_offset();
        let state = input.extra.clone();

        let (input, _) = keyword("if").parse(input)?;
        // `if let` belongs to the IfLet parser.
        let (input, _) = not(peek(keyword("let"))).parse(input)?;

        let (input, condition) =
            context("Missing condition", cut(ExpressionAst::parse_no_struct)).parse(input)?;
        let (input, then_block) = BlockAst::parse(input)?;

        let (input, else_ifs) = nom::multi::many0(map(
            preceded(
                pair(keyword("else"), peek(keyword("if"))),
                pair(
                    preceded(
                        pair(keyword("if"), not(peek(keyword("let")))),
                        context("Missing condition", cut(ExpressionAst::parse_no_struct)),
                    ),
                    BlockAst::parse,
                ),
            ),
            |(condition, block)| (condition, block),
        ))
        .parse(input)?;

        let (input, else_block) = opt(preceded(keyword("else"), BlockAst::parse)).parse(input)?;

        let span = crate::nom_tools::Span {
            text: "",
            position: start..input.location_offset(),
            state,
        };
        Ok((
            input,
            ExpressionAst::If(IfExpressionAst { index, condition: Box::new(condition), then_block, else_ifs, else_block, span }),
        ))
    }
}

impl<'base> IfLetAst<'base> {
    /// Parses `if let Pattern = expr { } [else { }]`.
    pub fn parse_for_expression(
        input: NomSpan<'base>,
    ) -> IResult<NomSpan<'base>, ExpressionAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let start = input.location_offset();
        let state = input.extra.clone();

        let (input, _) = keyword("if").parse(input)?;
        let (input, _) = keyword("let").parse(input)?;
        let (input, pattern) = context("Missing pattern", cut(PatternAst::parse)).parse(input)?;
        let (input, _) = context("Missing '=' in if let", cut(token('='))).parse(input)?;
        let (input, scrutinee) =
            context("Missing expression", cut(ExpressionAst::parse_no_struct)).parse(input)?;
        let (input, then_block) = BlockAst::parse(input)?;
        let (input, else_block) = opt(preceded(keyword("else"), BlockAst::parse)).parse(input)?;

        let span = crate::nom_tools::Span {
            text: "",
            position: start..input.location_offset(),
            state,
        };
        Ok((
            input,
            ExpressionAst::IfLet(IfLetAst {
                index,
                pattern,
                value: Box::new(scrutinee),
                then_block,
                else_block,
                span,
            }),
        ))
    }
}

impl<'base> MatchExpressionAst<'base> {
    /// Parses `match expr { Pattern => body, ... }`.
    ///
    /// An arm body is a block or a bare expression; bare expressions are
    /// wrapped into a one-expression block so lowering sees one shape.
    pub fn parse_for_expression(
        input: NomSpan<'base>,
    ) -> IResult<NomSpan<'base>, ExpressionAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let start = input.location_offset();
        let state = input.extra.clone();

        let (input, _) = keyword("match").parse(input)?;
        let (input, scrutinee) =
            context("Missing match scrutinee", cut(ExpressionAst::parse_no_struct)).parse(input)?;
        let (input, _) = context("Missing '{'", cut(token('{'))).parse(input)?;
        let (input, arms) = nom::multi::many0(MatchArmAst::parse).parse(input)?;
        let (input, _) = context("Missing '}'", cut(token('}'))).parse(input)?;

        let span = crate::nom_tools::Span {
            text: "",
            position: start..input.location_offset(),
            state,
        };
        Ok((
            input,
            ExpressionAst::Match(MatchExpressionAst { index, scrutinee: Box::new(scrutinee), arms, span }),
        ))
    }
}

impl<'base> MatchArmAst<'base> {
    /// Parses one `Pattern => body` arm with an optional trailing comma.
    fn parse(input: NomSpan<'base>) -> IResult<NomSpan<'base>, MatchArmAst<'base>, SableParserError<'base>> {
        let index = next_index(&input);
        let (input, pattern) = PatternAst::parse(input)?;
        let (input, _) = context("Missing '=>' in match arm", cut(cleanup(tag("=>")))).parse(input)?;

        let (input, body) = if peek(token('{')).parse(input.clone()).is_ok() {
            BlockAst::parse(input)?
        } else {
            let state = input.extra.clone();
            let (input, expr) =
                context("Missing match arm body", cut(ExpressionAst::parse)).parse(input)?;
            let span = crate::nom_tools::Span {
                text: "",
                position: expr.position(),
                state,
            };
            let body = BlockAst {
                statements: vec![StatementAst::Expression { expr, semicolon: false }],
                span,
            };
            (input, body)
        };

        let (input, _) = opt(token(',')).parse(input)?;
        Ok((input, MatchArmAst { index, pattern, body }))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::{ast::StatementAst, file::SourceFile, nom_tools::State};

    use super::*;

    fn parse_block(code: &str) -> (State, BlockAst<'_>) {
        // Leak the state so the returned AST can borrow from it in tests.
        let state: &'static State =
            Box::leak(Box::new(State::new(SourceFile::new(vec!["<memory>".into()], code.to_string()))));
        let input = NomSpan::new_extra(state.file.code.as_str(), state.clone());
        let (rest, block) = BlockAst::parse(input).unwrap();
        assert!(rest.fragment().trim().is_empty());
        (state.clone(), block)
    }

    #[test]
    fn empty_block_has_zero_statements() {
        let (_, block) = parse_block("{ }");
        assert!(block.statements.is_empty());
        assert!(block.tail_expression().is_none());
    }

    #[rstest]
    #[case("{ let x = 1; }", 1)]
    #[case("{ let mut x: i32 = 1; x = 2; }", 2)]
    #[case("{ return 1; }", 1)]
    #[case("{ break; continue; }", 2)]
    #[case("{ while x < 10 { x = x + 1; } }", 1)]
    #[case("{ for i in 0..10 { log(\"x\"); } }", 1)]
    #[case("{ f(); g(); }", 2)]
    fn statement_counts(#[case] code: &str, #[case] expected: usize) {
        let (_, block) = parse_block(code);
        assert_eq!(block.statements.len(), expected, "{code}");
    }

    #[test]
    fn tail_expression_is_detected() {
        let (_, block) = parse_block("{ let x = 1; x + 1 }");
        assert!(block.tail_expression().is_some());
    }

    #[test]
    fn trailing_semicolon_is_not_a_tail() {
        let (_, block) = parse_block("{ x + 1; }");
        assert!(block.tail_expression().is_none());
    }

    #[test]
    fn if_statement_without_semicolon() {
        let (_, block) = parse_block("{ if x { f(); } else { g(); } h(); }");
        assert_eq!(block.statements.len(), 2);
    }

    #[test]
    fn match_arms_parse() {
        let (_, block) = parse_block(
            "{ match c { Color.Red => 1, Color.Green => { 2 }, _ => 3, } }",
        );
        match &block.statements[0] {
            StatementAst::Expression { expr: crate::ast::ExpressionAst::Match(m), .. } => {
                assert_eq!(m.arms.len(), 3);
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn if_let_parses() {
        let (_, block) = parse_block("{ if let Option.Some(v) = o { f(v); } else { g(); } }");
        assert!(matches!(
            block.statements[0],
            StatementAst::Expression { expr: crate::ast::ExpressionAst::IfLet(_), .. }
        ));
    }

    #[test]
    fn bad_statement_recovers() {
        let (state, block) = parse_block("{ let = ; f(); }");
        assert_eq!(block.statements.len(), 1);
        assert!(!state.recovered_errors.borrow().is_empty());
    }

    #[test]
    fn assignment_to_field() {
        let (_, block) = parse_block("{ p.x = 3; }");
        assert!(matches!(block.statements[0], StatementAst::Assignment { .. }));
    }
}
