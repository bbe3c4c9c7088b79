//! Sable language parser built on nom combinators.
//!
//! This module turns source text into the Abstract Syntax Tree. It
//! covers all language constructs:
//!
//! - Imports (`import net as n;`)
//! - Function, struct, enum, const and extern declarations
//! - Statements (`let`, assignment, `if`/`if let`, `while`, `for`,
//!   `match`, `return`, `break`, `continue`, expression statements)
//! - Expressions with layered operator precedence and postfix forms
//!   (call, index, field access, cast)
//! - Written types and patterns
//!
//! # Error recovery
//!
//! A syntax error does not abort the parse. The failing declaration or
//! statement records a diagnostic into the shared [`State`] and the
//! parser synchronizes: it skips to the next declaration keyword (or
//! statement boundary inside blocks) at the current brace depth and
//! continues, so one run reports as many syntax errors as possible and
//! still returns a partial AST for the later phases to inspect.
//!
//! # Organization
//!
//! - [`expression`]: precedence climbing and primary expressions
//! - [`statement`]: blocks, statements, patterns, `if`/`match`
//! - [`item`]: top-level declarations
//! - [`types`]: written types
//! - [`primitive`]: literal values

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric1};
use nom::combinator::{cut, map, not, opt, recognize, verify};
use nom::error::context;
use nom::multi::many0_count;
use nom::sequence::{pair, terminated};
use nom::{IResult, Input, Parser};
use nom_language::error::{VerboseError, VerboseErrorKind};

use crate::ast::{AstIndex, FileAst, FileStatementAst};
use crate::nom_tools::{cleanup, NomSpan, State, ToRange};

pub mod expression;
pub mod item;
pub mod primitive;
pub mod statement;
pub mod types;

/// Type alias for parser errors with context information.
pub type SableParserError<'base> = VerboseError<NomSpan<'base>>;

/// Reserved words that can never be identifiers.
pub static KEYWORDS: &[&str] = &[
    "fn", "let", "mut", "struct", "enum", "const", "extern", "import", "as", "if", "else", "while",
    "for", "in", "match", "return", "break", "continue", "true", "false",
];

/// Parses a complete Sable source file into an AST.
///
/// Top-level declarations are parsed one after another; a declaration
/// that fails to parse is reported into the state's recovered-error sink
/// and skipped, so the returned [`FileAst`] contains every declaration
/// that could be recovered.
pub fn parse(state: &State) -> FileAst<'_> {
    let file = state.file.clone();
    let mut input: NomSpan<'_> = NomSpan::new_extra(state.file.code.as_str(), state.clone());
    let mut statements = Vec::new();

    loop {
        input = skip_trivia(input);
        if input.fragment().is_empty() {
            break;
        }

        match item::file_statement(input.clone()) {
            Ok((rest, statement)) => {
                statements.push(statement);
                input = rest;
            }
            Err(error) => {
                report_parse_error(state, &error, input.location_offset());
                input = synchronize_declaration(input);
            }
        }
    }

    FileAst { file, statements }
}

/// Extracts the most specific context message from a nom error and
/// records it as a recovered syntax error.
pub(crate) fn report_parse_error<'base>(state: &State, error: &nom::Err<SableParserError<'base>>, fallback_offset: usize) {
    match error {
        nom::Err::Error(inner) | nom::Err::Failure(inner) => {
            // The first context in the list is the most specific one.
            let detail = inner
                .errors
                .iter()
                .find_map(|(span, kind)| match kind {
                    VerboseErrorKind::Context(message) => Some((span.to_range(), *message)),
                    _ => None,
                });
            match detail {
                Some((position, message)) => state.report(position, message),
                None => {
                    let position = inner
                        .errors
                        .first()
                        .map(|(span, _)| span.to_range())
                        .unwrap_or(fallback_offset..fallback_offset + 1);
                    state.report(position, "Unknown syntax");
                }
            }
        }
        nom::Err::Incomplete(_) => {
            state.report(fallback_offset..fallback_offset + 1, "Unexpected end of input");
        }
    }
}

/// Advances past the failing declaration: skips to the next top-level
/// declaration keyword at brace depth zero, or to the end of input.
fn synchronize_declaration(input: NomSpan<'_>) -> NomSpan<'_> {
    let fragment = input.fragment();
    let mut depth = 0i32;
    let mut previous_boundary = true;
    let mut iter = fragment.char_indices().peekable();

    // Make progress even when the error sits on a declaration keyword.
    let mut skipped = 0usize;

    while let Some((offset, ch)) = iter.next() {
        match ch {
            '{' => depth += 1,
            '}' => depth = (depth - 1).max(0),
            _ => {}
        }

        if depth == 0 && previous_boundary && ch.is_ascii_alphabetic() && offset > 0 {
            let rest = &fragment[offset..];
            if starts_with_declaration_keyword(rest) {
                skipped = offset;
                break;
            }
        }

        previous_boundary = !(ch.is_ascii_alphanumeric() || ch == '_');
        skipped = offset + ch.len_utf8();
    }

    input.take_from(skipped)
}

/// True when the text begins with a top-level declaration keyword
/// followed by a non-identifier character.
fn starts_with_declaration_keyword(text: &str) -> bool {
    ["fn", "pub", "struct", "enum", "const", "extern", "import"].iter().any(|keyword| {
        text.starts_with(keyword)
            && !text[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Consumes leading whitespace and comments, returning the rest.
pub(crate) fn skip_trivia(input: NomSpan<'_>) -> NomSpan<'_> {
    match cleanup::<'_, (), _>(nom::combinator::success(())).parse(input.clone()) {
        Ok((rest, _)) => rest,
        Err(_) => input,
    }
}

/// Allocates the next unique AST node index from the parser state.
pub(crate) fn next_index(input: &NomSpan<'_>) -> AstIndex {
    AstIndex(input.extra.indexer.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
}

/// Parses the optional `pub` visibility modifier.
pub fn is_public(input: NomSpan<'_>) -> IResult<NomSpan<'_>, Option<NomSpan<'_>>, SableParserError<'_>> {
    cleanup(opt(keyword("pub"))).parse(input)
}

/// Parses a keyword as a full word (`keyword("in")` will not match the
/// prefix of `index`).
pub fn keyword<'base>(
    word: &'static str,
) -> impl Parser<NomSpan<'base>, Output = NomSpan<'base>, Error = SableParserError<'base>> {
    cleanup(terminated(tag(word), not(alt((alphanumeric1, tag("_"))))))
}

/// Parses an identifier with a custom error message on failure.
pub fn expected_ident<'base>(
    message: &'static str,
    input: NomSpan<'base>,
) -> IResult<NomSpan<'base>, NomSpan<'base>, SableParserError<'base>> {
    context(message, cut(ident())).parse(input)
}

/// Parses a valid Sable identifier.
///
/// Identifiers start with a letter or underscore, continue with letters,
/// digits or underscores, and are never reserved words. Surrounding
/// trivia is cleaned up.
pub fn ident<'base>() -> impl Parser<NomSpan<'base>, Output = NomSpan<'base>, Error = SableParserError<'base>> {
    cleanup(verify(
        recognize(pair(alt((alpha1, tag("_"))), many0_count(alt((alphanumeric1, tag("_")))))),
        |span: &NomSpan<'base>| !KEYWORDS.contains(span.fragment()),
    ))
}

/// Parses a comma-separated list accepting an optional trailing comma.
pub fn comma_list<'base, O, F>(
    item: F,
) -> impl Parser<NomSpan<'base>, Output = Vec<O>, Error = SableParserError<'base>>
where
    F: Parser<NomSpan<'base>, Output = O, Error = SableParserError<'base>>,
{
    map(
        opt(terminated(
            nom::multi::separated_list1(crate::nom_tools::token(','), item),
            opt(crate::nom_tools::token(',')),
        )),
        Option::unwrap_or_default,
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::{file::SourceFile, nom_tools::State};

    use super::*;

    fn state_for(code: &str) -> State {
        State::new(SourceFile::new(vec!["<memory>".into()], code.to_string()))
    }

    #[rstest]
    #[case("foo")]
    #[case("_bar")]
    #[case("hello_world")]
    #[case("Point2")]
    fn ident_accepts(#[case] code: &str) {
        let state = state_for(code);
        let input = NomSpan::new_extra(state.file.code.as_str(), state.clone());
        let (_, parsed) = ident().parse(input).unwrap();
        assert_eq!(*parsed.fragment(), code);
    }

    #[rstest]
    #[case("fn")]
    #[case("match")]
    #[case("return")]
    fn ident_rejects_keywords(#[case] code: &str) {
        let state = state_for(code);
        let input = NomSpan::new_extra(state.file.code.as_str(), state.clone());
        assert!(ident().parse(input).is_err());
    }

    #[test]
    fn keyword_is_word_bounded() {
        let state = state_for("index");
        let input = NomSpan::new_extra(state.file.code.as_str(), state.clone());
        assert!(keyword("in").parse(input).is_err());
    }

    #[test]
    fn parse_recovers_from_bad_declaration() {
        let state = state_for("fn broken( { } fn ok() { return; }");
        let ast = parse(&state);
        assert_eq!(ast.statements.len(), 1);
        assert!(!state.recovered_errors.borrow().is_empty());
    }

    #[test]
    fn parse_empty_file() {
        let state = state_for("  \n  // nothing here\n");
        let ast = parse(&state);
        assert!(ast.statements.is_empty());
        assert!(state.recovered_errors.borrow().is_empty());
    }
}
