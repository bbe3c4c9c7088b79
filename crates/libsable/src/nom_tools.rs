//! Nom parser tools and utilities for the Sable compiler.
//!
//! This module provides the shared state and span types used by the
//! parser: source location tracking, a lifetime-free span projection for
//! diagnostics, and the whitespace/comment cleanup combinator every
//! token-level parser is wrapped in.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_until};
use nom::character::complete::{char, multispace1, not_line_ending};
use nom::combinator::value;
use nom::multi::many0;
use nom::sequence::{delimited, preceded};
use nom::Parser;
use nom_locate::LocatedSpan;
use std::cell::RefCell;
use std::fmt::Display;
use std::hash::Hash;
use std::ops::Range;
use std::rc::Rc;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use crate::error::SyntaxErrorItem;
use crate::file::SourceFile;
use crate::parser::SableParserError;

/// Parser state shared by every combinator of one file's parse.
///
/// Carries the source file, the atomic counter that hands out
/// [`crate::ast::AstIndex`] values, and the sink the parser drops
/// recovered syntax errors into so parsing can continue past them.
#[derive(Debug, Clone)]
pub struct State {
    /// The source file being parsed
    pub file: SourceFile,
    /// Atomic counter for generating unique AST node indices
    pub indexer: Arc<AtomicUsize>,
    /// Syntax errors recovered from during parsing
    pub recovered_errors: Rc<RefCell<Vec<SyntaxErrorItem>>>,
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.file.hash(state);
    }
}

impl State {
    /// Creates a new parser state for the given source file.
    pub fn new(file: SourceFile) -> Self {
        Self {
            file,
            indexer: Arc::new(AtomicUsize::new(0)),
            recovered_errors: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Records a syntax error that the parser recovered from.
    pub fn report(&self, position: Range<usize>, message: &'static str) {
        self.recovered_errors.borrow_mut().push(SyntaxErrorItem {
            position,
            file: self.file.clone(),
            message,
        });
    }
}

/// Type alias for nom's `LocatedSpan` with Sable's parser state.
pub type NomSpan<'base, T = &'base str> = LocatedSpan<T, State>;

/// A span of source text with location information.
///
/// Combines the text content with its byte range in the source and the
/// parser state, giving full context for later error reporting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Span<'base> {
    /// The text content of this span
    pub text: &'base str,
    /// The byte range in the source file
    pub position: Range<usize>,
    /// The parser state containing file information
    pub state: State,
}

impl Display for Span<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text)
    }
}

impl<'base> From<NomSpan<'base>> for Span<'base> {
    fn from(value: NomSpan<'base>) -> Self {
        let start = value.location_offset();
        Span {
            text: value.fragment(),
            position: start..start + value.fragment().len(),
            state: value.extra.clone(),
        }
    }
}

impl Span<'_> {
    /// Builds the smallest span covering both `self` and `other`.
    pub fn merge(&self, other: &Span<'_>) -> Range<usize> {
        self.position.start.min(other.position.start)..self.position.end.max(other.position.end)
    }
}

/// Span information without lifetime dependencies.
///
/// Holds the byte range and file of a span without borrowing the source
/// text, making it suitable for diagnostics and symbol records that
/// outlive the parse.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpanInfo {
    /// The byte range in the source file
    pub position: Range<usize>,
    /// The source file this span belongs to
    pub file: SourceFile,
}

impl SpanInfo {
    /// Creates new span information with the given range and file.
    pub fn new(position: Range<usize>, file: SourceFile) -> Self {
        Self { position, file }
    }
}

impl From<Span<'_>> for SpanInfo {
    fn from(span: Span<'_>) -> Self {
        let file = span.state.file.clone();
        Self { position: span.position, file }
    }
}

impl From<&Span<'_>> for SpanInfo {
    fn from(span: &Span<'_>) -> Self {
        Self { position: span.position.clone(), file: span.state.file.clone() }
    }
}

/// Trait for extracting byte ranges from span-like values.
pub trait ToRange {
    /// Converts the span to a byte range.
    fn to_range(&self) -> Range<usize>;
}

impl ToRange for NomSpan<'_> {
    fn to_range(&self) -> Range<usize> {
        let start = self.location_offset();
        start..start + self.fragment().len().max(1)
    }
}

impl ToRange for Span<'_> {
    fn to_range(&self) -> Range<usize> {
        self.position.clone()
    }
}

impl ToRange for SpanInfo {
    fn to_range(&self) -> Range<usize> {
        self.position.clone()
    }
}

/// Skips whitespace, line comments (`//`) and block comments (`/* */`).
fn trivia<'base>(input: NomSpan<'base>) -> nom::IResult<NomSpan<'base>, (), SableParserError<'base>> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), preceded(tag("//"), not_line_ending)),
            value((), delimited(tag("/*"), take_until("*/"), tag("*/"))),
        ))),
    )
    .parse(input)
}

/// Parser combinator wrapping a parser with trivia cleanup.
///
/// Removes leading and trailing whitespace and comments around the
/// given parser so token parsers never have to handle them.
pub fn cleanup<'base, O, F: Parser<NomSpan<'base>, Output = O, Error = SableParserError<'base>>>(
    f: F,
) -> impl Parser<NomSpan<'base>, Output = O, Error = SableParserError<'base>> {
    delimited(trivia, f, trivia)
}

/// Like [`cleanup`] but for a bare `char` token.
pub fn token<'base>(
    c: char,
) -> impl Parser<NomSpan<'base>, Output = char, Error = SableParserError<'base>> {
    cleanup(char(c))
}
