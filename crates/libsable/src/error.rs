//! Error handling and diagnostic reporting for the Sable compiler.
//!
//! Every phase produces typed errors carrying miette diagnostic
//! metadata (codes, labels, source snippets, help text). The pipeline
//! collects them as [`CompilerError`] values, orders them
//! deterministically by (input file order, byte offset, phase), and
//! renders them through a [`ReportGenerator`]:
//!
//! - [`ConsoleReportGenerator`] prints the classic
//!   `path:line:col: severity: message` line followed by the offending
//!   source line and a caret, and ends with an `N errors, M warnings`
//!   summary.
//! - [`CodespanReportGenerator`] renders rich, colored diagnostics
//!   through `codespan-reporting` for terminal use.

use std::fmt::Write as _;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::{self, termcolor::{ColorChoice, StandardStream}};
use miette::{Diagnostic as MietteDiagnostic, SourceSpan};

use crate::file::SourceFile;
use crate::sema::error::SemaError;

/// File extension for Sable language source files.
pub static SABLE_LANG_EXT: &str = "sbl";

impl miette::SourceCode for SourceFile {
    fn read_span<'a>(
        &'a self,
        span: &SourceSpan,
        context_lines_before: usize,
        context_lines_after: usize,
    ) -> Result<Box<dyn miette::SpanContents<'a> + 'a>, miette::MietteError> {
        let contents =
            self.code.as_str().read_span(span, context_lines_before, context_lines_after)?;
        Ok(Box::new(miette::MietteSpanContents::new_named(
            self.display_name(),
            contents.data(),
            *contents.span(),
            contents.line(),
            contents.column(),
            contents.line_count(),
        )))
    }
}

/// A syntax error the parser recovered from.
///
/// These accumulate in the parser state while parsing continues; the
/// pipeline converts them into [`SyntaxError`] diagnostics afterwards.
#[derive(Debug, Clone)]
pub struct SyntaxErrorItem {
    /// Byte range of the error
    pub position: Range<usize>,
    /// The file being parsed
    pub file: SourceFile,
    /// Parser context message
    pub message: &'static str,
}

/// A syntax error diagnostic.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("{message}")]
#[diagnostic(code("sable::parse::syntax_error"))]
pub struct SyntaxError {
    /// Parser context message
    pub message: &'static str,
    /// Source location of the error
    #[label("syntax error here")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

impl From<SyntaxErrorItem> for SyntaxError {
    fn from(item: SyntaxErrorItem) -> Self {
        SyntaxError { message: item.message, position: item.position.into(), code: item.file }
    }
}

/// A source file could not be read.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("cannot read '{path}': {source}")]
#[diagnostic(code("sable::input::read_failed"))]
pub struct InputError {
    /// The path that failed
    pub path: String,
    /// The underlying I/O error
    #[source]
    pub source: std::io::Error,
}

/// An internal invariant was violated during lowering.
///
/// Always fatal; carries the bug-report marker in its help text.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("internal compiler error: {message}")]
#[diagnostic(
    code("sable::lower::internal"),
    help("this is a bug in the Sable compiler, please report it")
)]
pub struct InternalError {
    /// Description of the violated invariant
    pub message: String,
    /// Source location when one is known
    #[label("while lowering this")]
    pub position: Option<SourceSpan>,
    /// Source code context when one is known
    #[source_code]
    pub code: Option<SourceFile>,
}

impl InternalError {
    /// An internal error with no source attribution.
    pub fn new(message: impl Into<String>) -> Self {
        InternalError { message: message.into(), position: None, code: None }
    }

    /// An internal error pinned to a source location.
    pub fn at(message: impl Into<String>, position: Range<usize>, code: SourceFile) -> Self {
        InternalError { message: message.into(), position: Some(position.into()), code: Some(code) }
    }
}

/// An external tool (the linker) exited with a failure.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("{tool} failed with {status}")]
#[diagnostic(code("sable::tool::failed"))]
pub struct ToolError {
    /// The tool that was invoked
    pub tool: String,
    /// Its exit status
    pub status: String,
    /// Captured standard error output, reported verbatim
    #[help]
    pub stderr: String,
}

/// The phase a diagnostic originated from, in pipeline order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Reading input files
    Input,
    /// Parsing
    Parse,
    /// Semantic analysis
    Semantic,
    /// IR lowering
    Lower,
    /// External tool execution
    Tool,
}

/// Diagnostic severity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    /// An error that fails the compilation
    Error,
    /// A warning that does not
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// Any diagnostic the compiler can produce.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum CompilerError {
    /// Input file error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Input(#[from] InputError),

    /// Parse-phase syntax error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] SyntaxError),

    /// Semantic-phase error or warning
    #[error(transparent)]
    #[diagnostic(transparent)]
    Semantic(#[from] SemaError),

    /// Lowering-phase internal error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lowering(#[from] InternalError),

    /// External tool failure
    #[error(transparent)]
    #[diagnostic(transparent)]
    Tool(#[from] ToolError),
}

impl CompilerError {
    /// The phase this diagnostic belongs to.
    pub fn phase(&self) -> Phase {
        match self {
            CompilerError::Input(_) => Phase::Input,
            CompilerError::Syntax(_) => Phase::Parse,
            CompilerError::Semantic(_) => Phase::Semantic,
            CompilerError::Lowering(_) => Phase::Lower,
            CompilerError::Tool(_) => Phase::Tool,
        }
    }

    /// Error or warning, read from the diagnostic metadata.
    pub fn severity(&self) -> Severity {
        match MietteDiagnostic::severity(self) {
            Some(miette::Severity::Warning | miette::Severity::Advice) => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// The source file this diagnostic points into, when it has one.
    pub fn source_file(&self) -> Option<&SourceFile> {
        match self {
            CompilerError::Input(_) | CompilerError::Tool(_) => None,
            CompilerError::Syntax(inner) => Some(&inner.code),
            CompilerError::Semantic(inner) => Some(inner.source_file()),
            CompilerError::Lowering(inner) => inner.code.as_ref(),
        }
    }

    /// The source name and byte offset of the primary label, when the
    /// diagnostic has one. Used for deterministic ordering.
    pub fn location(&self) -> Option<(String, usize)> {
        let diag: &dyn MietteDiagnostic = self;
        let label = diag.labels().and_then(|mut labels| labels.next())?;
        let file = self.source_file()?;
        Some((file.display_name(), label.offset()))
    }
}

/// Orders diagnostics deterministically: first by the position of their
/// file in the input list, then by byte offset, then by phase.
pub fn sort_diagnostics(diagnostics: &mut [CompilerError], input_order: &[String]) {
    diagnostics.sort_by_key(|diagnostic| {
        let (file_rank, offset) = match diagnostic.location() {
            Some((name, offset)) => {
                let rank = input_order.iter().position(|input| *input == name).unwrap_or(usize::MAX - 1);
                (rank, offset)
            }
            None => (usize::MAX, 0),
        };
        (file_rank, offset, diagnostic.phase())
    });
}

/// Trait for diagnostic report generators.
pub trait ReportGenerator {
    /// Renders a batch of already-sorted diagnostics.
    fn generate(diagnostics: &[CompilerError]) -> String;
}

/// Plain-text generator printing `path:line:col: severity: message`
/// lines with a source snippet and caret, ending with the summary line.
pub struct ConsoleReportGenerator;

impl ConsoleReportGenerator {
    fn render_one(output: &mut String, diagnostic: &CompilerError) {
        let severity = diagnostic.severity();
        let diag: &dyn MietteDiagnostic = diagnostic;

        let label = diag.labels().and_then(|mut labels| labels.next());
        let located = label.as_ref().and_then(|label| {
            let source = diag.source_code()?;
            let contents = source.read_span(label.inner(), 0, 0).ok()?;
            Some((
                contents.name()?.to_string(),
                contents.line() + 1,
                contents.column() + 1,
                String::from_utf8_lossy(contents.data()).into_owned(),
            ))
        });

        match located {
            Some((name, line, column, snippet)) => {
                let _ = writeln!(output, "{name}:{line}:{column}: {severity}: {diagnostic}");
                let snippet_line = snippet.lines().next().unwrap_or("");
                if !snippet_line.is_empty() {
                    let _ = writeln!(output, "    {snippet_line}");
                    let caret_pad = " ".repeat(column.saturating_sub(1));
                    let caret_len = label
                        .as_ref()
                        .map(|l| l.len().max(1))
                        .unwrap_or(1)
                        .min(snippet_line.len().saturating_sub(column - 1).max(1));
                    let _ = writeln!(output, "    {caret_pad}{}", "^".repeat(caret_len));
                }
            }
            None => {
                let _ = writeln!(output, "{severity}: {diagnostic}");
            }
        }

        if let Some(help) = diag.help() {
            let _ = writeln!(output, "    note: {help}");
        }
    }
}

impl ReportGenerator for ConsoleReportGenerator {
    fn generate(diagnostics: &[CompilerError]) -> String {
        let mut output = String::new();
        let mut errors = 0usize;
        let mut warnings = 0usize;

        for diagnostic in diagnostics {
            match diagnostic.severity() {
                Severity::Error => errors += 1,
                Severity::Warning => warnings += 1,
            }
            Self::render_one(&mut output, diagnostic);
        }

        if errors > 0 || warnings > 0 {
            let _ = writeln!(output, "{errors} errors, {warnings} warnings");
        }
        output
    }
}

/// Rich terminal generator built on `codespan-reporting`.
pub struct CodespanReportGenerator;

impl CodespanReportGenerator {
    /// Builds codespan diagnostics from the miette metadata.
    fn build(diagnostics: &[CompilerError]) -> (SimpleFiles<String, String>, Vec<Diagnostic<usize>>) {
        let mut files = SimpleFiles::new();
        let mut file_ids: indexmap::IndexMap<String, usize> = indexmap::IndexMap::new();
        let mut rendered = Vec::new();

        for diagnostic in diagnostics {
            let diag: &dyn MietteDiagnostic = diagnostic;
            let severity = match diagnostic.severity() {
                Severity::Error => codespan_reporting::diagnostic::Severity::Error,
                Severity::Warning => codespan_reporting::diagnostic::Severity::Warning,
            };
            let mut codespan = Diagnostic::new(severity).with_message(diagnostic.to_string());

            if let (Some(labels), Some(file)) = (diag.labels(), diagnostic.source_file()) {
                let name = file.display_name();
                let file_id = *file_ids
                    .entry(name.clone())
                    .or_insert_with(|| files.add(name, file.code().clone()));

                let mut rendered_labels = Vec::new();
                for label in labels {
                    let range = label.offset()..label.offset() + label.len();
                    let mut rendered_label = Label::primary(file_id, range);
                    if let Some(text) = label.label() {
                        rendered_label = rendered_label.with_message(text.to_string());
                    }
                    rendered_labels.push(rendered_label);
                }
                codespan = codespan.with_labels(rendered_labels);
            }

            if let Some(help) = diag.help() {
                codespan = codespan.with_notes(vec![help.to_string()]);
            }
            rendered.push(codespan);
        }

        (files, rendered)
    }

    /// Emits the diagnostics to standard error with colors.
    pub fn emit(diagnostics: &[CompilerError]) {
        let (files, rendered) = Self::build(diagnostics);
        let writer = StandardStream::stderr(ColorChoice::Auto);
        let config = term::Config::default();
        for diagnostic in rendered {
            let _ = term::emit(&mut writer.lock(), &config, &files, &diagnostic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_error(file: &SourceFile, position: Range<usize>) -> CompilerError {
        CompilerError::Syntax(SyntaxError {
            message: "Missing ';'",
            position: position.into(),
            code: file.clone(),
        })
    }

    #[test]
    fn console_format_has_path_line_col() {
        let file = SourceFile::new(vec!["main".into()], "fn f() {\n    let x = 1\n}\n".to_string());
        let errors = vec![sample_error(&file, 22..23)];
        let report = ConsoleReportGenerator::generate(&errors);
        assert!(report.starts_with("main.sbl:2:"), "unexpected report: {report}");
        assert!(report.contains("error: Missing ';'"), "unexpected report: {report}");
        assert!(report.contains('^'), "missing caret: {report}");
        assert!(report.contains("1 errors, 0 warnings"), "missing summary: {report}");
    }

    #[test]
    fn ordering_is_by_file_then_offset() {
        let first = SourceFile::new(vec!["a".into()], "abc\n".to_string());
        let second = SourceFile::new(vec!["b".into()], "def\n".to_string());
        let mut errors = vec![
            sample_error(&second, 0..1),
            sample_error(&first, 2..3),
            sample_error(&first, 0..1),
        ];
        sort_diagnostics(&mut errors, &["a.sbl".to_string(), "b.sbl".to_string()]);

        let locations: Vec<(String, usize)> =
            errors.iter().map(|error| error.location().unwrap()).collect();
        assert_eq!(
            locations,
            vec![("a.sbl".to_string(), 0), ("a.sbl".to_string(), 2), ("b.sbl".to_string(), 0)]
        );
    }

    #[test]
    fn reports_are_deterministic() {
        let file = SourceFile::new(vec!["main".into()], "let\n".to_string());
        let errors = vec![sample_error(&file, 0..3)];
        let first = ConsoleReportGenerator::generate(&errors);
        let second = ConsoleReportGenerator::generate(&errors);
        assert_eq!(first, second);
    }
}
