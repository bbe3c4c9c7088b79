//! Sable Language Compiler Library
//!
//! This is the core library of the Sable ahead-of-time compiler. It
//! provides the complete pipeline from source text to native-format
//! artifacts via the LLVM backend.
//!
//! # Overview
//!
//! A compilation runs through four phases:
//!
//! 1. **Parsing**: source text into an Abstract Syntax Tree, with
//!    statement-level error recovery
//! 2. **Semantic analysis**: name resolution, type inference and
//!    checking; every expression node is annotated with an interned
//!    type and every call with a resolved target
//! 3. **Lowering**: the annotated AST drives the LLVM IR builder
//! 4. **Emission**: IR text, bitcode, assembly, object code, or a
//!    linked executable
//!
//! # Architecture
//!
//! - [`parser`]: nom-combinator recursive descent parser
//! - [`ast`]: syntax tree definitions with stable node ids
//! - [`types`]: interned type descriptors and type rules
//! - [`sema`]: scoped symbol tables and the semantic analyzer
//! - [`lower`]: AST-to-LLVM lowering
//! - [`pipeline`]: the orchestrator sequencing phases per file
//! - [`error`]: typed diagnostics and report rendering
//!
//! # Usage
//!
//! Drive a whole compilation through [`pipeline::Compiler`], or use
//! the phase entry points directly:
//!
//! ```ignore
//! use libsable::{process_code, process_ast, nom_tools::State, file::SourceFile};
//!
//! let source = SourceFile::new(vec!["main".into()], "fn main() { }".to_string());
//! let state = State::new(source);
//! let (ast, syntax_errors) = process_code(&state);
//! let sema = process_ast(&[ast.into()]);
//! assert!(!sema.has_errors());
//! ```

use std::rc::Rc;

use ast::FileAst;
use error::SyntaxErrorItem;
use nom_tools::State;
use sema::SemaContext;

pub mod ast;
pub mod error;
pub mod file;
pub mod lower;
pub mod nom_tools;
#[rustfmt::skip]
pub mod parser;
pub mod pipeline;
pub mod sema;
pub mod types;

/// Parses Sable source code into an AST.
///
/// This is the first stage of the pipeline. Syntax errors do not abort
/// the parse; the returned AST contains everything that could be
/// recovered, and the errors that were skipped over come back
/// alongside it.
pub fn process_code<'base>(state: &'base State) -> (FileAst<'base>, Vec<SyntaxErrorItem>) {
    let ast = parser::parse(state);
    let errors = state.recovered_errors.borrow().clone();
    (ast, errors)
}

/// Performs semantic analysis over parsed files.
///
/// This is the second stage of the pipeline. All files are analyzed
/// together so imports resolve across modules. The returned context
/// carries the annotations the lowerer needs plus every diagnostic;
/// analysis succeeded iff [`SemaContext::has_errors`] is false.
pub fn process_ast<'base>(files: &[Rc<FileAst<'base>>]) -> SemaContext<'base> {
    sema::analyze(files)
}
