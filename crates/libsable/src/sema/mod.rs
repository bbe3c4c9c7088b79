//! Semantic analysis for the Sable compiler.
//!
//! The analyzer turns parsed files into a fully annotated program:
//! every expression node gets a resolved, interned type; every call
//! gets a recorded target; every name gets a symbol. Analysis runs in
//! a fixed order:
//!
//! 1. **Register**: every top-level declaration of every module is
//!    bound in its module scope, so forward references resolve.
//! 2. **Resolve declarations**: imports bind module aliases; structs
//!    and enums get nominal handles and layouts; functions, externs
//!    and constants get their signatures and value types.
//! 3. **Check bodies**: constants and function bodies in declaration
//!    order: name resolution, inference, type rules, match
//!    exhaustiveness, missing-return and reachability.
//! 4. **Post-checks**: unused-import warnings.
//!
//! Errors accumulate in the context; the analysis never aborts early,
//! so a run reports everything it can find. Analysis succeeds iff no
//! error-severity diagnostic was recorded; warnings do not fail it.

use std::rc::Rc;

use log::debug;

use crate::ast::FileAst;
use crate::nom_tools::ToRange;

pub mod context;
pub mod error;
pub mod scope;

mod declare;
mod expr;
mod stmt;
mod typeres;

pub use context::{CallTarget, ModuleInfo, SemaContext};

/// Analyzes a program, returning the annotated context.
///
/// The caller decides success by [`SemaContext::has_errors`]; the
/// context is returned in both cases so every diagnostic can be
/// reported together.
pub fn analyze<'base>(files: &[Rc<FileAst<'base>>]) -> SemaContext<'base> {
    let mut context = SemaContext::new();

    debug!("sema: registering {} modules", files.len());
    let mut declarations = declare::register_files(&mut context, files);
    declare::resolve_declarations(&mut context, &mut declarations);

    for (module_path, definition, symbol) in declarations.consts.clone() {
        stmt::check_const(&mut context, &module_path, &definition, symbol);
    }

    for (module_path, function, symbol) in declarations.functions.clone() {
        debug!("sema: checking body of '{}'", function.name.text);
        stmt::check_function(&mut context, &module_path, &function, symbol);
    }

    for (symbol, import) in &declarations.imports {
        if !context.used_imports.contains(symbol) {
            context.error(error::UnusedImport {
                module: import.module_path(),
                position: import.span.to_range().into(),
                code: import.span.state.file.clone(),
            });
        }
    }

    context
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::ast::FileAst;
    use crate::error::CompilerError;
    use crate::file::SourceFile;
    use crate::nom_tools::State;
    use crate::parser;
    use crate::sema::error::SemaError;

    use super::SemaContext;

    /// Parses and analyzes sources, one module per (name, code) pair.
    fn analyze_modules(sources: &[(&str, &str)]) -> SemaContext<'static> {
        let mut files = Vec::new();
        for (name, code) in sources {
            let state: &'static State = Box::leak(Box::new(State::new(SourceFile::new(
                vec![name.to_string()],
                code.to_string(),
            ))));
            let ast: FileAst<'static> = parser::parse(state);
            assert!(
                state.recovered_errors.borrow().is_empty(),
                "test source has syntax errors: {:?}",
                state.recovered_errors.borrow()
            );
            files.push(std::rc::Rc::new(ast));
        }
        super::analyze(Box::leak(Box::new(files)))
    }

    fn analyze_one(code: &str) -> SemaContext<'static> {
        analyze_modules(&[("main", code)])
    }

    fn semantic_errors<'a>(context: &'a SemaContext<'a>) -> Vec<&'a SemaError> {
        context
            .errors
            .iter()
            .filter_map(|error| match error {
                CompilerError::Semantic(inner) => Some(inner),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn identity_function_analyzes_cleanly() {
        let context = analyze_one("fn id(x: i32) -> i32 { return x; }");
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn missing_return_is_reported() {
        let context = analyze_one("fn f() -> i32 { let y: i32 = 3; }");
        let errors = semantic_errors(&context);
        assert!(
            matches!(errors.as_slice(), [SemaError::MissingReturn(e)] if e.function == "f"),
            "expected exactly one missing-return error, got {errors:?}"
        );
    }

    #[test]
    fn tail_expression_counts_as_return() {
        let context = analyze_one("fn f() -> i32 { 3 }");
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn argument_count_mismatch() {
        let context = analyze_one(
            "fn h(a: i32, b: i32) -> i32 { return a; } fn main() -> i32 { return h(1); }",
        );
        let errors = semantic_errors(&context);
        assert!(
            matches!(errors.as_slice(), [SemaError::ArgumentCountMismatch(e)] if e.expected == 2 && e.found == 1),
            "expected one arity error, got {errors:?}"
        );
    }

    #[test]
    fn undefined_name() {
        let context = analyze_one("fn f() -> i32 { return missing; }");
        let errors = semantic_errors(&context);
        assert!(matches!(errors.as_slice(), [SemaError::UndefinedName(e)] if e.name == "missing"));
    }

    #[test]
    fn let_annotation_must_match() {
        let context = analyze_one("fn f() { let x: bool = 3; }");
        let errors = semantic_errors(&context);
        assert!(matches!(errors.as_slice(), [SemaError::TypeMismatch(_)]), "got {errors:?}");
    }

    #[test]
    fn assignment_typing_holds() {
        let context = analyze_one("fn f() { let mut x: i64 = 1; x = 2; }");
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);

        let context = analyze_one("fn f() { let mut x: i64 = 1; x = true; }");
        assert!(matches!(semantic_errors(&context).as_slice(), [SemaError::TypeMismatch(_)]));
    }

    #[test]
    fn assignment_to_immutable_binding() {
        let context = analyze_one("fn f() { let x = 1; x = 2; }");
        let errors = semantic_errors(&context);
        assert!(matches!(errors.as_slice(), [SemaError::AssignToImmutable(e)] if e.name == "x"));
    }

    #[test]
    fn condition_must_be_bool() {
        let context = analyze_one("fn f() { if 1 { } }");
        assert!(matches!(semantic_errors(&context).as_slice(), [SemaError::ConditionNotBool(_)]));

        let context = analyze_one("fn f() { while 1 { } }");
        assert!(matches!(semantic_errors(&context).as_slice(), [SemaError::ConditionNotBool(_)]));
    }

    #[test]
    fn break_outside_loop() {
        let context = analyze_one("fn f() { break; }");
        let errors = semantic_errors(&context);
        assert!(matches!(errors.as_slice(), [SemaError::OutsideLoop(e)] if e.keyword == "break"));
    }

    #[test]
    fn break_inside_loop_is_fine() {
        let context = analyze_one("fn f() { while true { break; } }");
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn duplicate_declaration() {
        let context = analyze_one("fn f() { } fn f() { }");
        assert!(matches!(semantic_errors(&context).as_slice(), [SemaError::AlreadyDefined(_)]));
    }

    #[test]
    fn shadowing_in_nested_block_is_fine() {
        let context = analyze_one("fn f() { let x = 1; while true { let x = true; if x { } } }");
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn match_must_be_exhaustive() {
        let source = "enum Color { Red, Green, Blue }
fn f(c: Color) -> i32 {
    match c {
        Color.Red => 1,
        Color.Green => 2,
    }
}";
        let context = analyze_one(source);
        let errors = semantic_errors(&context);
        assert!(
            matches!(errors.as_slice(), [SemaError::NonExhaustiveMatch(e)] if e.missing == "Blue"),
            "got {errors:?}"
        );
    }

    #[test]
    fn wildcard_makes_match_exhaustive() {
        let source = "enum Color { Red, Green, Blue }
fn f(c: Color) -> i32 {
    match c {
        Color.Red => 1,
        _ => 0,
    }
}";
        let context = analyze_one(source);
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn match_arm_types_must_agree() {
        let source = "enum Color { Red, Green }
fn f(c: Color) -> i32 {
    match c {
        Color.Red => 1,
        Color.Green => true,
    }
}";
        let context = analyze_one(source);
        assert!(context.has_errors());
    }

    #[test]
    fn variant_payload_binds_in_arm() {
        let source = "enum Shape { Circle(f64), Rect(f64, f64) }
fn area(s: Shape) -> f64 {
    match s {
        Shape.Circle(r) => r * r,
        Shape.Rect(w, h) => w * h,
    }
}";
        let context = analyze_one(source);
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn option_some_with_annotation() {
        let context = analyze_one("fn g() -> Option<i32> { return Option.Some(7); }");
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn option_none_needs_context() {
        let context = analyze_one("fn g() { let x = Option.None(); }");
        assert!(matches!(semantic_errors(&context).as_slice(), [SemaError::CannotInfer(_)]));
    }

    #[test]
    fn result_constructors_take_types_from_signature() {
        let source = "fn parse(flag: bool) -> Result<i32, string> {
    if flag {
        return Result.Ok(1);
    }
    return Result.Err(\"bad\");
}";
        let context = analyze_one(source);
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn never_call_marks_rest_unreachable() {
        let source = "extern fn panic(s: string) -> never;
fn k() -> i32 { panic(\"x\"); return 1; }";
        let context = analyze_one(source);
        assert!(!context.has_errors(), "unreachable code is a warning: {:?}", context.errors);
        let warnings = semantic_errors(&context);
        assert!(
            matches!(warnings.as_slice(), [SemaError::UnreachableCode(_)]),
            "expected unreachable warning, got {warnings:?}"
        );
    }

    #[test]
    fn literal_out_of_range() {
        let context = analyze_one("fn f() { let x: i8 = 200; }");
        assert!(matches!(semantic_errors(&context).as_slice(), [SemaError::LiteralOutOfRange(_)]));
    }

    #[test]
    fn negative_literal_uses_signed_range() {
        let context = analyze_one("fn f() { let x: i8 = -128; }");
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);

        let context = analyze_one("fn f() { let x: i8 = -129; }");
        assert!(matches!(semantic_errors(&context).as_slice(), [SemaError::LiteralOutOfRange(_)]));
    }

    #[test]
    fn no_implicit_widening_between_integers() {
        let context = analyze_one("fn f(x: i32) { let y: i64 = x; }");
        assert!(matches!(semantic_errors(&context).as_slice(), [SemaError::TypeMismatch(_)]));
    }

    #[test]
    fn cast_allows_numeric_conversion() {
        let context = analyze_one("fn f(x: i32) { let y: i64 = x as i64; }");
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn cast_rejects_struct_types() {
        let context = analyze_one("struct P { x: i32 } fn f(p: P) { let y = p as i32; }");
        assert!(matches!(semantic_errors(&context).as_slice(), [SemaError::InvalidCast(_)]));
    }

    #[test]
    fn struct_literal_and_field_access() {
        let source = "struct Point { x: i32, y: i32 }
fn f() -> i32 {
    let p = Point { x: 1, y: 2 };
    return p.x + p.y;
}";
        let context = analyze_one(source);
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn struct_literal_missing_field() {
        let context = analyze_one("struct Point { x: i32, y: i32 } fn f() { let p = Point { x: 1 }; }");
        let errors = semantic_errors(&context);
        assert!(matches!(errors.as_slice(), [SemaError::MissingFields(e)] if e.missing == "y"));
    }

    #[test]
    fn instance_method_dispatch() {
        let source = "struct Point { x: i32, y: i32 }
fn Point_instance_sum(self: *Point) -> i32 { return 0; }
fn f(p: Point) -> i32 { return p.sum(); }";
        let context = analyze_one(source);
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn associated_function_dispatch() {
        let source = "struct Point { x: i32, y: i32 }
fn Point_origin() -> Point { return Point { x: 0, y: 0 }; }
fn f() -> Point { return Point.origin(); }";
        let context = analyze_one(source);
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn unknown_method_is_reported() {
        let source = "struct Point { x: i32 } fn f(p: Point) { p.missing(); }";
        let context = analyze_one(source);
        let errors = semantic_errors(&context);
        assert!(matches!(errors.as_slice(), [SemaError::UnknownMethod(e)] if e.method == "missing"));
    }

    #[test]
    fn imports_resolve_across_modules() {
        let context = analyze_modules(&[
            ("math", "pub fn double(x: i32) -> i32 { return x + x; }"),
            ("main", "import math; fn main() -> i32 { return math.double(21); }"),
        ]);
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn import_alias_resolves() {
        let context = analyze_modules(&[
            ("math", "pub fn double(x: i32) -> i32 { return x + x; }"),
            ("main", "import math as m; fn main() -> i32 { return m.double(21); }"),
        ]);
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn missing_import_is_reported_but_not_fatal_to_other_files() {
        let context = analyze_modules(&[("main", "import missing; fn main() { }")]);
        let errors = semantic_errors(&context);
        assert!(matches!(errors.as_slice(), [SemaError::ImportNotFound(e)] if e.module == "missing"));
    }

    #[test]
    fn unused_import_warns() {
        let context = analyze_modules(&[
            ("math", "pub fn double(x: i32) -> i32 { return x + x; }"),
            ("main", "import math; fn main() { }"),
        ]);
        assert!(!context.has_errors(), "warning must not fail analysis: {:?}", context.errors);
        let diagnostics = semantic_errors(&context);
        assert!(
            matches!(diagnostics.as_slice(), [SemaError::UnusedImport(e)] if e.module == "math"),
            "got {diagnostics:?}"
        );
    }

    #[test]
    fn if_let_binds_payload() {
        let source = "fn f(o: Option<i32>) -> i32 {
    if let Option.Some(v) = o {
        return v;
    }
    return 0;
}";
        let context = analyze_one(source);
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn every_expression_gets_a_resolved_type() {
        let context = analyze_one("fn f(x: i32) -> i32 { let y = x + 1; return y * 2; }");
        assert!(!context.has_errors());
        // x + 1, literals, identifiers, y * 2 all have entries.
        assert!(context.node_types.len() >= 6, "only {} annotations", context.node_types.len());
    }

    #[test]
    fn error_marks_expression_unknown_without_cascades() {
        let context = analyze_one("fn f() -> i32 { let x = missing + 1; return x; }");
        let errors = semantic_errors(&context);
        assert_eq!(errors.len(), 1, "exactly the undefined-name error, got {errors:?}");
        assert!(matches!(errors[0], SemaError::UndefinedName(_)));
    }

    #[test]
    fn generic_struct_monomorphizes_per_argument_list() {
        let source = "struct Pair<A, B> { first: A, second: B }
fn f(p: Pair<i32, bool>) -> i32 { return p.first; }
fn g(p: Pair<i32, bool>) -> bool { return p.second; }";
        let context = analyze_one(source);
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn for_loop_binds_induction_variable() {
        let context = analyze_one("fn f() -> i64 { let mut total: i32 = 0; for i in 0..10 { total = total + i; } return 0 as i64; }");
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }

    #[test]
    fn variadic_extern_relaxes_tail_count() {
        let source = "extern fn printf(format: string, ...) -> i32;
fn f() { printf(\"%d %d\", 1, 2); }";
        let context = analyze_one(source);
        assert!(!context.has_errors(), "unexpected errors: {:?}", context.errors);
    }
}
