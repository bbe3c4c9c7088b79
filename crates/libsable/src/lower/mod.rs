//! Lowering from the annotated AST to LLVM IR.
//!
//! Runs only after semantic analysis succeeded with zero errors; it
//! trusts the analyzer's annotations and treats a missing one as an
//! internal compiler error. Every IR-building operation goes through
//! the backend library (inkwell over the LLVM C API); no IR text is
//! assembled by hand.
//!
//! Lowering model, in brief:
//!
//! - every named binding gets an entry-block `alloca`; reads load,
//!   writes store, so `&x` always has an address;
//! - `if`/`while`/`for` use the classic block shapes; a merge `phi` is
//!   materialized only when an `if`/`match` yields a value;
//! - `break`/`continue` branch through a loop context stack;
//! - a call whose resolved return type is `never` is followed by
//!   `unreachable` and ends its block;
//! - `Option.Some(v)` stores `{true, v}` into an allocated `{i1, T}`,
//!   `Result.Ok/Err` store discriminant 0/1 into `{i8, T, E}`;
//! - instance methods receive the receiver's address as their first
//!   argument; associated functions are direct calls to the mangled
//!   symbol.

use std::rc::Rc;

use indexmap::IndexMap;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::values::FunctionValue;
use log::debug;

use crate::ast::{FileAst, FileStatementAst};
use crate::error::InternalError;
use crate::sema::SemaContext;
use crate::types::TypeDescriptor;

mod debug_info;
mod func;
mod types;

pub(crate) use types::{basic_type, enum_payload_base, function_type, is_zero_sized};

use debug_info::DebugInfo;
use func::FunctionLowerer;

/// Options controlling lowering.
#[derive(Debug, Clone)]
pub struct LowerOptions {
    /// Name of the produced LLVM module
    pub module_name: String,
    /// Attach source locations to emitted instructions
    pub debug_info: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self { module_name: "sable".to_string(), debug_info: false }
    }
}

impl From<inkwell::builder::BuilderError> for InternalError {
    fn from(error: inkwell::builder::BuilderError) -> Self {
        InternalError::new(format!("IR builder error: {error}"))
    }
}

/// Lowers the whole program into one LLVM module.
///
/// All functions are declared first so calls across modules and
/// forward references resolve, then every body is lowered in input
/// order. The caller owns the LLVM context.
pub fn lower_program<'ctx, 'base>(
    llvm: &'ctx Context,
    sema: &SemaContext<'base>,
    files: &[Rc<FileAst<'base>>],
    options: &LowerOptions,
) -> Result<Module<'ctx>, InternalError> {
    if sema.has_errors() {
        return Err(InternalError::new("lowering was invoked on a failed analysis"));
    }

    let module = llvm.create_module(&options.module_name);
    let builder = llvm.create_builder();

    let mut functions: IndexMap<String, FunctionValue<'ctx>> = IndexMap::new();
    for (name, symbol) in &sema.functions {
        let signature = sema.symbol(*symbol).type_location;
        let Some(TypeDescriptor::Function { params, result, variadic }) =
            sema.interner.get(signature).cloned()
        else {
            return Err(InternalError::new(format!("function '{name}' has no resolved signature")));
        };
        let fn_type = function_type(llvm, sema, &params, result, variadic)?;
        let value = module.add_function(name, fn_type, None);
        debug!("declared function '{name}'");
        functions.insert(name.clone(), value);
    }

    let debug = options
        .debug_info
        .then(|| DebugInfo::new(&module, files.first().map(|f| f.file.clone())));

    for file in files {
        for statement in &file.statements {
            let FileStatementAst::Function(function) = statement else { continue };

            let value = functions
                .get(function.name.text)
                .copied()
                .ok_or_else(|| InternalError::new(format!("undeclared function '{}'", function.name.text)))?;

            let mut lowerer = FunctionLowerer::new(
                llvm,
                &module,
                &builder,
                sema,
                &functions,
                value,
                function,
                debug.as_ref(),
            )?;
            lowerer.lower()?;
        }
    }

    if let Some(debug) = &debug {
        debug.finalize();
    }
    Ok(module)
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use inkwell::context::Context;

    use crate::ast::FileAst;
    use crate::file::SourceFile;
    use crate::nom_tools::State;
    use crate::parser;

    use super::{lower_program, LowerOptions};

    /// Parses, analyzes and lowers a program, returning the IR text.
    pub(crate) fn lower_to_ir(code: &str) -> String {
        let state: &'static State = Box::leak(Box::new(State::new(SourceFile::new(
            vec!["main".into()],
            code.to_string(),
        ))));
        let ast: FileAst<'static> = parser::parse(state);
        assert!(
            state.recovered_errors.borrow().is_empty(),
            "syntax errors: {:?}",
            state.recovered_errors.borrow()
        );
        let files: &'static Vec<Rc<FileAst<'static>>> = Box::leak(Box::new(vec![Rc::new(ast)]));
        let sema = crate::sema::analyze(files);
        assert!(!sema.has_errors(), "sema errors: {:?}", sema.errors);

        let llvm = Context::create();
        let module = lower_program(&llvm, &sema, files, &LowerOptions::default()).unwrap();
        module.verify().unwrap_or_else(|message| panic!("invalid module: {message}"));
        module.print_to_string().to_string()
    }

    #[test]
    fn identity_function_shape() {
        let ir = lower_to_ir("fn id(x: i32) -> i32 { return x; }");
        assert!(ir.contains("define i32 @id(i32"), "ir: {ir}");
        assert!(ir.contains("alloca i32"), "parameter slot expected: {ir}");
        assert!(ir.contains("store i32"), "parameter store expected: {ir}");
        assert!(ir.contains("load i32"), "return load expected: {ir}");
    }

    #[test]
    fn option_some_layout() {
        let ir = lower_to_ir("fn g() -> Option<i32> { return Option.Some(7); }");
        assert!(ir.contains("{ i1, i32 }"), "option layout: {ir}");
        assert!(ir.contains("store i1 true"), "discriminant store: {ir}");
        assert!(ir.contains("store i32 7"), "payload store: {ir}");
    }

    #[test]
    fn option_none_layout() {
        let ir = lower_to_ir("fn g() -> Option<i32> { return Option.None(); }");
        assert!(ir.contains("store i1 false"), "discriminant store: {ir}");
    }

    #[test]
    fn result_discriminants() {
        let ir = lower_to_ir(
            "fn ok() -> Result<i32, string> { return Result.Ok(1); }
             fn err() -> Result<i32, string> { return Result.Err(\"no\"); }",
        );
        assert!(ir.contains("{ i8, i32, ptr }"), "result layout: {ir}");
        assert!(ir.contains("store i8 0"), "Ok discriminant: {ir}");
        assert!(ir.contains("store i8 1"), "Err discriminant: {ir}");
    }

    #[test]
    fn never_call_emits_unreachable_and_no_dead_code() {
        let ir = lower_to_ir(
            "extern fn panic(s: string) -> never;
             fn k() -> i32 { panic(\"x\"); return 1; }",
        );
        assert!(ir.contains("call void @panic"), "ir: {ir}");
        assert!(ir.contains("unreachable"), "ir: {ir}");
        assert!(!ir.contains("ret i32 1"), "dead return must not be emitted: {ir}");
    }

    #[test]
    fn while_loop_shape() {
        let ir = lower_to_ir(
            "fn count() -> i32 {
                 let mut i: i32 = 0;
                 while i < 10 { i = i + 1; }
                 return i;
             }",
        );
        assert!(ir.contains("while.header"), "ir: {ir}");
        assert!(ir.contains("while.body"), "ir: {ir}");
        assert!(ir.contains("while.exit"), "ir: {ir}");
        assert!(ir.contains("icmp slt"), "signed comparison expected: {ir}");
    }

    #[test]
    fn unsigned_comparison_uses_unsigned_predicate() {
        let ir = lower_to_ir(
            "fn f(a: u32, b: u32) -> bool { return a < b; }",
        );
        assert!(ir.contains("icmp ult"), "unsigned predicate expected: {ir}");
    }

    #[test]
    fn nested_break_targets_inner_loop() {
        let ir = lower_to_ir(
            "fn f() {
                 let mut i: i32 = 0;
                 while i < 3 {
                     while true {
                         break;
                     }
                     i = i + 1;
                 }
             }",
        );
        // Two loops, each with its own exit; the break branches to the
        // second (inner) exit.
        assert!(ir.matches("while.exit").count() >= 2, "ir: {ir}");
    }

    #[test]
    fn instance_method_receives_receiver_pointer() {
        let ir = lower_to_ir(
            "struct Point { x: i32, y: i32 }
             fn Point_instance_sum(self: *Point) -> i32 { return 0; }
             fn f() -> i32 {
                 let p = Point { x: 1, y: 2 };
                 return p.sum();
             }",
        );
        assert!(ir.contains("call i32 @Point_instance_sum(ptr"), "ir: {ir}");
    }

    #[test]
    fn match_extracts_variant_payload() {
        let ir = lower_to_ir(
            "enum Shape { Circle(f64), Rect(f64, f64) }
             fn area(s: Shape) -> f64 {
                 match s {
                     Shape.Circle(r) => r * r,
                     Shape.Rect(w, h) => w * h,
                 }
             }",
        );
        assert!(ir.contains("extractvalue"), "payload extraction: {ir}");
        assert!(ir.contains("match.arm"), "ir: {ir}");
    }

    #[test]
    fn len_of_fixed_array_is_constant() {
        let ir = lower_to_ir(
            "fn f() -> i64 {
                 let xs = [1, 2, 3];
                 return len(xs);
             }",
        );
        assert!(ir.contains("ret i64 3"), "constant length: {ir}");
    }

    #[test]
    fn log_lowers_to_runtime_call() {
        let ir = lower_to_ir("fn f() { log(\"hello\"); }");
        assert!(ir.contains("declare void @log(ptr"), "ir: {ir}");
        assert!(ir.contains("call void @log"), "ir: {ir}");
    }

    #[test]
    fn if_with_value_materializes_phi() {
        let ir = lower_to_ir("fn f(c: bool) -> i32 { let x = if c { 1 } else { 2 }; return x; }");
        assert!(ir.contains("phi i32"), "ir: {ir}");
    }

    #[test]
    fn if_without_value_has_no_phi() {
        let ir = lower_to_ir("fn f(c: bool) { if c { log(\"a\"); } else { log(\"b\"); } }");
        assert!(!ir.contains("phi"), "ir: {ir}");
    }

    #[test]
    fn debug_info_attaches_locations() {
        let state: &'static State = Box::leak(Box::new(State::new(SourceFile::new(
            vec!["main".into()],
            "fn id(x: i32) -> i32 { return x; }".to_string(),
        ))));
        let ast: FileAst<'static> = parser::parse(state);
        let files: &'static Vec<Rc<FileAst<'static>>> = Box::leak(Box::new(vec![Rc::new(ast)]));
        let sema = crate::sema::analyze(files);
        assert!(!sema.has_errors());

        let llvm = Context::create();
        let options = LowerOptions { module_name: "main".into(), debug_info: true };
        let module = lower_program(&llvm, &sema, files, &options).unwrap();
        let ir = module.print_to_string().to_string();
        assert!(ir.contains("!dbg"), "debug locations expected: {ir}");
    }
}
