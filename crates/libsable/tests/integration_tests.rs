//! End-to-end pipeline tests: source files on disk in, artifacts and
//! diagnostics out.

use std::fs;
use std::path::PathBuf;

use libsable::error::{ConsoleReportGenerator, ReportGenerator};
use libsable::pipeline::{CompileOptions, Compiler, OutputFormat};

/// Writes the given sources into a temp dir and compiles them to IR
/// text, returning the outcome and the produced IR (when any).
fn compile(sources: &[(&str, &str)]) -> (libsable::pipeline::CompileOutcome, Option<String>) {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut inputs: Vec<PathBuf> = Vec::new();
    for (name, code) in sources {
        let path = dir.path().join(format!("{name}.sbl"));
        fs::write(&path, code).expect("write source");
        inputs.push(path);
    }

    let output = dir.path().join("out.ll");
    let options = CompileOptions {
        output: output.clone(),
        format: OutputFormat::LlvmIr,
        ..CompileOptions::default()
    };
    let outcome = Compiler::new(options).compile(&inputs);
    let ir = fs::read_to_string(&output).ok();
    (outcome, ir)
}

#[test]
fn identity_function_emits_expected_shape() {
    let (outcome, ir) = compile(&[("main", "fn id(x: i32) -> i32 { return x; }")]);
    assert!(outcome.success(), "diagnostics: {:?}", outcome.diagnostics);

    let ir = ir.expect("IR artifact");
    assert!(ir.contains("define i32 @id(i32"), "signature: {ir}");
    assert!(ir.contains("alloca i32"), "slot for x: {ir}");
    assert!(ir.contains("store i32"), "parameter store: {ir}");
    assert!(ir.contains("load i32"), "return load: {ir}");
}

#[test]
fn missing_return_fails_and_emits_nothing() {
    let (outcome, ir) = compile(&[("main", "fn f() -> i32 { let y: i32 = 3; }")]);
    assert!(!outcome.success());
    assert!(outcome.artifact.is_none());
    assert!(ir.is_none(), "no IR may be written on error");

    let report = ConsoleReportGenerator::generate(&outcome.diagnostics);
    assert!(
        report.contains("function `f` may end without returning a value"),
        "report: {report}"
    );
    assert!(report.contains("1 errors, 0 warnings"), "summary: {report}");
}

#[test]
fn option_some_lowers_to_flag_and_payload() {
    let (outcome, ir) = compile(&[("main", "fn g() -> Option<i32> { return Option.Some(7); }")]);
    assert!(outcome.success(), "diagnostics: {:?}", outcome.diagnostics);

    let ir = ir.expect("IR artifact");
    assert!(ir.contains("{ i1, i32 }"), "option layout: {ir}");
    assert!(ir.contains("store i1 true"), "field 0 stores true: {ir}");
    assert!(ir.contains("store i32 7"), "field 1 stores 7: {ir}");
}

#[test]
fn argument_count_mismatch_fails_without_ir() {
    let (outcome, ir) = compile(&[(
        "main",
        "fn h(a: i32, b: i32) -> i32 { return a; } fn main() -> i32 { return h(1); }",
    )]);
    assert!(!outcome.success());
    assert!(ir.is_none());

    let report = ConsoleReportGenerator::generate(&outcome.diagnostics);
    assert!(report.contains("'h' expects 2 arguments, found 1"), "report: {report}");
}

#[test]
fn never_call_is_followed_by_unreachable_only() {
    let (outcome, ir) = compile(&[(
        "main",
        "extern fn panic(s: string) -> never;\nfn k() -> i32 { panic(\"x\"); return 1; }",
    )]);
    assert!(outcome.success(), "diagnostics: {:?}", outcome.diagnostics);

    let ir = ir.expect("IR artifact");
    let body: &str = ir.split("define i32 @k").nth(1).expect("function k");
    assert!(body.contains("call void @panic"), "ir: {ir}");
    assert!(body.contains("unreachable"), "ir: {ir}");
    assert!(!body.contains("ret i32 1"), "dead code must not be lowered: {ir}");
}

#[test]
fn nested_break_exits_only_the_inner_loop() {
    let (outcome, ir) = compile(&[(
        "main",
        "fn f() -> i32 {
            let mut outer: i32 = 0;
            while outer < 3 {
                while true {
                    break;
                }
                outer = outer + 1;
            }
            return outer;
        }",
    )]);
    assert!(outcome.success(), "diagnostics: {:?}", outcome.diagnostics);

    let ir = ir.expect("IR artifact");
    // Both loops produce their own header/exit blocks, and the inner
    // break must branch somewhere other than the outer exit.
    assert!(ir.matches("while.header").count() >= 2, "two loops expected: {ir}");
    assert!(ir.matches("while.exit").count() >= 2, "two exits expected: {ir}");
}

#[test]
fn diagnostics_are_byte_identical_across_runs() {
    let source = "fn f() { let x: bool = 3; missing(); }";
    let (first, _) = compile(&[("main", source)]);
    let (second, _) = compile(&[("main", source)]);

    let first_report = ConsoleReportGenerator::generate(&first.diagnostics);
    let second_report = ConsoleReportGenerator::generate(&second.diagnostics);
    assert_eq!(first_report, second_report);
    assert!(!first_report.is_empty());
}

#[test]
fn multi_file_compilation_resolves_imports() {
    let (outcome, ir) = compile(&[
        ("math", "pub fn double(x: i32) -> i32 { return x + x; }"),
        ("main", "import math;\nfn main() -> i32 { return math.double(21); }"),
    ]);
    assert!(outcome.success(), "diagnostics: {:?}", outcome.diagnostics);

    let ir = ir.expect("IR artifact");
    assert!(ir.contains("define i32 @double"), "ir: {ir}");
    assert!(ir.contains("call i32 @double"), "cross-module call: {ir}");
}

#[test]
fn parse_error_in_one_file_still_reports_the_other() {
    let (outcome, ir) = compile(&[
        ("broken", "fn oops( {"),
        ("main", "fn f() -> i32 { return missing; }"),
    ]);
    assert!(!outcome.success());
    assert!(ir.is_none());

    let report = ConsoleReportGenerator::generate(&outcome.diagnostics);
    assert!(report.contains("broken.sbl"), "parse error surfaced: {report}");
    assert!(report.contains("'missing' is not defined"), "semantic error surfaced: {report}");
}

#[test]
fn match_and_enums_compile_end_to_end() {
    let (outcome, ir) = compile(&[(
        "main",
        "enum Color { Red, Green, Blue }
         fn pick(c: Color) -> i32 {
             match c {
                 Color.Red => 1,
                 Color.Green => 2,
                 Color.Blue => 3,
             }
         }",
    )]);
    assert!(outcome.success(), "diagnostics: {:?}", outcome.diagnostics);

    let ir = ir.expect("IR artifact");
    assert!(ir.contains("match.arm"), "arm blocks: {ir}");
    assert!(ir.contains("phi i32"), "match value merge: {ir}");
}

#[test]
fn warnings_do_not_block_emission() {
    let (outcome, ir) = compile(&[
        ("math", "pub fn double(x: i32) -> i32 { return x + x; }"),
        ("main", "import math;\nfn main() -> i32 { return 0; }"),
    ]);
    assert!(outcome.success(), "warnings only: {:?}", outcome.diagnostics);
    assert!(ir.is_some(), "artifact still produced");

    let report = ConsoleReportGenerator::generate(&outcome.diagnostics);
    assert!(report.contains("unused import"), "report: {report}");
    assert!(report.contains("0 errors, 1 warnings"), "summary: {report}");
}

#[test]
fn object_emission_produces_a_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("main.sbl");
    fs::write(&input, "fn main() -> i32 { return 0; }").unwrap();

    let output = dir.path().join("main.o");
    let options = CompileOptions {
        output: output.clone(),
        format: OutputFormat::Object,
        ..CompileOptions::default()
    };
    let outcome = Compiler::new(options).compile(&[input]);
    assert!(outcome.success(), "diagnostics: {:?}", outcome.diagnostics);
    assert!(output.is_file(), "object file exists");
    assert!(fs::metadata(&output).unwrap().len() > 0);
}
