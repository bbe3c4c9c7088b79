//! Sable Language Compiler Executable
//!
//! Thin command-line wrapper over `libsable`'s pipeline. It parses the
//! flag surface, configures logging, runs one compilation and renders
//! the diagnostics.
//!
//! # Usage
//!
//! ```text
//! sablec [options] file.sbl...
//!
//!   -o <path>            output path
//!   --emit={llvm-ir,llvm-bc,asm,obj,exe}
//!   -O0 | -O1 | -O2 | -O3
//!   --target=<triple>    cross-compilation target
//!   --cpu=<name>         target CPU
//!   --features=<string>  target feature string
//!   --pie={default,on,off}
//!   -I <dir>             module search path (repeatable)
//!   -L <dir>             library search path (repeatable)
//!   -l <name>            library to link (repeatable)
//!   -g                   emit debug locations
//!   --coverage           coverage instrumentation
//!   -v                   verbose (timing summary)
//!   --version, --help
//! ```
//!
//! # Exit codes
//!
//! `0` on success, `1` on compilation errors, `2` on internal errors.

use std::path::PathBuf;
use std::process::exit;

use libsable::error::{CodespanReportGenerator, ConsoleReportGenerator, ReportGenerator};
use libsable::pipeline::{CompileOptions, Compiler, OptLevel, OutputFormat, PieMode};
use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelPadding, TermLogger, TerminalMode,
    ThreadLogMode,
};

static VERSION: &str = env!("CARGO_PKG_VERSION");

static USAGE: &str = "Usage: sablec [options] file.sbl...

Options:
  -o <path>             Output path
  --emit=<format>       llvm-ir, llvm-bc, asm, obj or exe (default: llvm-ir)
  -O0 -O1 -O2 -O3       Optimization level (default: -O0)
  --target=<triple>     Target triple (default: host)
  --cpu=<name>          Target CPU (default: host)
  --features=<string>   Target features
  --pie=<mode>          default, on or off
  -I <dir>              Add a module search path
  -L <dir>              Add a library search path
  -l <name>             Link a library
  -g                    Emit debug locations
  --coverage            Enable coverage instrumentation
  -v                    Verbose output
  --rich-diagnostics    Render diagnostics with full source windows
  --version             Print the version and exit
  --help                Print this help and exit";

struct Cli {
    inputs: Vec<PathBuf>,
    options: CompileOptions,
    rich_diagnostics: bool,
}

/// Parses the argument list; prints usage and exits on bad flags.
fn parse_args(args: &[String]) -> Cli {
    let mut inputs = Vec::new();
    let mut options = CompileOptions::default();
    let mut output: Option<PathBuf> = None;
    let mut rich_diagnostics = false;

    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" => {
                println!("{USAGE}");
                exit(0);
            }
            "--version" => {
                println!("sablec {VERSION}");
                exit(0);
            }
            "-v" => options.verbose = true,
            "-g" => options.debug_info = true,
            "--coverage" => options.coverage = true,
            "--rich-diagnostics" => rich_diagnostics = true,
            "-o" => match iter.next() {
                Some(path) => output = Some(PathBuf::from(path)),
                None => fail_usage("-o needs a path"),
            },
            "-I" => match iter.next() {
                Some(path) => options.include_paths.push(PathBuf::from(path)),
                None => fail_usage("-I needs a directory"),
            },
            "-L" => match iter.next() {
                Some(path) => options.library_paths.push(PathBuf::from(path)),
                None => fail_usage("-L needs a directory"),
            },
            "-l" => match iter.next() {
                Some(name) => options.libraries.push(name.clone()),
                None => fail_usage("-l needs a library name"),
            },
            "-O0" => options.opt_level = OptLevel::O0,
            "-O1" => options.opt_level = OptLevel::O1,
            "-O2" => options.opt_level = OptLevel::O2,
            "-O3" => options.opt_level = OptLevel::O3,
            flag if flag.starts_with("--emit=") => {
                let value = &flag["--emit=".len()..];
                match OutputFormat::from_flag(value) {
                    Some(format) => options.format = format,
                    None => fail_usage(&format!("unknown emit format '{value}'")),
                }
            }
            flag if flag.starts_with("--target=") => {
                options.target_triple = Some(flag["--target=".len()..].to_string());
            }
            flag if flag.starts_with("--cpu=") => {
                options.cpu = Some(flag["--cpu=".len()..].to_string());
            }
            flag if flag.starts_with("--features=") => {
                options.features = Some(flag["--features=".len()..].to_string());
            }
            flag if flag.starts_with("--pie=") => {
                options.pie = match &flag["--pie=".len()..] {
                    "default" => PieMode::Default,
                    "on" => PieMode::On,
                    "off" => PieMode::Off,
                    other => fail_usage(&format!("unknown pie mode '{other}'")),
                };
            }
            flag if flag.starts_with('-') && flag.len() > 1 => {
                fail_usage(&format!("unknown option '{flag}'"));
            }
            path => inputs.push(PathBuf::from(path)),
        }
    }

    if inputs.is_empty() {
        fail_usage("no input files");
    }

    options.output = output.unwrap_or_else(|| default_output(&inputs[0], options.format));
    Cli { inputs, options, rich_diagnostics }
}

fn fail_usage(message: &str) -> ! {
    eprintln!("sablec: {message}");
    eprintln!("{USAGE}");
    exit(2)
}

/// Default output path derived from the first input and the format.
fn default_output(input: &PathBuf, format: OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    let extension = match format {
        OutputFormat::LlvmIr => "ll",
        OutputFormat::LlvmBitcode => "bc",
        OutputFormat::Assembly => "s",
        OutputFormat::Object => "o",
        OutputFormat::Executable => return PathBuf::from(stem),
    };
    PathBuf::from(format!("{stem}.{extension}"))
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args);

    // Logging mirrors the compiler's internal debug!/info! lines onto
    // the terminal; verbose mode surfaces the timing summary.
    let level = if cli.options.verbose { LevelFilter::Info } else { LevelFilter::Error };
    let config = ConfigBuilder::new()
        .set_location_level(LevelFilter::Error)
        .set_thread_mode(ThreadLogMode::Both)
        .set_level_padding(LevelPadding::Off)
        .set_thread_level(LevelFilter::Off)
        .build();
    CombinedLogger::init(vec![TermLogger::new(
        level,
        config,
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )])
    .expect("logger initializes once");

    let compiler = Compiler::new(cli.options);
    let outcome = compiler.compile(&cli.inputs);

    if !outcome.diagnostics.is_empty() {
        if cli.rich_diagnostics {
            CodespanReportGenerator::emit(&outcome.diagnostics);
        } else {
            eprint!("{}", ConsoleReportGenerator::generate(&outcome.diagnostics));
        }
    }

    if outcome.internal_error() {
        exit(2);
    }
    if !outcome.success() {
        exit(1);
    }
}
