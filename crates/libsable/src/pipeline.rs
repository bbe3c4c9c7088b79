//! The compilation pipeline orchestrator.
//!
//! One [`Compiler`] invocation owns one compilation: it loads the
//! inputs (resolving imported modules against the include paths),
//! parses every file, analyzes all of them together, lowers the
//! annotated program into a single LLVM module and produces the
//! requested artifact.
//!
//! Failure routing follows the per-file state machine
//! `Pending → Parsed → Analyzed → Lowered → Emitted` with the sink
//! state `Failed(phase)`: a file that fails to parse still surfaces its
//! diagnostics while the other files are parsed and analyzed, and
//! nothing is ever lowered or emitted, and no external tool is
//! invoked, once any error has been recorded. Diagnostics are sorted
//! by (input order, byte offset, phase) so runs are byte-identical.
//!
//! Artifacts: IR text and bitcode are written straight from the
//! module; assembly and objects go through an in-process LLVM target
//! machine; executables link the object with the system `cc` driver as
//! a child process with captured output. Intermediates live in a
//! compilation-scoped temporary directory that is removed on success
//! and kept for diagnosis (in verbose mode) on failure.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;
use std::time::{Duration, Instant};

use inkwell::context::Context;
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine, TargetTriple,
};
use inkwell::OptimizationLevel;
use log::{debug, info};

use crate::ast::{FileAst, FileStatementAst};
use crate::error::{
    sort_diagnostics, CompilerError, InputError, InternalError, Phase, Severity, SyntaxError,
    ToolError, SABLE_LANG_EXT,
};
use crate::file::SourceFile;
use crate::lower::{lower_program, LowerOptions};
use crate::nom_tools::State;
use crate::parser;

/// The artifact kind a compilation produces.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    /// Textual LLVM IR (`--emit=llvm-ir`)
    LlvmIr,
    /// LLVM bitcode (`--emit=llvm-bc`)
    LlvmBitcode,
    /// Native assembly (`--emit=asm`)
    Assembly,
    /// A relocatable object file (`--emit=obj`)
    Object,
    /// A linked executable (`--emit=exe`)
    Executable,
}

impl OutputFormat {
    /// Parses the `--emit` flag value.
    pub fn from_flag(value: &str) -> Option<Self> {
        Some(match value {
            "llvm-ir" => OutputFormat::LlvmIr,
            "llvm-bc" => OutputFormat::LlvmBitcode,
            "asm" => OutputFormat::Assembly,
            "obj" => OutputFormat::Object,
            "exe" => OutputFormat::Executable,
            _ => return None,
        })
    }
}

/// Optimization level, `-O0` through `-O3`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum OptLevel {
    /// No optimization
    #[default]
    O0,
    /// Light optimization
    O1,
    /// Standard optimization
    O2,
    /// Aggressive optimization
    O3,
}

impl OptLevel {
    fn llvm(self) -> OptimizationLevel {
        match self {
            OptLevel::O0 => OptimizationLevel::None,
            OptLevel::O1 => OptimizationLevel::Less,
            OptLevel::O2 => OptimizationLevel::Default,
            OptLevel::O3 => OptimizationLevel::Aggressive,
        }
    }

    fn pass_pipeline(self) -> Option<&'static str> {
        match self {
            OptLevel::O0 => None,
            OptLevel::O1 => Some("default<O1>"),
            OptLevel::O2 => Some("default<O2>"),
            OptLevel::O3 => Some("default<O3>"),
        }
    }
}

/// Position-independent-executable mode for codegen and linking.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PieMode {
    /// Leave the decision to the toolchain defaults
    #[default]
    Default,
    /// Force PIE
    On,
    /// Disable PIE
    Off,
}

/// Options for one compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Output artifact path
    pub output: PathBuf,
    /// Requested artifact kind
    pub format: OutputFormat,
    /// Optimization level
    pub opt_level: OptLevel,
    /// Target triple; the host triple when absent
    pub target_triple: Option<String>,
    /// Target CPU; the host CPU when absent
    pub cpu: Option<String>,
    /// Target feature string
    pub features: Option<String>,
    /// PIE mode
    pub pie: PieMode,
    /// Verbose mode: timing summary and kept intermediates
    pub verbose: bool,
    /// Attach debug locations to the IR
    pub debug_info: bool,
    /// Enable coverage instrumentation
    pub coverage: bool,
    /// Module search paths for imports
    pub include_paths: Vec<PathBuf>,
    /// Linker library search paths (`-L`)
    pub library_paths: Vec<PathBuf>,
    /// Libraries to link (`-l`)
    pub libraries: Vec<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from("out.ll"),
            format: OutputFormat::LlvmIr,
            opt_level: OptLevel::O0,
            target_triple: None,
            cpu: None,
            features: None,
            pie: PieMode::Default,
            verbose: false,
            debug_info: false,
            coverage: false,
            include_paths: Vec::new(),
            library_paths: Vec::new(),
            libraries: Vec::new(),
        }
    }
}

/// Progress of one input file through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilePhase {
    /// Not processed yet
    Pending,
    /// Parsed into an AST
    Parsed,
    /// Passed semantic analysis
    Analyzed,
    /// Lowered to IR
    Lowered,
    /// Included in the emitted artifact
    Emitted,
    /// Failed in the given phase
    Failed(Phase),
}

/// Per-file progress and timing record.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// The file's diagnostic name
    pub name: String,
    /// Where the file got to
    pub phase: FilePhase,
    /// Time spent parsing this file
    pub parse_time: Duration,
}

/// The result of one compilation.
#[derive(Debug)]
pub struct CompileOutcome {
    /// All diagnostics, deterministically ordered
    pub diagnostics: Vec<CompilerError>,
    /// The produced artifact, on success
    pub artifact: Option<PathBuf>,
    /// Per-file progress records
    pub records: Vec<FileRecord>,
    /// Wall-clock time of each compilation-wide phase
    pub phase_times: Vec<(Phase, Duration)>,
}

impl CompileOutcome {
    /// True when no error-severity diagnostic was recorded.
    pub fn success(&self) -> bool {
        !self.diagnostics.iter().any(|diagnostic| diagnostic.severity() == Severity::Error)
    }

    /// True when an internal compiler error occurred.
    pub fn internal_error(&self) -> bool {
        self.diagnostics.iter().any(|diagnostic| matches!(diagnostic, CompilerError::Lowering(_)))
    }

    /// The verbose one-line timing summary.
    pub fn timing_summary(&self) -> String {
        let mut parts: Vec<String> = self
            .phase_times
            .iter()
            .map(|(phase, time)| format!("{phase:?} {:.1}ms", time.as_secs_f64() * 1000.0))
            .collect();
        parts.push(format!("{} files", self.records.len()));
        parts.join(", ")
    }
}

/// Drives a whole compilation. The single entry point callers use.
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    /// Creates a compiler with the given options.
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Compiles the inputs into the requested artifact.
    pub fn compile(&self, inputs: &[PathBuf]) -> CompileOutcome {
        let mut diagnostics: Vec<CompilerError> = Vec::new();
        let mut records: Vec<FileRecord> = Vec::new();
        let mut phase_times: Vec<(Phase, Duration)> = Vec::new();

        // Load inputs and resolve the import closure.
        let sources = self.load_sources(inputs, &mut diagnostics);
        let input_order: Vec<String> = sources.iter().map(SourceFile::display_name).collect();

        // Parse. Files with syntax errors are kept out of analysis but
        // their diagnostics survive.
        let parse_start = Instant::now();
        let states: Vec<State> = sources.iter().map(|source| State::new(source.clone())).collect();
        let mut clean: Vec<Rc<FileAst<'_>>> = Vec::new();

        for state in &states {
            let file_start = Instant::now();
            let ast = Rc::new(parser::parse(state));
            let recovered = state.recovered_errors.borrow().clone();
            let failed = !recovered.is_empty();
            for item in recovered {
                diagnostics.push(CompilerError::Syntax(SyntaxError::from(item)));
            }

            records.push(FileRecord {
                name: state.file.display_name(),
                phase: if failed { FilePhase::Failed(Phase::Parse) } else { FilePhase::Parsed },
                parse_time: file_start.elapsed(),
            });
            if !failed {
                clean.push(ast);
            }
        }
        phase_times.push((Phase::Parse, parse_start.elapsed()));

        // Analyze every cleanly parsed file together.
        let sema_start = Instant::now();
        let mut sema = crate::sema::analyze(&clean);
        phase_times.push((Phase::Semantic, sema_start.elapsed()));

        let sema_errors = std::mem::take(&mut sema.errors);
        let failed_files: Vec<String> = sema_errors
            .iter()
            .filter(|error| error.severity() == Severity::Error)
            .filter_map(|error| error.location().map(|(name, _)| name))
            .collect();
        for record in &mut records {
            if record.phase == FilePhase::Parsed {
                record.phase = if failed_files.contains(&record.name) {
                    FilePhase::Failed(Phase::Semantic)
                } else {
                    FilePhase::Analyzed
                };
            }
        }
        diagnostics.extend(sema_errors);

        let has_errors =
            diagnostics.iter().any(|diagnostic| diagnostic.severity() == Severity::Error);

        // Lower and emit only a fully clean compilation; partial trees
        // are never lowered and no tool runs after an error.
        let mut artifact = None;
        if !has_errors {
            let lower_start = Instant::now();
            let llvm = Context::create();
            let lower_options = LowerOptions {
                module_name: module_name_for(&self.options.output),
                debug_info: self.options.debug_info,
            };
            match lower_program(&llvm, &sema, &clean, &lower_options) {
                Ok(module) => {
                    phase_times.push((Phase::Lower, lower_start.elapsed()));
                    for record in &mut records {
                        if record.phase == FilePhase::Analyzed {
                            record.phase = FilePhase::Lowered;
                        }
                    }

                    let emit_start = Instant::now();
                    match self.emit(&module) {
                        Ok(path) => {
                            artifact = Some(path);
                            for record in &mut records {
                                if record.phase == FilePhase::Lowered {
                                    record.phase = FilePhase::Emitted;
                                }
                            }
                        }
                        Err(error) => diagnostics.push(error),
                    }
                    phase_times.push((Phase::Tool, emit_start.elapsed()));
                }
                Err(error) => {
                    phase_times.push((Phase::Lower, lower_start.elapsed()));
                    for record in &mut records {
                        if record.phase == FilePhase::Analyzed {
                            record.phase = FilePhase::Failed(Phase::Lower);
                        }
                    }
                    diagnostics.push(CompilerError::Lowering(error));
                }
            };
        }

        sort_diagnostics(&mut diagnostics, &input_order);
        let outcome = CompileOutcome { diagnostics, artifact, records, phase_times };
        if self.options.verbose {
            info!("{}", outcome.timing_summary());
        }
        outcome
    }

    /// Reads the input files and pulls imported modules in from the
    /// include paths until the import closure is complete.
    fn load_sources(
        &self,
        inputs: &[PathBuf],
        diagnostics: &mut Vec<CompilerError>,
    ) -> Vec<SourceFile> {
        let mut sources: Vec<SourceFile> = Vec::new();

        for input in inputs {
            match std::fs::read_to_string(input) {
                Ok(code) => sources.push(SourceFile::new(module_components(input), code)),
                Err(source) => diagnostics.push(CompilerError::Input(InputError {
                    path: input.display().to_string(),
                    source,
                })),
            }
        }

        // Discovery parses are throwaway; the real parse happens once
        // the source set is stable.
        let mut scanned = 0;
        while scanned < sources.len() {
            let source = sources[scanned].clone();
            scanned += 1;

            let state = State::new(source);
            let ast = parser::parse(&state);
            for statement in &ast.statements {
                let FileStatementAst::Import(import) = statement else { continue };
                let target = import.module_path();
                if sources.iter().any(|known| known.module_name() == target) {
                    continue;
                }
                if let Some(found) = self.find_module(&target) {
                    match std::fs::read_to_string(&found) {
                        Ok(code) => {
                            debug!("resolved import '{target}' to {}", found.display());
                            let components =
                                target.split('.').map(str::to_string).collect::<Vec<_>>();
                            sources.push(SourceFile::new(components, code));
                        }
                        Err(source) => diagnostics.push(CompilerError::Input(InputError {
                            path: found.display().to_string(),
                            source,
                        })),
                    }
                }
                // A module that stays unresolved is reported by the
                // analyzer at the import site.
            }
        }

        sources
    }

    /// Probes the include paths for `a/b.sbl` given the path `a.b`.
    fn find_module(&self, module_path: &str) -> Option<PathBuf> {
        let mut relative = PathBuf::new();
        for component in module_path.split('.') {
            relative.push(component);
        }
        relative.set_extension(SABLE_LANG_EXT);

        self.options.include_paths.iter().map(|base| base.join(&relative)).find(|p| p.is_file())
    }

    // ---- artifact production ----------------------------------------------

    fn emit(&self, module: &inkwell::module::Module<'_>) -> Result<PathBuf, CompilerError> {
        if let Err(message) = module.verify() {
            return Err(CompilerError::Lowering(InternalError::new(format!(
                "module verification failed: {}",
                message.to_string().trim()
            ))));
        }

        match self.options.format {
            OutputFormat::LlvmIr => {
                module.print_to_file(&self.options.output).map_err(|error| {
                    CompilerError::Lowering(InternalError::new(error.to_string()))
                })?;
                Ok(self.options.output.clone())
            }
            OutputFormat::LlvmBitcode => {
                if !module.write_bitcode_to_path(&self.options.output) {
                    return Err(CompilerError::Lowering(InternalError::new(
                        "failed to write bitcode",
                    )));
                }
                Ok(self.options.output.clone())
            }
            OutputFormat::Assembly => {
                let machine = self.target_machine()?;
                self.run_passes(module, &machine)?;
                machine
                    .write_to_file(module, FileType::Assembly, &self.options.output)
                    .map_err(|error| {
                        CompilerError::Lowering(InternalError::new(error.to_string()))
                    })?;
                Ok(self.options.output.clone())
            }
            OutputFormat::Object => {
                let machine = self.target_machine()?;
                self.run_passes(module, &machine)?;
                machine
                    .write_to_file(module, FileType::Object, &self.options.output)
                    .map_err(|error| {
                        CompilerError::Lowering(InternalError::new(error.to_string()))
                    })?;
                Ok(self.options.output.clone())
            }
            OutputFormat::Executable => {
                let machine = self.target_machine()?;
                self.run_passes(module, &machine)?;

                let scratch = tempfile::Builder::new().prefix("sablec").tempdir().map_err(
                    |error| {
                        CompilerError::Lowering(InternalError::new(format!(
                            "cannot create temporary directory: {error}"
                        )))
                    },
                )?;
                let object_path = scratch.path().join("module.o");
                machine.write_to_file(module, FileType::Object, &object_path).map_err(
                    |error| CompilerError::Lowering(InternalError::new(error.to_string())),
                )?;

                match self.link(&object_path) {
                    Ok(()) => Ok(self.options.output.clone()),
                    Err(error) => {
                        if self.options.verbose {
                            let kept = scratch.keep();
                            info!("intermediate files kept in {}", kept.display());
                        }
                        Err(error)
                    }
                }
            }
        }
    }

    fn target_machine(&self) -> Result<TargetMachine, CompilerError> {
        let internal =
            |message: String| CompilerError::Lowering(InternalError::new(message));

        let triple = match &self.options.target_triple {
            Some(triple) => {
                Target::initialize_all(&InitializationConfig::default());
                TargetTriple::create(triple)
            }
            None => {
                Target::initialize_native(&InitializationConfig::default())
                    .map_err(|error| internal(error.to_string()))?;
                TargetMachine::get_default_triple()
            }
        };

        let target = Target::from_triple(&triple).map_err(|error| internal(error.to_string()))?;
        let cpu = self.options.cpu.clone().unwrap_or_else(|| {
            TargetMachine::get_host_cpu_name().to_str().unwrap_or("generic").to_string()
        });
        let features = self.options.features.clone().unwrap_or_else(|| {
            TargetMachine::get_host_cpu_features().to_str().unwrap_or("").to_string()
        });
        let reloc = match self.options.pie {
            PieMode::Off => RelocMode::Static,
            PieMode::Default | PieMode::On => RelocMode::PIC,
        };

        target
            .create_target_machine(
                &triple,
                &cpu,
                &features,
                self.options.opt_level.llvm(),
                reloc,
                CodeModel::Default,
            )
            .ok_or_else(|| internal("failed to create target machine".to_string()))
    }

    fn run_passes(
        &self,
        module: &inkwell::module::Module<'_>,
        machine: &TargetMachine,
    ) -> Result<(), CompilerError> {
        let mut passes: Vec<&str> = Vec::new();
        if let Some(pipeline) = self.options.opt_level.pass_pipeline() {
            passes.push(pipeline);
        }
        if self.options.coverage {
            passes.push("insert-gcov-profiling");
        }
        if passes.is_empty() {
            return Ok(());
        }

        module
            .run_passes(&passes.join(","), machine, PassBuilderOptions::create())
            .map_err(|error| CompilerError::Lowering(InternalError::new(error.to_string())))
    }

    /// Links one object file into the output executable with the
    /// system C compiler driver.
    fn link(&self, object: &Path) -> Result<(), CompilerError> {
        let mut command = Command::new("cc");
        command.arg("-o").arg(&self.options.output).arg(object);
        for path in &self.options.library_paths {
            command.arg("-L").arg(path);
        }
        for library in &self.options.libraries {
            command.arg(format!("-l{library}"));
        }
        match self.options.pie {
            PieMode::On => {
                command.arg("-pie");
            }
            PieMode::Off => {
                command.arg("-no-pie");
            }
            PieMode::Default => {}
        }

        debug!("linking: {command:?}");
        let output = command.output().map_err(|error| {
            CompilerError::Tool(ToolError {
                tool: "cc".to_string(),
                status: "failed to start".to_string(),
                stderr: error.to_string(),
            })
        })?;

        if !output.status.success() {
            return Err(CompilerError::Tool(ToolError {
                tool: "cc".to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }));
        }
        Ok(())
    }
}

/// Module path components for an input file: its stem.
fn module_components(path: &Path) -> Vec<String> {
    let stem = path.file_stem().map(|stem| stem.to_string_lossy().into_owned());
    vec![stem.unwrap_or_else(|| path.display().to_string())]
}

/// The LLVM module name derived from the output path.
fn module_name_for(output: &Path) -> String {
    output
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sable".to_string())
}

