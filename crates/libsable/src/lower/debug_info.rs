//! Source-location debug metadata for emitted IR.
//!
//! When requested, every lowered statement tags the instructions it
//! produces with the source span of its AST node, through LLVM's
//! debug-info metadata. The emitted DWARF is intentionally minimal: a
//! compile unit, one subprogram per function, and per-instruction
//! locations; variable metadata is not produced.

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::debug_info::{
    AsDIScope, DICompileUnit, DIFlagsConstants, DISubprogram, DWARFEmissionKind,
    DWARFSourceLanguage, DebugInfoBuilder,
};
use inkwell::module::Module;
use inkwell::values::FunctionValue;

use crate::file::SourceFile;

/// Debug metadata state for one LLVM module.
pub(crate) struct DebugInfo<'ctx> {
    builder: DebugInfoBuilder<'ctx>,
    compile_unit: DICompileUnit<'ctx>,
}

impl<'ctx> DebugInfo<'ctx> {
    /// Creates the debug-info builder and compile unit.
    pub(crate) fn new(module: &Module<'ctx>, primary: Option<SourceFile>) -> Self {
        let context = module.get_context();
        module.add_basic_value_flag(
            "Debug Info Version",
            inkwell::module::FlagBehavior::Warning,
            context.i32_type().const_int(3, false),
        );

        let file_name =
            primary.as_ref().map(|file| file.display_name()).unwrap_or_else(|| "<unknown>".to_string());
        let (builder, compile_unit) = module.create_debug_info_builder(
            true,
            DWARFSourceLanguage::C,
            &file_name,
            ".",
            "sablec",
            false,
            "",
            0,
            "",
            DWARFEmissionKind::Full,
            0,
            false,
            false,
            "",
            "",
        );
        Self { builder, compile_unit }
    }

    /// Registers a subprogram for a function definition.
    pub(crate) fn begin_function(
        &self,
        function: FunctionValue<'ctx>,
        name: &str,
        file: &SourceFile,
        offset: usize,
    ) -> DISubprogram<'ctx> {
        let (line, _) = file.line_col(offset);
        let di_file = self.builder.create_file(&file.display_name(), ".");
        let subroutine = self.builder.create_subroutine_type(
            di_file,
            None,
            &[],
            inkwell::debug_info::DIFlags::PUBLIC,
        );
        let subprogram = self.builder.create_function(
            self.compile_unit.as_debug_info_scope(),
            name,
            None,
            di_file,
            line,
            subroutine,
            true,
            true,
            line,
            inkwell::debug_info::DIFlags::PUBLIC,
            false,
        );
        function.set_subprogram(subprogram);
        subprogram
    }

    /// Points the instruction builder at a source location.
    pub(crate) fn set_location(
        &self,
        llvm: &'ctx Context,
        builder: &Builder<'ctx>,
        subprogram: DISubprogram<'ctx>,
        file: &SourceFile,
        offset: usize,
    ) {
        let (line, column) = file.line_col(offset);
        let location = self.builder.create_debug_location(
            llvm,
            line,
            column,
            subprogram.as_debug_info_scope(),
            None,
        );
        builder.set_current_debug_location(location);
    }

    /// Finalizes the metadata; required before the module is emitted.
    pub(crate) fn finalize(&self) {
        self.builder.finalize();
    }
}
