//! Declaration passes of the semantic analyzer.
//!
//! Pass one registers every top-level name in its module scope so later
//! passes can resolve forward references. Pass two resolves the written
//! types of all declarations: nominal handles and layouts for structs
//! and enums, signatures for functions and externs, value types for
//! constants, and the import bindings.

use std::rc::Rc;

use indexmap::IndexMap;
use log::debug;

use crate::ast::{
    ConstDefinitionAst, EnumDefinitionAst, ExternFunctionAst, FileAst, FileStatementAst,
    FunctionDefinitionAst, ImportAst, StructDefinitionAst,
};
use crate::nom_tools::{SpanInfo, ToRange};
use crate::sema::context::{GenericDef, GenericDefKind, ModuleInfo, SemaContext};
use crate::sema::error::{
    AlreadyDefined, DuplicateFunctionName, ImportNotFound, ModuleAlreadyImported,
};
use crate::sema::scope::{ScopeKind, ScopeLocation, SymbolKind, SymbolLocation};
use crate::sema::typeres::{resolve_type, ParamEnv};
use crate::types::{EnumLayout, StructLayout, TypeDescriptor, TypeLocation};

/// Declarations gathered for the body-checking pass.
pub(crate) struct Declarations<'base> {
    /// Functions with their module path and symbol
    pub functions: Vec<(String, Rc<FunctionDefinitionAst<'base>>, SymbolLocation)>,
    /// Constants with their module path and symbol
    pub consts: Vec<(String, Rc<ConstDefinitionAst<'base>>, SymbolLocation)>,
    /// Import symbols with their statements, for the unused check
    pub imports: Vec<(SymbolLocation, Rc<ImportAst<'base>>)>,
    structs: Vec<(ScopeLocation, Rc<StructDefinitionAst<'base>>, SymbolLocation)>,
    enums: Vec<(ScopeLocation, Rc<EnumDefinitionAst<'base>>, SymbolLocation)>,
    externs: Vec<(ScopeLocation, Rc<ExternFunctionAst<'base>>, SymbolLocation)>,
    pending_imports: Vec<(String, ScopeLocation, Rc<ImportAst<'base>>)>,
}

/// Pass one: creates module scopes and registers every top-level name.
pub(crate) fn register_files<'base>(
    context: &mut SemaContext<'base>,
    files: &[Rc<FileAst<'base>>],
) -> Declarations<'base> {
    let mut declarations = Declarations {
        functions: Vec::new(),
        consts: Vec::new(),
        imports: Vec::new(),
        structs: Vec::new(),
        enums: Vec::new(),
        externs: Vec::new(),
        pending_imports: Vec::new(),
    };

    for file in files {
        let path = file.file.module_name();
        debug!("registering module '{path}'");

        if context.modules.contains_key(&path) {
            context.error(AlreadyDefined {
                name: path.clone(),
                old_position: (0..0).into(),
                new_position: (0..0).into(),
                code: file.file.clone(),
            });
            continue;
        }

        let scope = context.create_scope(ScopeKind::Module, context.root_scope(), Some(path.clone()));
        context.modules.insert(
            path.clone(),
            ModuleInfo { path: path.clone(), scope, file: file.file.clone() },
        );

        for statement in &file.statements {
            register_statement(context, &mut declarations, &path, scope, statement);
        }
    }

    declarations
}

fn register_statement<'base>(
    context: &mut SemaContext<'base>,
    declarations: &mut Declarations<'base>,
    module_path: &str,
    scope: ScopeLocation,
    statement: &FileStatementAst<'base>,
) {
    let undefined = TypeLocation::UNDEFINED;
    match statement {
        FileStatementAst::Function(function) => {
            let span = SpanInfo::from(&function.name);
            if let Some(symbol) = context.declare(
                scope,
                function.name.text.into(),
                SymbolKind::Function,
                function.index,
                undefined,
                function.is_public.is_some(),
                span,
                false,
            ) {
                declarations.functions.push((module_path.to_string(), function.clone(), symbol));
            }
        }
        FileStatementAst::Extern(extern_fn) => {
            // Repeated extern declarations of the same name are allowed;
            // the first one wins and pass two checks the signatures.
            if let Some(existing) = context.scope(scope).local(extern_fn.name.text) {
                if context.symbol(existing).kind == SymbolKind::ExternFunction {
                    declarations.externs.push((scope, extern_fn.clone(), existing));
                    return;
                }
            }
            let span = SpanInfo::from(&extern_fn.name);
            if let Some(symbol) = context.declare(
                scope,
                extern_fn.name.text.into(),
                SymbolKind::ExternFunction,
                extern_fn.index,
                undefined,
                true,
                span,
                false,
            ) {
                declarations.externs.push((scope, extern_fn.clone(), symbol));
            }
        }
        FileStatementAst::Struct(definition) => {
            let span = SpanInfo::from(&definition.name);
            if let Some(symbol) = context.declare(
                scope,
                definition.name.text.into(),
                SymbolKind::Struct,
                definition.index,
                undefined,
                definition.is_public.is_some(),
                span,
                false,
            ) {
                declarations.structs.push((scope, definition.clone(), symbol));
            }
        }
        FileStatementAst::Enum(definition) => {
            let span = SpanInfo::from(&definition.name);
            if let Some(symbol) = context.declare(
                scope,
                definition.name.text.into(),
                SymbolKind::Enum,
                definition.index,
                undefined,
                definition.is_public.is_some(),
                span,
                false,
            ) {
                declarations.enums.push((scope, definition.clone(), symbol));
            }
        }
        FileStatementAst::Const(definition) => {
            let span = SpanInfo::from(&definition.name);
            if let Some(symbol) = context.declare(
                scope,
                definition.name.text.into(),
                SymbolKind::Const,
                definition.index,
                undefined,
                definition.is_public.is_some(),
                span,
                false,
            ) {
                declarations.consts.push((module_path.to_string(), definition.clone(), symbol));
            }
        }
        FileStatementAst::Import(import) => {
            declarations
                .pending_imports
                .push((module_path.to_string(), scope, import.clone()));
        }
    }
}

/// Pass two: resolves imports and every declaration's written types.
pub(crate) fn resolve_declarations<'base>(
    context: &mut SemaContext<'base>,
    declarations: &mut Declarations<'base>,
) {
    resolve_imports(context, declarations);

    // Nominal handles first, so forward and recursive references work.
    for (_, definition, symbol) in &declarations.structs {
        let def = context.interner.allocate_def(definition.name.text);
        context.symbol_defs.insert(*symbol, def);
        if definition.type_params.is_empty() {
            let location = context.interner.intern(TypeDescriptor::Struct { def, args: vec![] });
            context.symbol_mut(*symbol).type_location = location;
        } else {
            let generic = GenericDef {
                def,
                params: definition.type_params.iter().map(|p| p.text.to_string()).collect(),
                kind: GenericDefKind::Struct(definition.clone()),
                scope: context.symbol(*symbol).owning_scope,
            };
            context.generics.insert(def, generic);
        }
    }
    for (_, definition, symbol) in &declarations.enums {
        let def = context.interner.allocate_def(definition.name.text);
        context.symbol_defs.insert(*symbol, def);
        if definition.type_params.is_empty() {
            let location = context.interner.intern(TypeDescriptor::Enum { def, args: vec![] });
            context.symbol_mut(*symbol).type_location = location;
        } else {
            let generic = GenericDef {
                def,
                params: definition.type_params.iter().map(|p| p.text.to_string()).collect(),
                kind: GenericDefKind::Enum(definition.clone()),
                scope: context.symbol(*symbol).owning_scope,
            };
            context.generics.insert(def, generic);
        }
    }

    // Layouts for the non-generic nominals.
    let empty = ParamEnv::new();
    for (scope, definition, symbol) in declarations.structs.clone() {
        if !definition.type_params.is_empty() {
            continue;
        }
        let fields = definition
            .fields
            .iter()
            .map(|field| {
                let ty = resolve_type(context, scope, &field.field_type, &empty);
                (field.name.text.to_string(), ty)
            })
            .collect();
        let location = context.symbol(symbol).type_location;
        context
            .interner
            .set_struct_layout(location, StructLayout { name: definition.name.text.to_string(), fields });
    }
    for (scope, definition, symbol) in declarations.enums.clone() {
        if !definition.type_params.is_empty() {
            continue;
        }
        let variants = definition
            .variants
            .iter()
            .map(|variant| {
                let payload =
                    variant.payload.iter().map(|ty| resolve_type(context, scope, ty, &empty)).collect();
                (variant.name.text.to_string(), payload)
            })
            .collect();
        let location = context.symbol(symbol).type_location;
        context
            .interner
            .set_enum_layout(location, EnumLayout { name: definition.name.text.to_string(), variants });
    }

    // Function and extern signatures.
    for (module_path, function, symbol) in declarations.functions.clone() {
        let scope = context.modules[&module_path].scope;
        let params: Vec<TypeLocation> = function
            .parameters
            .iter()
            .map(|parameter| resolve_type(context, scope, &parameter.written_type, &empty))
            .collect();
        let result = match &function.return_type {
            Some(written) => resolve_type(context, scope, written, &empty),
            None => context.interner.unit(),
        };
        let signature =
            context.interner.intern(TypeDescriptor::Function { params, result, variadic: false });
        context.symbol_mut(symbol).type_location = signature;
        register_function_symbol(context, &function.name.text, symbol, &function.name);
    }
    for (scope, extern_fn, symbol) in declarations.externs.clone() {
        let params: Vec<TypeLocation> = extern_fn
            .parameters
            .iter()
            .map(|parameter| resolve_type(context, scope, &parameter.written_type, &empty))
            .collect();
        let result = match &extern_fn.return_type {
            Some(written) => resolve_type(context, scope, written, &empty),
            None => context.interner.unit(),
        };
        let signature = context.interner.intern(TypeDescriptor::Function {
            params,
            result,
            variadic: extern_fn.variadic,
        });

        let previous = context.symbol(symbol).type_location;
        if previous != TypeLocation::UNDEFINED && previous != signature {
            context.error(DuplicateFunctionName {
                name: extern_fn.name.text.to_string(),
                position: extern_fn.name.to_range().into(),
                code: extern_fn.name.state.file.clone(),
            });
            continue;
        }
        context.symbol_mut(symbol).type_location = signature;
        register_function_symbol(context, &extern_fn.name.text, symbol, &extern_fn.name);
    }

    // Constant value types; the initializers are checked with bodies.
    for (module_path, definition, symbol) in declarations.consts.clone() {
        let scope = context.modules[&module_path].scope;
        let ty = resolve_type(context, scope, &definition.written_type, &empty);
        context.symbol_mut(symbol).type_location = ty;
        context.const_defs.insert(symbol, definition.clone());
    }
}

/// Adds a function to the program-wide symbol table, diagnosing
/// cross-module name collisions. Extern re-declarations resolve to the
/// same symbol and pass through.
fn register_function_symbol<'base>(
    context: &mut SemaContext<'base>,
    name: &str,
    symbol: SymbolLocation,
    span: &crate::nom_tools::Span<'base>,
) {
    match context.functions.get(name) {
        Some(existing) if *existing != symbol => {
            context.error(DuplicateFunctionName {
                name: name.to_string(),
                position: span.to_range().into(),
                code: span.state.file.clone(),
            });
        }
        Some(_) => {}
        None => {
            context.functions.insert(name.to_string(), symbol);
        }
    }
}

fn resolve_imports<'base>(
    context: &mut SemaContext<'base>,
    declarations: &mut Declarations<'base>,
) {
    let pending = std::mem::take(&mut declarations.pending_imports);
    let mut seen: IndexMap<(String, String), SpanInfo> = IndexMap::new();

    for (module_path, scope, import) in pending {
        let target = import.module_path();
        let local = import.local_name().clone();

        if !context.modules.contains_key(&target) {
            context.error(ImportNotFound {
                module: target,
                position: import.span.to_range().into(),
                code: import.span.state.file.clone(),
            });
            continue;
        }

        // The same module bound to the same local name twice.
        let key = (module_path.clone(), local.text.to_string());
        if let Some(previous) = seen.get(&key) {
            context.error(ModuleAlreadyImported {
                old_position: previous.position.clone().into(),
                new_position: import.span.to_range().into(),
                code: import.span.state.file.clone(),
            });
            continue;
        }
        seen.insert(key, SpanInfo::from(&import.span));

        let span = SpanInfo::from(&local);
        if let Some(symbol) = context.declare(
            scope,
            local.text.into(),
            SymbolKind::Module,
            import.index,
            TypeLocation::UNDEFINED,
            false,
            span,
            false,
        ) {
            context.symbol_mut(symbol).module_path = Some(target);
            declarations.imports.push((symbol, import.clone()));
        }
    }
}
