//! Resolution of written types to interned type handles.
//!
//! Written types are resolved against a scope (for nominal names) and a
//! type-parameter environment (inside generic definitions). `Option`
//! and `Result` instantiate through the interner's built-in
//! definitions; user generics monomorphize on use: the instantiation is
//! interned by (definition, arguments) and its field layout is resolved
//! once, with parameter names bound to the concrete arguments.

use indexmap::IndexMap;

use crate::ast::TypeAst;
use crate::sema::context::{GenericDef, GenericDefKind, SemaContext, MAX_INSTANTIATION_DEPTH};
use crate::sema::error::{InstantiationTooDeep, TypeNotFound, WrongTypeArgumentCount};
use crate::sema::scope::{ScopeLocation, SymbolKind};
use crate::types::{EnumLayout, PrimitiveKind, StructLayout, TypeDescriptor, TypeLocation};

/// Type-parameter environment: parameter name to concrete argument.
pub(crate) type ParamEnv = IndexMap<String, TypeLocation>;

/// Resolves a written type, reporting failures and returning the
/// `Unknown` placeholder for them.
pub(crate) fn resolve_type<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    written: &TypeAst<'base>,
    env: &ParamEnv,
) -> TypeLocation {
    match written {
        TypeAst::Named { name } => resolve_named(context, scope, name.text, written, env),
        TypeAst::Generic { name, args, .. } => {
            let resolved_args: Vec<TypeLocation> =
                args.iter().map(|arg| resolve_type(context, scope, arg, env)).collect();
            resolve_generic(context, scope, name.text, resolved_args, written)
        }
        TypeAst::Pointer { pointee, .. } => {
            let pointee = resolve_type(context, scope, pointee, env);
            context.interner.intern(TypeDescriptor::Pointer(pointee))
        }
        TypeAst::Slice { element, .. } => {
            let element = resolve_type(context, scope, element, env);
            context.interner.intern(TypeDescriptor::Slice(element))
        }
        TypeAst::Array { element, len, .. } => {
            let element = resolve_type(context, scope, element, env);
            context.interner.intern(TypeDescriptor::Array(element, *len))
        }
        TypeAst::Tuple { elements, .. } => {
            let elements: Vec<TypeLocation> =
                elements.iter().map(|element| resolve_type(context, scope, element, env)).collect();
            context.interner.intern(TypeDescriptor::Tuple(elements))
        }
        TypeAst::Function { params, result, .. } => {
            let params: Vec<TypeLocation> =
                params.iter().map(|param| resolve_type(context, scope, param, env)).collect();
            let result = match result {
                Some(result) => resolve_type(context, scope, result, env),
                None => context.interner.unit(),
            };
            context.interner.intern(TypeDescriptor::Function { params, result, variadic: false })
        }
    }
}

fn resolve_named<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    name: &str,
    written: &TypeAst<'base>,
    env: &ParamEnv,
) -> TypeLocation {
    if let Some(bound) = env.get(name) {
        return *bound;
    }
    if name == "unit" {
        return context.interner.unit();
    }
    if name == "never" {
        return context.interner.never();
    }
    if let Some(kind) = PrimitiveKind::all().iter().find(|kind| kind.name() == name) {
        return context.interner.primitive(*kind);
    }

    match context.resolve(scope, name) {
        Some(symbol) if matches!(context.symbol(symbol).kind, SymbolKind::Struct | SymbolKind::Enum) => {
            if let Some(def) = context.symbol_defs.get(&symbol).copied() {
                if let Some(generic) = context.generics.get(&def) {
                    let expected = generic.params.len();
                    context.error(WrongTypeArgumentCount {
                        name: name.to_string(),
                        expected,
                        found: 0,
                        position: written.position().into(),
                        code: written.file(),
                    });
                    return context.interner.unknown();
                }
            }
            context.symbol(symbol).type_location
        }
        _ => {
            context.error(TypeNotFound {
                type_name: name.to_string(),
                position: written.position().into(),
                code: written.file(),
            });
            context.interner.unknown()
        }
    }
}

fn resolve_generic<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    name: &str,
    args: Vec<TypeLocation>,
    written: &TypeAst<'base>,
) -> TypeLocation {
    match name {
        "Option" => {
            if args.len() != 1 {
                context.error(WrongTypeArgumentCount {
                    name: name.to_string(),
                    expected: 1,
                    found: args.len(),
                    position: written.position().into(),
                    code: written.file(),
                });
                return context.interner.unknown();
            }
            context.interner.option_of(args[0])
        }
        "Result" => {
            if args.len() != 2 {
                context.error(WrongTypeArgumentCount {
                    name: name.to_string(),
                    expected: 2,
                    found: args.len(),
                    position: written.position().into(),
                    code: written.file(),
                });
                return context.interner.unknown();
            }
            context.interner.result_of(args[0], args[1])
        }
        _ => {
            let symbol = match context.resolve(scope, name) {
                Some(symbol)
                    if matches!(context.symbol(symbol).kind, SymbolKind::Struct | SymbolKind::Enum) =>
                {
                    symbol
                }
                _ => {
                    context.error(TypeNotFound {
                        type_name: name.to_string(),
                        position: written.position().into(),
                        code: written.file(),
                    });
                    return context.interner.unknown();
                }
            };

            let Some(def) = context.symbol_defs.get(&symbol).copied() else {
                return context.interner.unknown();
            };
            let Some(generic) = context.generics.get(&def).cloned() else {
                context.error(WrongTypeArgumentCount {
                    name: name.to_string(),
                    expected: 0,
                    found: args.len(),
                    position: written.position().into(),
                    code: written.file(),
                });
                return context.interner.unknown();
            };

            instantiate(context, &generic, args, written)
        }
    }
}

/// Monomorphizes one generic definition with concrete arguments.
///
/// The handle is interned first so recursive references through
/// pointers resolve to the same instantiation; the layout is filled in
/// exactly once.
pub(crate) fn instantiate<'base>(
    context: &mut SemaContext<'base>,
    generic: &GenericDef<'base>,
    args: Vec<TypeLocation>,
    written: &TypeAst<'base>,
) -> TypeLocation {
    let name = context.interner.def_name(generic.def).to_string();
    if args.len() != generic.params.len() {
        context.error(WrongTypeArgumentCount {
            name,
            expected: generic.params.len(),
            found: args.len(),
            position: written.position().into(),
            code: written.file(),
        });
        return context.interner.unknown();
    }

    if context.instantiation_depth >= MAX_INSTANTIATION_DEPTH {
        context.error(InstantiationTooDeep {
            name,
            position: written.position().into(),
            code: written.file(),
        });
        return context.interner.unknown();
    }

    let descriptor = match generic.kind {
        GenericDefKind::Struct(_) => TypeDescriptor::Struct { def: generic.def, args: args.clone() },
        GenericDefKind::Enum(_) => TypeDescriptor::Enum { def: generic.def, args: args.clone() },
    };
    let location = context.interner.intern(descriptor);

    let already_resolved = match generic.kind {
        GenericDefKind::Struct(_) => context.interner.struct_layout(location).is_some(),
        GenericDefKind::Enum(_) => context.interner.enum_layout(location).is_some(),
    };
    if already_resolved || context.instantiating.contains(&location) {
        return location;
    }

    context.instantiating.insert(location);
    context.instantiation_depth += 1;

    let env: ParamEnv = generic
        .params
        .iter()
        .cloned()
        .zip(args.iter().copied())
        .collect();

    let display = display_instantiation(context, &name, &args);
    match &generic.kind {
        GenericDefKind::Struct(definition) => {
            let definition = definition.clone();
            let fields = definition
                .fields
                .iter()
                .map(|field| {
                    let ty = resolve_type(context, generic.scope, &field.field_type, &env);
                    (field.name.text.to_string(), ty)
                })
                .collect();
            context.interner.set_struct_layout(location, StructLayout { name: display, fields });
        }
        GenericDefKind::Enum(definition) => {
            let definition = definition.clone();
            let variants = definition
                .variants
                .iter()
                .map(|variant| {
                    let payload = variant
                        .payload
                        .iter()
                        .map(|ty| resolve_type(context, generic.scope, ty, &env))
                        .collect();
                    (variant.name.text.to_string(), payload)
                })
                .collect();
            context.interner.set_enum_layout(location, EnumLayout { name: display, variants });
        }
    }

    context.instantiation_depth -= 1;
    context.instantiating.swap_remove(&location);
    location
}

fn display_instantiation(context: &SemaContext<'_>, name: &str, args: &[TypeLocation]) -> String {
    if args.is_empty() {
        name.to_string()
    } else {
        let rendered: Vec<String> = args.iter().map(|arg| context.interner.display(*arg)).collect();
        format!("{name}<{}>", rendered.join(", "))
    }
}
