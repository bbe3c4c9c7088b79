//! Expression checking and inference.
//!
//! `check_expr` resolves names, infers and checks types, and annotates
//! every visited expression node with its resolved type. An optional
//! expected type flows inward (from let annotations, parameter types,
//! return types, field types); integer and float literals adopt it,
//! and `Option`/`Result` constructors take their generic arguments
//! from it. The first error in a sub-expression yields the `Unknown`
//! placeholder and later rules skip quietly, so one mistake produces
//! one diagnostic.
//!
//! Calls resolve per the flat mangling scheme: `o.m(..)` looks up
//! `TypeName_instance_m` with a pointer to the receiver as first
//! argument, `T.f(..)` looks up `T_f`, and `Option`/`Result`
//! constructors build their variant struct in place. Every resolution
//! is recorded in the context's call-target table for the lowerer.

use crate::ast::{
    AstIndex, BinaryOperator, ExpressionAst, IfExpressionAst, IfLetAst, LiteralValue,
    MatchExpressionAst, PatternAst, UnaryOperator,
};
use crate::nom_tools::{Span, SpanInfo, ToRange};
use crate::sema::context::{CallTarget, SemaContext};
use crate::sema::error::{
    AlreadyDefined, ArgumentCountMismatch, CannotInfer, InvalidCast, MissingFields,
    NonExhaustiveMatch, NotCallable, NotIndexable, NotAValue, PatternMismatch, TypeMismatch,
    UndefinedName, UnknownField, UnknownMethod, UnknownVariant,
};
use crate::sema::scope::{ScopeKind, ScopeLocation, SymbolKind, SymbolLocation};
use crate::sema::stmt::{check_block, literal_like, require_bool, FunctionCtx};
use crate::sema::typeres::resolve_type;
use crate::types::{PrimitiveKind, TypeDescriptor, TypeLocation, OPTION_DEF, RESULT_DEF};

/// Checks an expression, records its resolved type, and enforces the
/// expected type when one is supplied.
pub(crate) fn check_expr<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    expr: &ExpressionAst<'base>,
    expected: Option<TypeLocation>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    let ty = check_expr_inner(context, scope, expr, expected, fctx);
    context.set_node_type(expr.index(), ty);

    if let Some(expected_type) = expected {
        if !context.interner.is_assignable_to(ty, expected_type) {
            context.error(TypeMismatch {
                expected: context.interner.display(expected_type),
                found: context.interner.display(ty),
                position: expr.position().into(),
                code: expr.file(),
            });
        }
    }
    ty
}

fn check_expr_inner<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    expr: &ExpressionAst<'base>,
    expected: Option<TypeLocation>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    match expr {
        ExpressionAst::Literal { span, value, .. } => {
            check_literal(context, value, expected, false, span)
        }
        ExpressionAst::Identifier { name, .. } => {
            check_identifier(context, scope, expr.index(), name)
        }
        ExpressionAst::Unary { operator, operand, span, .. } => {
            check_unary(context, scope, *operator, operand, expected, span, fctx)
        }
        ExpressionAst::Binary { left, operator, right, .. } => {
            check_binary(context, scope, left, *operator, right, expected, fctx)
        }
        ExpressionAst::Call { function, args, span, .. } => {
            check_call(context, scope, expr.index(), function, args, span, fctx)
        }
        ExpressionAst::MethodCall { receiver, method, args, span, .. } => {
            check_method_call(context, scope, expr.index(), receiver, method, args, expected, span, fctx)
        }
        ExpressionAst::FieldAccess { receiver, field, .. } => {
            check_field_access(context, scope, expr.index(), receiver, field, expected, fctx)
        }
        ExpressionAst::Index { receiver, index_expr, .. } => {
            check_index(context, scope, receiver, index_expr, fctx)
        }
        ExpressionAst::Cast { value, target, .. } => {
            check_cast(context, scope, value, target, fctx)
        }
        ExpressionAst::StructLiteral { name, fields, span, .. } => {
            check_struct_literal(context, scope, name, fields, expected, span, fctx)
        }
        ExpressionAst::ArrayLiteral { elements, span, .. } => {
            check_array_literal(context, scope, elements, expected, span, fctx)
        }
        ExpressionAst::TupleLiteral { elements, .. } => {
            check_tuple_literal(context, scope, elements, expected, fctx)
        }
        ExpressionAst::If(if_expr) => check_if(context, scope, if_expr, expected, fctx),
        ExpressionAst::IfLet(if_let) => check_if_let(context, scope, if_let, expected, fctx),
        ExpressionAst::Match(match_expr) => check_match(context, scope, match_expr, expected, fctx),
    }
}

/// Bounds of an integer primitive as (max positive, max negated
/// magnitude).
fn integer_bounds(kind: PrimitiveKind) -> Option<(u128, u128)> {
    Some(match kind {
        PrimitiveKind::I8 => (i8::MAX as u128, 1 << 7),
        PrimitiveKind::I16 => (i16::MAX as u128, 1 << 15),
        PrimitiveKind::I32 => (i32::MAX as u128, 1 << 31),
        PrimitiveKind::I64 => (i64::MAX as u128, 1 << 63),
        PrimitiveKind::I128 => (i128::MAX as u128, 1 << 127),
        PrimitiveKind::U8 => (u8::MAX as u128, 0),
        PrimitiveKind::U16 => (u16::MAX as u128, 0),
        PrimitiveKind::U32 => (u32::MAX as u128, 0),
        PrimitiveKind::U64 => (u64::MAX as u128, 0),
        PrimitiveKind::U128 => (u128::MAX, 0),
        _ => return None,
    })
}

/// Types a literal, letting integers and floats adopt the expected
/// type. `negated` folds a leading unary minus into the range check.
fn check_literal<'base>(
    context: &mut SemaContext<'base>,
    value: &LiteralValue<'base>,
    expected: Option<TypeLocation>,
    negated: bool,
    span: &Span<'base>,
) -> TypeLocation {
    match value {
        LiteralValue::Int { magnitude, .. } => {
            let expected_kind = expected.and_then(|e| match context.interner.get(e) {
                Some(TypeDescriptor::Primitive(kind)) if integer_bounds(*kind).is_some() => Some(*kind),
                _ => None,
            });
            let kind = expected_kind.unwrap_or(PrimitiveKind::I32);
            let (max_positive, max_negated) =
                integer_bounds(kind).expect("integer kind always has bounds");
            let fits = if negated { *magnitude <= max_negated } else { *magnitude <= max_positive };
            if !fits {
                context.error(crate::sema::error::LiteralOutOfRange {
                    value: format!("{}{magnitude}", if negated { "-" } else { "" }),
                    type_name: kind.name().to_string(),
                    position: span.to_range().into(),
                    code: span.state.file.clone(),
                });
            }
            context.interner.primitive(kind)
        }
        LiteralValue::Float(_) => {
            let kind = match expected.and_then(|e| context.interner.get(e).cloned()) {
                Some(TypeDescriptor::Primitive(PrimitiveKind::F32)) => PrimitiveKind::F32,
                _ => PrimitiveKind::F64,
            };
            context.interner.primitive(kind)
        }
        LiteralValue::Bool(_) => context.interner.bool_type(),
        LiteralValue::Char(_) => context.interner.primitive(PrimitiveKind::Char),
        LiteralValue::String(_) => context.interner.primitive(PrimitiveKind::String),
        LiteralValue::Unit => context.interner.unit(),
    }
}

fn check_identifier<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    index: AstIndex,
    name: &Span<'base>,
) -> TypeLocation {
    match context.resolve(scope, name.text) {
        Some(symbol) => match context.symbol(symbol).kind {
            SymbolKind::Variable
            | SymbolKind::Parameter
            | SymbolKind::Const
            | SymbolKind::Function
            | SymbolKind::ExternFunction => {
                context.set_name_target(index, symbol);
                context.symbol(symbol).type_location
            }
            SymbolKind::Struct | SymbolKind::Enum | SymbolKind::Module | SymbolKind::TypeParam => {
                context.error(NotAValue {
                    name: name.text.to_string(),
                    position: name.to_range().into(),
                    code: name.state.file.clone(),
                });
                context.interner.unknown()
            }
        },
        None => {
            context.error(UndefinedName {
                name: name.text.to_string(),
                position: name.to_range().into(),
                code: name.state.file.clone(),
            });
            context.interner.unknown()
        }
    }
}

fn check_unary<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    operator: UnaryOperator,
    operand: &ExpressionAst<'base>,
    expected: Option<TypeLocation>,
    span: &Span<'base>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    match operator {
        UnaryOperator::Negate => {
            // Fold the sign into the literal so `-128` fits in `i8`.
            if let ExpressionAst::Literal { span: literal_span, value, index } = operand {
                let ty = check_literal(context, value, expected, true, literal_span);
                context.set_node_type(*index, ty);
                if context.interner.is_integer(ty) && !context.interner.is_signed(ty) {
                    context.error(TypeMismatch {
                        expected: "a signed numeric type".to_string(),
                        found: context.interner.display(ty),
                        position: span.to_range().into(),
                        code: span.state.file.clone(),
                    });
                }
                return ty;
            }

            let operand_type = check_expr(context, scope, operand, expected, fctx);
            let unknown = context.interner.unknown();
            if operand_type == unknown {
                return unknown;
            }
            let signed = context.interner.is_signed(operand_type)
                || context.interner.is_float(operand_type);
            if !signed {
                context.error(TypeMismatch {
                    expected: "a signed numeric type".to_string(),
                    found: context.interner.display(operand_type),
                    position: operand.position().into(),
                    code: operand.file(),
                });
                return unknown;
            }
            operand_type
        }
        UnaryOperator::Not => {
            let bool_type = context.interner.bool_type();
            check_expr(context, scope, operand, Some(bool_type), fctx);
            bool_type
        }
        UnaryOperator::AddressOf => {
            let pointee_hint = expected.and_then(|e| match context.interner.get(e) {
                Some(TypeDescriptor::Pointer(pointee)) => Some(*pointee),
                _ => None,
            });
            let operand_type = check_expr(context, scope, operand, pointee_hint, fctx);
            context.interner.intern(TypeDescriptor::Pointer(operand_type))
        }
        UnaryOperator::Deref => {
            let operand_type = check_expr(context, scope, operand, None, fctx);
            match context.interner.get(operand_type) {
                Some(TypeDescriptor::Pointer(pointee)) => *pointee,
                Some(TypeDescriptor::Unknown) => operand_type,
                _ => {
                    context.error(TypeMismatch {
                        expected: "a pointer type".to_string(),
                        found: context.interner.display(operand_type),
                        position: operand.position().into(),
                        code: operand.file(),
                    });
                    context.interner.unknown()
                }
            }
        }
    }
}

fn check_binary<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    left: &ExpressionAst<'base>,
    operator: BinaryOperator,
    right: &ExpressionAst<'base>,
    expected: Option<TypeLocation>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    let unknown = context.interner.unknown();
    let bool_type = context.interner.bool_type();

    if operator.is_logical() {
        check_expr(context, scope, left, Some(bool_type), fctx);
        check_expr(context, scope, right, Some(bool_type), fctx);
        return bool_type;
    }

    // A bare literal adopts the other operand's type, so check the
    // non-literal side first.
    let literal_first = literal_like(left) && !literal_like(right);
    let (first, second) = if literal_first { (right, left) } else { (left, right) };

    let operand_hint = expected.filter(|e| context.interner.is_numeric(*e));
    let first_type = check_expr(context, scope, first, operand_hint, fctx);
    check_expr(context, scope, second, Some(first_type), fctx);

    if first_type == unknown {
        return unknown;
    }

    if operator.is_comparison() {
        let comparable = context.interner.is_numeric(first_type)
            || first_type == bool_type
            || context.interner.is_pointer(first_type)
            || matches!(
                context.interner.get(first_type),
                Some(TypeDescriptor::Primitive(PrimitiveKind::Char))
            );
        let equality_only =
            matches!(operator, BinaryOperator::Equal | BinaryOperator::NotEqual);
        let ordered = context.interner.is_numeric(first_type)
            || matches!(
                context.interner.get(first_type),
                Some(TypeDescriptor::Primitive(PrimitiveKind::Char))
            );
        if !comparable || (!equality_only && !ordered) {
            context.error(TypeMismatch {
                expected: "a comparable type".to_string(),
                found: context.interner.display(first_type),
                position: first.position().into(),
                code: first.file(),
            });
        }
        return bool_type;
    }

    if operator.is_bitwise() {
        if !context.interner.is_integer(first_type) {
            context.error(TypeMismatch {
                expected: "an integer type".to_string(),
                found: context.interner.display(first_type),
                position: first.position().into(),
                code: first.file(),
            });
            return unknown;
        }
        return first_type;
    }

    // Arithmetic.
    if !context.interner.is_numeric(first_type) {
        context.error(TypeMismatch {
            expected: "a numeric type".to_string(),
            found: context.interner.display(first_type),
            position: first.position().into(),
            code: first.file(),
        });
        return unknown;
    }
    first_type
}

/// Extracts a function signature descriptor, cloned out of the
/// interner.
fn function_signature(
    context: &SemaContext<'_>,
    symbol: SymbolLocation,
) -> Option<(Vec<TypeLocation>, TypeLocation, bool)> {
    match context.interner.get(context.symbol(symbol).type_location) {
        Some(TypeDescriptor::Function { params, result, variadic }) => {
            Some((params.clone(), *result, *variadic))
        }
        _ => None,
    }
}

/// Checks arguments against a parameter list, with variadic tails.
#[allow(clippy::too_many_arguments)]
fn check_arguments<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    callee: &str,
    params: &[TypeLocation],
    variadic: bool,
    args: &[ExpressionAst<'base>],
    span: &Span<'base>,
    fctx: &FunctionCtx,
) {
    let count_matches = if variadic { args.len() >= params.len() } else { args.len() == params.len() };
    if !count_matches {
        context.error(ArgumentCountMismatch {
            name: callee.to_string(),
            expected: params.len(),
            found: args.len(),
            position: span.to_range().into(),
            code: span.state.file.clone(),
        });
    }
    for (position, arg) in args.iter().enumerate() {
        let expected = params.get(position).copied();
        check_expr(context, scope, arg, expected, fctx);
    }
}

fn check_call<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    index: AstIndex,
    function: &Span<'base>,
    args: &[ExpressionAst<'base>],
    span: &Span<'base>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    // Built-ins take priority; their names are part of the language.
    match function.text {
        "len" => {
            let i64_type = context.interner.primitive(PrimitiveKind::I64);
            if args.len() != 1 {
                context.error(ArgumentCountMismatch {
                    name: "len".to_string(),
                    expected: 1,
                    found: args.len(),
                    position: span.to_range().into(),
                    code: span.state.file.clone(),
                });
                return i64_type;
            }
            let arg_type = check_expr(context, scope, &args[0], None, fctx);
            match context.interner.get(arg_type) {
                Some(TypeDescriptor::Slice(_) | TypeDescriptor::Array(_, _) | TypeDescriptor::Unknown) => {}
                _ => {
                    context.error(TypeMismatch {
                        expected: "a slice or array".to_string(),
                        found: context.interner.display(arg_type),
                        position: args[0].position().into(),
                        code: args[0].file(),
                    });
                }
            }
            context.set_call_target(index, CallTarget::BuiltinLen);
            return i64_type;
        }
        "log" => {
            let string_type = context.interner.primitive(PrimitiveKind::String);
            if args.len() != 1 {
                context.error(ArgumentCountMismatch {
                    name: "log".to_string(),
                    expected: 1,
                    found: args.len(),
                    position: span.to_range().into(),
                    code: span.state.file.clone(),
                });
            }
            for arg in args {
                check_expr(context, scope, arg, Some(string_type), fctx);
            }
            context.set_call_target(index, CallTarget::BuiltinLog);
            return context.interner.unit();
        }
        _ => {}
    }

    let Some(symbol) = context.resolve(scope, function.text) else {
        context.error(UndefinedName {
            name: function.text.to_string(),
            position: function.to_range().into(),
            code: function.state.file.clone(),
        });
        return context.interner.unknown();
    };

    match context.symbol(symbol).kind {
        SymbolKind::Function | SymbolKind::ExternFunction => {
            let Some((params, result, variadic)) = function_signature(context, symbol) else {
                return context.interner.unknown();
            };
            check_arguments(context, scope, function.text, &params, variadic, args, span, fctx);
            context.set_call_target(index, CallTarget::Direct { function: symbol });
            result
        }
        _ => {
            context.error(NotCallable {
                name: function.text.to_string(),
                position: function.to_range().into(),
                code: function.state.file.clone(),
            });
            context.interner.unknown()
        }
    }
}

/// The enum instantiation behind an expected type, when it matches the
/// given definition.
fn expected_enum_args(
    context: &SemaContext<'_>,
    expected: Option<TypeLocation>,
    def: crate::types::DefId,
) -> Option<(TypeLocation, Vec<TypeLocation>)> {
    let expected = expected?;
    match context.interner.get(expected) {
        Some(TypeDescriptor::Enum { def: found, args }) if *found == def => {
            Some((expected, args.clone()))
        }
        _ => None,
    }
}

/// Checks an `Option`/`Result` constructor (`Option.Some(7)`).
#[allow(clippy::too_many_arguments)]
fn check_builtin_constructor<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    index: AstIndex,
    enum_name: &str,
    variant: &Span<'base>,
    args: &[ExpressionAst<'base>],
    expected: Option<TypeLocation>,
    span: &Span<'base>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    let unknown = context.interner.unknown();

    let arity = |context: &mut SemaContext<'base>, expected_count: usize| {
        if args.len() != expected_count {
            context.error(ArgumentCountMismatch {
                name: format!("{enum_name}.{}", variant.text),
                expected: expected_count,
                found: args.len(),
                position: span.to_range().into(),
                code: span.state.file.clone(),
            });
            return false;
        }
        true
    };

    match (enum_name, variant.text) {
        ("Option", "Some") => {
            if !arity(context, 1) {
                return unknown;
            }
            let payload_hint = expected_enum_args(context, expected, OPTION_DEF)
                .map(|(_, args)| args[0]);
            let payload = check_expr(context, scope, &args[0], payload_hint, fctx);
            if payload == unknown {
                return unknown;
            }
            let ty = context.interner.option_of(payload_hint.unwrap_or(payload));
            context.set_call_target(index, CallTarget::EnumConstructor { enum_type: ty, variant_index: 0 });
            ty
        }
        ("Option", "None") => {
            if !arity(context, 0) {
                return unknown;
            }
            match expected_enum_args(context, expected, OPTION_DEF) {
                Some((ty, _)) => {
                    context
                        .set_call_target(index, CallTarget::EnumConstructor { enum_type: ty, variant_index: 1 });
                    ty
                }
                None => {
                    context.error(CannotInfer {
                        position: span.to_range().into(),
                        code: span.state.file.clone(),
                    });
                    unknown
                }
            }
        }
        ("Result", "Ok") | ("Result", "Err") => {
            if !arity(context, 1) {
                return unknown;
            }
            let variant_index = if variant.text == "Ok" { 0 } else { 1 };
            match expected_enum_args(context, expected, RESULT_DEF) {
                Some((ty, type_args)) => {
                    check_expr(context, scope, &args[0], Some(type_args[variant_index]), fctx);
                    context
                        .set_call_target(index, CallTarget::EnumConstructor { enum_type: ty, variant_index });
                    ty
                }
                None => {
                    // The other half of the Result cannot be guessed.
                    context.error(CannotInfer {
                        position: span.to_range().into(),
                        code: span.state.file.clone(),
                    });
                    check_expr(context, scope, &args[0], None, fctx);
                    unknown
                }
            }
        }
        _ => {
            context.error(UnknownVariant {
                enum_name: enum_name.to_string(),
                variant: variant.text.to_string(),
                position: variant.to_range().into(),
                code: variant.state.file.clone(),
            });
            unknown
        }
    }
}

/// Checks a user enum variant constructor.
#[allow(clippy::too_many_arguments)]
fn check_enum_constructor<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    index: AstIndex,
    enum_symbol: SymbolLocation,
    variant: &Span<'base>,
    args: &[ExpressionAst<'base>],
    expected: Option<TypeLocation>,
    span: &Span<'base>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    let unknown = context.interner.unknown();
    let enum_name = context.symbol(enum_symbol).name.to_string();
    let def = context.symbol_defs.get(&enum_symbol).copied();

    // Generic enums take their arguments from the expected type.
    let enum_type = if context.symbol(enum_symbol).type_location != TypeLocation::UNDEFINED {
        context.symbol(enum_symbol).type_location
    } else if let Some((ty, _)) = def.and_then(|def| expected_enum_args(context, expected, def)) {
        ty
    } else {
        context.error(CannotInfer {
            position: span.to_range().into(),
            code: span.state.file.clone(),
        });
        return unknown;
    };

    let Some(layout) = context.interner.enum_layout(enum_type).cloned() else {
        return unknown;
    };
    let Some((variant_index, payload)) = layout.variant(variant.text) else {
        context.error(UnknownVariant {
            enum_name,
            variant: variant.text.to_string(),
            position: variant.to_range().into(),
            code: variant.state.file.clone(),
        });
        return unknown;
    };
    let payload: Vec<TypeLocation> = payload.to_vec();

    if args.len() != payload.len() {
        context.error(ArgumentCountMismatch {
            name: format!("{enum_name}.{}", variant.text),
            expected: payload.len(),
            found: args.len(),
            position: span.to_range().into(),
            code: span.state.file.clone(),
        });
    }
    for (position, arg) in args.iter().enumerate() {
        check_expr(context, scope, arg, payload.get(position).copied(), fctx);
    }

    context.set_call_target(index, CallTarget::EnumConstructor { enum_type, variant_index });
    enum_type
}

/// The nominal definition name behind a receiver type, dereferencing
/// one pointer level.
fn receiver_nominal(
    context: &SemaContext<'_>,
    receiver_type: TypeLocation,
) -> Option<(String, TypeLocation)> {
    let base = match context.interner.get(receiver_type) {
        Some(TypeDescriptor::Pointer(pointee)) => *pointee,
        _ => receiver_type,
    };
    match context.interner.get(base) {
        Some(TypeDescriptor::Struct { def, .. } | TypeDescriptor::Enum { def, .. }) => {
            Some((context.interner.def_name(*def).to_string(), base))
        }
        _ => None,
    }
}

#[allow(clippy::too_many_arguments)]
fn check_method_call<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    index: AstIndex,
    receiver: &ExpressionAst<'base>,
    method: &Span<'base>,
    args: &[ExpressionAst<'base>],
    expected: Option<TypeLocation>,
    span: &Span<'base>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    let unknown = context.interner.unknown();

    if let ExpressionAst::Identifier { name, index: receiver_index } = receiver {
        // Built-in sum type constructors.
        if name.text == "Option" || name.text == "Result" {
            context.set_node_type(*receiver_index, unknown);
            return check_builtin_constructor(
                context, scope, index, name.text, method, args, expected, span, fctx,
            );
        }

        if let Some(symbol) = context.resolve(scope, name.text) {
            match context.symbol(symbol).kind {
                SymbolKind::Module => {
                    context.set_node_type(*receiver_index, unknown);
                    let module_path =
                        context.symbol(symbol).module_path.clone().unwrap_or_default();
                    let Some(member) = context.resolve_in_module(&module_path, method.text) else {
                        context.error(UndefinedName {
                            name: format!("{}.{}", name.text, method.text),
                            position: method.to_range().into(),
                            code: method.state.file.clone(),
                        });
                        return unknown;
                    };
                    return match context.symbol(member).kind {
                        SymbolKind::Function | SymbolKind::ExternFunction => {
                            let Some((params, result, variadic)) = function_signature(context, member)
                            else {
                                return unknown;
                            };
                            check_arguments(context, scope, method.text, &params, variadic, args, span, fctx);
                            context.set_call_target(index, CallTarget::Direct { function: member });
                            result
                        }
                        _ => {
                            context.error(NotCallable {
                                name: format!("{}.{}", name.text, method.text),
                                position: method.to_range().into(),
                                code: method.state.file.clone(),
                            });
                            unknown
                        }
                    };
                }
                SymbolKind::Struct => {
                    context.set_node_type(*receiver_index, unknown);
                    let type_name = context.symbol(symbol).name.to_string();
                    let mangled = format!("{type_name}_{}", method.text);
                    let Some(function) = context.functions.get(&mangled).copied() else {
                        context.error(UnknownMethod {
                            type_name,
                            method: method.text.to_string(),
                            position: method.to_range().into(),
                            code: method.state.file.clone(),
                        });
                        return unknown;
                    };
                    let Some((params, result, variadic)) = function_signature(context, function) else {
                        return unknown;
                    };
                    check_arguments(context, scope, &mangled, &params, variadic, args, span, fctx);
                    context.set_call_target(index, CallTarget::Direct { function });
                    return result;
                }
                SymbolKind::Enum => {
                    context.set_node_type(*receiver_index, unknown);
                    return check_enum_constructor(
                        context, scope, index, symbol, method, args, expected, span, fctx,
                    );
                }
                _ => {}
            }
        }
    }

    // Instance method: `TypeName_instance_method(&receiver, args...)`.
    let receiver_type = check_expr(context, scope, receiver, None, fctx);
    if receiver_type == unknown {
        return unknown;
    }

    let Some((type_name, _)) = receiver_nominal(context, receiver_type) else {
        context.error(UnknownMethod {
            type_name: context.interner.display(receiver_type),
            method: method.text.to_string(),
            position: method.to_range().into(),
            code: method.state.file.clone(),
        });
        return unknown;
    };

    let mangled = format!("{type_name}_instance_{}", method.text);
    let Some(function) = context.functions.get(&mangled).copied() else {
        context.error(UnknownMethod {
            type_name,
            method: method.text.to_string(),
            position: method.to_range().into(),
            code: method.state.file.clone(),
        });
        return unknown;
    };
    let Some((params, result, variadic)) = function_signature(context, function) else {
        return unknown;
    };

    // The first parameter receives the receiver's address.
    let instance_params = if params.is_empty() { &[][..] } else { &params[1..] };
    check_arguments(context, scope, &mangled, instance_params, variadic, args, span, fctx);
    context.set_call_target(index, CallTarget::InstanceMethod { function });
    result
}

fn check_field_access<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    index: AstIndex,
    receiver: &ExpressionAst<'base>,
    field: &Span<'base>,
    expected: Option<TypeLocation>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    let unknown = context.interner.unknown();

    if let ExpressionAst::Identifier { name, index: receiver_index } = receiver {
        // `Option.None` / enum variant without parentheses.
        if name.text == "Option" || name.text == "Result" {
            context.set_node_type(*receiver_index, unknown);
            return check_builtin_constructor(
                context, scope, index, name.text, field, &[], expected, field, fctx,
            );
        }

        if let Some(symbol) = context.resolve(scope, name.text) {
            match context.symbol(symbol).kind {
                SymbolKind::Module => {
                    context.set_node_type(*receiver_index, unknown);
                    let module_path =
                        context.symbol(symbol).module_path.clone().unwrap_or_default();
                    let Some(member) = context.resolve_in_module(&module_path, field.text) else {
                        context.error(UndefinedName {
                            name: format!("{}.{}", name.text, field.text),
                            position: field.to_range().into(),
                            code: field.state.file.clone(),
                        });
                        return unknown;
                    };
                    return match context.symbol(member).kind {
                        SymbolKind::Const | SymbolKind::Function | SymbolKind::ExternFunction => {
                            context.set_call_target(index, CallTarget::Direct { function: member });
                            context.symbol(member).type_location
                        }
                        _ => {
                            context.error(NotAValue {
                                name: format!("{}.{}", name.text, field.text),
                                position: field.to_range().into(),
                                code: field.state.file.clone(),
                            });
                            unknown
                        }
                    };
                }
                SymbolKind::Enum => {
                    context.set_node_type(*receiver_index, unknown);
                    return check_enum_constructor(
                        context, scope, index, symbol, field, &[], expected, field, fctx,
                    );
                }
                _ => {}
            }
        }
    }

    let receiver_type = check_expr(context, scope, receiver, None, fctx);
    if receiver_type == unknown {
        return unknown;
    }

    // One pointer level is looked through, as with methods.
    let base = match context.interner.get(receiver_type) {
        Some(TypeDescriptor::Pointer(pointee)) => *pointee,
        _ => receiver_type,
    };

    match context.interner.get(base).cloned() {
        Some(TypeDescriptor::Struct { .. }) => {
            match context.interner.struct_layout(base).and_then(|layout| layout.field(field.text)) {
                Some((_, field_type)) => field_type,
                None => {
                    context.error(UnknownField {
                        type_name: context.interner.display(base),
                        field: field.text.to_string(),
                        position: field.to_range().into(),
                        code: field.state.file.clone(),
                    });
                    unknown
                }
            }
        }
        Some(TypeDescriptor::Tuple(elements)) => match field.text.parse::<usize>() {
            Ok(position) if position < elements.len() => elements[position],
            _ => {
                context.error(UnknownField {
                    type_name: context.interner.display(base),
                    field: field.text.to_string(),
                    position: field.to_range().into(),
                    code: field.state.file.clone(),
                });
                unknown
            }
        },
        _ => {
            context.error(UnknownField {
                type_name: context.interner.display(base),
                field: field.text.to_string(),
                position: field.to_range().into(),
                code: field.state.file.clone(),
            });
            unknown
        }
    }
}

fn check_index<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    receiver: &ExpressionAst<'base>,
    index_expr: &ExpressionAst<'base>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    let receiver_type = check_expr(context, scope, receiver, None, fctx);
    let index_type = check_expr(context, scope, index_expr, None, fctx);
    let unknown = context.interner.unknown();

    if !context.interner.is_integer(index_type) && index_type != unknown {
        context.error(TypeMismatch {
            expected: "an integer index".to_string(),
            found: context.interner.display(index_type),
            position: index_expr.position().into(),
            code: index_expr.file(),
        });
    }

    match context.interner.get(receiver_type) {
        Some(TypeDescriptor::Slice(element) | TypeDescriptor::Array(element, _)) => *element,
        Some(TypeDescriptor::Unknown) => unknown,
        _ => {
            context.error(NotIndexable {
                type_name: context.interner.display(receiver_type),
                position: receiver.position().into(),
                code: receiver.file(),
            });
            unknown
        }
    }
}

fn check_cast<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    value: &ExpressionAst<'base>,
    target: &crate::ast::TypeAst<'base>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    let value_type = check_expr(context, scope, value, None, fctx);
    let target_type = resolve_type(context, scope, target, &Default::default());
    let unknown = context.interner.unknown();
    if value_type == unknown || target_type == unknown {
        return target_type;
    }

    let from_numeric = context.interner.is_numeric(value_type);
    let to_numeric = context.interner.is_numeric(target_type);
    let from_pointer = context.interner.is_pointer(value_type);
    let to_pointer = context.interner.is_pointer(target_type);
    let from_integer = context.interner.is_integer(value_type);
    let to_integer = context.interner.is_integer(target_type);
    let from_enum = matches!(context.interner.get(value_type), Some(TypeDescriptor::Enum { .. }));
    let to_enum = matches!(context.interner.get(target_type), Some(TypeDescriptor::Enum { .. }));

    let allowed = (from_numeric && to_numeric)
        || (from_pointer && to_pointer)
        || (from_integer && to_pointer)
        || (from_pointer && to_integer)
        || (from_enum && to_integer)
        || (from_integer && to_enum);

    if !allowed {
        context.error(InvalidCast {
            from: context.interner.display(value_type),
            to: context.interner.display(target_type),
            position: value.position().into(),
            code: value.file(),
        });
    }
    target_type
}

#[allow(clippy::too_many_arguments)]
fn check_struct_literal<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    name: &Span<'base>,
    fields: &[(Span<'base>, ExpressionAst<'base>)],
    expected: Option<TypeLocation>,
    span: &Span<'base>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    let unknown = context.interner.unknown();

    let Some(symbol) = context.resolve(scope, name.text) else {
        context.error(UndefinedName {
            name: name.text.to_string(),
            position: name.to_range().into(),
            code: name.state.file.clone(),
        });
        return unknown;
    };
    if context.symbol(symbol).kind != SymbolKind::Struct {
        context.error(NotAValue {
            name: name.text.to_string(),
            position: name.to_range().into(),
            code: name.state.file.clone(),
        });
        return unknown;
    }

    // Generic structs come from the expected type; plain structs from
    // the symbol.
    let struct_type = if context.symbol(symbol).type_location != TypeLocation::UNDEFINED {
        context.symbol(symbol).type_location
    } else {
        let def = context.symbol_defs.get(&symbol).copied();
        let matching = expected.filter(|e| {
            matches!(
                (context.interner.get(*e), def),
                (Some(TypeDescriptor::Struct { def: found, .. }), Some(expected_def))
                    if *found == expected_def
            )
        });
        match matching {
            Some(ty) => ty,
            None => {
                context.error(CannotInfer {
                    position: span.to_range().into(),
                    code: span.state.file.clone(),
                });
                return unknown;
            }
        }
    };

    let Some(layout) = context.interner.struct_layout(struct_type).cloned() else {
        return unknown;
    };

    let mut initialized: Vec<&str> = Vec::new();
    for (field_name, value) in fields {
        if initialized.contains(&field_name.text) {
            context.error(AlreadyDefined {
                name: field_name.text.to_string(),
                old_position: field_name.to_range().into(),
                new_position: field_name.to_range().into(),
                code: field_name.state.file.clone(),
            });
            continue;
        }
        initialized.push(field_name.text);

        match layout.field(field_name.text) {
            Some((_, field_type)) => {
                check_expr(context, scope, value, Some(field_type), fctx);
            }
            None => {
                context.error(UnknownField {
                    type_name: layout.name.clone(),
                    field: field_name.text.to_string(),
                    position: field_name.to_range().into(),
                    code: field_name.state.file.clone(),
                });
                check_expr(context, scope, value, None, fctx);
            }
        }
    }

    let missing: Vec<&str> = layout
        .fields
        .iter()
        .map(|(field, _)| field.as_str())
        .filter(|field| !initialized.contains(field))
        .collect();
    if !missing.is_empty() {
        context.error(MissingFields {
            type_name: layout.name.clone(),
            missing: missing.join(", "),
            plural: if missing.len() > 1 { "s" } else { "" },
            position: span.to_range().into(),
            code: span.state.file.clone(),
        });
    }

    struct_type
}

fn check_array_literal<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    elements: &[ExpressionAst<'base>],
    expected: Option<TypeLocation>,
    span: &Span<'base>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    let expected_element = expected.and_then(|e| match context.interner.get(e) {
        Some(TypeDescriptor::Array(element, _)) => Some(*element),
        _ => None,
    });

    let element_type = match (elements.first(), expected_element) {
        (_, Some(element)) => element,
        (Some(first), None) => check_expr(context, scope, first, None, fctx),
        (None, None) => {
            context.error(CannotInfer {
                position: span.to_range().into(),
                code: span.state.file.clone(),
            });
            return context.interner.unknown();
        }
    };

    let skip_first = expected_element.is_none() && !elements.is_empty();
    for element in elements.iter().skip(if skip_first { 1 } else { 0 }) {
        check_expr(context, scope, element, Some(element_type), fctx);
    }

    context.interner.intern(TypeDescriptor::Array(element_type, elements.len() as u64))
}

fn check_tuple_literal<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    elements: &[ExpressionAst<'base>],
    expected: Option<TypeLocation>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    let expected_elements = expected.and_then(|e| match context.interner.get(e) {
        Some(TypeDescriptor::Tuple(inner)) if inner.len() == elements.len() => Some(inner.clone()),
        _ => None,
    });

    let element_types: Vec<TypeLocation> = elements
        .iter()
        .enumerate()
        .map(|(position, element)| {
            let hint = expected_elements.as_ref().map(|inner| inner[position]);
            check_expr(context, scope, element, hint, fctx)
        })
        .collect();

    context.interner.intern(TypeDescriptor::Tuple(element_types))
}

/// Unifies a branch type into the accumulated result type.
fn merge_branch<'base>(
    context: &mut SemaContext<'base>,
    accumulated: Option<TypeLocation>,
    branch: TypeLocation,
    position: std::ops::Range<usize>,
    file: crate::file::SourceFile,
) -> Option<TypeLocation> {
    match accumulated {
        None => Some(branch),
        Some(current) => match context.interner.unify(current, branch) {
            Some(unified) => Some(unified),
            None => {
                context.error(TypeMismatch {
                    expected: context.interner.display(current),
                    found: context.interner.display(branch),
                    position: position.into(),
                    code: file,
                });
                Some(current)
            }
        },
    }
}

fn check_if<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    if_expr: &IfExpressionAst<'base>,
    expected: Option<TypeLocation>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    let condition_type = check_expr(context, scope, &if_expr.condition, None, fctx);
    require_bool(context, &if_expr.condition, condition_type);

    let file = if_expr.span.state.file.clone();
    let mut merged: Option<TypeLocation> = None;
    let mut all_diverge = true;

    let (then_type, then_diverges) =
        check_block(context, scope, &if_expr.then_block, expected, fctx);
    all_diverge &= then_diverges;
    if !then_diverges {
        merged = merge_branch(context, merged, then_type, if_expr.then_block.span.position.clone(), file.clone());
    }

    for (condition, block) in &if_expr.else_ifs {
        let condition_type = check_expr(context, scope, condition, None, fctx);
        require_bool(context, condition, condition_type);
        let (block_type, block_diverges) = check_block(context, scope, block, expected, fctx);
        all_diverge &= block_diverges;
        if !block_diverges {
            merged = merge_branch(context, merged, block_type, block.span.position.clone(), file.clone());
        }
    }

    match &if_expr.else_block {
        Some(block) => {
            let (block_type, block_diverges) = check_block(context, scope, block, expected, fctx);
            all_diverge &= block_diverges;
            if !block_diverges {
                merged = merge_branch(context, merged, block_type, block.span.position.clone(), file);
            }
            if all_diverge {
                context.interner.never()
            } else {
                merged.unwrap_or_else(|| context.interner.unit())
            }
        }
        None => {
            // Without an else branch the whole expression is unit.
            context.interner.unit()
        }
    }
}

fn check_if_let<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    if_let: &IfLetAst<'base>,
    expected: Option<TypeLocation>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    let scrutinee_type = check_expr(context, scope, &if_let.value, None, fctx);

    let arm_scope = context.create_scope(ScopeKind::Block, scope, None);
    check_pattern(context, arm_scope, &if_let.pattern, scrutinee_type);

    let file = if_let.span.state.file.clone();
    let mut merged: Option<TypeLocation> = None;
    let mut all_diverge = true;

    let (then_type, then_diverges) =
        check_block(context, arm_scope, &if_let.then_block, expected, fctx);
    all_diverge &= then_diverges;
    if !then_diverges {
        merged = merge_branch(context, merged, then_type, if_let.then_block.span.position.clone(), file.clone());
    }

    match &if_let.else_block {
        Some(block) => {
            let (block_type, block_diverges) = check_block(context, scope, block, expected, fctx);
            all_diverge &= block_diverges;
            if !block_diverges {
                merged = merge_branch(context, merged, block_type, block.span.position.clone(), file);
            }
            if all_diverge {
                context.interner.never()
            } else {
                merged.unwrap_or_else(|| context.interner.unit())
            }
        }
        None => context.interner.unit(),
    }
}

/// How one pattern contributes to match coverage.
pub(crate) enum Coverage {
    /// Covers every value (wildcard or binding)
    All,
    /// Covers one enum variant
    Variant(usize),
    /// Covers one boolean literal
    BoolLiteral(bool),
    /// Covers a single value of a wider type
    Partial,
}

/// Checks a pattern against the scrutinee type, declaring its bindings
/// into `scope`.
pub(crate) fn check_pattern<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    pattern: &PatternAst<'base>,
    scrutinee: TypeLocation,
) -> Coverage {
    match pattern {
        PatternAst::Wildcard { .. } => Coverage::All,
        PatternAst::Binding { name } => {
            context.declare(
                scope,
                name.text.into(),
                SymbolKind::Variable,
                AstIndex(usize::MAX),
                scrutinee,
                false,
                SpanInfo::from(name),
                false,
            );
            Coverage::All
        }
        PatternAst::Literal { span, value } => {
            let matches_type = match value {
                LiteralValue::Int { .. } => context.interner.is_integer(scrutinee),
                LiteralValue::Bool(_) => scrutinee == context.interner.bool_type(),
                LiteralValue::Char(_) => {
                    context.interner.get(scrutinee)
                        == Some(&TypeDescriptor::Primitive(PrimitiveKind::Char))
                }
                _ => false,
            };
            let unknown = context.interner.unknown();
            if !matches_type && scrutinee != unknown {
                context.error(PatternMismatch {
                    type_name: context.interner.display(scrutinee),
                    position: span.to_range().into(),
                    code: span.state.file.clone(),
                });
            }
            match value {
                LiteralValue::Bool(flag) => Coverage::BoolLiteral(*flag),
                _ => Coverage::Partial,
            }
        }
        PatternAst::EnumVariant { enum_name, variant, bindings, span } => {
            let Some(TypeDescriptor::Enum { def, .. }) = context.interner.get(scrutinee).cloned()
            else {
                let unknown = context.interner.unknown();
                if scrutinee != unknown {
                    context.error(PatternMismatch {
                        type_name: context.interner.display(scrutinee),
                        position: span.to_range().into(),
                        code: span.state.file.clone(),
                    });
                }
                return Coverage::Partial;
            };

            let def_name = context.interner.def_name(def).to_string();
            if let Some(written) = enum_name {
                if written.text != def_name {
                    context.error(PatternMismatch {
                        type_name: context.interner.display(scrutinee),
                        position: written.to_range().into(),
                        code: written.state.file.clone(),
                    });
                    return Coverage::Partial;
                }
            }

            let Some(layout) = context.interner.enum_layout(scrutinee).cloned() else {
                return Coverage::Partial;
            };
            let Some((variant_index, payload)) = layout.variant(variant.text) else {
                context.error(UnknownVariant {
                    enum_name: def_name,
                    variant: variant.text.to_string(),
                    position: variant.to_range().into(),
                    code: variant.state.file.clone(),
                });
                return Coverage::Partial;
            };
            let payload: Vec<TypeLocation> = payload.to_vec();

            if bindings.len() != payload.len() {
                context.error(ArgumentCountMismatch {
                    name: format!("{def_name}.{}", variant.text),
                    expected: payload.len(),
                    found: bindings.len(),
                    position: span.to_range().into(),
                    code: span.state.file.clone(),
                });
            }

            for (binding, payload_type) in bindings.iter().zip(payload.iter()) {
                match binding {
                    PatternAst::Binding { name } => {
                        context.declare(
                            scope,
                            name.text.into(),
                            SymbolKind::Variable,
                            AstIndex(usize::MAX),
                            *payload_type,
                            false,
                            SpanInfo::from(name),
                            false,
                        );
                    }
                    PatternAst::Wildcard { .. } => {}
                    nested => {
                        context.error(PatternMismatch {
                            type_name: context.interner.display(*payload_type),
                            position: nested.position().into(),
                            code: span.state.file.clone(),
                        });
                    }
                }
            }

            Coverage::Variant(variant_index)
        }
    }
}

fn check_match<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    match_expr: &MatchExpressionAst<'base>,
    expected: Option<TypeLocation>,
    fctx: &FunctionCtx,
) -> TypeLocation {
    let scrutinee_type = check_expr(context, scope, &match_expr.scrutinee, None, fctx);
    let file = match_expr.span.state.file.clone();

    let mut merged: Option<TypeLocation> = None;
    let mut all_diverge = true;
    let mut covered_variants: Vec<usize> = Vec::new();
    let mut covered_bools = (false, false);
    let mut has_catch_all = false;

    for arm in &match_expr.arms {
        let arm_scope = context.create_scope(ScopeKind::Block, scope, None);
        match check_pattern(context, arm_scope, &arm.pattern, scrutinee_type) {
            Coverage::All => has_catch_all = true,
            Coverage::Variant(variant) => covered_variants.push(variant),
            Coverage::BoolLiteral(true) => covered_bools.0 = true,
            Coverage::BoolLiteral(false) => covered_bools.1 = true,
            Coverage::Partial => {}
        }

        let (arm_type, arm_diverges) = check_block(context, arm_scope, &arm.body, expected, fctx);
        all_diverge &= arm_diverges;
        if !arm_diverges {
            merged = merge_branch(context, merged, arm_type, arm.body.span.position.clone(), file.clone());
        }
    }

    // Exhaustiveness.
    if !has_catch_all {
        match context.interner.get(scrutinee_type).cloned() {
            Some(TypeDescriptor::Enum { def, .. }) => {
                if let Some(layout) = context.interner.enum_layout(scrutinee_type).cloned() {
                    let missing: Vec<&str> = layout
                        .variants
                        .iter()
                        .enumerate()
                        .filter(|(position, _)| !covered_variants.contains(position))
                        .map(|(_, (variant, _))| variant.as_str())
                        .collect();
                    if !missing.is_empty() {
                        context.error(NonExhaustiveMatch {
                            enum_name: context.interner.def_name(def).to_string(),
                            missing: missing.join(", "),
                            position: match_expr.scrutinee.position().into(),
                            code: file,
                        });
                    }
                }
            }
            Some(TypeDescriptor::Primitive(PrimitiveKind::Bool)) => {
                if !(covered_bools.0 && covered_bools.1) {
                    context.error(NonExhaustiveMatch {
                        enum_name: "bool".to_string(),
                        missing: if covered_bools.0 { "false" } else { "true" }.to_string(),
                        position: match_expr.scrutinee.position().into(),
                        code: file,
                    });
                }
            }
            Some(TypeDescriptor::Unknown) | None => {}
            _ => {
                context.error(NonExhaustiveMatch {
                    enum_name: context.interner.display(scrutinee_type),
                    missing: "a wildcard arm".to_string(),
                    position: match_expr.scrutinee.position().into(),
                    code: file,
                });
            }
        }
    }

    if match_expr.arms.is_empty() || all_diverge {
        context.interner.never()
    } else {
        merged.unwrap_or_else(|| context.interner.unit())
    }
}
