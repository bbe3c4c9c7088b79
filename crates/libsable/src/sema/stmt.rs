//! Statement and function-body checking.
//!
//! Blocks are checked statement by statement while tracking divergence
//! (a `return`, `break`, `continue` or a `never`-typed expression ends
//! the reachable part of a block; everything after it gets one
//! unreachable-code warning). A block's value is its trailing
//! expression without a semicolon, or unit.

use crate::ast::{BlockAst, ConstDefinitionAst, ExpressionAst, FunctionDefinitionAst, LiteralValue, StatementAst, UnaryOperator};
use crate::nom_tools::{SpanInfo, ToRange};
use crate::sema::context::SemaContext;
use crate::sema::error::{
    AssignToImmutable, ConditionNotBool, InvalidAssignmentTarget, MissingReturn,
    NonConstantInitializer, OutsideLoop, TypeMismatch,
};
use crate::sema::expr::check_expr;
use crate::sema::scope::{ScopeKind, ScopeLocation, SymbolKind, SymbolLocation};
use crate::types::{TypeDescriptor, TypeLocation};

/// Checking context for one function body.
#[derive(Debug, Clone)]
pub(crate) struct FunctionCtx {
    /// The declared return type
    pub return_type: TypeLocation,
    /// The function name, for diagnostics
    pub name: String,
    /// Current loop nesting depth
    pub loop_depth: usize,
}

impl FunctionCtx {
    fn inside_loop(&self) -> FunctionCtx {
        FunctionCtx { loop_depth: self.loop_depth + 1, ..self.clone() }
    }
}

/// Checks one function body against its resolved signature.
pub(crate) fn check_function<'base>(
    context: &mut SemaContext<'base>,
    module_path: &str,
    function: &FunctionDefinitionAst<'base>,
    symbol: SymbolLocation,
) {
    let module_scope = context.modules[module_path].scope;
    let fn_scope = context.create_scope(ScopeKind::Function, module_scope, None);

    let signature = context.symbol(symbol).type_location;
    let Some(TypeDescriptor::Function { params, result, .. }) =
        context.interner.get(signature).cloned()
    else {
        return;
    };

    for (parameter, ty) in function.parameters.iter().zip(params.iter()) {
        context.declare(
            fn_scope,
            parameter.name.text.into(),
            SymbolKind::Parameter,
            function.index,
            *ty,
            false,
            SpanInfo::from(&parameter.name),
            false,
        );
    }

    let unit = context.interner.unit();
    let unknown = context.interner.unknown();
    let returns_value = result != unit && result != unknown;

    let fctx = FunctionCtx {
        return_type: result,
        name: function.name.text.to_string(),
        loop_depth: 0,
    };
    let expected_tail = returns_value.then_some(result);
    let (_, diverged) = check_block(context, fn_scope, &function.body, expected_tail, &fctx);

    if returns_value && !diverged && function.body.tail_expression().is_none() {
        context.error(MissingReturn {
            function: function.name.text.to_string(),
            expected: context.interner.display(result),
            position: function.name.to_range().into(),
            code: function.name.state.file.clone(),
        });
    }
}

/// Checks a constant's initializer: a literal assignable to the
/// declared type.
pub(crate) fn check_const<'base>(
    context: &mut SemaContext<'base>,
    module_path: &str,
    definition: &ConstDefinitionAst<'base>,
    symbol: SymbolLocation,
) {
    let scope = context.modules[module_path].scope;
    let expected = context.symbol(symbol).type_location;

    let literal_initializer = match &definition.value {
        ExpressionAst::Literal { .. } => true,
        ExpressionAst::Unary { operator: UnaryOperator::Negate, operand, .. } => {
            matches!(operand.as_ref(), ExpressionAst::Literal { .. })
        }
        _ => false,
    };
    if !literal_initializer {
        context.error(NonConstantInitializer {
            position: definition.value.position().into(),
            code: definition.value.file(),
        });
    }

    let fctx = FunctionCtx {
        return_type: context.interner.unit(),
        name: definition.name.text.to_string(),
        loop_depth: 0,
    };
    check_expr(context, scope, &definition.value, Some(expected), &fctx);
}

/// Checks a block, returning its value type and whether it diverges.
pub(crate) fn check_block<'base>(
    context: &mut SemaContext<'base>,
    parent: ScopeLocation,
    block: &BlockAst<'base>,
    expected_tail: Option<TypeLocation>,
    fctx: &FunctionCtx,
) -> (TypeLocation, bool) {
    let scope = context.create_scope(ScopeKind::Block, parent, None);
    let mut diverged = false;
    let mut warned_unreachable = false;
    let mut block_type = context.interner.unit();

    let count = block.statements.len();
    for (position, statement) in block.statements.iter().enumerate() {
        if diverged && !warned_unreachable {
            context.error(crate::sema::error::UnreachableCode {
                position: statement.position().into(),
                code: block.span.state.file.clone(),
            });
            warned_unreachable = true;
        }

        let is_tail = position == count - 1
            && matches!(statement, StatementAst::Expression { semicolon: false, .. });

        if is_tail {
            let StatementAst::Expression { expr, .. } = statement else { unreachable!() };
            let ty = check_expr(context, scope, expr, expected_tail, fctx);
            let never = context.interner.never();
            if ty == never {
                diverged = true;
            }
            if !diverged {
                block_type = ty;
            }
        } else {
            let statement_diverges = check_statement(context, scope, statement, fctx);
            diverged = diverged || statement_diverges;
        }
    }

    if diverged {
        block_type = context.interner.never();
    }
    (block_type, diverged)
}

/// Checks one statement, returning whether it diverges.
fn check_statement<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    statement: &StatementAst<'base>,
    fctx: &FunctionCtx,
) -> bool {
    match statement {
        StatementAst::Let { index, mutable, name, written_type, value } => {
            let annotated = written_type
                .as_ref()
                .map(|written| crate::sema::typeres::resolve_type(context, scope, written, &Default::default()));
            let value_type = check_expr(context, scope, value, annotated, fctx);
            let binding_type = annotated.unwrap_or(value_type);

            context.declare(
                scope,
                name.text.into(),
                SymbolKind::Variable,
                *index,
                binding_type,
                false,
                SpanInfo::from(name),
                *mutable,
            );
            value_type == context.interner.never()
        }
        StatementAst::Assignment { target, value, .. } => {
            check_assignment_target(context, scope, target);
            let target_type = check_expr(context, scope, target, None, fctx);
            let value_type = check_expr(context, scope, value, Some(target_type), fctx);
            value_type == context.interner.never()
        }
        StatementAst::While { condition, body, .. } => {
            let condition_type = check_expr(context, scope, condition, None, fctx);
            require_bool(context, condition, condition_type);
            check_block(context, scope, body, None, &fctx.inside_loop());
            false
        }
        StatementAst::For { index, binding, start, end, body, .. } => {
            let start_type = check_expr(context, scope, start, None, fctx);
            if !context.interner.is_integer(start_type)
                && context.interner.get(start_type) != Some(&TypeDescriptor::Unknown)
            {
                context.error(TypeMismatch {
                    expected: "an integer type".to_string(),
                    found: context.interner.display(start_type),
                    position: start.position().into(),
                    code: start.file(),
                });
            }
            check_expr(context, scope, end, Some(start_type), fctx);

            let loop_scope = context.create_scope(ScopeKind::Block, scope, None);
            context.declare(
                loop_scope,
                binding.text.into(),
                SymbolKind::Variable,
                *index,
                start_type,
                false,
                SpanInfo::from(binding),
                false,
            );
            check_block(context, loop_scope, body, None, &fctx.inside_loop());
            false
        }
        StatementAst::Return { value, span, .. } => {
            match value {
                Some(value) => {
                    check_expr(context, scope, value, Some(fctx.return_type), fctx);
                }
                None => {
                    let unit = context.interner.unit();
                    let unknown = context.interner.unknown();
                    if fctx.return_type != unit && fctx.return_type != unknown {
                        context.error(TypeMismatch {
                            expected: context.interner.display(fctx.return_type),
                            found: "unit".to_string(),
                            position: span.to_range().into(),
                            code: span.state.file.clone(),
                        });
                    }
                }
            }
            true
        }
        StatementAst::Break { span, .. } => {
            if fctx.loop_depth == 0 {
                context.error(OutsideLoop {
                    keyword: "break",
                    position: span.to_range().into(),
                    code: span.state.file.clone(),
                });
            }
            true
        }
        StatementAst::Continue { span, .. } => {
            if fctx.loop_depth == 0 {
                context.error(OutsideLoop {
                    keyword: "continue",
                    position: span.to_range().into(),
                    code: span.state.file.clone(),
                });
            }
            true
        }
        StatementAst::Expression { expr, .. } => {
            let ty = check_expr(context, scope, expr, None, fctx);
            ty == context.interner.never()
        }
    }
}

/// Reports a condition that is not `bool`.
pub(crate) fn require_bool<'base>(
    context: &mut SemaContext<'base>,
    condition: &ExpressionAst<'base>,
    condition_type: TypeLocation,
) {
    let bool_type = context.interner.bool_type();
    let unknown = context.interner.unknown();
    let never = context.interner.never();
    if condition_type != bool_type && condition_type != unknown && condition_type != never {
        context.error(ConditionNotBool {
            found: context.interner.display(condition_type),
            position: condition.position().into(),
            code: condition.file(),
        });
    }
}

/// Validates the shape and mutability of an assignment target.
fn check_assignment_target<'base>(
    context: &mut SemaContext<'base>,
    scope: ScopeLocation,
    target: &ExpressionAst<'base>,
) {
    match target {
        ExpressionAst::Identifier { name, .. } => {
            let Some(symbol) = context.resolve(scope, name.text) else {
                return; // reported by the expression check
            };
            let symbol = context.symbol(symbol);
            let immutable = match symbol.kind {
                SymbolKind::Variable => !symbol.mutable,
                SymbolKind::Parameter | SymbolKind::Const => true,
                _ => return,
            };
            if immutable {
                context.error(AssignToImmutable {
                    name: name.text.to_string(),
                    position: name.to_range().into(),
                    code: name.state.file.clone(),
                });
            }
        }
        ExpressionAst::FieldAccess { receiver, .. } | ExpressionAst::Index { receiver, .. } => {
            // Writes through a field or element require the base
            // binding to be mutable too.
            check_assignment_target(context, scope, receiver);
        }
        ExpressionAst::Unary { operator: UnaryOperator::Deref, .. } => {}
        other => {
            context.error(InvalidAssignmentTarget {
                position: other.position().into(),
                code: other.file(),
            });
        }
    }
}

/// True when the expression is an integer literal, possibly negated.
pub(crate) fn literal_like(expr: &ExpressionAst<'_>) -> bool {
    match expr {
        ExpressionAst::Literal { value, .. } => {
            matches!(value, LiteralValue::Int { .. } | LiteralValue::Float(_))
        }
        ExpressionAst::Unary { operator: UnaryOperator::Negate, operand, .. } => {
            literal_like(operand)
        }
        _ => false,
    }
}
