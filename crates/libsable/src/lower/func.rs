//! Per-function lowering: statements, control flow and expressions.

use indexmap::IndexMap;
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::debug_info::DISubprogram;
use inkwell::module::Module;
use inkwell::types::{BasicType, BasicTypeEnum, StringRadix};
use inkwell::values::{
    BasicMetadataValueEnum, BasicValue, BasicValueEnum, FunctionValue, IntValue, PointerValue,
};
use inkwell::{AddressSpace, FloatPredicate, IntPredicate};

use crate::ast::{
    BinaryOperator, BlockAst, ExpressionAst, FunctionDefinitionAst, IfExpressionAst, IfLetAst,
    LiteralValue, MatchExpressionAst, PatternAst, StatementAst, UnaryOperator,
};
use crate::error::InternalError;
use crate::sema::scope::SymbolKind;
use crate::sema::{CallTarget, SemaContext};
use crate::types::{TypeDescriptor, TypeLocation, OPTION_DEF};

use super::debug_info::DebugInfo;
use super::{basic_type, enum_payload_base, is_zero_sized};

/// A named binding's storage slot. Zero-sized bindings have no slot.
#[derive(Copy, Clone)]
struct Local<'ctx> {
    ptr: Option<PointerValue<'ctx>>,
    ty: TypeLocation,
}

/// Branch targets of one enclosing loop.
#[derive(Copy, Clone)]
struct LoopFrame<'ctx> {
    continue_block: BasicBlock<'ctx>,
    break_block: BasicBlock<'ctx>,
}

/// Lowers one function body.
pub(crate) struct FunctionLowerer<'a, 'ctx, 'base> {
    llvm: &'ctx Context,
    module: &'a Module<'ctx>,
    builder: &'a Builder<'ctx>,
    sema: &'a SemaContext<'base>,
    functions: &'a IndexMap<String, FunctionValue<'ctx>>,
    function: FunctionValue<'ctx>,
    definition: &'a FunctionDefinitionAst<'base>,
    entry: BasicBlock<'ctx>,
    locals: Vec<IndexMap<String, Local<'ctx>>>,
    loops: Vec<LoopFrame<'ctx>>,
    param_types: Vec<TypeLocation>,
    return_type: TypeLocation,
    debug: Option<(&'a DebugInfo<'ctx>, DISubprogram<'ctx>)>,
}

impl<'a, 'ctx, 'base> FunctionLowerer<'a, 'ctx, 'base> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        llvm: &'ctx Context,
        module: &'a Module<'ctx>,
        builder: &'a Builder<'ctx>,
        sema: &'a SemaContext<'base>,
        functions: &'a IndexMap<String, FunctionValue<'ctx>>,
        function: FunctionValue<'ctx>,
        definition: &'a FunctionDefinitionAst<'base>,
        debug: Option<&'a DebugInfo<'ctx>>,
    ) -> Result<Self, InternalError> {
        let symbol = sema
            .functions
            .get(definition.name.text)
            .copied()
            .ok_or_else(|| InternalError::new(format!("function '{}' has no symbol", definition.name.text)))?;
        let Some(TypeDescriptor::Function { params, result, .. }) =
            sema.interner.get(sema.symbol(symbol).type_location).cloned()
        else {
            return Err(InternalError::new("function symbol without a function type"));
        };

        let entry = llvm.append_basic_block(function, "entry");
        let debug = debug.map(|info| {
            let subprogram = info.begin_function(
                function,
                definition.name.text,
                &definition.name.state.file,
                definition.name.position.start,
            );
            (info, subprogram)
        });

        Ok(Self {
            llvm,
            module,
            builder,
            sema,
            functions,
            function,
            definition,
            entry,
            locals: Vec::new(),
            loops: Vec::new(),
            param_types: params,
            return_type: result,
            debug,
        })
    }

    /// Lowers the whole body: parameter slots, statements, and the
    /// implicit return or trailing `unreachable`.
    pub(crate) fn lower(&mut self) -> Result<(), InternalError> {
        self.builder.position_at_end(self.entry);
        self.locals.push(IndexMap::new());

        let definition = self.definition;
        let params: Vec<TypeLocation> = self.param_types.clone();
        for (position, (parameter, ty)) in
            definition.parameters.iter().zip(params.iter()).enumerate()
        {
            let Some(value) = self.function.get_nth_param(position as u32) else { break };
            value.set_name(parameter.name.text);

            let local = if is_zero_sized(self.sema, *ty) {
                Local { ptr: None, ty: *ty }
            } else {
                let slot = self.entry_alloca(basic_type(self.llvm, self.sema, *ty)?, parameter.name.text)?;
                self.builder.build_store(slot, value)?;
                Local { ptr: Some(slot), ty: *ty }
            };
            self.insert_local(parameter.name.text, local);
        }

        let tail = self.lower_block(&definition.body)?;

        if !self.terminated() {
            match self.sema.interner.get(self.return_type) {
                Some(TypeDescriptor::Unit) => {
                    self.builder.build_return(None)?;
                }
                Some(TypeDescriptor::Never) => {
                    self.builder.build_unreachable()?;
                }
                _ => match tail {
                    Some(value) => {
                        self.builder.build_return(Some(&value))?;
                    }
                    None => {
                        // The analyzer proved this point unreachable.
                        self.builder.build_unreachable()?;
                    }
                },
            }
        }

        self.locals.pop();
        Ok(())
    }

    // ---- infrastructure ----------------------------------------------------

    fn terminated(&self) -> bool {
        self.builder
            .get_insert_block()
            .map(|block| block.get_terminator().is_some())
            .unwrap_or(true)
    }

    fn current_block(&self) -> Result<BasicBlock<'ctx>, InternalError> {
        self.builder
            .get_insert_block()
            .ok_or_else(|| InternalError::new("builder is not positioned in a block"))
    }

    fn append_block(&self, name: &str) -> BasicBlock<'ctx> {
        self.llvm.append_basic_block(self.function, name)
    }

    /// Creates an alloca in the entry block, in front of the body's
    /// instructions, so every named slot dominates all uses.
    fn entry_alloca(
        &self,
        ty: BasicTypeEnum<'ctx>,
        name: &str,
    ) -> Result<PointerValue<'ctx>, InternalError> {
        let entry_builder = self.llvm.create_builder();
        match self.entry.get_first_instruction() {
            Some(instruction) => entry_builder.position_before(&instruction),
            None => entry_builder.position_at_end(self.entry),
        }
        Ok(entry_builder.build_alloca(ty, name)?)
    }

    fn insert_local(&mut self, name: &str, local: Local<'ctx>) {
        self.locals
            .last_mut()
            .expect("a locals scope is always pushed")
            .insert(name.to_string(), local);
    }

    fn find_local(&self, name: &str) -> Option<Local<'ctx>> {
        self.locals.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    fn node_type(&self, expr: &ExpressionAst<'base>) -> Result<TypeLocation, InternalError> {
        self.sema.node_type(expr.index()).ok_or_else(|| {
            InternalError::at(
                "expression reached lowering without a resolved type",
                expr.position(),
                expr.file(),
            )
        })
    }

    fn function_by_symbol(
        &self,
        symbol: crate::sema::scope::SymbolLocation,
    ) -> Result<(FunctionValue<'ctx>, Vec<TypeLocation>, TypeLocation), InternalError> {
        let name = self.sema.symbol(symbol).name.to_string();
        let value = self
            .functions
            .get(&name)
            .copied()
            .ok_or_else(|| InternalError::new(format!("call to undeclared function '{name}'")))?;
        let Some(TypeDescriptor::Function { params, result, .. }) =
            self.sema.interner.get(self.sema.symbol(symbol).type_location).cloned()
        else {
            return Err(InternalError::new(format!("'{name}' has no function signature")));
        };
        Ok((value, params, result))
    }

    /// The value of an expression, with unit represented as the empty
    /// struct so it can travel through calls and stores.
    fn expect_value(&mut self, expr: &'a ExpressionAst<'base>) -> Result<BasicValueEnum<'ctx>, InternalError> {
        match self.lower_expression(expr)? {
            Some(value) => Ok(value),
            None => Ok(self.llvm.struct_type(&[], false).const_zero().into()),
        }
    }

    /// Spills a value into a fresh stack slot and returns its address.
    fn spill(
        &mut self,
        value: BasicValueEnum<'ctx>,
        name: &str,
    ) -> Result<PointerValue<'ctx>, InternalError> {
        let slot = self.entry_alloca(value.get_type(), name)?;
        self.builder.build_store(slot, value)?;
        Ok(slot)
    }

    fn set_debug_location(&self, offset: usize) {
        if let Some((info, subprogram)) = &self.debug {
            info.set_location(
                self.llvm,
                self.builder,
                *subprogram,
                &self.definition.name.state.file,
                offset,
            );
        }
    }

    // ---- statements --------------------------------------------------------

    /// Lowers a block, returning its tail value when it has one.
    fn lower_block(
        &mut self,
        block: &'a BlockAst<'base>,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        self.locals.push(IndexMap::new());
        let mut tail = None;

        let count = block.statements.len();
        for (position, statement) in block.statements.iter().enumerate() {
            if self.terminated() {
                // Everything past a terminator is dead; the analyzer
                // already warned about it.
                break;
            }
            self.set_debug_location(statement.position().start);

            let is_tail = position == count - 1
                && matches!(statement, StatementAst::Expression { semicolon: false, .. });
            if is_tail {
                let StatementAst::Expression { expr, .. } = statement else { unreachable!() };
                tail = self.lower_expression(expr)?;
            } else {
                self.lower_statement(statement)?;
            }
        }

        self.locals.pop();
        Ok(tail)
    }

    fn lower_statement(&mut self, statement: &'a StatementAst<'base>) -> Result<(), InternalError> {
        match statement {
            StatementAst::Let { name, value, .. } => {
                let value_ty = self.node_type(value)?;
                let lowered = self.lower_expression(value)?;
                if self.terminated() {
                    return Ok(());
                }
                let local = match lowered {
                    Some(initial) if !is_zero_sized(self.sema, value_ty) => {
                        let slot = self.entry_alloca(initial.get_type(), name.text)?;
                        self.builder.build_store(slot, initial)?;
                        Local { ptr: Some(slot), ty: value_ty }
                    }
                    _ => Local { ptr: None, ty: value_ty },
                };
                self.insert_local(name.text, local);
                Ok(())
            }
            StatementAst::Assignment { target, value, .. } => {
                let lowered = self.lower_expression(value)?;
                if self.terminated() {
                    return Ok(());
                }
                let Some(lowered) = lowered else { return Ok(()) };
                let Some(address) = self.lower_address(target)? else {
                    return Err(InternalError::at(
                        "assignment target has no address",
                        target.position(),
                        target.file(),
                    ));
                };
                self.builder.build_store(address, lowered)?;
                Ok(())
            }
            StatementAst::While { condition, body, .. } => {
                let header = self.append_block("while.header");
                let body_block = self.append_block("while.body");
                let exit = self.append_block("while.exit");

                self.builder.build_unconditional_branch(header)?;
                self.builder.position_at_end(header);
                let condition_value = self.lower_bool(condition)?;
                self.builder.build_conditional_branch(condition_value, body_block, exit)?;

                self.builder.position_at_end(body_block);
                self.loops.push(LoopFrame { continue_block: header, break_block: exit });
                self.lower_block(body)?;
                self.loops.pop();
                if !self.terminated() {
                    self.builder.build_unconditional_branch(header)?;
                }

                self.builder.position_at_end(exit);
                Ok(())
            }
            StatementAst::For { binding, start, end, body, .. } => {
                let induction_ty = self.node_type(start)?;
                let llvm_ty = basic_type(self.llvm, self.sema, induction_ty)?.into_int_type();

                let start_value = self
                    .lower_expression(start)?
                    .ok_or_else(|| InternalError::new("range start has no value"))?;
                let end_value = self
                    .lower_expression(end)?
                    .ok_or_else(|| InternalError::new("range end has no value"))?;

                let slot = self.entry_alloca(llvm_ty.into(), binding.text)?;
                self.builder.build_store(slot, start_value)?;

                let header = self.append_block("for.header");
                let body_block = self.append_block("for.body");
                let step = self.append_block("for.step");
                let exit = self.append_block("for.exit");

                self.builder.build_unconditional_branch(header)?;
                self.builder.position_at_end(header);
                let current = self.builder.build_load(llvm_ty, slot, binding.text)?.into_int_value();
                let predicate = if self.sema.interner.is_signed(induction_ty) {
                    IntPredicate::SLT
                } else {
                    IntPredicate::ULT
                };
                let in_range = self.builder.build_int_compare(
                    predicate,
                    current,
                    end_value.into_int_value(),
                    "for.cond",
                )?;
                self.builder.build_conditional_branch(in_range, body_block, exit)?;

                self.builder.position_at_end(body_block);
                self.locals.push(IndexMap::new());
                self.insert_local(binding.text, Local { ptr: Some(slot), ty: induction_ty });
                self.loops.push(LoopFrame { continue_block: step, break_block: exit });
                self.lower_block(body)?;
                self.loops.pop();
                self.locals.pop();
                if !self.terminated() {
                    self.builder.build_unconditional_branch(step)?;
                }

                self.builder.position_at_end(step);
                let current = self.builder.build_load(llvm_ty, slot, binding.text)?.into_int_value();
                let one = llvm_ty.const_int(1, false);
                let next = self.builder.build_int_add(current, one, "for.next")?;
                self.builder.build_store(slot, next)?;
                self.builder.build_unconditional_branch(header)?;

                self.builder.position_at_end(exit);
                Ok(())
            }
            StatementAst::Return { value, .. } => {
                match value {
                    Some(value) => {
                        let lowered = self.lower_expression(value)?;
                        if self.terminated() {
                            return Ok(());
                        }
                        match lowered {
                            Some(lowered) => {
                                self.builder.build_return(Some(&lowered))?;
                            }
                            None => {
                                self.builder.build_return(None)?;
                            }
                        }
                    }
                    None => {
                        self.builder.build_return(None)?;
                    }
                }
                Ok(())
            }
            StatementAst::Break { span, .. } => {
                let frame = self.loops.last().copied().ok_or_else(|| {
                    InternalError::at("break outside of a loop", span.position.clone(), span.state.file.clone())
                })?;
                self.builder.build_unconditional_branch(frame.break_block)?;
                Ok(())
            }
            StatementAst::Continue { span, .. } => {
                let frame = self.loops.last().copied().ok_or_else(|| {
                    InternalError::at(
                        "continue outside of a loop",
                        span.position.clone(),
                        span.state.file.clone(),
                    )
                })?;
                self.builder.build_unconditional_branch(frame.continue_block)?;
                Ok(())
            }
            StatementAst::Expression { expr, .. } => {
                self.lower_expression(expr)?;
                Ok(())
            }
        }
    }

    // ---- expressions -------------------------------------------------------

    fn lower_bool(&mut self, expr: &'a ExpressionAst<'base>) -> Result<IntValue<'ctx>, InternalError> {
        let value = self.lower_expression(expr)?.ok_or_else(|| {
            InternalError::at("condition has no value", expr.position(), expr.file())
        })?;
        Ok(value.into_int_value())
    }

    fn lower_expression(
        &mut self,
        expr: &'a ExpressionAst<'base>,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        match expr {
            ExpressionAst::Literal { value, .. } => self.lower_literal(expr, value),
            ExpressionAst::Identifier { name, .. } => self.lower_identifier(expr, name.text),
            ExpressionAst::Unary { operator, operand, .. } => self.lower_unary(*operator, operand),
            ExpressionAst::Binary { left, operator, right, .. } => {
                self.lower_binary(left, *operator, right)
            }
            ExpressionAst::Call { args, .. } | ExpressionAst::MethodCall { args, .. } => {
                self.lower_call(expr, args)
            }
            ExpressionAst::FieldAccess { receiver, field, .. } => {
                self.lower_field_access(expr, receiver, field.text)
            }
            ExpressionAst::Index { receiver, index_expr, .. } => {
                self.lower_index(receiver, index_expr)
            }
            ExpressionAst::Cast { value, .. } => self.lower_cast(expr, value),
            ExpressionAst::StructLiteral { fields, .. } => self.lower_struct_literal(expr, fields),
            ExpressionAst::ArrayLiteral { elements, .. } => self.lower_array_literal(expr, elements),
            ExpressionAst::TupleLiteral { elements, .. } => self.lower_tuple_literal(expr, elements),
            ExpressionAst::If(if_expr) => self.lower_if(expr, if_expr),
            ExpressionAst::IfLet(if_let) => self.lower_if_let(expr, if_let),
            ExpressionAst::Match(match_expr) => self.lower_match(expr, match_expr),
        }
    }

    fn int_constant(
        &self,
        ty: inkwell::types::IntType<'ctx>,
        magnitude: u128,
    ) -> Result<IntValue<'ctx>, InternalError> {
        if magnitude <= u64::MAX as u128 {
            Ok(ty.const_int(magnitude as u64, false))
        } else {
            ty.const_int_from_string(&magnitude.to_string(), StringRadix::Decimal)
                .ok_or_else(|| InternalError::new("integer literal does not fit its type"))
        }
    }

    fn lower_literal(
        &mut self,
        expr: &'a ExpressionAst<'base>,
        value: &LiteralValue<'base>,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        let ty = self.node_type(expr)?;
        Ok(match value {
            LiteralValue::Int { magnitude, .. } => {
                let llvm_ty = basic_type(self.llvm, self.sema, ty)?.into_int_type();
                Some(self.int_constant(llvm_ty, *magnitude)?.into())
            }
            LiteralValue::Float(number) => {
                let llvm_ty = basic_type(self.llvm, self.sema, ty)?.into_float_type();
                Some(llvm_ty.const_float(*number).into())
            }
            LiteralValue::Bool(flag) => {
                Some(self.llvm.bool_type().const_int(*flag as u64, false).into())
            }
            LiteralValue::Char(c) => Some(self.llvm.i32_type().const_int(*c as u64, false).into()),
            LiteralValue::String(text) => {
                let global = self.builder.build_global_string_ptr(text, ".str")?;
                Some(global.as_pointer_value().into())
            }
            LiteralValue::Unit => None,
        })
    }

    fn lower_identifier(
        &mut self,
        expr: &'a ExpressionAst<'base>,
        name: &str,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        if let Some(local) = self.find_local(name) {
            return match local.ptr {
                Some(ptr) => {
                    let llvm_ty = basic_type(self.llvm, self.sema, local.ty)?;
                    Ok(Some(self.builder.build_load(llvm_ty, ptr, name)?))
                }
                None => Ok(None),
            };
        }

        let symbol = self.sema.name_targets.get(&expr.index()).copied().ok_or_else(|| {
            InternalError::at("identifier without a resolved symbol", expr.position(), expr.file())
        })?;
        match self.sema.symbol(symbol).kind {
            SymbolKind::Const => self.lower_const_value(symbol),
            SymbolKind::Function | SymbolKind::ExternFunction => {
                let (function, _, _) = self.function_by_symbol(symbol)?;
                Ok(Some(function.as_global_value().as_pointer_value().into()))
            }
            other => Err(InternalError::at(
                format!("identifier resolved to unexpected symbol kind {other:?}"),
                expr.position(),
                expr.file(),
            )),
        }
    }

    /// Materializes a constant's literal initializer.
    fn lower_const_value(
        &mut self,
        symbol: crate::sema::scope::SymbolLocation,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        let definition = self
            .sema
            .const_defs
            .get(&symbol)
            .cloned()
            .ok_or_else(|| InternalError::new("constant without a recorded definition"))?;
        self.lower_expression_owned(&definition.value)
    }

    /// Lowers an expression that lives outside the current function's
    /// AST (constant initializers). Annotations still come from the
    /// shared analysis tables.
    fn lower_expression_owned(
        &mut self,
        expr: &ExpressionAst<'base>,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        match expr {
            ExpressionAst::Literal { value, .. } => self.lower_literal_owned(expr, value),
            ExpressionAst::Unary { operator: UnaryOperator::Negate, operand, .. } => {
                let value = self.lower_expression_owned(operand)?;
                match value {
                    Some(BasicValueEnum::IntValue(int)) => {
                        Ok(Some(self.builder.build_int_neg(int, "neg")?.into()))
                    }
                    Some(BasicValueEnum::FloatValue(float)) => {
                        Ok(Some(self.builder.build_float_neg(float, "neg")?.into()))
                    }
                    _ => Err(InternalError::new("constant initializer is not numeric")),
                }
            }
            _ => Err(InternalError::new("constant initializer is not a literal")),
        }
    }

    fn lower_literal_owned(
        &mut self,
        expr: &ExpressionAst<'base>,
        value: &LiteralValue<'base>,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        let ty = self.sema.node_type(expr.index()).ok_or_else(|| {
            InternalError::new("constant literal without a resolved type")
        })?;
        Ok(match value {
            LiteralValue::Int { magnitude, .. } => {
                let llvm_ty = basic_type(self.llvm, self.sema, ty)?.into_int_type();
                Some(self.int_constant(llvm_ty, *magnitude)?.into())
            }
            LiteralValue::Float(number) => {
                let llvm_ty = basic_type(self.llvm, self.sema, ty)?.into_float_type();
                Some(llvm_ty.const_float(*number).into())
            }
            LiteralValue::Bool(flag) => {
                Some(self.llvm.bool_type().const_int(*flag as u64, false).into())
            }
            LiteralValue::Char(c) => Some(self.llvm.i32_type().const_int(*c as u64, false).into()),
            LiteralValue::String(text) => {
                let global = self.builder.build_global_string_ptr(text, ".str")?;
                Some(global.as_pointer_value().into())
            }
            LiteralValue::Unit => None,
        })
    }

    fn lower_unary(
        &mut self,
        operator: UnaryOperator,
        operand: &'a ExpressionAst<'base>,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        match operator {
            UnaryOperator::Negate => {
                let value = self.lower_expression(operand)?.ok_or_else(|| {
                    InternalError::at("negation of a valueless expression", operand.position(), operand.file())
                })?;
                Ok(Some(match value {
                    BasicValueEnum::IntValue(int) => self.builder.build_int_neg(int, "neg")?.into(),
                    BasicValueEnum::FloatValue(float) => {
                        self.builder.build_float_neg(float, "neg")?.into()
                    }
                    _ => {
                        return Err(InternalError::at(
                            "negation of a non-numeric value",
                            operand.position(),
                            operand.file(),
                        ));
                    }
                }))
            }
            UnaryOperator::Not => {
                let value = self.lower_bool(operand)?;
                Ok(Some(self.builder.build_not(value, "not")?.into()))
            }
            UnaryOperator::AddressOf => {
                let address = match self.lower_address(operand)? {
                    Some(address) => address,
                    None => {
                        let value = self.expect_value(operand)?;
                        self.spill(value, "addr.tmp")?
                    }
                };
                Ok(Some(address.into()))
            }
            UnaryOperator::Deref => {
                let pointer = self
                    .lower_expression(operand)?
                    .ok_or_else(|| {
                        InternalError::at("dereference of a valueless expression", operand.position(), operand.file())
                    })?
                    .into_pointer_value();
                let pointee_ty = match self.sema.interner.get(self.node_type_of(operand)?) {
                    Some(TypeDescriptor::Pointer(pointee)) => *pointee,
                    _ => {
                        return Err(InternalError::at(
                            "dereference of a non-pointer",
                            operand.position(),
                            operand.file(),
                        ));
                    }
                };
                if is_zero_sized(self.sema, pointee_ty) {
                    return Ok(None);
                }
                let llvm_ty = basic_type(self.llvm, self.sema, pointee_ty)?;
                Ok(Some(self.builder.build_load(llvm_ty, pointer, "deref")?))
            }
        }
    }

    fn node_type_of(&self, expr: &ExpressionAst<'base>) -> Result<TypeLocation, InternalError> {
        self.sema.node_type(expr.index()).ok_or_else(|| {
            InternalError::at("expression without a resolved type", expr.position(), expr.file())
        })
    }

    fn lower_binary(
        &mut self,
        left: &'a ExpressionAst<'base>,
        operator: BinaryOperator,
        right: &'a ExpressionAst<'base>,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        if operator.is_logical() {
            return self.lower_short_circuit(left, operator, right);
        }

        let operand_type = self.node_type_of(left)?;
        let lhs = self.lower_expression(left)?.ok_or_else(|| {
            InternalError::at("operand has no value", left.position(), left.file())
        })?;
        let rhs = self.lower_expression(right)?.ok_or_else(|| {
            InternalError::at("operand has no value", right.position(), right.file())
        })?;

        let is_float = self.sema.interner.is_float(operand_type);
        let signed = self.sema.interner.is_signed(operand_type);

        if operator.is_comparison() {
            return Ok(Some(self.lower_comparison(operator, lhs, rhs, is_float, signed)?.into()));
        }

        let value: BasicValueEnum<'ctx> = if is_float {
            let l = lhs.into_float_value();
            let r = rhs.into_float_value();
            match operator {
                BinaryOperator::Add => self.builder.build_float_add(l, r, "fadd")?.into(),
                BinaryOperator::Sub => self.builder.build_float_sub(l, r, "fsub")?.into(),
                BinaryOperator::Mul => self.builder.build_float_mul(l, r, "fmul")?.into(),
                BinaryOperator::Div => self.builder.build_float_div(l, r, "fdiv")?.into(),
                BinaryOperator::Mod => self.builder.build_float_rem(l, r, "frem")?.into(),
                _ => {
                    return Err(InternalError::new("bitwise operator on floats"));
                }
            }
        } else {
            let l = lhs.into_int_value();
            let r = rhs.into_int_value();
            match operator {
                BinaryOperator::Add => self.builder.build_int_add(l, r, "add")?.into(),
                BinaryOperator::Sub => self.builder.build_int_sub(l, r, "sub")?.into(),
                BinaryOperator::Mul => self.builder.build_int_mul(l, r, "mul")?.into(),
                BinaryOperator::Div if signed => {
                    self.builder.build_int_signed_div(l, r, "sdiv")?.into()
                }
                BinaryOperator::Div => self.builder.build_int_unsigned_div(l, r, "udiv")?.into(),
                BinaryOperator::Mod if signed => {
                    self.builder.build_int_signed_rem(l, r, "srem")?.into()
                }
                BinaryOperator::Mod => self.builder.build_int_unsigned_rem(l, r, "urem")?.into(),
                BinaryOperator::BitAnd => self.builder.build_and(l, r, "and")?.into(),
                BinaryOperator::BitOr => self.builder.build_or(l, r, "or")?.into(),
                BinaryOperator::BitXor => self.builder.build_xor(l, r, "xor")?.into(),
                BinaryOperator::ShiftLeft => self.builder.build_left_shift(l, r, "shl")?.into(),
                BinaryOperator::ShiftRight => {
                    self.builder.build_right_shift(l, r, signed, "shr")?.into()
                }
                _ => return Err(InternalError::new("unexpected binary operator")),
            }
        };
        Ok(Some(value))
    }

    /// Comparison with the predicate picked from the resolved operand
    /// type: signed, unsigned or float-ordered.
    fn lower_comparison(
        &mut self,
        operator: BinaryOperator,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
        is_float: bool,
        signed: bool,
    ) -> Result<IntValue<'ctx>, InternalError> {
        if is_float {
            let predicate = match operator {
                BinaryOperator::Equal => FloatPredicate::OEQ,
                BinaryOperator::NotEqual => FloatPredicate::ONE,
                BinaryOperator::Less => FloatPredicate::OLT,
                BinaryOperator::LessEqual => FloatPredicate::OLE,
                BinaryOperator::Greater => FloatPredicate::OGT,
                BinaryOperator::GreaterEqual => FloatPredicate::OGE,
                _ => return Err(InternalError::new("unexpected comparison operator")),
            };
            return Ok(self.builder.build_float_compare(
                predicate,
                lhs.into_float_value(),
                rhs.into_float_value(),
                "fcmp",
            )?);
        }

        let (lhs, rhs) = if lhs.is_pointer_value() {
            let int_ty = self.llvm.i64_type();
            (
                self.builder
                    .build_ptr_to_int(lhs.into_pointer_value(), int_ty, "ptr.lhs")?
                    .into(),
                self.builder
                    .build_ptr_to_int(rhs.into_pointer_value(), int_ty, "ptr.rhs")?
                    .into(),
            )
        } else {
            (lhs, rhs)
        };

        let predicate = match operator {
            BinaryOperator::Equal => IntPredicate::EQ,
            BinaryOperator::NotEqual => IntPredicate::NE,
            BinaryOperator::Less if signed => IntPredicate::SLT,
            BinaryOperator::Less => IntPredicate::ULT,
            BinaryOperator::LessEqual if signed => IntPredicate::SLE,
            BinaryOperator::LessEqual => IntPredicate::ULE,
            BinaryOperator::Greater if signed => IntPredicate::SGT,
            BinaryOperator::Greater => IntPredicate::UGT,
            BinaryOperator::GreaterEqual if signed => IntPredicate::SGE,
            BinaryOperator::GreaterEqual => IntPredicate::UGE,
            _ => return Err(InternalError::new("unexpected comparison operator")),
        };
        Ok(self.builder.build_int_compare(
            predicate,
            lhs.into_int_value(),
            rhs.into_int_value(),
            "cmp",
        )?)
    }

    /// `&&` and `||` evaluate their right side only when needed.
    fn lower_short_circuit(
        &mut self,
        left: &'a ExpressionAst<'base>,
        operator: BinaryOperator,
        right: &'a ExpressionAst<'base>,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        let lhs = self.lower_bool(left)?;
        let lhs_block = self.current_block()?;

        let rhs_block = self.append_block("logic.rhs");
        let merge = self.append_block("logic.end");

        match operator {
            BinaryOperator::And => {
                self.builder.build_conditional_branch(lhs, rhs_block, merge)?;
            }
            BinaryOperator::Or => {
                self.builder.build_conditional_branch(lhs, merge, rhs_block)?;
            }
            _ => return Err(InternalError::new("not a logical operator")),
        }

        self.builder.position_at_end(rhs_block);
        let rhs = self.lower_bool(right)?;
        let rhs_end = self.current_block()?;
        self.builder.build_unconditional_branch(merge)?;

        self.builder.position_at_end(merge);
        let phi = self.builder.build_phi(self.llvm.bool_type(), "logic.value")?;
        let short_value = self
            .llvm
            .bool_type()
            .const_int((operator == BinaryOperator::Or) as u64, false);
        phi.add_incoming(&[(&short_value, lhs_block), (&rhs, rhs_end)]);
        Ok(Some(phi.as_basic_value()))
    }

    // ---- calls -------------------------------------------------------------

    fn lower_call(
        &mut self,
        expr: &'a ExpressionAst<'base>,
        args: &'a [ExpressionAst<'base>],
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        let target = self.sema.call_target(expr.index()).cloned().ok_or_else(|| {
            InternalError::at("call without a resolved target", expr.position(), expr.file())
        })?;

        match target {
            CallTarget::Direct { function } => {
                let (callee, _, result) = self.function_by_symbol(function)?;
                let mut lowered: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push(self.expect_value(arg)?.into());
                }
                self.finish_call(callee, &lowered, result)
            }
            CallTarget::InstanceMethod { function } => {
                let ExpressionAst::MethodCall { receiver, .. } = expr else {
                    return Err(InternalError::new("instance target on a non-method call"));
                };
                let receiver_address = match self.lower_address(receiver)? {
                    Some(address) => address,
                    None => {
                        let value = self.expect_value(receiver)?;
                        self.spill(value, "self.tmp")?
                    }
                };
                let (callee, _, result) = self.function_by_symbol(function)?;
                let mut lowered: Vec<BasicMetadataValueEnum<'ctx>> =
                    vec![receiver_address.into()];
                for arg in args {
                    lowered.push(self.expect_value(arg)?.into());
                }
                self.finish_call(callee, &lowered, result)
            }
            CallTarget::EnumConstructor { enum_type, variant_index } => {
                self.lower_enum_constructor(enum_type, variant_index, args)
            }
            CallTarget::BuiltinLen => self.lower_len(&args[0]),
            CallTarget::BuiltinLog => {
                let argument = self.expect_value(&args[0])?;
                let log = self.runtime_log();
                self.builder.build_call(log, &[argument.into()], "")?;
                Ok(None)
            }
        }
    }

    /// Emits the call and the trailing `unreachable` for `never`
    /// callees.
    fn finish_call(
        &mut self,
        callee: FunctionValue<'ctx>,
        args: &[BasicMetadataValueEnum<'ctx>],
        result: TypeLocation,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        let site = self.builder.build_call(callee, args, "")?;
        if matches!(self.sema.interner.get(result), Some(TypeDescriptor::Never)) {
            self.builder.build_unreachable()?;
            return Ok(None);
        }
        Ok(site.try_as_basic_value().left())
    }

    /// The externally provided `log` runtime function.
    fn runtime_log(&self) -> FunctionValue<'ctx> {
        self.module.get_function("log").unwrap_or_else(|| {
            let ptr = self.llvm.ptr_type(AddressSpace::default());
            let signature = self.llvm.void_type().fn_type(&[ptr.into()], false);
            self.module.add_function("log", signature, None)
        })
    }

    fn lower_len(
        &mut self,
        argument: &'a ExpressionAst<'base>,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        let argument_type = self.node_type_of(argument)?;
        match self.sema.interner.get(argument_type).cloned() {
            Some(TypeDescriptor::Array(_, length)) => {
                // Compile-time constant for fixed arrays; the operand
                // is still evaluated for its effects.
                self.lower_expression(argument)?;
                Ok(Some(self.llvm.i64_type().const_int(length, false).into()))
            }
            Some(TypeDescriptor::Slice(_)) => {
                let slice = self.lower_expression(argument)?.ok_or_else(|| {
                    InternalError::at("slice has no value", argument.position(), argument.file())
                })?;
                let length = self
                    .builder
                    .build_extract_value(slice.into_struct_value(), 1, "len")?;
                Ok(Some(length))
            }
            _ => Err(InternalError::at(
                "len on a type without a length",
                argument.position(),
                argument.file(),
            )),
        }
    }

    /// Builds a variant value in place: allocate the enum struct,
    /// store the discriminant and payload fields, load the whole.
    fn lower_enum_constructor(
        &mut self,
        enum_type: TypeLocation,
        variant_index: usize,
        args: &'a [ExpressionAst<'base>],
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        let llvm_ty = basic_type(self.llvm, self.sema, enum_type)?;
        let slot = self.entry_alloca(llvm_ty, "enum.tmp")?;

        let is_option = matches!(
            self.sema.interner.get(enum_type),
            Some(TypeDescriptor::Enum { def, .. }) if *def == OPTION_DEF
        );
        let tag: BasicValueEnum<'ctx> = if is_option {
            self.llvm.bool_type().const_int((variant_index == 0) as u64, false).into()
        } else {
            self.llvm.i8_type().const_int(variant_index as u64, false).into()
        };
        let tag_address = self.builder.build_struct_gep(llvm_ty, slot, 0, "enum.tag")?;
        self.builder.build_store(tag_address, tag)?;

        let base = enum_payload_base(self.sema, enum_type, variant_index);
        for (position, argument) in args.iter().enumerate() {
            let value = self.expect_value(argument)?;
            let address = self.builder.build_struct_gep(
                llvm_ty,
                slot,
                base + position as u32,
                "enum.payload",
            )?;
            self.builder.build_store(address, value)?;
        }

        Ok(Some(self.builder.build_load(llvm_ty, slot, "enum.value")?))
    }

    // ---- aggregate access --------------------------------------------------

    fn lower_field_access(
        &mut self,
        expr: &'a ExpressionAst<'base>,
        receiver: &'a ExpressionAst<'base>,
        field: &str,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        // Module constants and enum unit variants were rewritten by
        // the analyzer into targets.
        if let Some(target) = self.sema.call_target(expr.index()).cloned() {
            match target {
                CallTarget::Direct { function } => {
                    return match self.sema.symbol(function).kind {
                        SymbolKind::Const => self.lower_const_value(function),
                        _ => {
                            let (value, _, _) = self.function_by_symbol(function)?;
                            Ok(Some(value.as_global_value().as_pointer_value().into()))
                        }
                    };
                }
                CallTarget::EnumConstructor { enum_type, variant_index } => {
                    return self.lower_enum_constructor(enum_type, variant_index, &[]);
                }
                _ => {}
            }
        }

        let receiver_type = self.node_type_of(receiver)?;
        let expr_type = self.node_type(expr)?;
        if is_zero_sized(self.sema, expr_type) {
            self.lower_expression(receiver)?;
            return Ok(None);
        }

        // Through a pointer the access reads memory; otherwise the
        // field is extracted from the loaded aggregate.
        let (aggregate_type, through_pointer) = match self.sema.interner.get(receiver_type) {
            Some(TypeDescriptor::Pointer(pointee)) => (*pointee, true),
            _ => (receiver_type, false),
        };
        let field_index = self.field_index(aggregate_type, field, expr)?;

        if through_pointer {
            let pointer = self
                .lower_expression(receiver)?
                .ok_or_else(|| InternalError::at("receiver has no value", receiver.position(), receiver.file()))?
                .into_pointer_value();
            let llvm_aggregate = basic_type(self.llvm, self.sema, aggregate_type)?;
            let address =
                self.builder.build_struct_gep(llvm_aggregate, pointer, field_index, field)?;
            let llvm_field = basic_type(self.llvm, self.sema, expr_type)?;
            return Ok(Some(self.builder.build_load(llvm_field, address, field)?));
        }

        let aggregate = self.lower_expression(receiver)?.ok_or_else(|| {
            InternalError::at("receiver has no value", receiver.position(), receiver.file())
        })?;
        Ok(Some(self.builder.build_extract_value(
            aggregate.into_struct_value(),
            field_index,
            field,
        )?))
    }

    fn field_index(
        &self,
        aggregate_type: TypeLocation,
        field: &str,
        expr: &ExpressionAst<'base>,
    ) -> Result<u32, InternalError> {
        match self.sema.interner.get(aggregate_type) {
            Some(TypeDescriptor::Struct { .. }) => self
                .sema
                .interner
                .struct_layout(aggregate_type)
                .and_then(|layout| layout.field(field))
                .map(|(index, _)| index as u32)
                .ok_or_else(|| {
                    InternalError::at("unknown field reached lowering", expr.position(), expr.file())
                }),
            Some(TypeDescriptor::Tuple(_)) => field.parse::<u32>().map_err(|_| {
                InternalError::at("invalid tuple index reached lowering", expr.position(), expr.file())
            }),
            _ => Err(InternalError::at(
                "field access on a type without fields",
                expr.position(),
                expr.file(),
            )),
        }
    }

    fn lower_index(
        &mut self,
        receiver: &'a ExpressionAst<'base>,
        index_expr: &'a ExpressionAst<'base>,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        let receiver_type = self.node_type_of(receiver)?;
        match self.sema.interner.get(receiver_type).cloned() {
            Some(TypeDescriptor::Array(element, _)) => {
                let address = match self.lower_address(receiver)? {
                    Some(address) => address,
                    None => {
                        let value = self.expect_value(receiver)?;
                        self.spill(value, "array.tmp")?
                    }
                };
                let index = self
                    .lower_expression(index_expr)?
                    .ok_or_else(|| {
                        InternalError::at("index has no value", index_expr.position(), index_expr.file())
                    })?
                    .into_int_value();
                let llvm_array = basic_type(self.llvm, self.sema, receiver_type)?;
                let zero = self.llvm.i32_type().const_zero();
                // In-bounds access is the checked language contract.
                let element_address = unsafe {
                    self.builder.build_gep(llvm_array, address, &[zero, index], "elem.addr")?
                };
                let llvm_element = basic_type(self.llvm, self.sema, element)?;
                Ok(Some(self.builder.build_load(llvm_element, element_address, "elem")?))
            }
            Some(TypeDescriptor::Slice(element)) => {
                let slice = self.lower_expression(receiver)?.ok_or_else(|| {
                    InternalError::at("slice has no value", receiver.position(), receiver.file())
                })?;
                let base = self
                    .builder
                    .build_extract_value(slice.into_struct_value(), 0, "slice.ptr")?
                    .into_pointer_value();
                let index = self
                    .lower_expression(index_expr)?
                    .ok_or_else(|| {
                        InternalError::at("index has no value", index_expr.position(), index_expr.file())
                    })?
                    .into_int_value();
                let llvm_element = basic_type(self.llvm, self.sema, element)?;
                let element_address =
                    unsafe { self.builder.build_gep(llvm_element, base, &[index], "elem.addr")? };
                Ok(Some(self.builder.build_load(llvm_element, element_address, "elem")?))
            }
            _ => Err(InternalError::at(
                "indexing a type without elements",
                receiver.position(),
                receiver.file(),
            )),
        }
    }

    /// The address of an lvalue, when it has one.
    fn lower_address(
        &mut self,
        expr: &'a ExpressionAst<'base>,
    ) -> Result<Option<PointerValue<'ctx>>, InternalError> {
        match expr {
            ExpressionAst::Identifier { name, .. } => {
                Ok(self.find_local(name.text).and_then(|local| local.ptr))
            }
            ExpressionAst::FieldAccess { receiver, field, .. } => {
                if self.sema.call_target(expr.index()).is_some() {
                    return Ok(None); // module constant or variant, not an lvalue
                }
                let receiver_type = self.node_type_of(receiver)?;
                let (aggregate_type, address) = match self.sema.interner.get(receiver_type) {
                    Some(TypeDescriptor::Pointer(pointee)) => {
                        let pointer = self
                            .lower_expression(receiver)?
                            .ok_or_else(|| {
                                InternalError::at("receiver has no value", receiver.position(), receiver.file())
                            })?
                            .into_pointer_value();
                        (*pointee, Some(pointer))
                    }
                    _ => (receiver_type, self.lower_address(receiver)?),
                };
                let Some(address) = address else { return Ok(None) };
                let field_index = self.field_index(aggregate_type, field.text, expr)?;
                let llvm_aggregate = basic_type(self.llvm, self.sema, aggregate_type)?;
                Ok(Some(self.builder.build_struct_gep(
                    llvm_aggregate,
                    address,
                    field_index,
                    field.text,
                )?))
            }
            ExpressionAst::Index { receiver, index_expr, .. } => {
                let receiver_type = self.node_type_of(receiver)?;
                match self.sema.interner.get(receiver_type).cloned() {
                    Some(TypeDescriptor::Array(_, _)) => {
                        let Some(address) = self.lower_address(receiver)? else {
                            return Ok(None);
                        };
                        let index = self
                            .lower_expression(index_expr)?
                            .ok_or_else(|| {
                                InternalError::at("index has no value", index_expr.position(), index_expr.file())
                            })?
                            .into_int_value();
                        let llvm_array = basic_type(self.llvm, self.sema, receiver_type)?;
                        let zero = self.llvm.i32_type().const_zero();
                        let element_address = unsafe {
                            self.builder.build_gep(llvm_array, address, &[zero, index], "elem.addr")?
                        };
                        Ok(Some(element_address))
                    }
                    Some(TypeDescriptor::Slice(element)) => {
                        let slice = self.lower_expression(receiver)?.ok_or_else(|| {
                            InternalError::at("slice has no value", receiver.position(), receiver.file())
                        })?;
                        let base = self
                            .builder
                            .build_extract_value(slice.into_struct_value(), 0, "slice.ptr")?
                            .into_pointer_value();
                        let index = self
                            .lower_expression(index_expr)?
                            .ok_or_else(|| {
                                InternalError::at("index has no value", index_expr.position(), index_expr.file())
                            })?
                            .into_int_value();
                        let llvm_element = basic_type(self.llvm, self.sema, element)?;
                        let element_address = unsafe {
                            self.builder.build_gep(llvm_element, base, &[index], "elem.addr")?
                        };
                        Ok(Some(element_address))
                    }
                    _ => Ok(None),
                }
            }
            ExpressionAst::Unary { operator: UnaryOperator::Deref, operand, .. } => {
                let pointer = self
                    .lower_expression(operand)?
                    .ok_or_else(|| {
                        InternalError::at("dereference of a valueless expression", operand.position(), operand.file())
                    })?
                    .into_pointer_value();
                Ok(Some(pointer))
            }
            _ => Ok(None),
        }
    }

    fn lower_cast(
        &mut self,
        expr: &'a ExpressionAst<'base>,
        value: &'a ExpressionAst<'base>,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        let from_type = self.node_type_of(value)?;
        let to_type = self.node_type(expr)?;
        let lowered = self.lower_expression(value)?.ok_or_else(|| {
            InternalError::at("cast of a valueless expression", value.position(), value.file())
        })?;

        if from_type == to_type {
            return Ok(Some(lowered));
        }

        let from_signed = self.sema.interner.is_signed(from_type);
        let from_integer = self.sema.interner.is_integer(from_type);
        let from_float = self.sema.interner.is_float(from_type);
        let from_pointer = self.sema.interner.is_pointer(from_type);
        let from_enum =
            matches!(self.sema.interner.get(from_type), Some(TypeDescriptor::Enum { .. }));
        let to_integer = self.sema.interner.is_integer(to_type);
        let to_signed = self.sema.interner.is_signed(to_type);
        let to_float = self.sema.interner.is_float(to_type);
        let to_pointer = self.sema.interner.is_pointer(to_type);
        let to_enum = matches!(self.sema.interner.get(to_type), Some(TypeDescriptor::Enum { .. }));

        let llvm_to = basic_type(self.llvm, self.sema, to_type)?;
        let cast: BasicValueEnum<'ctx> = match () {
            _ if from_integer && to_integer => self
                .builder
                .build_int_cast_sign_flag(
                    lowered.into_int_value(),
                    llvm_to.into_int_type(),
                    from_signed,
                    "cast",
                )?
                .into(),
            _ if from_integer && to_float => {
                if from_signed {
                    self.builder
                        .build_signed_int_to_float(lowered.into_int_value(), llvm_to.into_float_type(), "cast")?
                        .into()
                } else {
                    self.builder
                        .build_unsigned_int_to_float(lowered.into_int_value(), llvm_to.into_float_type(), "cast")?
                        .into()
                }
            }
            _ if from_float && to_integer => {
                if to_signed {
                    self.builder
                        .build_float_to_signed_int(lowered.into_float_value(), llvm_to.into_int_type(), "cast")?
                        .into()
                } else {
                    self.builder
                        .build_float_to_unsigned_int(lowered.into_float_value(), llvm_to.into_int_type(), "cast")?
                        .into()
                }
            }
            _ if from_float && to_float => self
                .builder
                .build_float_cast(lowered.into_float_value(), llvm_to.into_float_type(), "cast")?
                .into(),
            _ if from_pointer && to_pointer => self
                .builder
                .build_pointer_cast(lowered.into_pointer_value(), llvm_to.into_pointer_type(), "cast")?
                .into(),
            _ if from_integer && to_pointer => self
                .builder
                .build_int_to_ptr(lowered.into_int_value(), llvm_to.into_pointer_type(), "cast")?
                .into(),
            _ if from_pointer && to_integer => self
                .builder
                .build_ptr_to_int(lowered.into_pointer_value(), llvm_to.into_int_type(), "cast")?
                .into(),
            _ if from_enum && to_integer => {
                let tag = self
                    .builder
                    .build_extract_value(lowered.into_struct_value(), 0, "tag")?
                    .into_int_value();
                self.builder
                    .build_int_cast_sign_flag(tag, llvm_to.into_int_type(), false, "cast")?
                    .into()
            }
            _ if from_integer && to_enum => {
                let slot = self.entry_alloca(llvm_to, "enum.cast")?;
                let tag_address = self.builder.build_struct_gep(llvm_to, slot, 0, "enum.tag")?;
                let tag_type = llvm_to.into_struct_type().get_field_type_at_index(0).ok_or_else(
                    || InternalError::new("enum type without a discriminant field"),
                )?;
                let tag = self.builder.build_int_cast_sign_flag(
                    lowered.into_int_value(),
                    tag_type.into_int_type(),
                    false,
                    "cast",
                )?;
                self.builder.build_store(tag_address, tag)?;
                self.builder.build_load(llvm_to, slot, "enum.value")?
            }
            _ => {
                return Err(InternalError::at(
                    "cast pair reached lowering unchecked",
                    expr.position(),
                    expr.file(),
                ));
            }
        };
        Ok(Some(cast))
    }

    // ---- aggregate literals ------------------------------------------------

    fn lower_struct_literal(
        &mut self,
        expr: &'a ExpressionAst<'base>,
        fields: &'a [(crate::nom_tools::Span<'base>, ExpressionAst<'base>)],
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        let struct_type = self.node_type(expr)?;
        let layout = self
            .sema
            .interner
            .struct_layout(struct_type)
            .cloned()
            .ok_or_else(|| InternalError::new("struct literal without a layout"))?;
        let llvm_ty = basic_type(self.llvm, self.sema, struct_type)?;
        let slot = self.entry_alloca(llvm_ty, "struct.tmp")?;

        for (name, value) in fields {
            let Some((field_index, _)) = layout.field(name.text) else {
                return Err(InternalError::at(
                    "unknown field reached lowering",
                    expr.position(),
                    expr.file(),
                ));
            };
            let lowered = self.expect_value(value)?;
            let address =
                self.builder.build_struct_gep(llvm_ty, slot, field_index as u32, name.text)?;
            self.builder.build_store(address, lowered)?;
        }

        Ok(Some(self.builder.build_load(llvm_ty, slot, "struct.value")?))
    }

    fn lower_array_literal(
        &mut self,
        expr: &'a ExpressionAst<'base>,
        elements: &'a [ExpressionAst<'base>],
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        let array_type = self.node_type(expr)?;
        let llvm_ty = basic_type(self.llvm, self.sema, array_type)?;
        let slot = self.entry_alloca(llvm_ty, "array.tmp")?;

        let zero = self.llvm.i32_type().const_zero();
        for (position, element) in elements.iter().enumerate() {
            let value = self.expect_value(element)?;
            let index = self.llvm.i32_type().const_int(position as u64, false);
            let address =
                unsafe { self.builder.build_gep(llvm_ty, slot, &[zero, index], "array.elem")? };
            self.builder.build_store(address, value)?;
        }

        Ok(Some(self.builder.build_load(llvm_ty, slot, "array.value")?))
    }

    fn lower_tuple_literal(
        &mut self,
        expr: &'a ExpressionAst<'base>,
        elements: &'a [ExpressionAst<'base>],
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        let tuple_type = self.node_type(expr)?;
        let llvm_ty = basic_type(self.llvm, self.sema, tuple_type)?;
        let slot = self.entry_alloca(llvm_ty, "tuple.tmp")?;

        for (position, element) in elements.iter().enumerate() {
            let value = self.expect_value(element)?;
            let address =
                self.builder.build_struct_gep(llvm_ty, slot, position as u32, "tuple.elem")?;
            self.builder.build_store(address, value)?;
        }

        Ok(Some(self.builder.build_load(llvm_ty, slot, "tuple.value")?))
    }

    // ---- control flow expressions ------------------------------------------

    fn lower_if(
        &mut self,
        expr: &'a ExpressionAst<'base>,
        if_expr: &'a IfExpressionAst<'base>,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        let result_type = self.node_type(expr)?;
        let yields = !is_zero_sized(self.sema, result_type);

        let merge = self.append_block("if.end");
        let mut incoming: Vec<(BasicValueEnum<'ctx>, BasicBlock<'ctx>)> = Vec::new();

        let mut branches: Vec<(&ExpressionAst<'base>, &BlockAst<'base>)> =
            vec![(&if_expr.condition, &if_expr.then_block)];
        for (condition, block) in &if_expr.else_ifs {
            branches.push((condition, block));
        }

        let total = branches.len();
        for (position, (condition, block)) in branches.into_iter().enumerate() {
            let then_block = self.append_block("if.then");
            let last = position == total - 1;
            let else_block = if last && if_expr.else_block.is_none() {
                merge
            } else {
                self.append_block("if.else")
            };

            let condition_value = self.lower_bool(condition)?;
            self.builder.build_conditional_branch(condition_value, then_block, else_block)?;

            self.builder.position_at_end(then_block);
            let value = self.lower_block(block)?;
            if !self.terminated() {
                if yields {
                    if let Some(value) = value {
                        incoming.push((value, self.current_block()?));
                    }
                }
                self.builder.build_unconditional_branch(merge)?;
            }

            self.builder.position_at_end(else_block);
        }

        if let Some(block) = &if_expr.else_block {
            let value = self.lower_block(block)?;
            if !self.terminated() {
                if yields {
                    if let Some(value) = value {
                        incoming.push((value, self.current_block()?));
                    }
                }
                self.builder.build_unconditional_branch(merge)?;
            }
            self.builder.position_at_end(merge);
        }

        if yields && !incoming.is_empty() {
            let llvm_ty = basic_type(self.llvm, self.sema, result_type)?;
            let phi = self.builder.build_phi(llvm_ty, "if.value")?;
            for (value, block) in &incoming {
                phi.add_incoming(&[(value as &dyn BasicValue<'ctx>, *block)]);
            }
            Ok(Some(phi.as_basic_value()))
        } else {
            Ok(None)
        }
    }

    fn lower_if_let(
        &mut self,
        expr: &'a ExpressionAst<'base>,
        if_let: &'a IfLetAst<'base>,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        let result_type = self.node_type(expr)?;
        let yields = !is_zero_sized(self.sema, result_type);

        let scrutinee_type = self.node_type_of(&if_let.value)?;
        let scrutinee = self.lower_expression(&if_let.value)?.ok_or_else(|| {
            InternalError::at("scrutinee has no value", if_let.value.position(), if_let.value.file())
        })?;

        let then_block = self.append_block("iflet.then");
        let else_block = self.append_block("iflet.else");
        let merge = self.append_block("iflet.end");
        let mut incoming: Vec<(BasicValueEnum<'ctx>, BasicBlock<'ctx>)> = Vec::new();

        let matched =
            self.pattern_condition(&if_let.pattern, scrutinee, scrutinee_type)?;
        self.builder.build_conditional_branch(matched, then_block, else_block)?;

        self.builder.position_at_end(then_block);
        self.locals.push(IndexMap::new());
        self.bind_pattern(&if_let.pattern, scrutinee, scrutinee_type)?;
        let value = self.lower_block(&if_let.then_block)?;
        self.locals.pop();
        if !self.terminated() {
            if yields {
                if let Some(value) = value {
                    incoming.push((value, self.current_block()?));
                }
            }
            self.builder.build_unconditional_branch(merge)?;
        }

        self.builder.position_at_end(else_block);
        if let Some(block) = &if_let.else_block {
            let value = self.lower_block(block)?;
            if !self.terminated() {
                if yields {
                    if let Some(value) = value {
                        incoming.push((value, self.current_block()?));
                    }
                }
                self.builder.build_unconditional_branch(merge)?;
            }
        } else {
            self.builder.build_unconditional_branch(merge)?;
        }

        self.builder.position_at_end(merge);
        if yields && !incoming.is_empty() {
            let llvm_ty = basic_type(self.llvm, self.sema, result_type)?;
            let phi = self.builder.build_phi(llvm_ty, "iflet.value")?;
            for (value, block) in &incoming {
                phi.add_incoming(&[(value as &dyn BasicValue<'ctx>, *block)]);
            }
            Ok(Some(phi.as_basic_value()))
        } else {
            Ok(None)
        }
    }

    /// The i1 condition deciding whether a pattern matches.
    fn pattern_condition(
        &mut self,
        pattern: &'a PatternAst<'base>,
        scrutinee: BasicValueEnum<'ctx>,
        scrutinee_type: TypeLocation,
    ) -> Result<IntValue<'ctx>, InternalError> {
        match pattern {
            PatternAst::Wildcard { .. } | PatternAst::Binding { .. } => {
                Ok(self.llvm.bool_type().const_int(1, false))
            }
            PatternAst::Literal { value, .. } => {
                let expected: IntValue<'ctx> = match value {
                    LiteralValue::Int { magnitude, .. } => {
                        let ty = scrutinee.into_int_value().get_type();
                        self.int_constant(ty, *magnitude)?
                    }
                    LiteralValue::Bool(flag) => {
                        self.llvm.bool_type().const_int(*flag as u64, false)
                    }
                    LiteralValue::Char(c) => self.llvm.i32_type().const_int(*c as u64, false),
                    _ => return Err(InternalError::new("unsupported literal pattern")),
                };
                Ok(self.builder.build_int_compare(
                    IntPredicate::EQ,
                    scrutinee.into_int_value(),
                    expected,
                    "pat.cmp",
                )?)
            }
            PatternAst::EnumVariant { variant, .. } => {
                let layout = self
                    .sema
                    .interner
                    .enum_layout(scrutinee_type)
                    .cloned()
                    .ok_or_else(|| InternalError::new("variant pattern on a non-enum"))?;
                let (variant_index, _) = layout
                    .variant(variant.text)
                    .ok_or_else(|| InternalError::new("unknown variant reached lowering"))?;

                let tag = self
                    .builder
                    .build_extract_value(scrutinee.into_struct_value(), 0, "tag")?
                    .into_int_value();
                let is_option = matches!(
                    self.sema.interner.get(scrutinee_type),
                    Some(TypeDescriptor::Enum { def, .. }) if *def == OPTION_DEF
                );
                let expected = if is_option {
                    self.llvm.bool_type().const_int((variant_index == 0) as u64, false)
                } else {
                    self.llvm.i8_type().const_int(variant_index as u64, false)
                };
                Ok(self.builder.build_int_compare(IntPredicate::EQ, tag, expected, "tag.cmp")?)
            }
        }
    }

    /// Declares a pattern's bindings as locals holding the matched
    /// payload fields.
    fn bind_pattern(
        &mut self,
        pattern: &'a PatternAst<'base>,
        scrutinee: BasicValueEnum<'ctx>,
        scrutinee_type: TypeLocation,
    ) -> Result<(), InternalError> {
        match pattern {
            PatternAst::Binding { name } => {
                let slot = self.spill(scrutinee, name.text)?;
                self.insert_local(name.text, Local { ptr: Some(slot), ty: scrutinee_type });
                Ok(())
            }
            PatternAst::EnumVariant { variant, bindings, .. } => {
                let layout = self
                    .sema
                    .interner
                    .enum_layout(scrutinee_type)
                    .cloned()
                    .ok_or_else(|| InternalError::new("variant pattern on a non-enum"))?;
                let (variant_index, payload) = layout
                    .variant(variant.text)
                    .ok_or_else(|| InternalError::new("unknown variant reached lowering"))?;
                let payload: Vec<TypeLocation> = payload.to_vec();

                let base = enum_payload_base(self.sema, scrutinee_type, variant_index);
                for (position, (binding, payload_type)) in
                    bindings.iter().zip(payload.iter()).enumerate()
                {
                    let PatternAst::Binding { name } = binding else { continue };
                    let value = self.builder.build_extract_value(
                        scrutinee.into_struct_value(),
                        base + position as u32,
                        name.text,
                    )?;
                    let slot = self.spill(value, name.text)?;
                    self.insert_local(name.text, Local { ptr: Some(slot), ty: *payload_type });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn lower_match(
        &mut self,
        expr: &'a ExpressionAst<'base>,
        match_expr: &'a MatchExpressionAst<'base>,
    ) -> Result<Option<BasicValueEnum<'ctx>>, InternalError> {
        let result_type = self.node_type(expr)?;
        let yields = !is_zero_sized(self.sema, result_type);

        let scrutinee_type = self.node_type_of(&match_expr.scrutinee)?;
        let scrutinee = self.lower_expression(&match_expr.scrutinee)?.ok_or_else(|| {
            InternalError::at(
                "scrutinee has no value",
                match_expr.scrutinee.position(),
                match_expr.scrutinee.file(),
            )
        })?;

        let merge = self.append_block("match.end");
        let mut incoming: Vec<(BasicValueEnum<'ctx>, BasicBlock<'ctx>)> = Vec::new();
        let mut had_catch_all = false;

        for arm in &match_expr.arms {
            let arm_block = self.append_block("match.arm");
            let catch_all =
                matches!(arm.pattern, PatternAst::Wildcard { .. } | PatternAst::Binding { .. });

            if catch_all {
                self.builder.build_unconditional_branch(arm_block)?;
            } else {
                let next_test = self.append_block("match.next");
                let condition =
                    self.pattern_condition(&arm.pattern, scrutinee, scrutinee_type)?;
                self.builder.build_conditional_branch(condition, arm_block, next_test)?;
                self.builder.position_at_end(arm_block);
                // Fall through below; next_test becomes current after.
                self.lower_match_arm(arm, scrutinee, scrutinee_type, merge, yields, &mut incoming)?;
                self.builder.position_at_end(next_test);
                continue;
            }

            self.builder.position_at_end(arm_block);
            self.lower_match_arm(arm, scrutinee, scrutinee_type, merge, yields, &mut incoming)?;
            had_catch_all = true;
            break;
        }

        // Exhaustiveness was proven by the analyzer: without a wildcard
        // the remaining test block cannot be reached.
        if !had_catch_all && !self.terminated() {
            self.builder.build_unreachable()?;
        }

        self.builder.position_at_end(merge);
        if yields && !incoming.is_empty() {
            let llvm_ty = basic_type(self.llvm, self.sema, result_type)?;
            let phi = self.builder.build_phi(llvm_ty, "match.value")?;
            for (value, block) in &incoming {
                phi.add_incoming(&[(value as &dyn BasicValue<'ctx>, *block)]);
            }
            Ok(Some(phi.as_basic_value()))
        } else {
            Ok(None)
        }
    }

    fn lower_match_arm(
        &mut self,
        arm: &'a crate::ast::MatchArmAst<'base>,
        scrutinee: BasicValueEnum<'ctx>,
        scrutinee_type: TypeLocation,
        merge: BasicBlock<'ctx>,
        yields: bool,
        incoming: &mut Vec<(BasicValueEnum<'ctx>, BasicBlock<'ctx>)>,
    ) -> Result<(), InternalError> {
        self.locals.push(IndexMap::new());
        self.bind_pattern(&arm.pattern, scrutinee, scrutinee_type)?;
        let value = self.lower_block(&arm.body)?;
        self.locals.pop();

        if !self.terminated() {
            if yields {
                if let Some(value) = value {
                    incoming.push((value, self.current_block()?));
                }
            }
            self.builder.build_unconditional_branch(merge)?;
        }
        Ok(())
    }
}
