//! Abstract Syntax Tree definitions for the Sable language.
//!
//! The AST is the structured result of parsing one source file. It is the
//! bridge between the parser and the semantic analyzer: the parser builds
//! it, the analyzer reads it and records annotations *next to* it (keyed
//! by [`AstIndex`]), and the lowerer reads both.
//!
//! # Design principles
//!
//! 1. **Lifetime management**: nodes borrow source text through the
//!    `'base` lifetime instead of copying it.
//! 2. **Stable ids**: every expression and statement node carries an
//!    [`AstIndex`] allocated from the parser state's atomic counter. Ids
//!    are the cross-reference currency used by the analyzer's side
//!    tables (resolved types, call targets) and by diagnostics.
//! 3. **Strict tree**: children are owned by their parent; nodes never
//!    reference each other by pointer. References to declarations go
//!    through name lookup in the symbol table.
//! 4. **Immutability**: nothing mutates a node after parsing; all later
//!    phases annotate through id-keyed tables.

use std::{borrow::Cow, ops::Range, rc::Rc};
use strum_macros::EnumIs;

use crate::{file::SourceFile, nom_tools::Span};

/// Unique identifier for AST nodes within a compilation unit.
///
/// Serves as the key for the analyzer's annotation tables and keeps
/// cross-references free of raw pointers.
#[derive(PartialEq, Debug, Copy, Clone, Eq, PartialOrd, Ord, Hash)]
pub struct AstIndex(pub usize);

/// The base an integer literal was written in.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum IntBase {
    /// Binary literal (`0b1010`)
    Binary,
    /// Octal literal (`0o17`)
    Octal,
    /// Decimal literal (`42`)
    Decimal,
    /// Hexadecimal literal (`0xff`)
    Hexadecimal,
}

impl IntBase {
    /// The numeric radix of this base.
    pub fn radix(self) -> u32 {
        match self {
            IntBase::Binary => 2,
            IntBase::Octal => 8,
            IntBase::Decimal => 10,
            IntBase::Hexadecimal => 16,
        }
    }
}

/// Literal values as they appear in source code.
///
/// Integer literals keep their unsigned magnitude and original base;
/// they are not given a concrete width here. Range checking against the
/// type the context expects happens in semantic analysis, which also
/// resolves the literal's final type.
#[derive(PartialEq, Debug, Clone)]
pub enum LiteralValue<'base> {
    /// Integer literal magnitude with its written base
    Int {
        /// Unsigned magnitude; sign is handled by the unary minus operator
        magnitude: u128,
        /// Base the literal was written in
        base: IntBase,
    },
    /// Floating point literal
    Float(f64),
    /// Boolean literal (`true` / `false`)
    Bool(bool),
    /// Character literal
    Char(char),
    /// String literal, borrowed from the source when no escapes occur
    String(Cow<'base, str>),
    /// The unit literal `()`
    Unit,
}

/// Unary operators.
#[derive(PartialEq, Copy, Clone, Debug)]
pub enum UnaryOperator {
    /// Arithmetic negation (`-`)
    Negate,
    /// Logical not (`!`)
    Not,
    /// Address-of (`&`)
    AddressOf,
    /// Pointer dereference (`*`)
    Deref,
}

/// Binary operators, ordered by the precedence groups the parser uses.
///
/// Highest to lowest: multiplicative, additive, shifts, relational,
/// equality, bitwise and/xor/or, logical and, logical or.
#[derive(PartialEq, Copy, Clone, Debug)]
pub enum BinaryOperator {
    /// Addition (`+`)
    Add,
    /// Subtraction (`-`)
    Sub,
    /// Multiplication (`*`)
    Mul,
    /// Division (`/`)
    Div,
    /// Remainder (`%`)
    Mod,
    /// Logical and (`&&`)
    And,
    /// Logical or (`||`)
    Or,
    /// Equality (`==`)
    Equal,
    /// Inequality (`!=`)
    NotEqual,
    /// Greater-or-equal (`>=`)
    GreaterEqual,
    /// Greater-than (`>`)
    Greater,
    /// Less-or-equal (`<=`)
    LessEqual,
    /// Less-than (`<`)
    Less,
    /// Bitwise xor (`^`)
    BitXor,
    /// Bitwise or (`|`)
    BitOr,
    /// Bitwise and (`&`)
    BitAnd,
    /// Left shift (`<<`)
    ShiftLeft,
    /// Right shift (`>>`)
    ShiftRight,
}

impl BinaryOperator {
    /// True for `+ - * / %`.
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOperator::Add | BinaryOperator::Sub | BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Mod
        )
    }

    /// True for the six comparison operators.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::Greater
                | BinaryOperator::GreaterEqual
                | BinaryOperator::Less
                | BinaryOperator::LessEqual
        )
    }

    /// True for `&&` and `||`.
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    /// True for `& | ^ << >>`.
    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOperator::BitAnd
                | BinaryOperator::BitOr
                | BinaryOperator::BitXor
                | BinaryOperator::ShiftLeft
                | BinaryOperator::ShiftRight
        )
    }
}

/// A type as written in source code.
///
/// Written types are resolved to interned type descriptors by the
/// semantic analyzer; the AST only records their syntactic shape.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeAst<'base> {
    /// A bare type name (`i32`, `Point`, `never`)
    Named {
        /// The type name
        name: Span<'base>,
    },
    /// A generic instantiation (`Option<i32>`, `Pair<i32, bool>`)
    Generic {
        /// The generic type name
        name: Span<'base>,
        /// Written type arguments
        args: Vec<TypeAst<'base>>,
        /// Span of the whole instantiation
        span: Span<'base>,
    },
    /// A pointer type (`*T`)
    Pointer {
        /// The pointee type
        pointee: Box<TypeAst<'base>>,
        /// Span of the whole pointer type
        span: Span<'base>,
    },
    /// A slice type (`[T]`)
    Slice {
        /// The element type
        element: Box<TypeAst<'base>>,
        /// Span of the whole slice type
        span: Span<'base>,
    },
    /// A fixed-size array type (`[T; 4]`)
    Array {
        /// The element type
        element: Box<TypeAst<'base>>,
        /// The written element count
        len: u64,
        /// Span of the whole array type
        span: Span<'base>,
    },
    /// A tuple type (`(T, U)`)
    Tuple {
        /// Element types
        elements: Vec<TypeAst<'base>>,
        /// Span of the whole tuple type
        span: Span<'base>,
    },
    /// A function type (`fn(T, U) -> R`)
    Function {
        /// Parameter types
        params: Vec<TypeAst<'base>>,
        /// Result type; `None` means unit
        result: Option<Box<TypeAst<'base>>>,
        /// Span of the whole function type
        span: Span<'base>,
    },
}

impl TypeAst<'_> {
    /// Byte range of the written type, for diagnostics.
    pub fn position(&self) -> Range<usize> {
        match self {
            TypeAst::Named { name } => name.position.clone(),
            TypeAst::Generic { span, .. }
            | TypeAst::Pointer { span, .. }
            | TypeAst::Slice { span, .. }
            | TypeAst::Array { span, .. }
            | TypeAst::Tuple { span, .. }
            | TypeAst::Function { span, .. } => span.position.clone(),
        }
    }

    /// The source file the written type came from.
    pub fn file(&self) -> SourceFile {
        match self {
            TypeAst::Named { name } => name.state.file.clone(),
            TypeAst::Generic { span, .. }
            | TypeAst::Pointer { span, .. }
            | TypeAst::Slice { span, .. }
            | TypeAst::Array { span, .. }
            | TypeAst::Tuple { span, .. }
            | TypeAst::Function { span, .. } => span.state.file.clone(),
        }
    }
}

/// Patterns used by `match` arms and `if let`.
#[derive(Debug, PartialEq, EnumIs)]
pub enum PatternAst<'base> {
    /// The wildcard pattern `_`
    Wildcard {
        /// Span of the `_`
        span: Span<'base>,
    },
    /// A binding pattern that names the matched value
    Binding {
        /// Name introduced by the binding
        name: Span<'base>,
    },
    /// A literal pattern (`0`, `true`)
    Literal {
        /// Span of the literal
        span: Span<'base>,
        /// The literal value
        value: LiteralValue<'base>,
    },
    /// An enum variant pattern (`Shape.Circle(r)`, `Option.None`)
    EnumVariant {
        /// The enum type name, when written qualified
        enum_name: Option<Span<'base>>,
        /// The variant name
        variant: Span<'base>,
        /// Binding patterns for the payload fields
        bindings: Vec<PatternAst<'base>>,
        /// Span of the whole pattern
        span: Span<'base>,
    },
}

impl PatternAst<'_> {
    /// Byte range of the pattern, for diagnostics.
    pub fn position(&self) -> Range<usize> {
        match self {
            PatternAst::Wildcard { span } => span.position.clone(),
            PatternAst::Binding { name } => name.position.clone(),
            PatternAst::Literal { span, .. } => span.position.clone(),
            PatternAst::EnumVariant { span, .. } => span.position.clone(),
        }
    }
}

/// One arm of a `match` expression.
#[derive(Debug, PartialEq)]
pub struct MatchArmAst<'base> {
    /// Unique index of this arm
    pub index: AstIndex,
    /// Pattern matched by this arm
    pub pattern: PatternAst<'base>,
    /// The arm body; `pattern => expr` is wrapped into a one-expression block
    pub body: BlockAst<'base>,
}

/// A `match` expression.
#[derive(Debug, PartialEq)]
pub struct MatchExpressionAst<'base> {
    /// Unique index of this expression
    pub index: AstIndex,
    /// The value being matched
    pub scrutinee: Box<ExpressionAst<'base>>,
    /// Arms in source order
    pub arms: Vec<MatchArmAst<'base>>,
    /// Span of the whole expression
    pub span: Span<'base>,
}

/// An `if` / `else if` / `else` expression.
#[derive(Debug, PartialEq)]
pub struct IfExpressionAst<'base> {
    /// Unique index of this expression
    pub index: AstIndex,
    /// Main condition
    pub condition: Box<ExpressionAst<'base>>,
    /// Block executed when the condition holds
    pub then_block: BlockAst<'base>,
    /// `else if` branches with their conditions and blocks
    pub else_ifs: Vec<(ExpressionAst<'base>, BlockAst<'base>)>,
    /// Optional `else` block
    pub else_block: Option<BlockAst<'base>>,
    /// Span of the whole expression
    pub span: Span<'base>,
}

/// An `if let` expression testing a pattern against a value.
#[derive(Debug, PartialEq)]
pub struct IfLetAst<'base> {
    /// Unique index of this expression
    pub index: AstIndex,
    /// Pattern being tested
    pub pattern: PatternAst<'base>,
    /// Value the pattern is tested against
    pub value: Box<ExpressionAst<'base>>,
    /// Block executed on a match
    pub then_block: BlockAst<'base>,
    /// Optional `else` block
    pub else_block: Option<BlockAst<'base>>,
    /// Span of the whole expression
    pub span: Span<'base>,
}

/// Expression nodes.
#[derive(Debug, PartialEq, EnumIs)]
pub enum ExpressionAst<'base> {
    /// A literal value
    Literal {
        /// Unique index of this node
        index: AstIndex,
        /// Span of the literal
        span: Span<'base>,
        /// The literal value
        value: LiteralValue<'base>,
    },
    /// A bare identifier
    Identifier {
        /// Unique index of this node
        index: AstIndex,
        /// The identifier
        name: Span<'base>,
    },
    /// A binary operation
    Binary {
        /// Unique index of this node
        index: AstIndex,
        /// Left operand
        left: Box<ExpressionAst<'base>>,
        /// The operator
        operator: BinaryOperator,
        /// Right operand
        right: Box<ExpressionAst<'base>>,
    },
    /// A unary operation
    Unary {
        /// Unique index of this node
        index: AstIndex,
        /// The operator
        operator: UnaryOperator,
        /// The operand
        operand: Box<ExpressionAst<'base>>,
        /// Span of the whole expression
        span: Span<'base>,
    },
    /// A direct call to a named function (`f(a, b)`)
    Call {
        /// Unique index of this node
        index: AstIndex,
        /// The called name
        function: Span<'base>,
        /// Argument expressions
        args: Vec<ExpressionAst<'base>>,
        /// Span of the whole call
        span: Span<'base>,
    },
    /// A call through a receiver (`o.m(a)`, `Type.f(a)`, `mod.f(a)`)
    ///
    /// The analyzer decides whether this is an instance method, an
    /// associated function, an enum constructor or a module-qualified
    /// call, and records the decision in its call-target table.
    MethodCall {
        /// Unique index of this node
        index: AstIndex,
        /// Receiver expression
        receiver: Box<ExpressionAst<'base>>,
        /// Method name
        method: Span<'base>,
        /// Argument expressions
        args: Vec<ExpressionAst<'base>>,
        /// Span of the whole call
        span: Span<'base>,
    },
    /// Field access (`o.f`, `mod.CONST`, tuple access `t.0`)
    FieldAccess {
        /// Unique index of this node
        index: AstIndex,
        /// Receiver expression
        receiver: Box<ExpressionAst<'base>>,
        /// Field name
        field: Span<'base>,
    },
    /// Indexing (`a[i]`)
    Index {
        /// Unique index of this node
        index: AstIndex,
        /// Receiver expression
        receiver: Box<ExpressionAst<'base>>,
        /// Index expression
        index_expr: Box<ExpressionAst<'base>>,
        /// Span of the whole expression
        span: Span<'base>,
    },
    /// A cast (`e as T`)
    Cast {
        /// Unique index of this node
        index: AstIndex,
        /// Value being cast
        value: Box<ExpressionAst<'base>>,
        /// Target type as written
        target: TypeAst<'base>,
        /// Span of the whole expression
        span: Span<'base>,
    },
    /// A struct literal (`Point { x: 1, y: 2 }`)
    StructLiteral {
        /// Unique index of this node
        index: AstIndex,
        /// The struct type name
        name: Span<'base>,
        /// Field initializers in written order
        fields: Vec<(Span<'base>, ExpressionAst<'base>)>,
        /// Span of the whole literal
        span: Span<'base>,
    },
    /// An array literal (`[1, 2, 3]`)
    ArrayLiteral {
        /// Unique index of this node
        index: AstIndex,
        /// Element expressions
        elements: Vec<ExpressionAst<'base>>,
        /// Span of the whole literal
        span: Span<'base>,
    },
    /// A tuple literal (`(1, true)`)
    TupleLiteral {
        /// Unique index of this node
        index: AstIndex,
        /// Element expressions; always two or more
        elements: Vec<ExpressionAst<'base>>,
        /// Span of the whole literal
        span: Span<'base>,
    },
    /// An `if` expression
    If(IfExpressionAst<'base>),
    /// An `if let` expression
    IfLet(IfLetAst<'base>),
    /// A `match` expression
    Match(MatchExpressionAst<'base>),
}

impl<'base> ExpressionAst<'base> {
    /// The node's unique index.
    pub fn index(&self) -> AstIndex {
        match self {
            ExpressionAst::Literal { index, .. }
            | ExpressionAst::Identifier { index, .. }
            | ExpressionAst::Binary { index, .. }
            | ExpressionAst::Unary { index, .. }
            | ExpressionAst::Call { index, .. }
            | ExpressionAst::MethodCall { index, .. }
            | ExpressionAst::FieldAccess { index, .. }
            | ExpressionAst::Index { index, .. }
            | ExpressionAst::Cast { index, .. }
            | ExpressionAst::StructLiteral { index, .. }
            | ExpressionAst::ArrayLiteral { index, .. }
            | ExpressionAst::TupleLiteral { index, .. } => *index,
            ExpressionAst::If(inner) => inner.index,
            ExpressionAst::IfLet(inner) => inner.index,
            ExpressionAst::Match(inner) => inner.index,
        }
    }

    /// Byte range of the expression, for diagnostics.
    pub fn position(&self) -> Range<usize> {
        match self {
            ExpressionAst::Literal { span, .. } => span.position.clone(),
            ExpressionAst::Identifier { name, .. } => name.position.clone(),
            ExpressionAst::Binary { left, right, .. } => {
                let left = left.position();
                let right = right.position();
                left.start.min(right.start)..left.end.max(right.end)
            }
            ExpressionAst::Unary { span, .. }
            | ExpressionAst::Call { span, .. }
            | ExpressionAst::MethodCall { span, .. }
            | ExpressionAst::Index { span, .. }
            | ExpressionAst::Cast { span, .. }
            | ExpressionAst::StructLiteral { span, .. }
            | ExpressionAst::ArrayLiteral { span, .. }
            | ExpressionAst::TupleLiteral { span, .. } => span.position.clone(),
            ExpressionAst::FieldAccess { receiver, field, .. } => {
                receiver.position().start..field.position.end
            }
            ExpressionAst::If(inner) => inner.span.position.clone(),
            ExpressionAst::IfLet(inner) => inner.span.position.clone(),
            ExpressionAst::Match(inner) => inner.span.position.clone(),
        }
    }

    /// The source file the expression came from.
    pub fn file(&self) -> SourceFile {
        match self {
            ExpressionAst::Literal { span, .. } => span.state.file.clone(),
            ExpressionAst::Identifier { name, .. } => name.state.file.clone(),
            ExpressionAst::Binary { left, .. } => left.file(),
            ExpressionAst::Unary { span, .. }
            | ExpressionAst::Call { span, .. }
            | ExpressionAst::MethodCall { span, .. }
            | ExpressionAst::Index { span, .. }
            | ExpressionAst::Cast { span, .. }
            | ExpressionAst::StructLiteral { span, .. }
            | ExpressionAst::ArrayLiteral { span, .. }
            | ExpressionAst::TupleLiteral { span, .. } => span.state.file.clone(),
            ExpressionAst::FieldAccess { receiver, .. } => receiver.file(),
            ExpressionAst::If(inner) => inner.span.state.file.clone(),
            ExpressionAst::IfLet(inner) => inner.span.state.file.clone(),
            ExpressionAst::Match(inner) => inner.span.state.file.clone(),
        }
    }
}

/// Statements inside blocks.
#[derive(Debug, PartialEq, EnumIs)]
pub enum StatementAst<'base> {
    /// A `let` binding
    Let {
        /// Unique index of this statement
        index: AstIndex,
        /// Whether the binding is mutable (`let mut`)
        mutable: bool,
        /// Binding name
        name: Span<'base>,
        /// Optional written type
        written_type: Option<TypeAst<'base>>,
        /// Initializer expression
        value: ExpressionAst<'base>,
    },
    /// An assignment to an existing lvalue
    Assignment {
        /// Unique index of this statement
        index: AstIndex,
        /// Assignment target (identifier, field, index or deref)
        target: ExpressionAst<'base>,
        /// New value expression
        value: ExpressionAst<'base>,
    },
    /// A `while` loop
    While {
        /// Unique index of this statement
        index: AstIndex,
        /// Loop condition
        condition: ExpressionAst<'base>,
        /// Loop body
        body: BlockAst<'base>,
        /// Span of the `while` keyword
        span: Span<'base>,
    },
    /// A `for` loop over a half-open integer range
    For {
        /// Unique index of this statement
        index: AstIndex,
        /// Induction variable name
        binding: Span<'base>,
        /// Range start expression
        start: ExpressionAst<'base>,
        /// Range end expression (exclusive)
        end: ExpressionAst<'base>,
        /// Loop body
        body: BlockAst<'base>,
        /// Span of the `for` keyword
        span: Span<'base>,
    },
    /// A `return` statement
    Return {
        /// Unique index of this statement
        index: AstIndex,
        /// Optional return value
        value: Option<ExpressionAst<'base>>,
        /// Span of the `return` keyword
        span: Span<'base>,
    },
    /// A `break` statement
    Break {
        /// Unique index of this statement
        index: AstIndex,
        /// Span of the keyword
        span: Span<'base>,
    },
    /// A `continue` statement
    Continue {
        /// Unique index of this statement
        index: AstIndex,
        /// Span of the keyword
        span: Span<'base>,
    },
    /// An expression statement; without a trailing semicolon as the last
    /// statement it is the block's tail value
    Expression {
        /// The expression
        expr: ExpressionAst<'base>,
        /// Whether the statement ended with `;`
        semicolon: bool,
    },
}

impl StatementAst<'_> {
    /// Byte range of the statement, for diagnostics.
    pub fn position(&self) -> Range<usize> {
        match self {
            StatementAst::Let { name, value, .. } => name.position.start..value.position().end,
            StatementAst::Assignment { target, value, .. } => {
                target.position().start..value.position().end
            }
            StatementAst::While { span, body, .. } | StatementAst::For { span, body, .. } => {
                span.position.start..body.span.position.end
            }
            StatementAst::Return { span, value, .. } => match value {
                Some(value) => span.position.start..value.position().end,
                None => span.position.clone(),
            },
            StatementAst::Break { span, .. } | StatementAst::Continue { span, .. } => {
                span.position.clone()
            }
            StatementAst::Expression { expr, .. } => expr.position(),
        }
    }
}

/// A brace-delimited statement block.
///
/// An empty block has zero statements; it is never a missing child. The
/// block's value is its trailing expression statement without a
/// semicolon, or unit.
#[derive(Debug, PartialEq)]
pub struct BlockAst<'base> {
    /// Statements in source order
    pub statements: Vec<StatementAst<'base>>,
    /// Span of the whole block including braces
    pub span: Span<'base>,
}

impl<'base> BlockAst<'base> {
    /// The tail expression giving the block its value, if any.
    pub fn tail_expression(&self) -> Option<&ExpressionAst<'base>> {
        match self.statements.last() {
            Some(StatementAst::Expression { expr, semicolon: false }) => Some(expr),
            _ => None,
        }
    }
}

/// A function parameter (`name: Type`).
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterAst<'base> {
    /// Parameter name
    pub name: Span<'base>,
    /// Written parameter type
    pub written_type: TypeAst<'base>,
}

/// A function definition.
#[derive(Debug, PartialEq)]
pub struct FunctionDefinitionAst<'base> {
    /// Unique index of this declaration
    pub index: AstIndex,
    /// Optional `pub` visibility modifier
    pub is_public: Option<Span<'base>>,
    /// Function name
    pub name: Span<'base>,
    /// Parameters in source order
    pub parameters: Vec<ParameterAst<'base>>,
    /// Span covering the parameter list
    pub parameters_span: Span<'base>,
    /// Written return type; `None` means unit
    pub return_type: Option<TypeAst<'base>>,
    /// Function body
    pub body: BlockAst<'base>,
}

/// An external function declaration (`extern fn name(...) -> T;`).
#[derive(Debug, PartialEq)]
pub struct ExternFunctionAst<'base> {
    /// Unique index of this declaration
    pub index: AstIndex,
    /// Function name
    pub name: Span<'base>,
    /// Declared parameters
    pub parameters: Vec<ParameterAst<'base>>,
    /// Whether the declaration ends with `...`
    pub variadic: bool,
    /// Written return type; `None` means unit
    pub return_type: Option<TypeAst<'base>>,
}

/// A struct field declaration.
#[derive(Debug, PartialEq)]
pub struct FieldAst<'base> {
    /// Field name
    pub name: Span<'base>,
    /// Written field type
    pub field_type: TypeAst<'base>,
}

/// A struct definition.
#[derive(Debug, PartialEq)]
pub struct StructDefinitionAst<'base> {
    /// Unique index of this declaration
    pub index: AstIndex,
    /// Optional `pub` visibility modifier
    pub is_public: Option<Span<'base>>,
    /// Struct name
    pub name: Span<'base>,
    /// Generic type parameters, possibly empty
    pub type_params: Vec<Span<'base>>,
    /// Fields in source order
    pub fields: Vec<FieldAst<'base>>,
}

/// One variant of an enum definition.
#[derive(Debug, PartialEq)]
pub struct VariantAst<'base> {
    /// Variant name
    pub name: Span<'base>,
    /// Payload field types, possibly empty
    pub payload: Vec<TypeAst<'base>>,
}

/// An enum definition.
#[derive(Debug, PartialEq)]
pub struct EnumDefinitionAst<'base> {
    /// Unique index of this declaration
    pub index: AstIndex,
    /// Optional `pub` visibility modifier
    pub is_public: Option<Span<'base>>,
    /// Enum name
    pub name: Span<'base>,
    /// Generic type parameters, possibly empty
    pub type_params: Vec<Span<'base>>,
    /// Variants in source order
    pub variants: Vec<VariantAst<'base>>,
}

/// A top-level constant definition.
#[derive(Debug, PartialEq)]
pub struct ConstDefinitionAst<'base> {
    /// Unique index of this declaration
    pub index: AstIndex,
    /// Optional `pub` visibility modifier
    pub is_public: Option<Span<'base>>,
    /// Constant name
    pub name: Span<'base>,
    /// Written type
    pub written_type: TypeAst<'base>,
    /// Value expression
    pub value: ExpressionAst<'base>,
}

/// An import statement (`import mod;` / `import mod as alias;`).
#[derive(Debug, PartialEq)]
pub struct ImportAst<'base> {
    /// Unique index of this declaration
    pub index: AstIndex,
    /// Dotted module path components
    pub module: Vec<Span<'base>>,
    /// Optional alias name
    pub alias: Option<Span<'base>>,
    /// Span of the whole statement
    pub span: Span<'base>,
}

impl<'base> ImportAst<'base> {
    /// The dotted module path as a string.
    pub fn module_path(&self) -> String {
        self.module.iter().map(|part| part.text).collect::<Vec<_>>().join(".")
    }

    /// The name the module is bound to locally: the alias when present,
    /// otherwise the last path component.
    pub fn local_name(&self) -> &Span<'base> {
        self.alias.as_ref().unwrap_or_else(|| self.module.last().expect("import path is never empty"))
    }
}

/// Top-level statements that can appear in a source file.
#[derive(EnumIs, Debug)]
pub enum FileStatementAst<'base> {
    /// Function definition
    Function(Rc<FunctionDefinitionAst<'base>>),
    /// Struct definition
    Struct(Rc<StructDefinitionAst<'base>>),
    /// Enum definition
    Enum(Rc<EnumDefinitionAst<'base>>),
    /// Constant definition
    Const(Rc<ConstDefinitionAst<'base>>),
    /// External function declaration
    Extern(Rc<ExternFunctionAst<'base>>),
    /// Import statement
    Import(Rc<ImportAst<'base>>),
}

/// Root AST node representing a complete parsed source file.
///
/// One file is one module. The file AST owns every node below it, so
/// the whole tree is released as a single unit when the compilation is
/// dropped.
#[derive(Debug)]
pub struct FileAst<'base> {
    /// Source file information
    pub file: SourceFile,
    /// Top-level statements in source order
    pub statements: Vec<FileStatementAst<'base>>,
}
