//! Semantic error and warning definitions.
//!
//! Every semantic diagnostic is a small struct carrying its message
//! parameters, the primary source label and the source file, with
//! miette derive metadata supplying the diagnostic code and help text.
//! [`SemaError`] is the closed set of all of them.
//!
//! Warnings (unused import, unreachable code) are the same shapes with
//! `severity(warning)`; they never fail a compilation.

use miette::SourceSpan;
use crate::file::SourceFile;

/// A `use` of a name that is not defined in any reachable scope.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("'{name}' is not defined")]
#[diagnostic(
    code("sable::sema::undefined_name"),
    help("check the spelling, or declare it before use")
)]
pub struct UndefinedName {
    /// The unresolved name
    pub name: String,
    /// Where the name was used
    #[label("not found in this scope")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// A reference to a type that does not exist.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("'{type_name}' type not found")]
#[diagnostic(
    code("sable::sema::type_not_found"),
    help("import the type or define it in this module")
)]
pub struct TypeNotFound {
    /// The unresolved type name
    pub type_name: String,
    /// Where the type was written
    #[label("no type with this name is visible here")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// A name declared twice in the same scope.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("'{name}' is already defined")]
#[diagnostic(code("sable::sema::already_defined"), help("rename one of the definitions"))]
pub struct AlreadyDefined {
    /// The duplicated name
    pub name: String,
    /// The original definition
    #[label("first defined here")]
    pub old_position: SourceSpan,
    /// The conflicting definition
    #[label("defined again here")]
    pub new_position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// Two types that were required to match but do not.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("expected `{expected}`, found `{found}`")]
#[diagnostic(code("sable::sema::type_mismatch"))]
pub struct TypeMismatch {
    /// The type the context requires
    pub expected: String,
    /// The type the expression has
    pub found: String,
    /// The mismatching expression
    #[label("this has type `{found}`")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// An `if`/`while` condition that is not `bool`.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("condition must be `bool`, found `{found}`")]
#[diagnostic(code("sable::sema::condition_not_bool"))]
pub struct ConditionNotBool {
    /// The condition's actual type
    pub found: String,
    /// The condition expression
    #[label("expected `bool` here")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// A call with the wrong number of arguments.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("'{name}' expects {expected} arguments, found {found}")]
#[diagnostic(code("sable::sema::argument_count"))]
pub struct ArgumentCountMismatch {
    /// The callee name
    pub name: String,
    /// Declared parameter count
    pub expected: usize,
    /// Supplied argument count
    pub found: usize,
    /// The call site
    #[label("wrong number of arguments")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// A call on something that is not a function.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("'{name}' is not callable")]
#[diagnostic(code("sable::sema::not_callable"))]
pub struct NotCallable {
    /// The name that was called
    pub name: String,
    /// The call site
    #[label("this is not a function")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// A field access that names no field of the receiver type.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("type `{type_name}` has no field '{field}'")]
#[diagnostic(code("sable::sema::unknown_field"))]
pub struct UnknownField {
    /// The receiver type
    pub type_name: String,
    /// The missing field
    pub field: String,
    /// The access site
    #[label("unknown field")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// A variant name that does not belong to the enum.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("enum `{enum_name}` has no variant '{variant}'")]
#[diagnostic(code("sable::sema::unknown_variant"))]
pub struct UnknownVariant {
    /// The enum type
    pub enum_name: String,
    /// The missing variant
    pub variant: String,
    /// The use site
    #[label("unknown variant")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// A method call that resolves to no function.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("no method '{method}' for type `{type_name}`")]
#[diagnostic(
    code("sable::sema::unknown_method"),
    help("instance methods are functions named `TypeName_instance_method`")
)]
pub struct UnknownMethod {
    /// The receiver type
    pub type_name: String,
    /// The missing method
    pub method: String,
    /// The call site
    #[label("no such method")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// A `match` over an enum that does not cover every variant.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("match on `{enum_name}` is not exhaustive: missing {missing}")]
#[diagnostic(
    code("sable::sema::non_exhaustive_match"),
    help("add the missing arms or a `_` wildcard arm")
)]
pub struct NonExhaustiveMatch {
    /// The matched enum
    pub enum_name: String,
    /// Comma-separated missing variant names
    pub missing: String,
    /// The match expression
    #[label("not all variants are handled")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// A cast between types with no allowed conversion.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("cannot cast `{from}` to `{to}`")]
#[diagnostic(
    code("sable::sema::invalid_cast"),
    help("casts are allowed between numeric types, pointers, integers and pointers, and enums and integers")
)]
pub struct InvalidCast {
    /// Source type
    pub from: String,
    /// Target type
    pub to: String,
    /// The cast expression
    #[label("invalid cast")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// An assignment whose target binding is not mutable.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("cannot assign to immutable binding '{name}'")]
#[diagnostic(code("sable::sema::assign_to_immutable"), help("declare it with `let mut`"))]
pub struct AssignToImmutable {
    /// The immutable binding
    pub name: String,
    /// The assignment site
    #[label("assignment to immutable binding")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// An assignment whose left side is not an lvalue.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("invalid assignment target")]
#[diagnostic(
    code("sable::sema::invalid_assignment_target"),
    help("only variables, fields, indexes and dereferences can be assigned to")
)]
pub struct InvalidAssignmentTarget {
    /// The target expression
    #[label("cannot assign to this expression")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// `break` or `continue` outside of a loop.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("'{keyword}' outside of a loop")]
#[diagnostic(code("sable::sema::outside_loop"))]
pub struct OutsideLoop {
    /// `break` or `continue`
    pub keyword: &'static str,
    /// The statement
    #[label("not inside any loop")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// A non-unit function whose body can fall off the end.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("function `{function}` may end without returning a value")]
#[diagnostic(
    code("sable::sema::missing_return"),
    help("every path through the body must return `{expected}`")
)]
pub struct MissingReturn {
    /// The function name
    pub function: String,
    /// The declared return type
    pub expected: String,
    /// The function header
    #[label("this function does not always return")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// An import of a module that is not part of the compilation.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("module '{module}' not found")]
#[diagnostic(
    code("sable::sema::import_not_found"),
    help("check the module name, or add its source file to the compilation")
)]
pub struct ImportNotFound {
    /// The missing module path
    pub module: String,
    /// The import statement
    #[label("no module with this name")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// The same module imported twice without distinct aliases.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("module already imported")]
#[diagnostic(code("sable::sema::module_already_imported"), help("remove one of the imports"))]
pub struct ModuleAlreadyImported {
    /// The original import
    #[label("already imported here")]
    pub old_position: SourceSpan,
    /// The duplicate import
    #[label("imported again here")]
    pub new_position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// An integer literal that does not fit its context type.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("literal `{value}` is out of range for `{type_name}`")]
#[diagnostic(code("sable::sema::literal_out_of_range"))]
pub struct LiteralOutOfRange {
    /// The literal text
    pub value: String,
    /// The context type
    pub type_name: String,
    /// The literal
    #[label("does not fit in `{type_name}`")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// An expression whose type cannot be inferred from context.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("cannot infer the type of this expression")]
#[diagnostic(code("sable::sema::cannot_infer"), help("add a type annotation"))]
pub struct CannotInfer {
    /// The expression
    #[label("type is ambiguous here")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// A generic type used with the wrong number of arguments.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("`{name}` expects {expected} type arguments, found {found}")]
#[diagnostic(code("sable::sema::type_argument_count"))]
pub struct WrongTypeArgumentCount {
    /// The generic type name
    pub name: String,
    /// Declared parameter count
    pub expected: usize,
    /// Written argument count
    pub found: usize,
    /// The instantiation site
    #[label("wrong number of type arguments")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// Generic instantiation recursion exceeded the depth limit.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("generic instantiation of `{name}` is too deeply recursive")]
#[diagnostic(code("sable::sema::instantiation_depth"))]
pub struct InstantiationTooDeep {
    /// The generic type name
    pub name: String,
    /// The instantiation site
    #[label("instantiation recursion limit reached")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// Something that names a type or module used where a value is needed.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("'{name}' is not a value")]
#[diagnostic(code("sable::sema::not_a_value"))]
pub struct NotAValue {
    /// The name
    pub name: String,
    /// The use site
    #[label("types and modules cannot be used as values")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// Indexing into a type that has no elements.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("type `{type_name}` cannot be indexed")]
#[diagnostic(code("sable::sema::not_indexable"))]
pub struct NotIndexable {
    /// The receiver type
    pub type_name: String,
    /// The index expression
    #[label("only arrays and slices can be indexed")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// A struct literal missing one or more fields.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("missing field{plural} {missing} in `{type_name}` literal")]
#[diagnostic(code("sable::sema::missing_fields"))]
pub struct MissingFields {
    /// The struct type
    pub type_name: String,
    /// Comma-separated missing field names
    pub missing: String,
    /// `"s"` when more than one field is missing
    pub plural: &'static str,
    /// The literal
    #[label("incomplete struct literal")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// A pattern that does not fit the matched type.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("pattern does not match type `{type_name}`")]
#[diagnostic(code("sable::sema::pattern_mismatch"))]
pub struct PatternMismatch {
    /// The scrutinee type
    pub type_name: String,
    /// The pattern
    #[label("incompatible pattern")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// A constant whose initializer is not a literal.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("constant initializer must be a literal")]
#[diagnostic(code("sable::sema::non_constant_initializer"))]
pub struct NonConstantInitializer {
    /// The initializer expression
    #[label("not a literal value")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// The same function symbol defined in more than one module.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("function '{name}' is defined in more than one module")]
#[diagnostic(
    code("sable::sema::duplicate_function"),
    help("top-level function names are program-wide; rename one of them")
)]
pub struct DuplicateFunctionName {
    /// The duplicated function name
    pub name: String,
    /// The later definition
    #[label("this name is already taken by another module's function")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// Warning: an import that is never used.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("unused import '{module}'")]
#[diagnostic(severity(warning), code("sable::sema::unused_import"))]
pub struct UnusedImport {
    /// The imported module path
    pub module: String,
    /// The import statement
    #[label("imported but never used")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// Warning: statements that can never execute.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("unreachable code")]
#[diagnostic(severity(warning), code("sable::sema::unreachable_code"))]
pub struct UnreachableCode {
    /// The first unreachable statement
    #[label("this statement can never run")]
    pub position: SourceSpan,
    /// Source code context
    #[source_code]
    pub code: SourceFile,
}

/// The closed set of semantic diagnostics.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum SemaError {
    /// See [`UndefinedName`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    UndefinedName(UndefinedName),
    /// See [`TypeNotFound`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    TypeNotFound(TypeNotFound),
    /// See [`AlreadyDefined`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    AlreadyDefined(AlreadyDefined),
    /// See [`TypeMismatch`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    TypeMismatch(TypeMismatch),
    /// See [`ConditionNotBool`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    ConditionNotBool(ConditionNotBool),
    /// See [`ArgumentCountMismatch`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    ArgumentCountMismatch(ArgumentCountMismatch),
    /// See [`NotCallable`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    NotCallable(NotCallable),
    /// See [`UnknownField`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    UnknownField(UnknownField),
    /// See [`UnknownVariant`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    UnknownVariant(UnknownVariant),
    /// See [`UnknownMethod`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    UnknownMethod(UnknownMethod),
    /// See [`NonExhaustiveMatch`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    NonExhaustiveMatch(NonExhaustiveMatch),
    /// See [`InvalidCast`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidCast(InvalidCast),
    /// See [`AssignToImmutable`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    AssignToImmutable(AssignToImmutable),
    /// See [`InvalidAssignmentTarget`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidAssignmentTarget(InvalidAssignmentTarget),
    /// See [`OutsideLoop`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    OutsideLoop(OutsideLoop),
    /// See [`MissingReturn`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    MissingReturn(MissingReturn),
    /// See [`ImportNotFound`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    ImportNotFound(ImportNotFound),
    /// See [`ModuleAlreadyImported`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    ModuleAlreadyImported(ModuleAlreadyImported),
    /// See [`LiteralOutOfRange`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    LiteralOutOfRange(LiteralOutOfRange),
    /// See [`CannotInfer`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    CannotInfer(CannotInfer),
    /// See [`WrongTypeArgumentCount`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    WrongTypeArgumentCount(WrongTypeArgumentCount),
    /// See [`InstantiationTooDeep`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    InstantiationTooDeep(InstantiationTooDeep),
    /// See [`NotAValue`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    NotAValue(NotAValue),
    /// See [`NotIndexable`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    NotIndexable(NotIndexable),
    /// See [`MissingFields`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    MissingFields(MissingFields),
    /// See [`PatternMismatch`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    PatternMismatch(PatternMismatch),
    /// See [`DuplicateFunctionName`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    DuplicateFunctionName(DuplicateFunctionName),
    /// See [`NonConstantInitializer`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    NonConstantInitializer(NonConstantInitializer),
    /// See [`UnusedImport`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    UnusedImport(UnusedImport),
    /// See [`UnreachableCode`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    UnreachableCode(UnreachableCode),
}

macro_rules! from_sema_error {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for SemaError {
                fn from(value: $variant) -> Self {
                    SemaError::$variant(value)
                }
            }

            impl From<$variant> for crate::error::CompilerError {
                fn from(value: $variant) -> Self {
                    crate::error::CompilerError::Semantic(value.into())
                }
            }
        )*

        impl SemaError {
            /// The source file this diagnostic points into.
            pub fn source_file(&self) -> &SourceFile {
                match self {
                    $(SemaError::$variant(inner) => &inner.code,)*
                }
            }
        }
    };
}

from_sema_error!(
    UndefinedName,
    TypeNotFound,
    AlreadyDefined,
    TypeMismatch,
    ConditionNotBool,
    ArgumentCountMismatch,
    NotCallable,
    UnknownField,
    UnknownVariant,
    UnknownMethod,
    NonExhaustiveMatch,
    InvalidCast,
    AssignToImmutable,
    InvalidAssignmentTarget,
    OutsideLoop,
    MissingReturn,
    ImportNotFound,
    ModuleAlreadyImported,
    LiteralOutOfRange,
    CannotInfer,
    WrongTypeArgumentCount,
    InstantiationTooDeep,
    NotAValue,
    NotIndexable,
    MissingFields,
    PatternMismatch,
    DuplicateFunctionName,
    NonConstantInitializer,
    UnusedImport,
    UnreachableCode,
);
