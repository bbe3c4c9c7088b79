//! Scoped symbol tables for the Sable semantic analyzer.
//!
//! Scopes form a tree rooted at the compilation's global scope. Each
//! module, function, block and type-parameter list gets its own scope;
//! name lookup walks from the current scope to the root. Module aliases
//! resolve to a module's scope so qualified lookups can continue there.
//!
//! Symbols are created once, owned by the context's symbol vector, and
//! addressed by [`SymbolLocation`]. They are never moved between scopes
//! and live until the compilation is dropped.

use std::borrow::Cow;

use indexmap::IndexMap;

use crate::ast::AstIndex;
use crate::nom_tools::SpanInfo;
use crate::types::TypeLocation;

/// Index of a scope in the context's scope vector.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ScopeLocation(pub usize);

impl ScopeLocation {
    /// Sentinel for an invalid scope.
    pub const UNDEFINED: Self = ScopeLocation(usize::MAX);
}

impl From<usize> for ScopeLocation {
    fn from(location: usize) -> Self {
        ScopeLocation(location)
    }
}

/// Index of a symbol in the context's symbol vector.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolLocation(pub usize);

impl From<usize> for SymbolLocation {
    fn from(location: usize) -> Self {
        SymbolLocation(location)
    }
}

/// What a symbol names.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    /// A function definition
    Function,
    /// An external function declaration
    ExternFunction,
    /// A local `let` binding
    Variable,
    /// A function parameter
    Parameter,
    /// A constant
    Const,
    /// A struct definition
    Struct,
    /// An enum definition
    Enum,
    /// A module bound by an import
    Module,
    /// A generic type parameter
    TypeParam,
}

/// One named declaration.
#[derive(Debug, Clone)]
pub struct Symbol<'base> {
    /// The declared name
    pub name: Cow<'base, str>,
    /// What kind of declaration this is
    pub kind: SymbolKind,
    /// The AST node that declared it
    pub declaring_node: AstIndex,
    /// The symbol's type: the value type for bindings and consts, the
    /// function type for functions, the nominal type for structs/enums
    pub type_location: TypeLocation,
    /// Whether the declaration is `pub`
    pub is_public: bool,
    /// The scope the symbol was declared in
    pub owning_scope: ScopeLocation,
    /// Source location of the declaring name
    pub span: SpanInfo,
    /// Whether assignment to the binding is allowed
    pub mutable: bool,
    /// For [`SymbolKind::Module`] symbols: the imported module's path
    pub module_path: Option<String>,
}

/// The role of a scope in the tree.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScopeKind {
    /// The compilation's root scope
    Global,
    /// One module's top-level scope
    Module,
    /// A function body
    Function,
    /// A nested block, loop body, or match arm
    Block,
    /// Generic type parameters of a struct or enum definition
    TypeParams,
}

/// One scope: a named region with its own bindings.
#[derive(Debug)]
pub struct Scope<'base> {
    /// This scope's own location
    pub location: ScopeLocation,
    /// The role of this scope
    pub kind: ScopeKind,
    /// Parent scope; `None` only for the root
    pub parent: Option<ScopeLocation>,
    /// The module path this scope belongs to
    pub module: Option<String>,
    /// Bindings declared directly in this scope; module aliases
    /// introduced by imports live here as [`SymbolKind::Module`]
    /// symbols
    bindings: IndexMap<Cow<'base, str>, SymbolLocation>,
}

impl<'base> Scope<'base> {
    /// Creates a scope; callers register it with the context.
    pub fn new(
        location: ScopeLocation,
        kind: ScopeKind,
        parent: Option<ScopeLocation>,
        module: Option<String>,
    ) -> Self {
        Self { location, kind, parent, module, bindings: IndexMap::new() }
    }

    /// A binding declared directly in this scope.
    pub fn local(&self, name: &str) -> Option<SymbolLocation> {
        self.bindings.get(name).copied()
    }

    /// Inserts a binding, returning the previous symbol on collision.
    pub fn insert(&mut self, name: Cow<'base, str>, symbol: SymbolLocation) -> Option<SymbolLocation> {
        self.bindings.insert(name, symbol)
    }

    /// Iterates bindings in declaration order.
    pub fn bindings(&self) -> impl Iterator<Item = (&Cow<'base, str>, SymbolLocation)> {
        self.bindings.iter().map(|(name, symbol)| (name, *symbol))
    }
}
