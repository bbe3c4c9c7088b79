//! Central state for semantic analysis.
//!
//! The [`SemaContext`] is the single owner of everything the analyzer
//! produces: the scope tree, the symbol vector, the interned type
//! table, the per-node annotation tables and the collected diagnostics.
//! The lowerer reads it and never writes it.

use std::borrow::Cow;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use log::debug;

use crate::ast::{AstIndex, ConstDefinitionAst, EnumDefinitionAst, StructDefinitionAst};
use crate::error::CompilerError;
use crate::file::SourceFile;
use crate::nom_tools::SpanInfo;
use crate::sema::error::AlreadyDefined;
use crate::sema::scope::{Scope, ScopeKind, ScopeLocation, Symbol, SymbolKind, SymbolLocation};
use crate::types::{DefId, TypeInterner, TypeLocation};

/// One module of the compilation, created per source file.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    /// The dotted module path
    pub path: String,
    /// The module's top-level scope
    pub scope: ScopeLocation,
    /// The source file backing the module
    pub file: SourceFile,
}

/// How a call expression resolved; recorded per call node for the
/// lowerer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// A direct call to a named function or extern (including
    /// associated functions and module-qualified calls)
    Direct {
        /// The callee's symbol
        function: SymbolLocation,
    },
    /// An instance method call; the lowerer passes the receiver's
    /// address as the first argument
    InstanceMethod {
        /// The callee's symbol
        function: SymbolLocation,
    },
    /// An enum variant constructor; no function is called, the variant
    /// struct is built in place
    EnumConstructor {
        /// The constructed enum instantiation
        enum_type: TypeLocation,
        /// The variant's declaration index
        variant_index: usize,
    },
    /// The built-in `len`
    BuiltinLen,
    /// The built-in `log`
    BuiltinLog,
}

/// The AST behind a generic definition, kept for instantiation.
#[derive(Debug, Clone)]
pub enum GenericDefKind<'base> {
    /// A generic struct
    Struct(Rc<StructDefinitionAst<'base>>),
    /// A generic enum
    Enum(Rc<EnumDefinitionAst<'base>>),
}

/// A generic struct or enum definition awaiting instantiation.
#[derive(Debug, Clone)]
pub struct GenericDef<'base> {
    /// The definition's id
    pub def: DefId,
    /// Type parameter names in declaration order
    pub params: Vec<String>,
    /// The definition's AST
    pub kind: GenericDefKind<'base>,
    /// The module scope the definition was declared in
    pub scope: ScopeLocation,
}

/// Maximum nesting depth for generic type instantiation.
pub(crate) const MAX_INSTANTIATION_DEPTH: usize = 64;

/// The semantic analysis context owned by one compilation.
#[derive(Debug)]
pub struct SemaContext<'base> {
    /// The interned type table
    pub interner: TypeInterner,
    /// Modules by path, in input order
    pub modules: IndexMap<String, ModuleInfo>,
    /// All scopes; [`ScopeLocation`] indexes into this
    pub scopes: Vec<Scope<'base>>,
    /// All symbols; [`SymbolLocation`] indexes into this
    pub symbols: Vec<Symbol<'base>>,
    /// Resolved type of every checked expression node
    pub node_types: IndexMap<AstIndex, TypeLocation>,
    /// Resolution of every call and constructor node
    pub call_targets: IndexMap<AstIndex, CallTarget>,
    /// Symbol each identifier expression resolved to
    pub name_targets: IndexMap<AstIndex, SymbolLocation>,
    /// Program-wide function symbols by name (they become LLVM symbol
    /// names, so the name space is flat)
    pub functions: IndexMap<String, SymbolLocation>,
    /// Constant definitions by symbol, for the lowerer
    pub const_defs: IndexMap<SymbolLocation, Rc<ConstDefinitionAst<'base>>>,
    /// Generic definitions by id
    pub generics: IndexMap<DefId, GenericDef<'base>>,
    /// Definition ids of struct/enum symbols
    pub symbol_defs: IndexMap<SymbolLocation, DefId>,
    /// Import symbols that were actually used
    pub used_imports: IndexSet<SymbolLocation>,
    /// Collected diagnostics
    pub errors: Vec<CompilerError>,
    /// Current generic instantiation depth
    pub(crate) instantiation_depth: usize,
    /// Instantiations whose layouts are currently being resolved
    pub(crate) instantiating: IndexSet<TypeLocation>,
}

impl Default for SemaContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'base> SemaContext<'base> {
    /// Creates an empty context with the root scope in place.
    pub fn new() -> Self {
        let mut context = Self {
            interner: TypeInterner::new(),
            modules: IndexMap::new(),
            scopes: Vec::new(),
            symbols: Vec::new(),
            node_types: IndexMap::new(),
            call_targets: IndexMap::new(),
            name_targets: IndexMap::new(),
            functions: IndexMap::new(),
            const_defs: IndexMap::new(),
            generics: IndexMap::new(),
            symbol_defs: IndexMap::new(),
            used_imports: IndexSet::new(),
            errors: Vec::new(),
            instantiation_depth: 0,
            instantiating: IndexSet::new(),
        };
        context.scopes.push(Scope::new(ScopeLocation(0), ScopeKind::Global, None, None));
        context
    }

    /// The root scope of the compilation.
    pub fn root_scope(&self) -> ScopeLocation {
        ScopeLocation(0)
    }

    /// Creates a child scope and returns its location.
    pub fn create_scope(
        &mut self,
        kind: ScopeKind,
        parent: ScopeLocation,
        module: Option<String>,
    ) -> ScopeLocation {
        let location = ScopeLocation(self.scopes.len());
        let module = module.or_else(|| self.scope(parent).module.clone());
        debug!("new scope {}(parent) -> {}(child)", parent.0, location.0);
        self.scopes.push(Scope::new(location, kind, Some(parent), module));
        location
    }

    /// Immutable scope access; the location must be valid.
    pub fn scope(&self, location: ScopeLocation) -> &Scope<'base> {
        &self.scopes[location.0]
    }

    /// Mutable scope access; the location must be valid.
    pub fn scope_mut(&mut self, location: ScopeLocation) -> &mut Scope<'base> {
        &mut self.scopes[location.0]
    }

    /// Immutable symbol access; the location must be valid.
    pub fn symbol(&self, location: SymbolLocation) -> &Symbol<'base> {
        &self.symbols[location.0]
    }

    /// Mutable symbol access; the location must be valid.
    pub fn symbol_mut(&mut self, location: SymbolLocation) -> &mut Symbol<'base> {
        &mut self.symbols[location.0]
    }

    /// Declares a symbol in a scope, reporting a duplicate definition
    /// when the name is already bound there.
    #[allow(clippy::too_many_arguments)]
    pub fn declare(
        &mut self,
        scope: ScopeLocation,
        name: Cow<'base, str>,
        kind: SymbolKind,
        declaring_node: AstIndex,
        type_location: TypeLocation,
        is_public: bool,
        span: SpanInfo,
        mutable: bool,
    ) -> Option<SymbolLocation> {
        if let Some(existing) = self.scope(scope).local(&name) {
            let old = self.symbol(existing).span.clone();
            self.error(AlreadyDefined {
                name: name.to_string(),
                old_position: old.position.into(),
                new_position: span.position.clone().into(),
                code: span.file.clone(),
            });
            return None;
        }

        let location = SymbolLocation(self.symbols.len());
        debug!("declare {kind:?} '{name}' in scope {}", scope.0);
        self.symbols.push(Symbol {
            name: name.clone(),
            kind,
            declaring_node,
            type_location,
            is_public,
            owning_scope: scope,
            span,
            mutable,
            module_path: None,
        });
        self.scope_mut(scope).insert(name, location);
        Some(location)
    }

    /// Resolves a name by walking from `scope` to the root.
    ///
    /// Module symbols found on the way are marked as used for the
    /// unused-import post-check. Deterministic: repeated calls within a
    /// phase always yield the same symbol.
    pub fn resolve(&mut self, scope: ScopeLocation, name: &str) -> Option<SymbolLocation> {
        let mut current = Some(scope);
        while let Some(location) = current {
            if let Some(symbol) = self.scope(location).local(name) {
                if self.symbol(symbol).kind == SymbolKind::Module {
                    self.used_imports.insert(symbol);
                }
                return Some(symbol);
            }
            current = self.scope(location).parent;
        }
        None
    }

    /// Resolves a name inside one module's top-level scope only.
    pub fn resolve_in_module(&mut self, module_path: &str, name: &str) -> Option<SymbolLocation> {
        let scope = self.modules.get(module_path)?.scope;
        self.scope(scope).local(name)
    }

    /// The resolved type of an expression node, when recorded.
    pub fn node_type(&self, index: AstIndex) -> Option<TypeLocation> {
        self.node_types.get(&index).copied()
    }

    /// Records the resolved type of an expression node.
    pub fn set_node_type(&mut self, index: AstIndex, location: TypeLocation) {
        self.node_types.insert(index, location);
    }

    /// Records how a call node resolved.
    pub fn set_call_target(&mut self, index: AstIndex, target: CallTarget) {
        self.call_targets.insert(index, target);
    }

    /// Records the symbol an identifier expression resolved to.
    pub fn set_name_target(&mut self, index: AstIndex, symbol: SymbolLocation) {
        self.name_targets.insert(index, symbol);
    }

    /// The recorded resolution of a call node.
    pub fn call_target(&self, index: AstIndex) -> Option<&CallTarget> {
        self.call_targets.get(&index)
    }

    /// Collects a diagnostic.
    pub fn error(&mut self, error: impl Into<CompilerError>) {
        self.errors.push(error.into());
    }

    /// True when any collected diagnostic is an error (not a warning).
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|error| error.severity() == crate::error::Severity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrimitiveKind;

    fn span() -> SpanInfo {
        SpanInfo::new(0..1, SourceFile::new(vec!["test".into()], "x".to_string()))
    }

    #[test]
    fn declare_and_resolve() {
        let mut context = SemaContext::new();
        let module = context.create_scope(ScopeKind::Module, context.root_scope(), Some("m".into()));
        let ty = context.interner.primitive(PrimitiveKind::I32);

        let symbol = context
            .declare(module, "x".into(), SymbolKind::Variable, AstIndex(0), ty, false, span(), false)
            .unwrap();
        assert_eq!(context.resolve(module, "x"), Some(symbol));

        let child = context.create_scope(ScopeKind::Block, module, None);
        assert_eq!(context.resolve(child, "x"), Some(symbol), "lookup walks to parent");
        assert_eq!(context.resolve(child, "y"), None);
    }

    #[test]
    fn duplicate_declaration_is_reported() {
        let mut context = SemaContext::new();
        let scope = context.create_scope(ScopeKind::Module, context.root_scope(), Some("m".into()));
        let ty = context.interner.primitive(PrimitiveKind::I32);

        context.declare(scope, "x".into(), SymbolKind::Variable, AstIndex(0), ty, false, span(), false);
        let second = context.declare(scope, "x".into(), SymbolKind::Variable, AstIndex(1), ty, false, span(), false);
        assert!(second.is_none());
        assert!(context.has_errors());
    }

    #[test]
    fn shadowing_in_child_scope_is_allowed() {
        let mut context = SemaContext::new();
        let outer = context.create_scope(ScopeKind::Function, context.root_scope(), None);
        let inner = context.create_scope(ScopeKind::Block, outer, None);
        let ty = context.interner.primitive(PrimitiveKind::I32);

        let first = context
            .declare(outer, "x".into(), SymbolKind::Variable, AstIndex(0), ty, false, span(), false)
            .unwrap();
        let second = context
            .declare(inner, "x".into(), SymbolKind::Variable, AstIndex(1), ty, false, span(), false)
            .unwrap();

        assert_eq!(context.resolve(inner, "x"), Some(second));
        assert_eq!(context.resolve(outer, "x"), Some(first));
        assert!(!context.has_errors());
    }

    #[test]
    fn resolve_is_deterministic() {
        let mut context = SemaContext::new();
        let scope = context.create_scope(ScopeKind::Module, context.root_scope(), Some("m".into()));
        let ty = context.interner.primitive(PrimitiveKind::I32);
        context.declare(scope, "x".into(), SymbolKind::Variable, AstIndex(0), ty, false, span(), false);

        let first = context.resolve(scope, "x");
        let second = context.resolve(scope, "x");
        assert_eq!(first, second);
    }
}
